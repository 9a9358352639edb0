//! Hash, value noise, and FBM shared by both effects.
//!
//! The GLSL and the Rust functions below are the same arithmetic; keep them in
//! step when editing either.

use glam::{Vec2, Vec3};

pub(crate) const GLSL: &str = r"
float hash21(vec2 p) {
    p = fract(p * vec2(123.34, 456.21));
    p += vec2(dot(p, p + vec2(45.32)));
    return fract(p.x * p.y);
}

float valueNoise(vec2 p) {
    vec2 i = floor(p);
    vec2 f = fract(p);
    vec2 u = f * f * (vec2(3.0) - 2.0 * f);
    float a = hash21(i);
    float b = hash21(i + vec2(1.0, 0.0));
    float c = hash21(i + vec2(0.0, 1.0));
    float d = hash21(i + vec2(1.0, 1.0));
    return mix(mix(a, b, u.x), mix(c, d, u.x), u.y);
}

float fbm(vec2 p) {
    float value = 0.0;
    float amplitude = 0.5;
    for (int octave = 0; octave < 5; octave++) {
        value += amplitude * valueNoise(p);
        p = p * 2.03 + vec2(17.1, 9.2);
        amplitude *= 0.5;
    }
    return value;
}
";

pub const TAU: f32 = 6.283_185_5;

/// GLSL `fract`: `x - floor(x)`, always in `[0, 1)`.
pub fn fract(x: f32) -> f32 {
    x - x.floor()
}

fn fract2(v: Vec2) -> Vec2 {
    v - v.floor()
}

/// GLSL `mod`: result takes the sign of `y`.
pub fn modulo(x: f32, y: f32) -> f32 {
    x - y * (x / y).floor()
}

pub fn mix(a: f32, b: f32, t: f32) -> f32 {
    a * (1.0 - t) + b * t
}

pub fn mix3(a: Vec3, b: Vec3, t: f32) -> Vec3 {
    a * (1.0 - t) + b * t
}

pub fn smoothstep(edge0: f32, edge1: f32, x: f32) -> f32 {
    let t = ((x - edge0) / (edge1 - edge0)).clamp(0.0, 1.0);
    t * t * (3.0 - 2.0 * t)
}

/// Stable pseudo-random value in `[0, 1)` for a 2D key.
pub fn hash21(p: Vec2) -> f32 {
    let mut p = fract2(p * Vec2::new(123.34, 456.21));
    p += Vec2::splat(p.dot(p + Vec2::splat(45.32)));
    fract(p.x * p.y)
}

pub fn value_noise(p: Vec2) -> f32 {
    let i = p.floor();
    let f = fract2(p);
    let u = f * f * (Vec2::splat(3.0) - 2.0 * f);
    let a = hash21(i);
    let b = hash21(i + Vec2::new(1.0, 0.0));
    let c = hash21(i + Vec2::new(0.0, 1.0));
    let d = hash21(i + Vec2::new(1.0, 1.0));
    mix(mix(a, b, u.x), mix(c, d, u.x), u.y)
}

/// Five octaves of [`value_noise`]; the result stays below 1.
pub fn fbm(mut p: Vec2) -> f32 {
    let mut value = 0.0;
    let mut amplitude = 0.5;
    for _ in 0..5 {
        value += amplitude * value_noise(p);
        p = p * 2.03 + Vec2::new(17.1, 9.2);
        amplitude *= 0.5;
    }
    value
}

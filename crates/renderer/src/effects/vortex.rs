//! Logarithmic spiral ("Droste") warp over an FBM field.
//!
//! The pixel is taken into log-polar space with a complex logarithm, rotated
//! and scaled by `beta` so one annulus `r1..r2` maps onto a strip of width
//! `log(r2 / r1)`, shifted by the zoom, wrapped with `mod`, and mapped back out
//! with a complex exponential. The FBM field is blended between the two ends of
//! the strip so the wrap boundary leaves no seam.

use glam::{Vec2, Vec3};

use super::noise::{fbm, mix, mix3, modulo, smoothstep, TAU};
use super::FrameInputs;
use crate::types::VortexParams;

/// Color returned at the exact canvas center, where `log` and `atan2` are undefined.
pub const VORTEX_CORE: Vec3 = Vec3::new(1.0, 0.86, 0.55);

const AMBER_DEEP: Vec3 = Vec3::new(0.08, 0.03, 0.01);
const AMBER: Vec3 = Vec3::new(0.85, 0.45, 0.10);
const GOLD: Vec3 = Vec3::new(1.0, 0.78, 0.35);
const FIELD_SCALE: f32 = 3.0;
const ORIGIN_EPSILON: f32 = 1e-6;

pub(crate) const GLSL: &str = r"
const vec3 VORTEX_CORE = vec3(1.0, 0.86, 0.55);
const vec3 AMBER_DEEP = vec3(0.08, 0.03, 0.01);
const vec3 AMBER = vec3(0.85, 0.45, 0.10);
const vec3 GOLD = vec3(1.0, 0.78, 0.35);
const float FIELD_SCALE = 3.0;

vec2 clog(vec2 z) {
    return vec2(log(length(z)), atan(z.y, z.x));
}

vec2 cexp(vec2 z) {
    return exp(z.x) * vec2(cos(z.y), sin(z.y));
}

vec2 cdiv(vec2 a, vec2 b) {
    float d = dot(b, b);
    return vec2(a.x * b.x + a.y * b.y, a.y * b.x - a.x * b.y) / d;
}

vec3 shade(vec2 fragCoord) {
    vec2 uv = (fragCoord - 0.5 * ubo.resolution) / ubo.resolution.y;
    float r = length(uv);
    if (!(r >= 1e-6)) {
        return VORTEX_CORE;
    }

    float r1 = ubo.innerRadius;
    float r2 = ubo.outerRadius;
    float period = log(r2 / r1);
    float alpha = atan(period / TAU);
    vec2 beta = cos(alpha) * vec2(cos(alpha), sin(alpha));

    vec2 z = cdiv(clog(uv), beta);
    z.x = mod(z.x - ubo.time * ubo.zoomSpeed, period);
    vec2 w = cexp(z) * r1;

    float near = fbm(w * FIELD_SCALE);
    float far = fbm(w * (r1 / r2) * FIELD_SCALE);
    float field = mix(near, far, z.x / period);

    vec3 col = mix(AMBER_DEEP, AMBER, smoothstep(0.2, 0.6, field));
    col = mix(col, GOLD, smoothstep(0.55, 0.85, field));
    float glow = exp(-r * 4.0);
    float vignette = 1.0 - smoothstep(0.35, 1.1, r);
    col = col * vignette + VORTEX_CORE * glow * 0.5;
    return clamp(col, vec3(0.0), vec3(1.0));
}
";

fn clog(z: Vec2) -> Vec2 {
    Vec2::new(z.length().ln(), z.y.atan2(z.x))
}

fn cexp(z: Vec2) -> Vec2 {
    z.x.exp() * Vec2::new(z.y.cos(), z.y.sin())
}

fn cdiv(a: Vec2, b: Vec2) -> Vec2 {
    let d = b.dot(b);
    Vec2::new(a.x * b.x + a.y * b.y, a.y * b.x - a.x * b.y) / d
}

pub fn shade(params: &VortexParams, frag_coord: Vec2, inputs: &FrameInputs) -> Vec3 {
    let uv = (frag_coord - 0.5 * inputs.resolution) / inputs.resolution.y;
    let r = uv.length();
    if !(r >= ORIGIN_EPSILON) {
        return VORTEX_CORE;
    }

    let r1 = params.inner_radius;
    let r2 = params.outer_radius;
    let period = (r2 / r1).ln();
    let alpha = (period / TAU).atan();
    let beta = alpha.cos() * Vec2::new(alpha.cos(), alpha.sin());

    let mut z = cdiv(clog(uv), beta);
    z.x = modulo(z.x - inputs.time * params.zoom_speed, period);
    let w = cexp(z) * r1;

    let near = fbm(w * FIELD_SCALE);
    let far = fbm(w * (r1 / r2) * FIELD_SCALE);
    let field = mix(near, far, z.x / period);

    let mut col = mix3(AMBER_DEEP, AMBER, smoothstep(0.2, 0.6, field));
    col = mix3(col, GOLD, smoothstep(0.55, 0.85, field));
    let glow = (-r * 4.0).exp();
    let vignette = 1.0 - smoothstep(0.35, 1.1, r);
    col = col * vignette + VORTEX_CORE * glow * 0.5;
    col.clamp(Vec3::ZERO, Vec3::ONE)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn inputs(time: f32) -> FrameInputs {
        FrameInputs {
            time,
            resolution: Vec2::new(800.0, 600.0),
        }
    }

    #[test]
    fn center_pixel_uses_core_color() {
        let params = VortexParams::default();
        let color = shade(&params, Vec2::new(400.0, 300.0), &inputs(1.0 / 24.0));
        assert_eq!(color, VORTEX_CORE);
    }

    #[test]
    fn output_is_finite_and_clamped() {
        let params = VortexParams::default();
        for y in (0..600).step_by(37) {
            for x in (0..800).step_by(41) {
                let frag = Vec2::new(x as f32 + 0.5, y as f32 + 0.5);
                let color = shade(&params, frag, &inputs(3.7));
                assert!(color.is_finite(), "{color} at {frag}");
                assert!(color.min_element() >= 0.0 && color.max_element() <= 1.0);
            }
        }
    }

    #[test]
    fn zoom_period_repeats_the_frame() {
        // Advancing time by one strip width over zoom speed lands on the same
        // wrapped coordinate.
        let params = VortexParams::default();
        let period = (params.outer_radius / params.inner_radius).ln();
        let frag = Vec2::new(520.5, 211.5);
        let a = shade(&params, frag, &inputs(0.5));
        let b = shade(&params, frag, &inputs(0.5 + period / params.zoom_speed));
        assert!((a - b).abs().max_element() < 1e-3, "{a} vs {b}");
    }

    #[test]
    fn degenerate_resolution_does_not_produce_nan() {
        let params = VortexParams::default();
        let zero = FrameInputs {
            time: 0.0,
            resolution: Vec2::ZERO,
        };
        assert_eq!(shade(&params, Vec2::ZERO, &zero), VORTEX_CORE);
    }
}

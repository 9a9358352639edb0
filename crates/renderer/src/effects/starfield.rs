//! Multi-layer parallax starfield.
//!
//! Each layer tiles the screen into a grid whose scale follows the layer's
//! depth. Star placement, size, twinkle phase, and hue come from hashing the
//! grid cell together with the layer index and seed, so a star never moves
//! within its layer's grid between frames; only depth-driven scale, fade, and
//! twinkle animate.

use glam::{IVec2, Vec2, Vec3};

use super::noise::{fract, hash21, mix, smoothstep, TAU};
use super::FrameInputs;
use crate::types::{StarfieldParams, MAX_STAR_LAYERS};

/// Seeds are folded into this range so hash keys keep their fractional bits.
pub const SEED_PERIOD: u32 = 4096;

const NEAR_SCALE: f32 = 22.0;
const FAR_SCALE: f32 = 1.5;
const STAR_RADIUS: f32 = 0.035;
const MAX_GLOW: f32 = 6.0;

pub(crate) const GLSL: &str = r"
const int MAX_LAYERS = 8;

vec3 paletteColor(float h) {
    int count = int(ubo.paletteLen);
    int index = max(min(int(h * ubo.paletteLen), count - 1), 0);
    return ubo.palette[index].rgb;
}

vec3 starLayer(vec2 uv, float layer, float depth) {
    float scale = mix(22.0, 1.5, depth);
    float fade = smoothstep(0.0, 0.25, depth) * (1.0 - smoothstep(0.85, 1.0, depth));
    vec2 p = uv * scale + vec2(layer * 17.0, layer * 9.0);
    vec2 cell = floor(p);
    vec2 salt = vec2(layer * 31.7 + ubo.seed, layer * 11.3 - ubo.seed * 0.5);
    vec3 col = vec3(0.0);
    for (int y = -1; y <= 1; y++) {
        for (int x = -1; x <= 1; x++) {
            vec2 id = cell + vec2(float(x), float(y));
            vec2 key = id + salt;
            vec2 jitter = vec2(hash21(key), hash21(key + vec2(19.19, 7.77))) - vec2(0.5);
            vec2 star = id + vec2(0.5) + jitter * 0.8;
            float d = length(p - star);
            float size = mix(0.5, 1.0, hash21(key + vec2(7.1, 2.9)));
            float glow = min(pow(0.035 * size / max(d, 1e-4), ubo.intensity), 6.0);
            glow *= 1.0 - smoothstep(0.6, 1.2, d);
            float twinkle = 0.7 + 0.3 * sin(ubo.time * 2.0 + hash21(key + vec2(5.3, 13.1)) * TAU);
            col += paletteColor(hash21(key + vec2(3.7, 91.3))) * glow * twinkle;
        }
    }
    return col * fade;
}

vec3 shade(vec2 fragCoord) {
    vec2 uv = (fragCoord - 0.5 * ubo.resolution) / ubo.resolution.y;
    vec3 col = vec3(0.0);
    for (int i = 0; i < MAX_LAYERS; i++) {
        float layer = float(i);
        if (layer >= ubo.layerCount) {
            break;
        }
        float depth = fract(layer / ubo.layerCount + ubo.time * ubo.driftSpeed);
        col += starLayer(uv, layer, depth);
    }
    col *= 1.0 - smoothstep(0.45, 1.25, length(uv));
    return col / (col + vec3(1.0));
}
";

/// One star as it lands on screen for a given frame.
#[derive(Clone, Copy, Debug, PartialEq)]
pub struct Star {
    pub layer: u32,
    pub cell: [i32; 2],
    /// Pixel position, bottom-left origin.
    pub position: [f32; 2],
    pub palette_index: usize,
    pub depth: f32,
}

/// Hash-derived attributes of the star living in one grid cell.
struct CellStar {
    center: Vec2,
    size: f32,
    phase: f32,
    hue: f32,
}

pub(crate) fn seed_value(seed: u32) -> f32 {
    (seed % SEED_PERIOD) as f32
}

pub(crate) fn layer_count(params: &StarfieldParams) -> u32 {
    params.layers.clamp(1, MAX_STAR_LAYERS)
}

fn layer_depth(layer: f32, layers: f32, time: f32, drift_speed: f32) -> f32 {
    fract(layer / layers + time * drift_speed)
}

fn layer_offset(layer: f32) -> Vec2 {
    Vec2::new(layer * 17.0, layer * 9.0)
}

fn cell_star(layer: f32, seed: f32, id: Vec2) -> CellStar {
    let salt = Vec2::new(layer * 31.7 + seed, layer * 11.3 - seed * 0.5);
    let key = id + salt;
    let jitter = Vec2::new(hash21(key), hash21(key + Vec2::new(19.19, 7.77))) - Vec2::splat(0.5);
    CellStar {
        center: id + Vec2::splat(0.5) + jitter * 0.8,
        size: mix(0.5, 1.0, hash21(key + Vec2::new(7.1, 2.9))),
        phase: hash21(key + Vec2::new(5.3, 13.1)),
        hue: hash21(key + Vec2::new(3.7, 91.3)),
    }
}

fn palette_index(hue: f32, palette_len: usize) -> usize {
    let count = palette_len as i32;
    ((hue * palette_len as f32) as i32).min(count - 1).max(0) as usize
}

fn palette_color(params: &StarfieldParams, hue: f32) -> Vec3 {
    params
        .palette
        .get(palette_index(hue, params.palette.len()))
        .map(|rgb| Vec3::from_array(*rgb))
        .unwrap_or(Vec3::ONE)
}

fn star_layer(params: &StarfieldParams, uv: Vec2, layer: f32, depth: f32, time: f32) -> Vec3 {
    let scale = mix(NEAR_SCALE, FAR_SCALE, depth);
    let fade = smoothstep(0.0, 0.25, depth) * (1.0 - smoothstep(0.85, 1.0, depth));
    let p = uv * scale + layer_offset(layer);
    let cell = p.floor();
    let seed = seed_value(params.seed);
    let mut col = Vec3::ZERO;
    for y in -1..=1 {
        for x in -1..=1 {
            let id = cell + Vec2::new(x as f32, y as f32);
            let star = cell_star(layer, seed, id);
            let d = (p - star.center).length();
            let mut glow = (STAR_RADIUS * star.size / d.max(1e-4))
                .powf(params.intensity)
                .min(MAX_GLOW);
            glow *= 1.0 - smoothstep(0.6, 1.2, d);
            let twinkle = 0.7 + 0.3 * (time * 2.0 + star.phase * TAU).sin();
            col += palette_color(params, star.hue) * glow * twinkle;
        }
    }
    col * fade
}

pub fn shade(params: &StarfieldParams, frag_coord: Vec2, inputs: &FrameInputs) -> Vec3 {
    let uv = (frag_coord - 0.5 * inputs.resolution) / inputs.resolution.y;
    let layers = layer_count(params);
    let mut col = Vec3::ZERO;
    for i in 0..layers {
        let layer = i as f32;
        let depth = layer_depth(layer, layers as f32, inputs.time, params.drift_speed);
        col += star_layer(params, uv, layer, depth, inputs.time);
    }
    col *= 1.0 - smoothstep(0.45, 1.25, uv.length());
    col / (col + Vec3::ONE)
}

/// Enumerates the stars whose centers fall inside the frame.
pub fn visible_stars(params: &StarfieldParams, time: f32, resolution: Vec2) -> Vec<Star> {
    if !(resolution.x > 0.0 && resolution.y > 0.0) {
        return Vec::new();
    }
    let layers = layer_count(params);
    let seed = seed_value(params.seed);
    let half = Vec2::new(0.5 * resolution.x / resolution.y, 0.5);
    let mut stars = Vec::new();

    for i in 0..layers {
        let layer = i as f32;
        let depth = layer_depth(layer, layers as f32, time, params.drift_speed);
        let scale = mix(NEAR_SCALE, FAR_SCALE, depth);
        let offset = layer_offset(layer);
        let lo = (-half * scale + offset).floor().as_ivec2();
        let hi = (half * scale + offset).floor().as_ivec2();

        for cy in lo.y..=hi.y {
            for cx in lo.x..=hi.x {
                let cell = IVec2::new(cx, cy);
                let star = cell_star(layer, seed, cell.as_vec2());
                let uv = (star.center - offset) / scale;
                let position = uv * resolution.y + 0.5 * resolution;
                if position.x < 0.0
                    || position.y < 0.0
                    || position.x >= resolution.x
                    || position.y >= resolution.y
                {
                    continue;
                }
                stars.push(Star {
                    layer: i,
                    cell: cell.to_array(),
                    position: position.to_array(),
                    palette_index: palette_index(star.hue, params.palette.len()),
                    depth,
                });
            }
        }
    }
    stars
}

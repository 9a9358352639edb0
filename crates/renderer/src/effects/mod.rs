//! Procedural generators.
//!
//! Each effect ships as fragment-stage GLSL plus a Rust mirror of the same
//! math (`shade`), which is what the snapshot exporter and the tests evaluate.
//! Both read the same uniform block:
//!
//! ```text
//!   offset  member                 offset  member
//!        0  vec2  resolution           28  float paletteLen
//!        8  float time                 32  float intensity
//!       12  float layerCount           36  float driftSpeed
//!       16  float innerRadius          40  float seed
//!       20  float outerRadius          44  float _pad0
//!       24  float zoomSpeed            48  vec4  palette[5]
//! ```

pub mod noise;
pub mod starfield;
pub mod vortex;

use glam::{Vec2, Vec3};

use crate::compile::{ExpectedUniform, ShaderSource};
use crate::types::{EffectKind, EffectParams};
use crate::uniforms::{UniformBinding, UniformKind, UniformRole, UniformValue};

pub use starfield::{visible_stars, Star};
pub use vortex::VORTEX_CORE;

/// Per-frame inputs shared by both generators.
#[derive(Clone, Copy, Debug, PartialEq)]
pub struct FrameInputs {
    pub time: f32,
    pub resolution: Vec2,
}

const PRELUDE: &str = r"#version 450
layout(location = 0) in vec2 v_uv;
layout(location = 0) out vec4 outColor;

layout(std140, set = 0, binding = 0) uniform BackdropParams {
    vec2 resolution;
    float time;
    float layerCount;
    float innerRadius;
    float outerRadius;
    float zoomSpeed;
    float paletteLen;
    float intensity;
    float driftSpeed;
    float seed;
    float _pad0;
    vec4 palette[5];
} ubo;

const float TAU = 6.28318530718;
";

const EPILOGUE: &str = r"
void main() {
    vec2 fragCoord = v_uv * ubo.resolution;
    outColor = vec4(shade(fragCoord), 1.0);
}
";

pub fn fragment_source(effect: EffectKind) -> ShaderSource {
    let (label, body) = match effect {
        EffectKind::Vortex => ("vortex fragment", vortex::GLSL),
        EffectKind::Starfield => ("starfield fragment", starfield::GLSL),
    };
    ShaderSource::fragment(label, format!("{PRELUDE}{}{body}{EPILOGUE}", noise::GLSL))
}

/// Uniforms the render loop writes for `effect`; checked at link time.
pub fn expected_uniforms(effect: EffectKind) -> Vec<ExpectedUniform> {
    let mut expected = vec![
        ExpectedUniform::new("resolution", UniformKind::Vec2),
        ExpectedUniform::new("time", UniformKind::Float),
    ];
    match effect {
        EffectKind::Vortex => expected.extend([
            ExpectedUniform::new("innerRadius", UniformKind::Float),
            ExpectedUniform::new("outerRadius", UniformKind::Float),
            ExpectedUniform::new("zoomSpeed", UniformKind::Float),
        ]),
        EffectKind::Starfield => expected.extend([
            ExpectedUniform::new("layerCount", UniformKind::Float),
            ExpectedUniform::new("intensity", UniformKind::Float),
            ExpectedUniform::new("driftSpeed", UniformKind::Float),
            ExpectedUniform::new("seed", UniformKind::Float),
            ExpectedUniform::new("paletteLen", UniformKind::Float),
            ExpectedUniform::new(
                "palette",
                UniformKind::Vec4Array(crate::types::MAX_PALETTE_COLORS as u32),
            ),
        ]),
    }
    expected
}

/// Initial uniform bindings for a mounted effect.
pub fn bindings(params: &EffectParams, resolution: [f32; 2]) -> Vec<UniformBinding> {
    let custom =
        |name, value| UniformBinding::new(name, UniformRole::Custom, UniformValue::Float(value));
    let mut bindings = vec![
        UniformBinding::new("time", UniformRole::Time, UniformValue::Float(0.0)),
        UniformBinding::new(
            "resolution",
            UniformRole::Resolution,
            UniformValue::Vec2(resolution),
        ),
    ];
    match params {
        EffectParams::Vortex(vortex) => bindings.extend([
            custom("innerRadius", vortex.inner_radius),
            custom("outerRadius", vortex.outer_radius),
            custom("zoomSpeed", vortex.zoom_speed),
        ]),
        EffectParams::Starfield(stars) => {
            let palette: Vec<[f32; 4]> = stars
                .palette
                .iter()
                .map(|[r, g, b]| [*r, *g, *b, 1.0])
                .collect();
            bindings.extend([
                custom("layerCount", starfield::layer_count(stars) as f32),
                custom("intensity", stars.intensity),
                custom("driftSpeed", stars.drift_speed),
                custom("seed", starfield::seed_value(stars.seed)),
                custom("paletteLen", palette.len() as f32),
                UniformBinding::new(
                    "palette",
                    UniformRole::Custom,
                    UniformValue::Vec4Array(palette),
                ),
            ]);
        }
    }
    bindings
}

/// Color of one pixel; `frag_coord` is in backing pixels with a bottom-left origin.
pub fn shade(params: &EffectParams, frag_coord: Vec2, inputs: &FrameInputs) -> Vec3 {
    match params {
        EffectParams::Vortex(vortex) => vortex::shade(vortex, frag_coord, inputs),
        EffectParams::Starfield(stars) => starfield::shade(stars, frag_coord, inputs),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::types::{StarfieldParams, VortexParams};

    #[test]
    fn shading_is_deterministic() {
        let inputs = FrameInputs {
            time: 12.5,
            resolution: Vec2::new(1280.0, 720.0),
        };
        for params in [
            EffectParams::Vortex(VortexParams::default()),
            EffectParams::Starfield(StarfieldParams::default()),
        ] {
            for frag in [Vec2::new(10.5, 20.5), Vec2::new(640.5, 300.5), Vec2::new(1279.5, 719.5)] {
                let a = shade(&params, frag, &inputs);
                let b = shade(&params, frag, &inputs);
                assert_eq!(a.to_array().map(f32::to_bits), b.to_array().map(f32::to_bits));
            }
        }
    }

    #[test]
    fn sources_share_the_uniform_block() {
        for effect in EffectKind::ALL {
            let source = fragment_source(effect);
            assert!(source.text.starts_with("#version 450"));
            assert!(source.text.contains("uniform BackdropParams"));
            assert!(source.text.contains("vec3 shade(vec2 fragCoord)"));
        }
    }

    #[test]
    fn bindings_cover_expected_uniforms() {
        for (effect, params) in [
            (EffectKind::Vortex, EffectParams::Vortex(VortexParams::default())),
            (EffectKind::Starfield, EffectParams::Starfield(StarfieldParams::default())),
        ] {
            let names: Vec<_> = bindings(&params, [1.0, 1.0]).iter().map(|b| b.name).collect();
            for expected in expected_uniforms(effect) {
                assert!(names.contains(&expected.name), "{effect}: {}", expected.name);
            }
        }
    }
}

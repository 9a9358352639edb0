//! Shader Program Unit: front end, link checks, and uniform reflection.
//!
//! Every stage goes through the `naga` GLSL front end and validator before it
//! reaches the device, so diagnostics look the same on every backend. The link
//! step then checks the stage interface and reflects the uniform block into a
//! [`UniformLayout`] the render loop writes through without name lookups.

use std::borrow::Cow;

use wgpu::naga::{
    self,
    front::glsl,
    valid::{Capabilities, ValidationFlags, Validator},
    AddressSpace, ArraySize, Binding, Module, ScalarKind, TypeInner, VectorSize,
};

use crate::context::{GeometryHandle, ProgramHandle, RenderContext, StageHandle};
use crate::types::{BuildError, BuildStage, StageKind};
use crate::uniforms::{UniformKind, UniformLayout, UniformSlot};

/// Device-space corners of the full-surface triangle strip.
pub const QUAD_VERTICES: [[f32; 2]; 4] = [[-1.0, -1.0], [1.0, -1.0], [-1.0, 1.0], [1.0, 1.0]];

/// Immutable text of one shader stage.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct ShaderSource {
    pub stage: StageKind,
    pub label: &'static str,
    pub text: Cow<'static, str>,
}

impl ShaderSource {
    pub fn vertex(label: &'static str, text: impl Into<Cow<'static, str>>) -> Self {
        Self {
            stage: StageKind::Vertex,
            label,
            text: text.into(),
        }
    }

    pub fn fragment(label: &'static str, text: impl Into<Cow<'static, str>>) -> Self {
        Self {
            stage: StageKind::Fragment,
            label,
            text: text.into(),
        }
    }
}

/// A uniform the render loop updates and therefore requires at link time.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct ExpectedUniform {
    pub name: &'static str,
    pub kind: UniformKind,
}

impl ExpectedUniform {
    pub const fn new(name: &'static str, kind: UniformKind) -> Self {
        Self { name, kind }
    }
}

/// A linked program plus the quad it draws. Handles are cleared as they are
/// released, which makes [`destroy`] idempotent.
#[derive(Debug)]
pub struct ShaderProgram {
    vertex: Option<StageHandle>,
    fragment: Option<StageHandle>,
    program: Option<ProgramHandle>,
    geometry: Option<GeometryHandle>,
    layout: UniformLayout,
}

impl ShaderProgram {
    pub fn handle(&self) -> Option<ProgramHandle> {
        self.program
    }

    pub fn geometry(&self) -> Option<GeometryHandle> {
        self.geometry
    }

    pub fn layout(&self) -> &UniformLayout {
        &self.layout
    }

    pub fn is_destroyed(&self) -> bool {
        self.program.is_none()
            && self.geometry.is_none()
            && self.vertex.is_none()
            && self.fragment.is_none()
    }
}

/// Compiles both stages, links them, and creates the quad.
///
/// A stage that fails aborts the build before anything later is attempted;
/// whatever was already created on `ctx` is released before returning.
pub fn build<C: RenderContext>(
    ctx: &mut C,
    vertex: &ShaderSource,
    fragment: &ShaderSource,
    expected: &[ExpectedUniform],
) -> Result<ShaderProgram, BuildError> {
    let vertex_module = front_end(vertex, StageKind::Vertex)?;
    let vertex_stage = ctx
        .create_stage(vertex)
        .map_err(|diagnostic| BuildError::new(BuildStage::Vertex, diagnostic))?;

    let fragment_module = match front_end(fragment, StageKind::Fragment) {
        Ok(module) => module,
        Err(err) => {
            ctx.release_stage(vertex_stage);
            return Err(err);
        }
    };
    let fragment_stage = match ctx.create_stage(fragment) {
        Ok(stage) => stage,
        Err(diagnostic) => {
            ctx.release_stage(vertex_stage);
            return Err(BuildError::new(BuildStage::Fragment, diagnostic));
        }
    };

    let linked = link(&vertex_module, &fragment_module, expected).and_then(|layout| {
        ctx.create_program(vertex_stage, fragment_stage, &layout)
            .map(|program| (program, layout))
    });
    let (program, layout) = match linked {
        Ok(linked) => linked,
        Err(diagnostic) => {
            ctx.release_stage(fragment_stage);
            ctx.release_stage(vertex_stage);
            return Err(BuildError::new(BuildStage::Link, diagnostic));
        }
    };

    let geometry = ctx.create_quad(&QUAD_VERTICES);
    tracing::debug!(
        vertex = vertex.label,
        fragment = fragment.label,
        uniform_bytes = layout.size(),
        "shader program linked"
    );

    Ok(ShaderProgram {
        vertex: Some(vertex_stage),
        fragment: Some(fragment_stage),
        program: Some(program),
        geometry: Some(geometry),
        layout,
    })
}

/// Releases geometry, program, and stages. Returns whether anything was
/// released; a second call finds nothing and is a no-op.
pub fn destroy<C: RenderContext>(ctx: &mut C, program: &mut ShaderProgram) -> bool {
    let mut released = false;
    if let Some(geometry) = program.geometry.take() {
        released |= ctx.release_geometry(geometry);
    }
    if let Some(handle) = program.program.take() {
        released |= ctx.release_program(handle);
    }
    if let Some(stage) = program.fragment.take() {
        released |= ctx.release_stage(stage);
    }
    if let Some(stage) = program.vertex.take() {
        released |= ctx.release_stage(stage);
    }
    released
}

/// Parses and validates a single stage.
pub fn front_end(source: &ShaderSource, expected: StageKind) -> Result<Module, BuildError> {
    let stage = BuildStage::from(expected);
    if source.stage != expected {
        return Err(BuildError::new(
            stage,
            format!("`{}` is a {:?} stage", source.label, source.stage),
        ));
    }

    let mut frontend = glsl::Frontend::default();
    let options = glsl::Options::from(source.stage.naga_stage());
    let module = frontend
        .parse(&options, &source.text)
        .map_err(|errors| BuildError::new(stage, errors.emit_to_string(&source.text)))?;

    Validator::new(ValidationFlags::all(), Capabilities::default())
        .validate(&module)
        .map_err(|err| BuildError::new(stage, err.emit_to_string(&source.text)))?;

    Ok(module)
}

/// Checks the stage interface and reflects the fragment uniform block.
fn link(
    vertex: &Module,
    fragment: &Module,
    expected: &[ExpectedUniform],
) -> Result<UniformLayout, String> {
    let outputs = interface(vertex, naga::ShaderStage::Vertex)?;
    let inputs = interface(fragment, naga::ShaderStage::Fragment)?;
    for (location, input) in &inputs {
        match outputs.iter().find(|(out, _)| out == location) {
            None => {
                return Err(format!(
                    "fragment input at location {location} is not written by the vertex stage"
                ))
            }
            Some((_, output)) if output != input => {
                return Err(format!(
                    "location {location}: vertex writes {output:?} but fragment reads {input:?}"
                ))
            }
            Some(_) => {}
        }
    }

    let layout = reflect_uniform_block(fragment)?;
    for uniform in expected {
        match layout.slot(uniform.name) {
            None => {
                return Err(format!(
                    "uniform `{}` is not declared in block `{}`",
                    uniform.name,
                    layout.block_name()
                ))
            }
            Some(slot) if slot.kind != uniform.kind => {
                return Err(format!(
                    "uniform `{}` is declared as {:?}, expected {:?}",
                    uniform.name, slot.kind, uniform.kind
                ))
            }
            Some(_) => {}
        }
    }
    Ok(layout)
}

/// Location-bound varyings of the stage's entry point: outputs for a vertex
/// stage, inputs for a fragment stage.
fn interface(module: &Module, stage: naga::ShaderStage) -> Result<Vec<(u32, TypeInner)>, String> {
    let entry = module
        .entry_points
        .iter()
        .find(|entry| entry.stage == stage)
        .ok_or_else(|| format!("no {stage:?} entry point"))?;

    let mut found = Vec::new();
    match stage {
        naga::ShaderStage::Vertex => {
            if let Some(result) = &entry.function.result {
                collect_locations(module, result.ty, result.binding.as_ref(), &mut found);
            }
        }
        _ => {
            for argument in &entry.function.arguments {
                collect_locations(module, argument.ty, argument.binding.as_ref(), &mut found);
            }
        }
    }
    Ok(found)
}

fn collect_locations(
    module: &Module,
    ty: naga::Handle<naga::Type>,
    binding: Option<&Binding>,
    found: &mut Vec<(u32, TypeInner)>,
) {
    match binding {
        Some(Binding::Location { location, .. }) => {
            found.push((*location, module.types[ty].inner.clone()));
        }
        Some(Binding::BuiltIn(_)) => {}
        None => {
            if let TypeInner::Struct { members, .. } = &module.types[ty].inner {
                for member in members {
                    collect_locations(module, member.ty, member.binding.as_ref(), found);
                }
            }
        }
    }
}

fn reflect_uniform_block(module: &Module) -> Result<UniformLayout, String> {
    let blocks: Vec<_> = module
        .global_variables
        .iter()
        .filter(|(_, var)| var.space == AddressSpace::Uniform)
        .collect();
    let [(_, block)] = blocks.as_slice() else {
        return Err(format!(
            "fragment stage must declare exactly one uniform block, found {}",
            blocks.len()
        ));
    };

    let ty = &module.types[block.ty];
    let TypeInner::Struct { members, span } = &ty.inner else {
        return Err("uniform block is not a struct".to_owned());
    };

    let name = ty
        .name
        .clone()
        .or_else(|| block.name.clone())
        .unwrap_or_default();
    let mut layout = UniformLayout::new(name, *span);
    for member in members {
        let Some(name) = &member.name else { continue };
        if let Some((kind, stride)) = classify(module, member.ty) {
            layout.insert(
                name.clone(),
                UniformSlot {
                    offset: member.offset,
                    stride,
                    kind,
                },
            );
        }
    }
    Ok(layout)
}

fn classify(module: &Module, ty: naga::Handle<naga::Type>) -> Option<(UniformKind, u32)> {
    let is_f32 = |scalar: naga::Scalar| scalar.kind == ScalarKind::Float && scalar.width == 4;
    match module.types[ty].inner {
        TypeInner::Scalar(scalar) if is_f32(scalar) => Some((UniformKind::Float, 0)),
        TypeInner::Vector {
            size: VectorSize::Bi,
            scalar,
        } if is_f32(scalar) => Some((UniformKind::Vec2, 0)),
        TypeInner::Array {
            base,
            size: ArraySize::Constant(len),
            stride,
        } => match module.types[base].inner {
            TypeInner::Vector {
                size: VectorSize::Quad,
                scalar,
            } if is_f32(scalar) => Some((UniformKind::Vec4Array(len.get()), stride)),
            _ => None,
        },
        _ => None,
    }
}

/// Passes the quad corners through and derives `v_uv` in `[0, 1]`.
pub const VERTEX_SHADER_GLSL: &str = r"#version 450
layout(location = 0) in vec2 a_position;
layout(location = 0) out vec2 v_uv;

void main() {
    v_uv = a_position * 0.5 + vec2(0.5);
    gl_Position = vec4(a_position, 0.0, 1.0);
}
";

pub fn vertex_source() -> ShaderSource {
    ShaderSource::vertex("fullscreen quad vertex", VERTEX_SHADER_GLSL)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::context::SurfaceTarget;
    use crate::effects;
    use crate::headless::{HeadlessTarget, JournalEvent};
    use crate::types::EffectKind;
    use crate::uniforms::FrameUniforms;
    use std::mem::offset_of;

    const PLAIN_FRAGMENT: &str = r"#version 450
layout(location = 0) in vec2 v_uv;
layout(location = 0) out vec4 outColor;
layout(std140, set = 0, binding = 0) uniform Params {
    vec2 resolution;
    float time;
} ubo;
void main() {
    outColor = vec4(v_uv * ubo.resolution, ubo.time, 1.0);
}
";

    fn expected_common() -> Vec<ExpectedUniform> {
        vec![
            ExpectedUniform::new("resolution", UniformKind::Vec2),
            ExpectedUniform::new("time", UniformKind::Float),
        ]
    }

    #[test]
    fn builds_both_effect_programs() {
        for effect in EffectKind::ALL {
            let target = HeadlessTarget::new(320.0, 200.0);
            let mut ctx = target.acquire().unwrap();
            let program = build(
                &mut ctx,
                &vertex_source(),
                &effects::fragment_source(effect),
                &effects::expected_uniforms(effect),
            )
            .unwrap_or_else(|err| panic!("{effect} failed to build: {err}"));
            assert!(program.handle().is_some());
            assert!(program.geometry().is_some());
        }
    }

    #[test]
    fn reflected_layout_matches_host_mirror() {
        let source = effects::fragment_source(EffectKind::Starfield);
        let module = front_end(&source, StageKind::Fragment).unwrap();
        let layout = reflect_uniform_block(&module).unwrap();
        assert_eq!(layout.size() as usize, std::mem::size_of::<FrameUniforms>());
        let offset = |name: &str| layout.slot(name).unwrap().offset as usize;
        assert_eq!(offset("resolution"), offset_of!(FrameUniforms, resolution));
        assert_eq!(offset("time"), offset_of!(FrameUniforms, time));
        assert_eq!(offset("layerCount"), offset_of!(FrameUniforms, layer_count));
        assert_eq!(offset("innerRadius"), offset_of!(FrameUniforms, inner_radius));
        assert_eq!(offset("zoomSpeed"), offset_of!(FrameUniforms, zoom_speed));
        assert_eq!(offset("seed"), offset_of!(FrameUniforms, seed));
        assert_eq!(offset("palette"), offset_of!(FrameUniforms, palette));
        assert_eq!(layout.slot("palette").unwrap().stride, 16);
    }

    #[test]
    fn fragment_failure_releases_vertex_stage() {
        let target = HeadlessTarget::new(64.0, 64.0);
        let journal = target.journal();
        let mut ctx = target.acquire().unwrap();
        let broken = ShaderSource::fragment("broken", "#version 450\nvoid main() { oops }\n");
        let err = build(&mut ctx, &vertex_source(), &broken, &[]).unwrap_err();
        assert_eq!(err.stage, BuildStage::Fragment);
        assert!(!err.diagnostic.is_empty());
        assert_eq!(journal.live_objects(), 0);
        assert!(!journal
            .events()
            .iter()
            .any(|event| matches!(event, JournalEvent::ProgramCreated(_))));
    }

    #[test]
    fn vertex_failure_never_touches_fragment() {
        let target = HeadlessTarget::new(64.0, 64.0);
        let journal = target.journal();
        let mut ctx = target.acquire().unwrap();
        let broken =
            ShaderSource::vertex("broken", "#version 450\nvoid main() { gl_Position = ; }\n");
        let fragment = ShaderSource::fragment("plain", PLAIN_FRAGMENT);
        let err = build(&mut ctx, &broken, &fragment, &[]).unwrap_err();
        assert_eq!(err.stage, BuildStage::Vertex);
        assert!(journal.events().is_empty());
    }

    #[test]
    fn mismatched_interface_is_a_link_error() {
        let target = HeadlessTarget::new(64.0, 64.0);
        let journal = target.journal();
        let mut ctx = target.acquire().unwrap();
        let fragment = ShaderSource::fragment(
            "reads location 1",
            r"#version 450
layout(location = 1) in vec2 v_other;
layout(location = 0) out vec4 outColor;
layout(std140, set = 0, binding = 0) uniform Params { vec2 resolution; float time; } ubo;
void main() { outColor = vec4(v_other, ubo.time, 1.0); }
",
        );
        let err = build(&mut ctx, &vertex_source(), &fragment, &[]).unwrap_err();
        assert_eq!(err.stage, BuildStage::Link);
        assert!(err.diagnostic.contains("location 1"), "{}", err.diagnostic);
        assert_eq!(journal.live_objects(), 0);
    }

    #[test]
    fn missing_uniform_is_a_link_error() {
        let target = HeadlessTarget::new(64.0, 64.0);
        let mut ctx = target.acquire().unwrap();
        let fragment = ShaderSource::fragment("plain", PLAIN_FRAGMENT);
        let mut expected = expected_common();
        expected.push(ExpectedUniform::new("zoomSpeed", UniformKind::Float));
        let err = build(&mut ctx, &vertex_source(), &fragment, &expected).unwrap_err();
        assert_eq!(err.stage, BuildStage::Link);
        assert!(err.diagnostic.contains("zoomSpeed"));

        let wrong_shape = [ExpectedUniform::new("time", UniformKind::Vec2)];
        let err = build(&mut ctx, &vertex_source(), &fragment, &wrong_shape).unwrap_err();
        assert_eq!(err.stage, BuildStage::Link);
    }

    #[test]
    fn destroy_is_idempotent() {
        let target = HeadlessTarget::new(64.0, 64.0);
        let journal = target.journal();
        let mut ctx = target.acquire().unwrap();
        let fragment = ShaderSource::fragment("plain", PLAIN_FRAGMENT);
        let mut program = build(&mut ctx, &vertex_source(), &fragment, &expected_common()).unwrap();
        assert_eq!(journal.live_objects(), 4);
        assert!(destroy(&mut ctx, &mut program));
        assert!(program.is_destroyed());
        assert!(!destroy(&mut ctx, &mut program));
        assert_eq!(journal.live_objects(), 0);
        assert_eq!(journal.double_releases(), 0);
    }
}

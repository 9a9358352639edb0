//! Explicit rendering context threaded through every component call.
//!
//! GPU objects live inside the context and are addressed by small copyable
//! handles. A handle that was released (or never issued) is rejected instead
//! of being released twice.

use crate::compile::ShaderSource;
use crate::types::DrawError;
use crate::uniforms::UniformLayout;

#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub struct StageHandle(pub(crate) u32);

#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub struct ProgramHandle(pub(crate) u32);

#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub struct GeometryHandle(pub(crate) u32);

/// Summary of the device backing a context.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct DeviceProfile {
    pub name: String,
    pub backend: String,
    /// Software rasterizers and integrated GPUs; these get the low quality tier
    /// under [`crate::Quality::Auto`].
    pub constrained: bool,
}

/// Viewport rectangle in backing pixels.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct Viewport {
    pub x: u32,
    pub y: u32,
    pub width: u32,
    pub height: u32,
}

impl Viewport {
    pub fn full(width: u32, height: u32) -> Self {
        Self {
            x: 0,
            y: 0,
            width,
            height,
        }
    }
}

#[derive(Clone, Debug, PartialEq, Eq, thiserror::Error)]
#[error("rendering context unavailable: {reason}")]
pub struct ContextUnavailable {
    pub reason: String,
}

impl ContextUnavailable {
    pub fn new(reason: impl Into<String>) -> Self {
        Self {
            reason: reason.into(),
        }
    }
}

/// A single-owner GPU context that accepts one vertex stage, one fragment
/// stage, a full-surface quad, and a block of uniforms.
pub trait RenderContext {
    fn profile(&self) -> &DeviceProfile;

    /// Compiles one stage on the device. `Err` carries the backend diagnostic.
    fn create_stage(&mut self, source: &ShaderSource) -> Result<StageHandle, String>;

    /// Links two compiled stages together with a uniform buffer sized for `layout`.
    fn create_program(
        &mut self,
        vertex: StageHandle,
        fragment: StageHandle,
        layout: &UniformLayout,
    ) -> Result<ProgramHandle, String>;

    fn create_quad(&mut self, vertices: &[[f32; 2]]) -> GeometryHandle;

    fn write_uniforms(&mut self, program: ProgramHandle, bytes: &[u8]) -> Result<(), DrawError>;

    fn resize_backing(&mut self, width: u32, height: u32);

    fn set_viewport(&mut self, viewport: Viewport);

    fn draw(&mut self, program: ProgramHandle, geometry: GeometryHandle) -> Result<(), DrawError>;

    /// Returns `false` when the handle is not live; nothing is released then.
    fn release_stage(&mut self, stage: StageHandle) -> bool;

    fn release_program(&mut self, program: ProgramHandle) -> bool;

    fn release_geometry(&mut self, geometry: GeometryHandle) -> bool;

    /// Tears the context down. Handles issued by it are meaningless afterwards.
    fn release(self)
    where
        Self: Sized;
}

/// Host surface a backdrop can be mounted on.
pub trait SurfaceTarget {
    type Context: RenderContext;

    fn acquire(&self) -> Result<Self::Context, ContextUnavailable>;

    /// Size in logical (density independent) units.
    fn logical_size(&self) -> (f64, f64);

    fn density_scale(&self) -> f64;
}

/// Append-only slot storage behind the context handles. Slots are never
/// reused, so a stale handle cannot alias a newer object.
#[derive(Debug)]
pub(crate) struct Arena<T> {
    slots: Vec<Option<T>>,
}

impl<T> Default for Arena<T> {
    fn default() -> Self {
        Self { slots: Vec::new() }
    }
}

impl<T> Arena<T> {
    pub(crate) fn insert(&mut self, value: T) -> u32 {
        self.slots.push(Some(value));
        (self.slots.len() - 1) as u32
    }

    pub(crate) fn get(&self, index: u32) -> Option<&T> {
        self.slots.get(index as usize).and_then(Option::as_ref)
    }

    pub(crate) fn get_mut(&mut self, index: u32) -> Option<&mut T> {
        self.slots.get_mut(index as usize).and_then(Option::as_mut)
    }

    pub(crate) fn remove(&mut self, index: u32) -> Option<T> {
        self.slots.get_mut(index as usize).and_then(Option::take)
    }

    pub(crate) fn live(&self) -> usize {
        self.slots.iter().filter(|slot| slot.is_some()).count()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn arena_never_reuses_slots() {
        let mut arena = Arena::default();
        let first = arena.insert("a");
        assert_eq!(arena.remove(first), Some("a"));
        let second = arena.insert("b");
        assert_ne!(first, second);
        assert_eq!(arena.remove(first), None);
        assert_eq!(arena.get(second), Some(&"b"));
        assert_eq!(arena.live(), 1);
    }
}

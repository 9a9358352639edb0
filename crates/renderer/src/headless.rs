//! Recording backend with no GPU behind it.
//!
//! Every object creation and release, viewport command, and draw is appended to
//! a [`Journal`] shared with the [`HeadlessTarget`] that produced the context,
//! so callers can inspect what happened after the context is gone. The target
//! can also play an unsupported surface, a constrained device, a device that
//! rejects a shader stage, or one whose draws start failing after N frames.

use std::cell::RefCell;
use std::rc::Rc;

use crate::compile::ShaderSource;
use crate::context::{
    Arena, ContextUnavailable, DeviceProfile, GeometryHandle, ProgramHandle, RenderContext,
    StageHandle, SurfaceTarget, Viewport,
};
use crate::types::{DrawError, StageKind};
use crate::uniforms::{FrameUniforms, UniformLayout};

#[derive(Clone, Debug, PartialEq)]
pub enum JournalEvent {
    StageCreated { handle: StageHandle, stage: StageKind },
    StageReleased(StageHandle),
    ProgramCreated(ProgramHandle),
    ProgramReleased(ProgramHandle),
    GeometryCreated { handle: GeometryHandle, vertices: usize },
    GeometryReleased(GeometryHandle),
    UniformsWritten { program: ProgramHandle, bytes: usize },
    SurfaceResized { width: u32, height: u32 },
    Viewport(Viewport),
    Draw(DrawRecord),
    ContextReleased,
}

/// One draw call with the state the device saw.
#[derive(Clone, Debug, PartialEq)]
pub struct DrawRecord {
    pub program: ProgramHandle,
    pub geometry: GeometryHandle,
    pub viewport: Option<Viewport>,
    pub backing: (u32, u32),
    pub uniforms: Vec<u8>,
}

impl DrawRecord {
    pub fn frame_uniforms(&self) -> Option<FrameUniforms> {
        FrameUniforms::from_bytes(&self.uniforms)
    }
}

#[derive(Debug, Default)]
struct JournalState {
    events: Vec<JournalEvent>,
    double_releases: u32,
    live: usize,
}

/// Shared, append-only log of a headless context's activity.
#[derive(Clone, Debug, Default)]
pub struct Journal(Rc<RefCell<JournalState>>);

impl Journal {
    fn push(&self, event: JournalEvent) {
        let mut state = self.0.borrow_mut();
        match &event {
            JournalEvent::StageCreated { .. }
            | JournalEvent::ProgramCreated(_)
            | JournalEvent::GeometryCreated { .. } => state.live += 1,
            JournalEvent::StageReleased(_)
            | JournalEvent::ProgramReleased(_)
            | JournalEvent::GeometryReleased(_) => state.live = state.live.saturating_sub(1),
            _ => {}
        }
        state.events.push(event);
    }

    fn record_double_release(&self) {
        self.0.borrow_mut().double_releases += 1;
    }

    pub fn events(&self) -> Vec<JournalEvent> {
        self.0.borrow().events.clone()
    }

    pub fn draws(&self) -> Vec<DrawRecord> {
        self.0
            .borrow()
            .events
            .iter()
            .filter_map(|event| match event {
                JournalEvent::Draw(record) => Some(record.clone()),
                _ => None,
            })
            .collect()
    }

    pub fn draw_count(&self) -> usize {
        self.0
            .borrow()
            .events
            .iter()
            .filter(|event| matches!(event, JournalEvent::Draw(_)))
            .count()
    }

    pub fn viewports(&self) -> Vec<Viewport> {
        self.0
            .borrow()
            .events
            .iter()
            .filter_map(|event| match event {
                JournalEvent::Viewport(viewport) => Some(*viewport),
                _ => None,
            })
            .collect()
    }

    /// Stages, programs, and geometry created but not yet released.
    pub fn live_objects(&self) -> usize {
        self.0.borrow().live
    }

    /// Releases of handles that were not live.
    pub fn double_releases(&self) -> u32 {
        self.0.borrow().double_releases
    }

    pub fn context_releases(&self) -> usize {
        self.0
            .borrow()
            .events
            .iter()
            .filter(|event| matches!(event, JournalEvent::ContextReleased))
            .count()
    }

    /// Position of the first event matching `predicate`.
    pub fn position(&self, predicate: impl Fn(&JournalEvent) -> bool) -> Option<usize> {
        self.0.borrow().events.iter().position(predicate)
    }
}

/// Host surface stand-in for tests and headless tooling.
#[derive(Clone, Debug)]
pub struct HeadlessTarget {
    logical: (f64, f64),
    scale: f64,
    supported: bool,
    constrained: bool,
    reject_stage: Option<StageKind>,
    fail_draw_after: Option<u64>,
    journal: Journal,
}

impl HeadlessTarget {
    pub fn new(logical_width: f64, logical_height: f64) -> Self {
        Self {
            logical: (logical_width, logical_height),
            scale: 1.0,
            supported: true,
            constrained: false,
            reject_stage: None,
            fail_draw_after: None,
            journal: Journal::default(),
        }
    }

    pub fn with_scale(mut self, scale: f64) -> Self {
        self.scale = scale;
        self
    }

    /// `acquire` fails as on a platform without GPU support.
    pub fn unsupported(mut self) -> Self {
        self.supported = false;
        self
    }

    /// Reports a software adapter in the device profile.
    pub fn constrained(mut self) -> Self {
        self.constrained = true;
        self
    }

    /// The device refuses to compile stages of this kind.
    pub fn reject_stage(mut self, stage: StageKind) -> Self {
        self.reject_stage = Some(stage);
        self
    }

    /// Draws succeed `frames` times and fail afterwards.
    pub fn fail_draw_after(mut self, frames: u64) -> Self {
        self.fail_draw_after = Some(frames);
        self
    }

    pub fn set_logical_size(&mut self, width: f64, height: f64) {
        self.logical = (width, height);
    }

    pub fn journal(&self) -> Journal {
        self.journal.clone()
    }
}

impl SurfaceTarget for HeadlessTarget {
    type Context = HeadlessContext;

    fn acquire(&self) -> Result<HeadlessContext, ContextUnavailable> {
        if !self.supported {
            return Err(ContextUnavailable::new(
                "headless target configured as unsupported",
            ));
        }
        let profile = DeviceProfile {
            name: if self.constrained {
                "headless software rasterizer".to_owned()
            } else {
                "headless".to_owned()
            },
            backend: "none".to_owned(),
            constrained: self.constrained,
        };
        Ok(HeadlessContext {
            profile,
            journal: self.journal.clone(),
            reject_stage: self.reject_stage,
            fail_draw_after: self.fail_draw_after,
            stages: Arena::default(),
            programs: Arena::default(),
            geometry: Arena::default(),
            viewport: None,
            backing: (0, 0),
            draws: 0,
        })
    }

    fn logical_size(&self) -> (f64, f64) {
        self.logical
    }

    fn density_scale(&self) -> f64 {
        self.scale
    }
}

#[derive(Debug)]
pub struct HeadlessContext {
    profile: DeviceProfile,
    journal: Journal,
    reject_stage: Option<StageKind>,
    fail_draw_after: Option<u64>,
    stages: Arena<StageKind>,
    programs: Arena<Vec<u8>>,
    geometry: Arena<usize>,
    viewport: Option<Viewport>,
    backing: (u32, u32),
    draws: u64,
}

impl HeadlessContext {
    pub fn journal(&self) -> Journal {
        self.journal.clone()
    }

    pub fn backing_size(&self) -> (u32, u32) {
        self.backing
    }

    pub fn viewport(&self) -> Option<Viewport> {
        self.viewport
    }
}

impl RenderContext for HeadlessContext {
    fn profile(&self) -> &DeviceProfile {
        &self.profile
    }

    fn create_stage(&mut self, source: &ShaderSource) -> Result<StageHandle, String> {
        if self.reject_stage == Some(source.stage) {
            return Err(format!("device rejected `{}`", source.label));
        }
        let handle = StageHandle(self.stages.insert(source.stage));
        self.journal.push(JournalEvent::StageCreated {
            handle,
            stage: source.stage,
        });
        Ok(handle)
    }

    fn create_program(
        &mut self,
        vertex: StageHandle,
        fragment: StageHandle,
        layout: &UniformLayout,
    ) -> Result<ProgramHandle, String> {
        match (self.stages.get(vertex.0), self.stages.get(fragment.0)) {
            (Some(StageKind::Vertex), Some(StageKind::Fragment)) => {}
            _ => return Err("program needs one live vertex and one live fragment stage".to_owned()),
        }
        let handle = ProgramHandle(self.programs.insert(vec![0; layout.size() as usize]));
        self.journal.push(JournalEvent::ProgramCreated(handle));
        Ok(handle)
    }

    fn create_quad(&mut self, vertices: &[[f32; 2]]) -> GeometryHandle {
        let handle = GeometryHandle(self.geometry.insert(vertices.len()));
        self.journal.push(JournalEvent::GeometryCreated {
            handle,
            vertices: vertices.len(),
        });
        handle
    }

    fn write_uniforms(&mut self, program: ProgramHandle, bytes: &[u8]) -> Result<(), DrawError> {
        let buffer = self
            .programs
            .get_mut(program.0)
            .ok_or(DrawError::UnknownHandle("program"))?;
        let len = bytes.len().min(buffer.len());
        buffer[..len].copy_from_slice(&bytes[..len]);
        self.journal.push(JournalEvent::UniformsWritten {
            program,
            bytes: len,
        });
        Ok(())
    }

    fn resize_backing(&mut self, width: u32, height: u32) {
        self.backing = (width, height);
        self.journal
            .push(JournalEvent::SurfaceResized { width, height });
    }

    fn set_viewport(&mut self, viewport: Viewport) {
        self.viewport = Some(viewport);
        self.journal.push(JournalEvent::Viewport(viewport));
    }

    fn draw(&mut self, program: ProgramHandle, geometry: GeometryHandle) -> Result<(), DrawError> {
        if self.fail_draw_after.is_some_and(|limit| self.draws >= limit) {
            return Err(DrawError::Device(format!(
                "simulated device loss after {} frames",
                self.draws
            )));
        }
        let uniforms = self
            .programs
            .get(program.0)
            .ok_or(DrawError::UnknownHandle("program"))?
            .clone();
        if self.geometry.get(geometry.0).is_none() {
            return Err(DrawError::UnknownHandle("geometry"));
        }
        self.draws += 1;
        self.journal.push(JournalEvent::Draw(DrawRecord {
            program,
            geometry,
            viewport: self.viewport,
            backing: self.backing,
            uniforms,
        }));
        Ok(())
    }

    fn release_stage(&mut self, stage: StageHandle) -> bool {
        if self.stages.remove(stage.0).is_some() {
            self.journal.push(JournalEvent::StageReleased(stage));
            true
        } else {
            self.journal.record_double_release();
            false
        }
    }

    fn release_program(&mut self, program: ProgramHandle) -> bool {
        if self.programs.remove(program.0).is_some() {
            self.journal.push(JournalEvent::ProgramReleased(program));
            true
        } else {
            self.journal.record_double_release();
            false
        }
    }

    fn release_geometry(&mut self, geometry: GeometryHandle) -> bool {
        if self.geometry.remove(geometry.0).is_some() {
            self.journal.push(JournalEvent::GeometryReleased(geometry));
            true
        } else {
            self.journal.record_double_release();
            false
        }
    }

    fn release(self) {
        let leaked = self.stages.live() + self.programs.live() + self.geometry.live();
        if leaked > 0 {
            tracing::warn!(leaked, "headless context released with live objects");
        }
        self.journal.push(JournalEvent::ContextReleased);
    }
}

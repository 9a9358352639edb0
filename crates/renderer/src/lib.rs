//! Procedural animated backgrounds rendered by GPU fragment programs.
//!
//! A [`Backdrop`] binds one effect to a drawing surface and owns everything
//! that effect needs while it is mounted:
//!
//! ```text
//!   SurfaceTarget ──acquire──▶ RenderContext
//!         │                        │ create_stage / create_program / create_quad
//!         ▼                        ▼
//!   ViewportManager ──resize──▶ ShaderProgram ◀── effects::{vortex, starfield}
//!                                  │
//!   scheduler::RenderLoop ──tick──▶ UniformBlock ──write_uniforms──▶ draw
//! ```
//!
//! Two contexts ship with the crate: [`gpu::WgpuContext`] for real windows and
//! [`headless::HeadlessContext`], which records every call in a journal so
//! lifecycle behaviour can be asserted without a GPU. [`snapshot`] renders
//! still frames on the CPU through a mirror of the fragment programs.

pub mod backdrop;
pub mod compile;
pub mod context;
pub mod effects;
pub mod gpu;
pub mod headless;
pub mod snapshot;
mod types;
pub mod uniforms;
pub mod viewport;
mod window;

pub use backdrop::{attach, Backdrop, LifecycleState};
pub use context::{
    ContextUnavailable, DeviceProfile, GeometryHandle, ProgramHandle, RenderContext, StageHandle,
    SurfaceTarget, Viewport,
};
pub use scheduler::{FrameTick, LoopState, TickOutcome};
pub use types::{
    BackdropError, BackdropOptions, BuildError, BuildStage, DrawError, EffectKind, EffectParams,
    Quality, ResolvedOptions, StageKind, StarfieldParams, VortexParams,
    CONSTRAINED_MAX_DENSITY_SCALE, DEFAULT_MAX_DENSITY_SCALE, MAX_PALETTE_COLORS, MAX_STAR_LAYERS,
};
pub use viewport::{Reconciled, ViewportManager, ViewportState};
pub use window::{run_preview, PreviewConfig};

use std::time::Instant;

use scheduler::{LoopState, RenderLoop, TickOutcome};

use crate::compile::{self, ShaderProgram};
use crate::context::{RenderContext, SurfaceTarget};
use crate::effects::{self, FrameInputs};
use crate::types::{
    BackdropError, BackdropOptions, DrawError, EffectKind, EffectParams, ResolvedOptions,
};
use crate::uniforms::UniformBlock;
use crate::viewport::{Reconciled, ViewportManager, ViewportState};

/// Lifecycle of a [`Backdrop`].
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum LifecycleState {
    Unmounted,
    Initializing,
    Running,
    Stopping,
}

/// Everything the frame callback draws with. Owned by the facade and lent to
/// the render loop for the duration of one tick.
struct Mounted<C> {
    context: C,
    program: ShaderProgram,
    uniforms: UniformBlock,
    viewport: ViewportManager,
    resolved: ResolvedOptions,
}

type FrameFn<C> = fn(&mut Mounted<C>, scheduler::FrameTick) -> Result<(), DrawError>;

/// A mountable procedural background.
///
/// ```text
///   Unmounted ──mount──▶ Initializing ──▶ Running ──unmount──▶ Stopping ──▶ Unmounted
///                              │
///                              └── context or shader failure ──▶ Unmounted
/// ```
///
/// Dropping a mounted backdrop unmounts it.
pub struct Backdrop<C: RenderContext> {
    state: LifecycleState,
    effect: Option<EffectKind>,
    mounted: Option<Mounted<C>>,
    render_loop: Option<RenderLoop<FrameFn<C>>>,
    last_frame: Option<scheduler::FrameTick>,
}

impl<C: RenderContext> Default for Backdrop<C> {
    fn default() -> Self {
        Self::new()
    }
}

/// Acquires a context on `target`, builds `effect`, and starts its render loop.
pub fn attach<T: SurfaceTarget>(
    target: &T,
    effect: EffectKind,
    options: &BackdropOptions,
) -> Result<Backdrop<T::Context>, BackdropError> {
    let mut backdrop = Backdrop::new();
    backdrop.mount(target, effect, options)?;
    Ok(backdrop)
}

impl<C: RenderContext> Backdrop<C> {
    pub fn new() -> Self {
        Self {
            state: LifecycleState::Unmounted,
            effect: None,
            mounted: None,
            render_loop: None,
            last_frame: None,
        }
    }

    pub fn mount<T>(
        &mut self,
        target: &T,
        effect: EffectKind,
        options: &BackdropOptions,
    ) -> Result<(), BackdropError>
    where
        T: SurfaceTarget<Context = C>,
    {
        if self.state != LifecycleState::Unmounted {
            return Err(BackdropError::AlreadyMounted);
        }
        self.state = LifecycleState::Initializing;

        let mut context = match target.acquire() {
            Ok(context) => context,
            Err(err) => {
                tracing::warn!(
                    %effect,
                    reason = %err.reason,
                    "no rendering context; leaving surface blank"
                );
                self.state = LifecycleState::Unmounted;
                return Err(err.into());
            }
        };

        let profile = context.profile();
        let resolved = options.resolve(effect, profile.constrained);
        tracing::debug!(
            device = %profile.name,
            backend = %profile.backend,
            constrained = resolved.constrained,
            "rendering context acquired"
        );

        let program = match compile::build(
            &mut context,
            &compile::vertex_source(),
            &effects::fragment_source(effect),
            &effects::expected_uniforms(effect),
        ) {
            Ok(program) => program,
            Err(err) => {
                tracing::error!(
                    %effect,
                    stage = %err.stage,
                    "shader build failed:\n{}",
                    err.diagnostic
                );
                context.release();
                self.state = LifecycleState::Unmounted;
                return Err(err.into());
            }
        };

        let mut uniforms = UniformBlock::new(
            program.layout(),
            effects::bindings(&resolved.params, [0.0, 0.0]),
        );
        let mut viewport = ViewportManager::new(resolved.max_density_scale);
        let (width, height) = target.logical_size();
        if let Some(state) = viewport
            .reconcile(&mut context, width, height, target.density_scale())
            .state()
        {
            uniforms.set_resolution(state.backing_width as f32, state.backing_height as f32);
        }

        let mut mounted = Mounted {
            context,
            program,
            uniforms,
            viewport,
            resolved,
        };
        let frame_fn = draw_frame::<C> as FrameFn<C>;
        let render_loop = match RenderLoop::start(frame_fn, mounted.resolved.target_fps) {
            Ok(render_loop) => render_loop,
            Err(err) => {
                compile::destroy(&mut mounted.context, &mut mounted.program);
                mounted.context.release();
                self.state = LifecycleState::Unmounted;
                return Err(err.into());
            }
        };

        tracing::info!(
            %effect,
            fps = mounted.resolved.target_fps,
            constrained = mounted.resolved.constrained,
            "backdrop mounted"
        );
        self.effect = Some(effect);
        self.mounted = Some(mounted);
        self.render_loop = Some(render_loop);
        self.last_frame = None;
        self.state = LifecycleState::Running;
        Ok(())
    }

    /// Halts the loop, then destroys GPU objects, then releases the context.
    /// Calling it again, or on a backdrop that never mounted, does nothing.
    pub fn unmount(&mut self) {
        if self.state == LifecycleState::Unmounted {
            return;
        }
        self.state = LifecycleState::Stopping;
        if let Some(mut render_loop) = self.render_loop.take() {
            render_loop.stop();
        }
        if let Some(mut mounted) = self.mounted.take() {
            compile::destroy(&mut mounted.context, &mut mounted.program);
            mounted.context.release();
        }
        if let Some(effect) = self.effect.take() {
            tracing::info!(%effect, "backdrop unmounted");
        }
        self.state = LifecycleState::Unmounted;
    }

    /// Host-facing name for [`Backdrop::unmount`].
    pub fn detach(&mut self) {
        self.unmount();
    }

    /// Resize notification; takes effect before the next frame is drawn.
    pub fn resize(
        &mut self,
        logical_width: f64,
        logical_height: f64,
        scale: f64,
    ) -> Option<ViewportState> {
        if self.state != LifecycleState::Running {
            return None;
        }
        let mounted = self.mounted.as_mut()?;
        let outcome = mounted
            .viewport
            .reconcile(&mut mounted.context, logical_width, logical_height, scale);
        if let Reconciled::Resized(state) = outcome {
            mounted
                .uniforms
                .set_resolution(state.backing_width as f32, state.backing_height as f32);
        }
        outcome.state()
    }

    /// Display refresh callback.
    pub fn frame(&mut self, now: Instant) -> TickOutcome {
        if self.state != LifecycleState::Running {
            return TickOutcome::Inactive;
        }
        let (Some(render_loop), Some(mounted)) =
            (self.render_loop.as_mut(), self.mounted.as_mut())
        else {
            return TickOutcome::Inactive;
        };
        let outcome = render_loop.tick(now, mounted);
        if let TickOutcome::Rendered(tick) = outcome {
            self.last_frame = Some(tick);
        }
        outcome
    }

    /// When the host should next call [`Backdrop::frame`].
    pub fn next_deadline(&self) -> Option<Instant> {
        self.render_loop.as_ref().and_then(RenderLoop::next_deadline)
    }

    pub fn state(&self) -> LifecycleState {
        self.state
    }

    pub fn loop_state(&self) -> Option<LoopState> {
        self.render_loop.as_ref().map(RenderLoop::state)
    }

    pub fn effect(&self) -> Option<EffectKind> {
        self.effect
    }

    pub fn resolved(&self) -> Option<&ResolvedOptions> {
        self.mounted.as_ref().map(|mounted| &mounted.resolved)
    }

    pub fn effect_params(&self) -> Option<&EffectParams> {
        self.resolved().map(|resolved| &resolved.params)
    }

    pub fn viewport(&self) -> Option<ViewportState> {
        self.mounted.as_ref().and_then(|mounted| mounted.viewport.state())
    }

    /// Inputs the most recently drawn frame was shaded with.
    pub fn last_frame_inputs(&self) -> Option<FrameInputs> {
        let tick = self.last_frame?;
        let viewport = self.viewport()?;
        Some(FrameInputs {
            time: tick.elapsed as f32,
            resolution: glam::Vec2::new(
                viewport.backing_width as f32,
                viewport.backing_height as f32,
            ),
        })
    }

    pub fn context(&self) -> Option<&C> {
        self.mounted.as_ref().map(|mounted| &mounted.context)
    }
}

impl<C: RenderContext> Drop for Backdrop<C> {
    fn drop(&mut self) {
        self.unmount();
    }
}

impl<C: RenderContext> std::fmt::Debug for Backdrop<C> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Backdrop")
            .field("state", &self.state)
            .field("effect", &self.effect)
            .field("loop", &self.render_loop)
            .finish_non_exhaustive()
    }
}

fn draw_frame<C: RenderContext>(
    mounted: &mut Mounted<C>,
    tick: scheduler::FrameTick,
) -> Result<(), DrawError> {
    // No backing store yet: the resolution uniform is still zero.
    if mounted.viewport.state().is_none() {
        return Ok(());
    }
    let program = mounted.program.handle().ok_or(DrawError::UnknownHandle("program"))?;
    let geometry = mounted
        .program
        .geometry()
        .ok_or(DrawError::UnknownHandle("geometry"))?;
    mounted.uniforms.set_time(tick.elapsed as f32);
    if mounted.uniforms.take_dirty() {
        mounted.context.write_uniforms(program, mounted.uniforms.bytes())?;
    }
    mounted.context.draw(program, geometry)
}

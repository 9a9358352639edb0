use std::cell::Cell;
use std::rc::Rc;
use std::sync::Arc;
use std::time::Instant;

use anyhow::{anyhow, bail, Result};
use winit::dpi::LogicalSize;
use winit::event::{ElementState, Event, KeyEvent, WindowEvent};
use winit::event_loop::{ControlFlow, EventLoopBuilder};
use winit::keyboard::{Key, NamedKey};
use winit::window::WindowBuilder;

use scheduler::TickOutcome;

use crate::backdrop::attach;
use crate::gpu::WindowTarget;
use crate::types::{BackdropOptions, EffectKind};

/// Settings for an interactive preview window.
#[derive(Debug, Clone)]
pub struct PreviewConfig {
    pub effect: EffectKind,
    pub options: BackdropOptions,
    /// Logical window size.
    pub size: (u32, u32),
    pub title: String,
}

impl PreviewConfig {
    pub fn new(effect: EffectKind, options: BackdropOptions) -> Self {
        Self {
            effect,
            options,
            size: (1280, 720),
            title: format!("backdrop: {effect}"),
        }
    }
}

/// Opens a window, mounts the backdrop into it and drives frames until the
/// window is closed or Escape is pressed.
pub fn run_preview(config: PreviewConfig) -> Result<()> {
    let event_loop = EventLoopBuilder::new()
        .build()
        .map_err(|err| anyhow!("failed to create event loop: {err}"))?;

    let window = WindowBuilder::new()
        .with_title(config.title.as_str())
        .with_inner_size(LogicalSize::new(config.size.0, config.size.1))
        .build(&event_loop)
        .map_err(|err| anyhow!("failed to create preview window: {err}"))?;
    let window = Arc::new(window);
    let target = WindowTarget::new(window.clone());

    let mut backdrop = attach(&target, config.effect, &config.options)?;
    window.request_redraw();

    let faulted = Rc::new(Cell::new(false));
    let loop_faulted = faulted.clone();
    let run_result = event_loop.run(move |event, elwt| match event {
        Event::WindowEvent { window_id, event } if window_id == window.id() => match event {
            WindowEvent::CloseRequested
            | WindowEvent::Destroyed
            | WindowEvent::KeyboardInput {
                event:
                    KeyEvent {
                        logical_key: Key::Named(NamedKey::Escape),
                        state: ElementState::Pressed,
                        ..
                    },
                ..
            } => {
                backdrop.detach();
                elwt.exit();
            }
            WindowEvent::Resized(size) => {
                let scale = window.scale_factor();
                let logical = size.to_logical::<f64>(scale);
                backdrop.resize(logical.width, logical.height, scale);
            }
            WindowEvent::ScaleFactorChanged { scale_factor, .. } => {
                let logical = window.inner_size().to_logical::<f64>(scale_factor);
                backdrop.resize(logical.width, logical.height, scale_factor);
            }
            WindowEvent::RedrawRequested => {
                if let TickOutcome::Faulted = backdrop.frame(Instant::now()) {
                    loop_faulted.set(true);
                    backdrop.detach();
                    elwt.exit();
                }
            }
            _ => {}
        },
        Event::AboutToWait => {
            let now = Instant::now();
            match backdrop.next_deadline() {
                Some(deadline) if deadline <= now => {
                    window.request_redraw();
                    elwt.set_control_flow(ControlFlow::Wait);
                }
                Some(deadline) => {
                    tracing::trace!(
                        wait_ms = deadline.saturating_duration_since(now).as_millis(),
                        "waiting for next frame"
                    );
                    elwt.set_control_flow(ControlFlow::WaitUntil(deadline));
                }
                None => elwt.set_control_flow(ControlFlow::Wait),
            }
        }
        _ => {}
    });

    run_result.map_err(|err| anyhow!("window event loop error: {err}"))?;
    if faulted.get() {
        bail!("rendering stopped after a device error");
    }
    Ok(())
}

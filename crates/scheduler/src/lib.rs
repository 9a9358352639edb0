//! Render loop scheduling for decorative shader backgrounds.
//!
//! The host owns the platform's "next display refresh" primitive (a winit redraw
//! request, a compositor frame callback, a timer) and calls [`RenderLoop::tick`]
//! from it. The loop decides whether the callback becomes a frame, feeds the
//! frame callback a fixed-step animation time, and stops itself when the
//! callback fails.

use std::fmt;
use std::time::{Duration, Instant};

mod clock;
mod pacer;

pub use clock::AnimationClock;
pub use pacer::FramePacer;

#[derive(Debug, thiserror::Error)]
pub enum LoopError {
    #[error("target frame rate must be a positive finite number (got {0})")]
    InvalidFrameRate(f32),
}

/// Timing handed to the frame callback for one accepted frame.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct FrameTick {
    /// Animation time in seconds; `frame_index * (1 / target_fps)`.
    pub elapsed: f64,
    pub frame_index: u64,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LoopState {
    Running,
    Stopped,
    /// The frame callback returned an error and the loop halted itself.
    Faulted,
}

/// What a single refresh callback turned into.
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum TickOutcome {
    Rendered(FrameTick),
    /// Arrived before the next scheduled instant; the clock did not advance.
    Skipped,
    /// The loop is stopped or faulted; nothing ran.
    Inactive,
    /// The frame callback failed during this tick and the loop stopped.
    Faulted,
}

/// Frame loop driven by host refresh callbacks and throttled to a target rate.
///
/// The callback receives the state it draws with as an explicit `&mut S`
/// argument on every tick instead of capturing it, so the loop never shares
/// ownership of GPU resources with its caller.
pub struct RenderLoop<F> {
    on_frame: Option<F>,
    pacer: FramePacer,
    clock: AnimationClock,
    state: LoopState,
    target_fps: f32,
    stats: FrameStats,
}

impl<F> RenderLoop<F> {
    /// Starts a loop that invokes `on_frame` at most `target_fps` times per second.
    pub fn start(on_frame: F, target_fps: f32) -> Result<Self, LoopError> {
        if !(target_fps.is_finite() && target_fps > 0.0) {
            return Err(LoopError::InvalidFrameRate(target_fps));
        }
        tracing::debug!(target_fps, "render loop started");
        Ok(Self {
            on_frame: Some(on_frame),
            pacer: FramePacer::new(Some(target_fps)),
            clock: AnimationClock::new(target_fps),
            state: LoopState::Running,
            target_fps,
            stats: FrameStats::default(),
        })
    }

    pub fn state(&self) -> LoopState {
        self.state
    }

    pub fn is_running(&self) -> bool {
        self.state == LoopState::Running
    }

    pub fn target_fps(&self) -> f32 {
        self.target_fps
    }

    pub fn clock(&self) -> &AnimationClock {
        &self.clock
    }

    /// Instant the host should next wake for, or `None` once the loop has stopped.
    pub fn next_deadline(&self) -> Option<Instant> {
        if !self.is_running() {
            return None;
        }
        self.pacer.next_deadline()
    }

    /// Returns true when a callback at `now` would be accepted as a frame.
    pub fn is_due(&self, now: Instant) -> bool {
        self.is_running() && self.next_deadline().map_or(true, |deadline| now >= deadline)
    }

    /// Halts the loop. The callback is dropped here, so no invocation can
    /// happen after this returns.
    pub fn stop(&mut self) {
        if self.on_frame.take().is_some() {
            tracing::debug!(frames = self.clock.frames(), "render loop stopped");
        }
        if self.state == LoopState::Running {
            self.state = LoopState::Stopped;
        }
    }

    /// Handles one host refresh callback.
    pub fn tick<S, E>(&mut self, now: Instant, target: &mut S) -> TickOutcome
    where
        F: FnMut(&mut S, FrameTick) -> Result<(), E>,
        E: fmt::Display,
    {
        if self.state != LoopState::Running {
            return TickOutcome::Inactive;
        }
        let Some(on_frame) = self.on_frame.as_mut() else {
            return TickOutcome::Inactive;
        };
        if !self.pacer.should_render(now) {
            return TickOutcome::Skipped;
        }

        let tick = FrameTick {
            elapsed: self.clock.elapsed(),
            frame_index: self.clock.frames(),
        };
        if let Err(err) = on_frame(target, tick) {
            tracing::error!(
                error = %err,
                frame = tick.frame_index,
                "frame callback failed; stopping render loop"
            );
            self.on_frame = None;
            self.state = LoopState::Faulted;
            return TickOutcome::Faulted;
        }

        self.clock.advance();
        self.stats.record(now, &self.clock);
        TickOutcome::Rendered(tick)
    }
}

impl<F> fmt::Debug for RenderLoop<F> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("RenderLoop")
            .field("state", &self.state)
            .field("target_fps", &self.target_fps)
            .field("clock", &self.clock)
            .finish_non_exhaustive()
    }
}

#[derive(Debug, Default)]
struct FrameStats {
    window_start: Option<Instant>,
    frames: u32,
}

impl FrameStats {
    fn record(&mut self, now: Instant, clock: &AnimationClock) {
        let start = *self.window_start.get_or_insert(now);
        self.frames += 1;
        let window = now.saturating_duration_since(start);
        if window >= Duration::from_secs(1) {
            let fps = self.frames as f32 / window.as_secs_f32();
            tracing::debug!(
                fps = fps.round(),
                frame = clock.frames(),
                time = clock.elapsed(),
                "render stats"
            );
            self.frames = 0;
            self.window_start = Some(now);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[derive(Default)]
    struct Recorder {
        ticks: Vec<FrameTick>,
        fail_at: Option<u64>,
    }

    fn record(recorder: &mut Recorder, tick: FrameTick) -> Result<(), String> {
        if recorder.fail_at == Some(tick.frame_index) {
            return Err(format!("draw failed at frame {}", tick.frame_index));
        }
        recorder.ticks.push(tick);
        Ok(())
    }

    type RecordFn = fn(&mut Recorder, FrameTick) -> Result<(), String>;

    fn refresh(start: Instant, hz: f64, index: u32) -> Instant {
        start + Duration::from_secs_f64(f64::from(index) / hz)
    }

    #[test]
    fn fires_about_target_rate_at_high_refresh() {
        let mut render_loop = RenderLoop::start(record as RecordFn, 24.0).unwrap();
        let mut recorder = Recorder::default();
        let start = Instant::now();
        for index in 0..120 {
            render_loop.tick(refresh(start, 120.0, index), &mut recorder);
        }
        let fired = recorder.ticks.len();
        assert!((23..=25).contains(&fired), "fired {fired} times");
    }

    #[test]
    fn elapsed_uses_nominal_step_not_wall_clock() {
        let mut render_loop = RenderLoop::start(record as RecordFn, 24.0).unwrap();
        let mut recorder = Recorder::default();
        let start = Instant::now();
        let jittered_ms = [0_u64, 45, 83, 140, 170, 260];
        for ms in jittered_ms {
            render_loop.tick(start + Duration::from_millis(ms), &mut recorder);
        }
        assert!(!recorder.ticks.is_empty());
        for (index, tick) in recorder.ticks.iter().enumerate() {
            assert_eq!(tick.frame_index, index as u64);
            assert!((tick.elapsed - index as f64 / 24.0).abs() < 1e-12);
        }
    }

    #[test]
    fn skipped_callbacks_do_not_advance_clock() {
        let mut render_loop = RenderLoop::start(record as RecordFn, 30.0).unwrap();
        let mut recorder = Recorder::default();
        let start = Instant::now();
        assert!(matches!(
            render_loop.tick(start, &mut recorder),
            TickOutcome::Rendered(_)
        ));
        let early = start + Duration::from_millis(5);
        assert_eq!(render_loop.tick(early, &mut recorder), TickOutcome::Skipped);
        assert_eq!(render_loop.clock().frames(), 1);
    }

    #[test]
    fn no_callbacks_after_stop() {
        let mut render_loop = RenderLoop::start(record as RecordFn, 60.0).unwrap();
        let mut recorder = Recorder::default();
        let start = Instant::now();
        render_loop.tick(start, &mut recorder);
        render_loop.stop();
        for index in 1..20 {
            let outcome = render_loop.tick(refresh(start, 60.0, index), &mut recorder);
            assert_eq!(outcome, TickOutcome::Inactive);
        }
        assert_eq!(recorder.ticks.len(), 1);
        assert_eq!(render_loop.state(), LoopState::Stopped);
        assert_eq!(render_loop.next_deadline(), None);
    }

    #[test]
    fn failing_callback_stops_loop() {
        let mut render_loop = RenderLoop::start(record as RecordFn, 60.0).unwrap();
        let mut recorder = Recorder {
            fail_at: Some(2),
            ..Recorder::default()
        };
        let start = Instant::now();
        let mut outcomes = Vec::new();
        for index in 0..10 {
            outcomes.push(render_loop.tick(refresh(start, 60.0, index), &mut recorder));
        }
        assert_eq!(recorder.ticks.len(), 2);
        assert_eq!(outcomes[2], TickOutcome::Faulted);
        assert!(outcomes[3..].iter().all(|o| *o == TickOutcome::Inactive));
        assert_eq!(render_loop.state(), LoopState::Faulted);
    }

    #[test]
    fn rejects_non_positive_rate() {
        assert!(RenderLoop::start(record as RecordFn, 0.0).is_err());
        assert!(RenderLoop::start(record as RecordFn, f32::NAN).is_err());
    }

    #[test]
    fn due_reflects_deadline() {
        let mut render_loop = RenderLoop::start(record as RecordFn, 10.0).unwrap();
        let mut recorder = Recorder::default();
        let start = Instant::now();
        assert!(render_loop.is_due(start));
        render_loop.tick(start, &mut recorder);
        assert!(!render_loop.is_due(start + Duration::from_millis(50)));
        assert!(render_loop.is_due(start + Duration::from_millis(100)));
    }
}

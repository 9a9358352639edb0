use crate::context::{RenderContext, Viewport};

/// Backing-buffer size and the inputs it was derived from.
#[derive(Clone, Copy, Debug, PartialEq)]
pub struct ViewportState {
    pub logical_width: f64,
    pub logical_height: f64,
    /// Density scale after clamping.
    pub scale: f64,
    pub backing_width: u32,
    pub backing_height: u32,
}

/// Result of one [`ViewportManager::reconcile`] call.
#[derive(Clone, Copy, Debug, PartialEq)]
pub enum Reconciled {
    /// The backing size changed; the surface and viewport were updated.
    Resized(ViewportState),
    /// Same backing size as before; no GPU calls were made.
    Unchanged(ViewportState),
    /// Zero-area request; the previous state (if any) is retained.
    Degenerate(Option<ViewportState>),
}

impl Reconciled {
    pub fn state(&self) -> Option<ViewportState> {
        match *self {
            Reconciled::Resized(state) | Reconciled::Unchanged(state) => Some(state),
            Reconciled::Degenerate(state) => state,
        }
    }
}

/// Keeps the backing buffer at `round(logical * clamp(scale))`.
#[derive(Debug, Clone)]
pub struct ViewportManager {
    max_scale: f64,
    state: Option<ViewportState>,
}

impl ViewportManager {
    pub fn new(max_scale: f64) -> Self {
        let max_scale = if max_scale.is_finite() && max_scale > 0.0 {
            max_scale
        } else {
            1.0
        };
        Self {
            max_scale,
            state: None,
        }
    }

    pub fn max_scale(&self) -> f64 {
        self.max_scale
    }

    pub fn state(&self) -> Option<ViewportState> {
        self.state
    }

    /// Non-finite or non-positive scales count as 1.0 before clamping.
    pub fn clamp_scale(&self, scale: f64) -> f64 {
        let scale = if scale.is_finite() && scale > 0.0 {
            scale
        } else {
            1.0
        };
        scale.min(self.max_scale)
    }

    pub fn backing_size(&self, logical_width: f64, logical_height: f64, scale: f64) -> (u32, u32) {
        let scale = self.clamp_scale(scale);
        (to_pixels(logical_width * scale), to_pixels(logical_height * scale))
    }

    pub fn reconcile<C: RenderContext>(
        &mut self,
        ctx: &mut C,
        logical_width: f64,
        logical_height: f64,
        scale: f64,
    ) -> Reconciled {
        let clamped = self.clamp_scale(scale);
        let (backing_width, backing_height) =
            self.backing_size(logical_width, logical_height, scale);
        if backing_width == 0 || backing_height == 0 {
            tracing::debug!(
                logical_width,
                logical_height,
                scale,
                "degenerate surface size; keeping previous viewport"
            );
            return Reconciled::Degenerate(self.state);
        }

        let next = ViewportState {
            logical_width,
            logical_height,
            scale: clamped,
            backing_width,
            backing_height,
        };
        let unchanged = self.state.is_some_and(|previous| {
            previous.backing_width == backing_width && previous.backing_height == backing_height
        });
        self.state = Some(next);
        if unchanged {
            return Reconciled::Unchanged(next);
        }

        ctx.resize_backing(backing_width, backing_height);
        ctx.set_viewport(Viewport::full(backing_width, backing_height));
        tracing::debug!(
            width = backing_width,
            height = backing_height,
            scale = clamped,
            "viewport resized"
        );
        Reconciled::Resized(next)
    }
}

fn to_pixels(value: f64) -> u32 {
    if value.is_finite() && value > 0.0 {
        value.round().min(f64::from(u32::MAX)) as u32
    } else {
        0
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::context::SurfaceTarget;
    use crate::headless::{HeadlessTarget, JournalEvent};

    #[test]
    fn clamps_density_and_rounds() {
        let manager = ViewportManager::new(2.0);
        assert_eq!(manager.backing_size(100.4, 50.0, 1.0), (100, 50));
        assert_eq!(manager.backing_size(100.0, 50.0, 3.0), (200, 100));
        assert_eq!(manager.backing_size(333.0, 111.0, 1.5), (500, 167));
        assert_eq!(manager.backing_size(10.0, 10.0, f64::NAN), (10, 10));
        assert_eq!(manager.backing_size(10.0, 10.0, -2.0), (10, 10));
    }

    #[test]
    fn unchanged_size_makes_no_gpu_calls() {
        let target = HeadlessTarget::new(100.0, 100.0);
        let journal = target.journal();
        let mut ctx = target.acquire().unwrap();
        let mut manager = ViewportManager::new(2.0);

        assert!(matches!(
            manager.reconcile(&mut ctx, 200.0, 100.0, 1.0),
            Reconciled::Resized(_)
        ));
        let calls = journal.events().len();
        let outcome = manager.reconcile(&mut ctx, 100.0, 50.0, 2.0);
        assert!(matches!(outcome, Reconciled::Unchanged(_)));
        assert_eq!(journal.events().len(), calls);
        let state = outcome.state().unwrap();
        assert_eq!(state.logical_width, 100.0);
        assert_eq!(state.scale, 2.0);
    }

    #[test]
    fn degenerate_size_keeps_previous_state() {
        let target = HeadlessTarget::new(100.0, 100.0);
        let journal = target.journal();
        let mut ctx = target.acquire().unwrap();
        let mut manager = ViewportManager::new(2.0);
        let first = manager.reconcile(&mut ctx, 640.0, 480.0, 1.0).state();
        let before = journal.events().len();

        let outcome = manager.reconcile(&mut ctx, 0.0, 480.0, 1.0);
        assert_eq!(outcome, Reconciled::Degenerate(first));
        assert_eq!(manager.state(), first);
        assert_eq!(journal.events().len(), before);
        let zero_viewport = |event: &JournalEvent| {
            matches!(event, JournalEvent::Viewport(vp) if vp.width == 0 || vp.height == 0)
        };
        assert!(!journal.events().iter().any(zero_viewport));
    }

    #[test]
    fn degenerate_before_first_size_has_no_state() {
        let target = HeadlessTarget::new(0.0, 0.0);
        let mut ctx = target.acquire().unwrap();
        let mut manager = ViewportManager::new(2.0);
        assert_eq!(manager.reconcile(&mut ctx, 0.0, 0.0, 1.0), Reconciled::Degenerate(None));
    }
}

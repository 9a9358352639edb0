use std::time::{Duration, Instant};

/// Slack applied when comparing the accumulator against the frame interval so
/// refresh callbacks that land a hair early still count.
const PACING_SLACK: Duration = Duration::from_micros(250);

/// Throttles display-refresh callbacks down to a target frame interval.
///
/// Every callback adds the wall-clock delta since the previous callback to an
/// accumulator; a frame is accepted once a full interval has accumulated. Only
/// the sub-interval remainder is carried forward: frames missed while the host
/// stalled are dropped, never replayed as a burst.
#[derive(Debug, Clone)]
pub struct FramePacer {
    target_interval: Option<Duration>,
    accumulator: Duration,
    last_tick: Option<Instant>,
}

impl FramePacer {
    /// Creates a pacer; `None` or a non-positive rate accepts every callback.
    pub fn new(target_fps: Option<f32>) -> Self {
        let target_interval = target_fps.and_then(|fps| {
            if fps > 0.0 && fps.is_finite() {
                Some(Duration::from_secs_f64(1.0 / f64::from(fps)))
            } else {
                None
            }
        });
        Self {
            target_interval,
            accumulator: Duration::ZERO,
            last_tick: None,
        }
    }

    pub fn target_interval(&self) -> Option<Duration> {
        self.target_interval
    }

    pub fn reset(&mut self) {
        self.accumulator = Duration::ZERO;
        self.last_tick = None;
    }

    /// Records a refresh callback at `now` and reports whether it should draw.
    pub fn should_render(&mut self, now: Instant) -> bool {
        match (self.target_interval, self.last_tick) {
            (Some(interval), Some(last)) => {
                let delta = now.saturating_duration_since(last);
                self.last_tick = Some(now);
                self.accumulator = self.accumulator.saturating_add(delta);
                if self.accumulator + PACING_SLACK < interval {
                    false
                } else {
                    let remainder = self.accumulator.saturating_sub(interval);
                    self.accumulator = if remainder >= interval {
                        Duration::ZERO
                    } else {
                        remainder
                    };
                    true
                }
            }
            (Some(_), None) | (None, _) => {
                self.last_tick = Some(now);
                true
            }
        }
    }

    /// Earliest instant at which the next callback would be accepted.
    pub fn next_deadline(&self) -> Option<Instant> {
        let interval = self.target_interval?;
        let last = self.last_tick?;
        Some(last + interval.saturating_sub(self.accumulator))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn refresh_ticks(start: Instant, hz: f64, count: u32) -> impl Iterator<Item = Instant> {
        (0..count).map(move |index| start + Duration::from_secs_f64(f64::from(index) / hz))
    }

    #[test]
    fn first_callback_always_renders() {
        let mut pacer = FramePacer::new(Some(24.0));
        assert!(pacer.should_render(Instant::now()));
    }

    #[test]
    fn throttles_high_refresh_rate_to_target() {
        let mut pacer = FramePacer::new(Some(24.0));
        let start = Instant::now();
        let rendered = refresh_ticks(start, 120.0, 120)
            .filter(|now| pacer.should_render(*now))
            .count();
        assert!((23..=25).contains(&rendered), "rendered {rendered} frames");
    }

    #[test]
    fn uncapped_pacer_accepts_every_callback() {
        let mut pacer = FramePacer::new(None);
        let start = Instant::now();
        let rendered = refresh_ticks(start, 60.0, 60)
            .filter(|now| pacer.should_render(*now))
            .count();
        assert_eq!(rendered, 60);
        assert_eq!(pacer.next_deadline(), None);
    }

    #[test]
    fn long_stall_does_not_burst() {
        let mut pacer = FramePacer::new(Some(30.0));
        let start = Instant::now();
        assert!(pacer.should_render(start));
        assert!(pacer.should_render(start + Duration::from_secs(5)));
        let refresh = Duration::from_secs_f64(1.0 / 120.0);
        let after_stall = start + Duration::from_secs(5) + refresh;
        assert!(!pacer.should_render(after_stall));
    }

    #[test]
    fn deadline_tracks_remaining_interval() {
        let mut pacer = FramePacer::new(Some(10.0));
        let start = Instant::now();
        assert!(pacer.should_render(start));
        assert_eq!(pacer.next_deadline(), Some(start + Duration::from_millis(100)));
    }
}

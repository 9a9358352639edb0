/// Monotonic animation clock advanced by a fixed nominal step per accepted frame.
///
/// Elapsed time is derived from the frame count rather than accumulated, so the
/// value reported for frame `n` is always exactly `n * step` regardless of when
/// frames were actually delivered.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct AnimationClock {
    step: f64,
    frames: u64,
}

impl AnimationClock {
    /// Creates a clock whose step is `1 / fps` seconds.
    pub fn new(fps: f32) -> Self {
        Self {
            step: 1.0 / f64::from(fps),
            frames: 0,
        }
    }

    pub fn step(&self) -> f64 {
        self.step
    }

    pub fn frames(&self) -> u64 {
        self.frames
    }

    /// Seconds of animation time for the frame about to be drawn.
    pub fn elapsed(&self) -> f64 {
        self.frames as f64 * self.step
    }

    pub fn advance(&mut self) {
        self.frames = self.frames.saturating_add(1);
    }

    pub fn reset(&mut self) {
        self.frames = 0;
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn advances_by_nominal_step() {
        let mut clock = AnimationClock::new(24.0);
        assert_eq!(clock.elapsed(), 0.0);
        clock.advance();
        assert!((clock.elapsed() - 1.0 / 24.0).abs() < 1e-12);
        clock.advance();
        assert!((clock.elapsed() - 2.0 / 24.0).abs() < 1e-12);
    }

    #[test]
    fn never_moves_backward() {
        let mut clock = AnimationClock::new(30.0);
        let mut last = clock.elapsed();
        for _ in 0..1000 {
            clock.advance();
            assert!(clock.elapsed() > last);
            last = clock.elapsed();
        }
        clock.reset();
        assert_eq!(clock.frames(), 0);
    }
}

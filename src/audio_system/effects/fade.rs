/// Volume fade
///
/// Linear volume ramp driven by elapsed milliseconds rather than by samples,
/// so it follows the host's `update` cadence.

/// Fade from one volume to another
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct FadeEffect {
    from: i32,
    to: i32,
    duration_ms: u64,
    elapsed_ms: u64,
}

impl FadeEffect {
    /// Create a new fade between two volumes on the 0..=100 scale
    pub fn new(from: i32, to: i32, duration_ms: u64) -> Self {
        Self {
            from: from.clamp(0, 100),
            to: to.clamp(0, 100),
            duration_ms,
            elapsed_ms: 0,
        }
    }

    /// Advance the fade clock
    pub fn advance(&mut self, delta_ms: u64) {
        self.elapsed_ms = self.elapsed_ms.saturating_add(delta_ms).min(self.duration_ms);
    }

    /// Volume at the current point of the fade
    pub fn current(&self) -> i32 {
        if self.duration_ms == 0 || self.elapsed_ms >= self.duration_ms {
            return self.to;
        }
        let span = (self.to - self.from) as i64;
        let step = span * self.elapsed_ms as i64 / self.duration_ms as i64;
        self.from + step as i32
    }

    pub fn is_done(&self) -> bool {
        self.elapsed_ms >= self.duration_ms
    }

    pub fn target(&self) -> i32 {
        self.to
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_fade_in_progress() {
        let mut fade = FadeEffect::new(0, 80, 500);
        assert_eq!(fade.current(), 0);

        fade.advance(250);
        assert_eq!(fade.current(), 40);
        assert!(!fade.is_done());

        fade.advance(1000);
        assert_eq!(fade.current(), 80);
        assert!(fade.is_done());
    }

    #[test]
    fn test_fade_out_progress() {
        let mut fade = FadeEffect::new(100, 0, 1000);
        fade.advance(100);
        assert_eq!(fade.current(), 90);
        fade.advance(900);
        assert_eq!(fade.current(), 0);
    }

    #[test]
    fn test_zero_duration_jumps_to_target() {
        let fade = FadeEffect::new(10, 70, 0);
        assert_eq!(fade.current(), 70);
        assert!(fade.is_done());
    }

    #[test]
    fn test_fade_clamps_endpoints() {
        let fade = FadeEffect::new(-20, 150, 0);
        assert_eq!(fade.target(), 100);
        assert_eq!(fade.current(), 100);
    }
}

//! Millisecond time source shared by every control decision.
//!
//! Timestamps are a `u32` count of milliseconds since controller boot and
//! wrap after ~49.7 days. Elapsed time is always computed with wrapping
//! subtraction, so a comparison against a past timestamp stays correct
//! across the rollover.

use std::time::Instant;

use serde::Serialize;

/// Milliseconds since boot, modulo 2^32.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize)]
#[serde(transparent)]
pub struct Millis(pub u32);

impl Millis {
    pub const ZERO: Millis = Millis(0);

    /// Milliseconds elapsed from `earlier` to `self`.
    pub fn since(self, earlier: Millis) -> u32 {
        self.0.wrapping_sub(earlier.0)
    }

    pub fn plus(self, ms: u32) -> Millis {
        Millis(self.0.wrapping_add(ms))
    }

    pub fn minus(self, ms: u32) -> Millis {
        Millis(self.0.wrapping_sub(ms))
    }
}

impl std::fmt::Display for Millis {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let total_s = self.0 / 1000;
        write!(
            f,
            "{}:{:02}:{:02}.{:03}",
            total_s / 3600,
            (total_s / 60) % 60,
            total_s % 60,
            self.0 % 1000
        )
    }
}

pub const fn secs(s: u32) -> u32 {
    s * 1_000
}

pub const fn mins(m: u32) -> u32 {
    m * 60_000
}

pub const fn hours(h: u32) -> u32 {
    h * 3_600_000
}

/// Monotonic counter anchored at construction (controller boot).
#[derive(Debug, Clone)]
pub struct MonotonicClock {
    boot: Instant,
}

impl MonotonicClock {
    pub fn new() -> Self {
        Self {
            boot: Instant::now(),
        }
    }

    pub fn now(&self) -> Millis {
        // Truncation to 32 bits is the wrap.
        Millis(self.boot.elapsed().as_millis() as u32)
    }
}

impl Default for MonotonicClock {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn since_plain() {
        assert_eq!(Millis(15_000).since(Millis(5_000)), 10_000);
    }

    #[test]
    fn since_across_rollover() {
        let before = Millis(u32::MAX - 999);
        let after = before.plus(5_000);
        assert_eq!(after, Millis(4_000));
        assert_eq!(after.since(before), 5_000);
    }

    #[test]
    fn minus_wraps_below_zero() {
        assert_eq!(Millis(1_000).minus(2_000), Millis(u32::MAX - 999));
    }

    #[test]
    fn duration_helpers() {
        assert_eq!(secs(45), 45_000);
        assert_eq!(mins(120), 7_200_000);
        assert_eq!(hours(18), 64_800_000);
    }

    #[test]
    fn display_as_uptime() {
        assert_eq!(Millis(hours(2) + mins(3) + secs(4) + 5).to_string(), "2:03:04.005");
    }

    #[test]
    fn clock_starts_near_zero() {
        let clock = MonotonicClock::new();
        assert!(clock.now().0 < 1_000);
    }
}

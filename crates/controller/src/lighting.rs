//! Day/night light cycle.
//!
//! The phase is anchored at controller boot: the day starts at t = 0 and
//! lasts the configured on-time, then night for the off-time, forever. The
//! relay itself follows once the boot dwell has passed.

use tracing::info;

use crate::clock::Millis;
use crate::config::RoomConfig;
use crate::relay::{Actuator, RelayBank};

/// Whether the light should be on at `now` for the given cycle.
pub fn phase_on(now: Millis, on_ms: u32, off_ms: u32) -> bool {
    let cycle = on_ms as u64 + off_ms as u64;
    if cycle == 0 {
        return false;
    }
    (now.0 as u64 % cycle) < on_ms as u64
}

#[derive(Debug, Default)]
pub struct LightScheduler {
    last_phase: Option<bool>,
}

impl LightScheduler {
    pub fn new() -> Self {
        Self::default()
    }

    /// Request the light only when the phase disagrees with the relay, so a
    /// change held back by the dwell is asked for again next tick.
    pub fn update(&mut self, cfg: &RoomConfig, bank: &mut RelayBank, now: Millis) -> bool {
        let want = phase_on(now, cfg.light_on_ms(), cfg.light_off_ms());

        if self.last_phase != Some(want) {
            info!(
                room = %bank.room(),
                phase = if want { "day" } else { "night" },
                "light phase"
            );
            self.last_phase = Some(want);
        }

        if bank.state(Actuator::Light) != want {
            bank.light(want, now);
        }
        want
    }
}

// ===========================================================================
// Tests
// ===========================================================================

#[cfg(test)]
mod tests {
    use super::*;
    use crate::clock::{hours, mins, secs};
    use crate::relay::RelayBoard;
    use crate::room::RoomId;

    // -- phase_on ---------------------------------------------------------

    #[test]
    fn eighteen_six_schedule() {
        let (on, off) = (hours(18), hours(6));
        assert!(phase_on(Millis(0), on, off));
        assert!(phase_on(Millis(hours(18) - 1), on, off));
        assert!(!phase_on(Millis(hours(18)), on, off));
        assert!(!phase_on(Millis(hours(24) - 1), on, off));
        assert!(phase_on(Millis(hours(24)), on, off));
    }

    #[test]
    fn twelve_twelve_schedule() {
        let (on, off) = (hours(12), hours(12));
        assert!(phase_on(Millis(hours(11)), on, off));
        assert!(!phase_on(Millis(hours(13)), on, off));
        assert!(phase_on(Millis(hours(25)), on, off));
    }

    #[test]
    fn zero_off_time_is_always_on() {
        for t in [0, mins(1), hours(23), u32::MAX] {
            assert!(phase_on(Millis(t), hours(24), 0));
        }
    }

    #[test]
    fn zero_on_time_is_always_off() {
        for t in [0, mins(1), hours(23)] {
            assert!(!phase_on(Millis(t), 0, hours(24)));
        }
    }

    #[test]
    fn empty_cycle_is_off() {
        assert!(!phase_on(Millis(12_345), 0, 0));
    }

    // -- LightScheduler ---------------------------------------------------

    fn veg_bank() -> RelayBank {
        let pins = crate::config::Relays::default().veg;
        let board = RelayBoard::new(RoomId::Veg, &pins, true).unwrap();
        RelayBank::new(RoomId::Veg, board, 10_000)
    }

    #[test]
    fn switches_relay_with_phase() {
        let cfg = RoomConfig::defaults_for(RoomId::Veg);
        let mut bank = veg_bank();
        let mut sched = LightScheduler::new();

        // Day from boot, but the relay waits out the boot dwell.
        assert!(sched.update(&cfg, &mut bank, Millis(0)));
        assert!(!bank.state(Actuator::Light));
        assert!(sched.update(&cfg, &mut bank, Millis(secs(10))));
        assert!(bank.state(Actuator::Light));

        assert!(!sched.update(&cfg, &mut bank, Millis(hours(18))));
        assert!(!bank.state(Actuator::Light));

        assert!(sched.update(&cfg, &mut bank, Millis(hours(24))));
        assert!(bank.state(Actuator::Light));
    }

    #[test]
    fn held_change_is_retried_next_tick() {
        let mut cfg = RoomConfig::defaults_for(RoomId::Veg);
        // One-minute cycle so the phase flips inside the dwell.
        cfg.light_on_min = 1;
        cfg.light_off_min = 1;
        let mut bank = veg_bank();
        let mut sched = LightScheduler::new();

        sched.update(&cfg, &mut bank, Millis(mins(1) - 5_000));
        assert!(bank.state(Actuator::Light));

        // Phase says off, dwell says not yet.
        assert!(!sched.update(&cfg, &mut bank, Millis(mins(1))));
        assert!(bank.state(Actuator::Light));

        // Next tick after the dwell the request goes through.
        sched.update(&cfg, &mut bank, Millis(mins(1) + 5_000));
        assert!(!bank.state(Actuator::Light));
    }
}

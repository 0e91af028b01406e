//! Temperature hysteresis for the heater and exhaust fan.
//!
//! Heater: on below `ideal - band`, off above `ideal + band`.
//! Exhaust: on above `ideal + band`, off below `ideal - band`.
//! Inside the band neither latch moves. Humidity is reported but drives
//! nothing.

use serde::Serialize;
use tracing::debug;

use crate::clock::Millis;
use crate::config::RoomConfig;
use crate::relay::RelayBank;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct ClimateDecision {
    pub heater: bool,
    pub exhaust: bool,
}

/// Bang-bang latches for one room.
#[derive(Debug, Default)]
pub struct EnvironmentController {
    heater_on: bool,
    exhaust_on: bool,
}

impl EnvironmentController {
    pub fn new() -> Self {
        Self::default()
    }

    /// Advance both latches for `temp` and return the desired outputs.
    pub fn decide(&mut self, temp: f32, cfg: &RoomConfig) -> ClimateDecision {
        let low = cfg.ideal_temp - cfg.temp_threshold;
        let high = cfg.ideal_temp + cfg.temp_threshold;

        if !self.heater_on && temp < low {
            self.heater_on = true;
        } else if self.heater_on && temp > high {
            self.heater_on = false;
        }

        if !self.exhaust_on && temp > high {
            self.exhaust_on = true;
        } else if self.exhaust_on && temp < low {
            self.exhaust_on = false;
        }

        ClimateDecision {
            heater: self.heater_on,
            exhaust: self.exhaust_on,
        }
    }

    /// Decide and push the result through the relay bank. With no reading
    /// this tick the latches and relays are left as they are.
    pub fn update(
        &mut self,
        temp: Option<f32>,
        cfg: &RoomConfig,
        bank: &mut RelayBank,
        now: Millis,
    ) -> Option<ClimateDecision> {
        let Some(temp) = temp else {
            debug!(room = %bank.room(), "no temperature this tick, climate unchanged");
            return None;
        };

        let decision = self.decide(temp, cfg);
        bank.heater(decision.heater, now);
        bank.exhaust(decision.exhaust, now);
        Some(decision)
    }

    pub fn heater_on(&self) -> bool {
        self.heater_on
    }

    pub fn exhaust_on(&self) -> bool {
        self.exhaust_on
    }
}

// ===========================================================================
// Tests
// ===========================================================================

#[cfg(test)]
mod tests {
    use super::*;
    use crate::relay::{Actuator, RelayBoard};
    use crate::room::RoomId;
    use proptest::prelude::*;

    fn veg() -> RoomConfig {
        // ideal 26.0, band 1.0 → [25.0, 27.0]
        RoomConfig::defaults_for(RoomId::Veg)
    }

    // -- Heater -----------------------------------------------------------

    #[test]
    fn cold_turns_heater_on() {
        let mut env = EnvironmentController::new();
        let d = env.decide(24.9, &veg());
        assert!(d.heater);
        assert!(!d.exhaust);
    }

    #[test]
    fn heater_holds_through_band() {
        let mut env = EnvironmentController::new();
        env.decide(24.0, &veg());
        for t in [25.0, 26.0, 27.0] {
            assert!(env.decide(t, &veg()).heater, "heater dropped at {t}");
        }
        assert!(!env.decide(27.1, &veg()).heater);
    }

    #[test]
    fn band_edges_are_inclusive_dead_band() {
        let mut env = EnvironmentController::new();
        let d = env.decide(25.0, &veg());
        assert!(!d.heater, "exactly ideal - band must not switch");
        let d = env.decide(27.0, &veg());
        assert!(!d.exhaust, "exactly ideal + band must not switch");
    }

    // -- Exhaust ----------------------------------------------------------

    #[test]
    fn hot_turns_exhaust_on() {
        let mut env = EnvironmentController::new();
        let d = env.decide(27.5, &veg());
        assert!(d.exhaust);
        assert!(!d.heater);
    }

    #[test]
    fn exhaust_holds_through_band() {
        let mut env = EnvironmentController::new();
        env.decide(28.0, &veg());
        for t in [27.0, 26.0, 25.0] {
            assert!(env.decide(t, &veg()).exhaust, "exhaust dropped at {t}");
        }
        assert!(!env.decide(24.9, &veg()).exhaust);
    }

    #[test]
    fn zero_band_still_has_strict_edges() {
        let mut cfg = veg();
        cfg.temp_threshold = 0.0;
        let mut env = EnvironmentController::new();
        assert_eq!(
            env.decide(26.0, &cfg),
            ClimateDecision { heater: false, exhaust: false }
        );
        assert!(env.decide(25.99, &cfg).heater);
        let d = env.decide(26.01, &cfg);
        assert!(!d.heater);
        assert!(d.exhaust);
    }

    // -- Relay integration ------------------------------------------------

    fn bank() -> RelayBank {
        let pins = crate::config::Relays::default().veg;
        let board = RelayBoard::new(RoomId::Veg, &pins, true).unwrap();
        RelayBank::new(RoomId::Veg, board, 10_000)
    }

    #[test]
    fn update_drives_relays() {
        let mut env = EnvironmentController::new();
        let mut bank = bank();
        env.update(Some(20.0), &veg(), &mut bank, Millis(10_000));
        assert!(bank.state(Actuator::Heater));
        assert!(!bank.state(Actuator::Exhaust));
    }

    #[test]
    fn cold_boot_waits_out_the_dwell() {
        let mut env = EnvironmentController::new();
        let mut bank = bank();
        env.update(Some(20.0), &veg(), &mut bank, Millis(2_000));
        assert!(env.heater_on());
        assert!(!bank.state(Actuator::Heater));
        env.update(Some(20.0), &veg(), &mut bank, Millis(10_000));
        assert!(bank.state(Actuator::Heater));
    }

    #[test]
    fn missing_reading_changes_nothing() {
        let mut env = EnvironmentController::new();
        let mut bank = bank();
        env.update(Some(20.0), &veg(), &mut bank, Millis(10_000));
        assert_eq!(env.update(None, &veg(), &mut bank, Millis(70_000)), None);
        assert!(env.heater_on());
        assert!(bank.state(Actuator::Heater));
    }

    #[test]
    fn latch_follows_decision_while_relay_waits_for_dwell() {
        let mut env = EnvironmentController::new();
        let mut bank = bank();
        env.update(Some(20.0), &veg(), &mut bank, Millis(10_000));
        // Hot five seconds later: latch flips, relay is held.
        env.update(Some(30.0), &veg(), &mut bank, Millis(15_000));
        assert!(!env.heater_on());
        assert!(bank.state(Actuator::Heater));
        // The next tick past the dwell re-requests and lands.
        env.update(Some(30.0), &veg(), &mut bank, Millis(20_000));
        assert!(!bank.state(Actuator::Heater));
        assert!(bank.state(Actuator::Exhaust));
    }

    proptest! {
        /// Readings inside the closed band never move either latch.
        #[test]
        fn dead_band_is_idempotent(
            ideal in 5.0f32..40.0,
            band in 0.0f32..5.0,
            heater in any::<bool>(),
            exhaust in any::<bool>(),
            frac in 0.0f32..=1.0,
        ) {
            let mut cfg = veg();
            cfg.ideal_temp = ideal;
            cfg.temp_threshold = band;
            let low = ideal - band;
            let high = ideal + band;
            let temp = (low + frac * (high - low)).clamp(low, high);

            let mut env = EnvironmentController { heater_on: heater, exhaust_on: exhaust };
            let d = env.decide(temp, &cfg);
            prop_assert_eq!(d, ClimateDecision { heater, exhaust });
        }

        /// Outside the band the latches always land on the same side.
        #[test]
        fn outside_band_is_decisive(
            heater in any::<bool>(),
            exhaust in any::<bool>(),
            below in any::<bool>(),
            margin in 0.01f32..20.0,
        ) {
            let cfg = veg();
            let temp = if below {
                cfg.ideal_temp - cfg.temp_threshold - margin
            } else {
                cfg.ideal_temp + cfg.temp_threshold + margin
            };
            let mut env = EnvironmentController { heater_on: heater, exhaust_on: exhaust };
            let d = env.decide(temp, &cfg);
            prop_assert_eq!(d.heater, below);
            prop_assert_eq!(d.exhaust, !below);
        }
    }
}

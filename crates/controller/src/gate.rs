//! Minimum-dwell debounce for a single relay output.
//!
//! A gate accepts a state change only if at least `min_dwell_ms` has passed
//! since the last change it accepted. A request that arrives too early is
//! dropped, not queued; the caller asks again on its next tick if it still
//! wants the change.

use serde::Serialize;

use crate::clock::{secs, Millis};

/// Dwell applied to every relay unless the config overrides it.
pub const DEFAULT_MIN_DWELL_MS: u32 = secs(10);

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum GateOutcome {
    /// State changed; the output must be driven.
    Applied,
    /// Already in the requested state; nothing to do.
    AlreadyInState,
    /// Differs from the current state but the dwell has not elapsed.
    TooSoon,
}

#[derive(Debug, Clone)]
pub struct ActuatorGate {
    state: bool,
    last_change: Millis,
    min_dwell_ms: u32,
}

impl ActuatorGate {
    /// A gate starts OFF with its last change at boot (t = 0), so nothing
    /// may switch during the first dwell after startup.
    pub fn new(min_dwell_ms: u32) -> Self {
        Self {
            state: false,
            last_change: Millis::ZERO,
            min_dwell_ms,
        }
    }

    pub fn request(&mut self, desired: bool, now: Millis) -> GateOutcome {
        if desired == self.state {
            return GateOutcome::AlreadyInState;
        }
        if now.since(self.last_change) < self.min_dwell_ms {
            return GateOutcome::TooSoon;
        }
        self.state = desired;
        self.last_change = now;
        GateOutcome::Applied
    }

    pub fn state(&self) -> bool {
        self.state
    }

    pub fn last_change(&self) -> Millis {
        self.last_change
    }

    pub fn min_dwell_ms(&self) -> u32 {
        self.min_dwell_ms
    }
}

// ===========================================================================
// Tests
// ===========================================================================

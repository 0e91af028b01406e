//! Interval-based flood watering, one state machine per zone.
//!
//! A zone rests until its rest period (post-water delay plus interval) has
//! run out, then floods as soon as the soil reads drier than its threshold.
//! A flood holds the zone's relay on for a fixed duration and always runs to
//! completion; soil readings taken during a flood are ignored.

use serde::Serialize;
use tracing::info;

use crate::clock::Millis;
use crate::config::RoomConfig;
use crate::relay::{Actuator, RelayBank};
use crate::room::ZoneId;

/// Where a zone's dryness threshold comes from.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SoilTarget {
    /// The room's `ideal_soil`.
    Configured,
    /// A fixed target, independent of the room config.
    Fixed(i32),
}

impl SoilTarget {
    /// Readings strictly below this start a flood.
    pub fn threshold(self, cfg: &RoomConfig) -> f32 {
        let target = match self {
            SoilTarget::Configured => cfg.ideal_soil,
            SoilTarget::Fixed(t) => t,
        };
        (target - cfg.soil_threshold) as f32
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ZoneParams {
    pub interval_ms: u32,
    pub duration_ms: u32,
    pub post_delay_ms: u32,
    pub target: SoilTarget,
    pub actuator: Actuator,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(tag = "state", rename_all = "snake_case")]
pub enum ZoneState {
    /// Not watering. `rest_deadline` is flood end plus the post-water delay.
    Resting { rest_deadline: Millis },
    Flooding { since: Millis },
}

#[derive(Debug, Clone, Copy, PartialEq, Serialize)]
#[serde(tag = "event", rename_all = "snake_case")]
pub enum WateringEvent {
    FloodStarted { zone: ZoneId, at: Millis, soil: f32 },
    FloodEnded { zone: ZoneId, at: Millis, rest_deadline: Millis },
}

pub struct WateringScheduler {
    zone: ZoneId,
    params: ZoneParams,
    state: ZoneState,
}

impl WateringScheduler {
    /// Zones start resting with a deadline of zero, so the first flood can
    /// happen once `interval` has passed since boot.
    pub fn new(zone: ZoneId, params: ZoneParams) -> Self {
        Self {
            zone,
            params,
            state: ZoneState::Resting {
                rest_deadline: Millis::ZERO,
            },
        }
    }

    pub fn zone(&self) -> ZoneId {
        self.zone
    }

    pub fn params(&self) -> &ZoneParams {
        &self.params
    }

    pub fn state(&self) -> ZoneState {
        self.state
    }

    pub fn is_flooding(&self) -> bool {
        matches!(self.state, ZoneState::Flooding { .. })
    }

    /// Whether post-water delay plus interval has elapsed since the last
    /// flood ended.
    fn rest_over(&self, rest_deadline: Millis, now: Millis) -> bool {
        let ended = rest_deadline.minus(self.params.post_delay_ms);
        let rest = self.params.post_delay_ms as u64 + self.params.interval_ms as u64;
        now.since(ended) as u64 >= rest
    }

    /// Run one tick. The zone's relay is re-requested every tick so a change
    /// the dwell held back lands as soon as it is allowed.
    pub fn update(
        &mut self,
        soil: Option<f32>,
        cfg: &RoomConfig,
        bank: &mut RelayBank,
        now: Millis,
    ) -> Option<WateringEvent> {
        let actuator = self.params.actuator;

        match self.state {
            ZoneState::Resting { rest_deadline } => {
                let threshold = self.params.target.threshold(cfg);
                match soil {
                    Some(level) if level < threshold && self.rest_over(rest_deadline, now) => {
                        self.state = ZoneState::Flooding { since: now };
                        bank.request(actuator, true, now);
                        info!(
                            zone = %self.zone,
                            soil = level,
                            threshold,
                            duration_s = self.params.duration_ms / 1000,
                            "flood started"
                        );
                        Some(WateringEvent::FloodStarted {
                            zone: self.zone,
                            at: now,
                            soil: level,
                        })
                    }
                    _ => {
                        bank.request(actuator, false, now);
                        None
                    }
                }
            }
            ZoneState::Flooding { since } => {
                if now.since(since) >= self.params.duration_ms {
                    let rest_deadline = now.plus(self.params.post_delay_ms);
                    self.state = ZoneState::Resting { rest_deadline };
                    bank.request(actuator, false, now);
                    info!(
                        zone = %self.zone,
                        flooded_s = now.since(since) / 1000,
                        "flood finished, resting"
                    );
                    Some(WateringEvent::FloodEnded {
                        zone: self.zone,
                        at: now,
                        rest_deadline,
                    })
                } else {
                    bank.request(actuator, true, now);
                    None
                }
            }
        }
    }
}

// ===========================================================================
// Tests
// ===========================================================================

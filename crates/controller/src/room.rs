//! Rooms, watering zones, and the per-room control loop.

use std::collections::BTreeMap;
use std::fmt;

use anyhow::{Context, Result};
use grow_sensors::SoilChannel;
use serde::{Deserialize, Serialize};
use tracing::{debug, info};

use crate::clock::Millis;
use crate::config::{Config, RoomConfig};
use crate::environment::{ClimateDecision, EnvironmentController};
use crate::lighting::LightScheduler;
use crate::relay::{Actuator, RelayBank, RelayBoard, Transition};
use crate::sampler::SensorSnapshot;
use crate::watering::{SoilTarget, WateringEvent, WateringScheduler, ZoneState};

// ---------------------------------------------------------------------------
// Identifiers
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum RoomId {
    Veg,
    Flower,
}

impl RoomId {
    pub const ALL: [RoomId; 2] = [RoomId::Veg, RoomId::Flower];

    /// Key used by the config store and the console.
    pub fn as_str(self) -> &'static str {
        match self {
            RoomId::Veg => "veg",
            RoomId::Flower => "flower",
        }
    }

    /// Watering zones inside this room. The mother plants share the veg room.
    pub fn zones(self) -> &'static [ZoneId] {
        match self {
            RoomId::Veg => &[ZoneId::Veg, ZoneId::Mother],
            RoomId::Flower => &[ZoneId::Flower],
        }
    }
}

impl fmt::Display for RoomId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// One moisture-sensor group and the relay that floods it.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ZoneId {
    Veg,
    Mother,
    Flower,
}

impl ZoneId {
    pub const ALL: [ZoneId; 3] = [ZoneId::Veg, ZoneId::Mother, ZoneId::Flower];

    pub fn as_str(self) -> &'static str {
        match self {
            ZoneId::Veg => "veg",
            ZoneId::Mother => "mother",
            ZoneId::Flower => "flower",
        }
    }

    pub fn room(self) -> RoomId {
        match self {
            ZoneId::Veg | ZoneId::Mother => RoomId::Veg,
            ZoneId::Flower => RoomId::Flower,
        }
    }

    pub fn actuator(self) -> Actuator {
        match self {
            ZoneId::Veg | ZoneId::Flower => Actuator::Water,
            ZoneId::Mother => Actuator::Intake,
        }
    }

    pub fn default_interval_min(self) -> u32 {
        match self {
            ZoneId::Veg => 120,
            ZoneId::Mother => 240,
            ZoneId::Flower => 180,
        }
    }

    pub fn default_duration_sec(self) -> u32 {
        match self {
            ZoneId::Veg => 45,
            ZoneId::Mother => 30,
            ZoneId::Flower => 60,
        }
    }

    /// The mother zone floods against a fixed 2100 rather than the veg
    /// room's `ideal_soil`.
    pub fn soil_target(self) -> SoilTarget {
        match self {
            ZoneId::Mother => SoilTarget::Fixed(2100),
            ZoneId::Veg | ZoneId::Flower => SoilTarget::Configured,
        }
    }

    pub fn default_channels(self) -> Vec<SoilChannel> {
        match self {
            ZoneId::Veg => (0..4).map(|ch| SoilChannel::new(0x48, ch)).collect(),
            ZoneId::Mother => vec![SoilChannel::new(0x49, 0)],
            ZoneId::Flower => (0..4).map(|ch| SoilChannel::new(0x4A, ch)).collect(),
        }
    }
}

impl fmt::Display for ZoneId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

// ---------------------------------------------------------------------------
// Status report
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, Serialize)]
pub struct ZoneReport {
    pub zone: ZoneId,
    /// Average this tick, `None` if no probe answered.
    pub soil: Option<f32>,
    pub threshold: f32,
    pub state: ZoneState,
}

/// What one room saw and did in one tick.
#[derive(Debug, Clone, Serialize)]
pub struct StatusReport {
    pub room: RoomId,
    pub name: String,
    pub at: Millis,
    pub temperature: Option<f32>,
    pub humidity: Option<f32>,
    pub climate: Option<ClimateDecision>,
    pub light_phase: bool,
    pub zones: Vec<ZoneReport>,
    pub actuators: BTreeMap<Actuator, bool>,
    pub transitions: Vec<Transition>,
    pub watering: Vec<WateringEvent>,
}

fn fmt_opt(v: Option<f32>, precision: usize) -> String {
    v.map_or_else(|| "--".to_string(), |v| format!("{v:.precision$}"))
}

impl StatusReport {
    /// One-line summary for the log.
    pub fn summary(&self) -> String {
        let soil = self
            .zones
            .iter()
            .map(|z| format!("{}={}", z.zone, fmt_opt(z.soil, 0)))
            .collect::<Vec<_>>()
            .join(" ");
        let on = self
            .actuators
            .iter()
            .filter(|(_, on)| **on)
            .map(|(a, _)| a.as_str())
            .collect::<Vec<_>>();
        format!(
            "{} t={}C h={}% soil[{}] on[{}]",
            self.room,
            fmt_opt(self.temperature, 1),
            fmt_opt(self.humidity, 0),
            soil,
            on.join(",")
        )
    }
}

// ---------------------------------------------------------------------------
// Room controller
// ---------------------------------------------------------------------------

/// Everything one room owns: its config, relays and schedulers.
pub struct RoomController {
    id: RoomId,
    config: RoomConfig,
    bank: RelayBank,
    environment: EnvironmentController,
    light: LightScheduler,
    zones: Vec<WateringScheduler>,
    /// Last successful soil average per zone.
    soil: BTreeMap<ZoneId, f32>,
}

impl RoomController {
    pub fn new(id: RoomId, config: RoomConfig, bank: RelayBank, zones: Vec<WateringScheduler>) -> Self {
        debug_assert!(zones.iter().all(|z| z.zone().room() == id));
        Self {
            id,
            config,
            bank,
            environment: EnvironmentController::new(),
            light: LightScheduler::new(),
            zones,
            soil: BTreeMap::new(),
        }
    }

    /// Wire up `id` from the deployment file: relay board, gates and
    /// watering zones.
    pub fn build(id: RoomId, file: &Config, config: RoomConfig) -> Result<Self> {
        let board = RelayBoard::new(id, file.relays.pins(id), file.relays.active_low)
            .with_context(|| format!("failed to set up relays for room '{id}'"))?;
        let bank = RelayBank::new(id, board, file.min_dwell_ms());
        let zones = id
            .zones()
            .iter()
            .map(|&z| WateringScheduler::new(z, file.zone_params(z)))
            .collect();
        Ok(Self::new(id, config, bank, zones))
    }

    pub fn id(&self) -> RoomId {
        self.id
    }

    /// Run one control tick against `snap`: climate, then light, then each
    /// watering zone in order.
    pub fn update(&mut self, snap: &SensorSnapshot) -> StatusReport {
        let now = snap.at;

        let climate = self
            .environment
            .update(snap.temperature(), &self.config, &mut self.bank, now);

        let light_phase = self.light.update(&self.config, &mut self.bank, now);

        let mut watering = Vec::new();
        let mut zones = Vec::with_capacity(self.zones.len());
        for sched in &mut self.zones {
            let zone = sched.zone();
            let reading = snap.soil_average(zone);
            if let Some(v) = reading {
                self.soil.insert(zone, v);
            }
            watering.extend(sched.update(reading, &self.config, &mut self.bank, now));
            zones.push(ZoneReport {
                zone,
                soil: reading,
                threshold: sched.params().target.threshold(&self.config),
                state: sched.state(),
            });
        }

        let report = StatusReport {
            room: self.id,
            name: self.config.name.clone(),
            at: now,
            temperature: snap.temperature(),
            humidity: snap.humidity(),
            climate,
            light_phase,
            zones,
            actuators: self.bank.states().into_iter().collect(),
            transitions: self.bank.take_transitions(),
            watering,
        };
        debug!(room = %self.id, report = %report.summary(), "tick");
        report
    }

    pub fn config(&self) -> &RoomConfig {
        &self.config
    }

    /// Swap in a new config. It takes effect from the next tick.
    pub fn replace_config(&mut self, config: RoomConfig) -> Result<()> {
        config.validate()?;
        info!(room = %self.id, ?config, "room config replaced");
        self.config = config;
        Ok(())
    }

    /// Last successful soil average for `zone`.
    pub fn soil_reading(&self, zone: ZoneId) -> Option<f32> {
        self.soil.get(&zone).copied()
    }

    pub fn bank(&self) -> &RelayBank {
        &self.bank
    }

    pub fn zones(&self) -> &[WateringScheduler] {
        &self.zones
    }
}

// ===========================================================================
// Tests
// ===========================================================================

#[cfg(test)]
mod tests {
    use super::*;
    use crate::clock::{hours, mins};
    use grow_sensors::Climate;

    /// First tick after the boot dwell.
    const T0: u32 = 10_000;

    fn room(id: RoomId) -> RoomController {
        RoomController::build(id, &Config::default(), RoomConfig::defaults_for(id)).unwrap()
    }

    fn snapshot(at: u32, temp: f32, soil: &[(ZoneId, u16)]) -> SensorSnapshot {
        let mut snap = SensorSnapshot {
            at: Millis(at),
            climate: Some(Climate {
                temperature_c: temp,
                humidity_pct: 60.0,
            }),
            ..Default::default()
        };
        for &(zone, v) in soil {
            snap.soil.entry(zone).or_default().push(v);
        }
        snap
    }

    // -- Identifiers ------------------------------------------------------

    #[test]
    fn zones_belong_to_their_room() {
        for room in RoomId::ALL {
            for zone in room.zones() {
                assert_eq!(zone.room(), room);
            }
        }
        assert_eq!(RoomId::Veg.zones(), &[ZoneId::Veg, ZoneId::Mother]);
    }

    #[test]
    fn zone_defaults() {
        assert_eq!(ZoneId::Veg.actuator(), Actuator::Water);
        assert_eq!(ZoneId::Mother.actuator(), Actuator::Intake);
        assert_eq!(ZoneId::Flower.default_interval_min(), 180);
        assert_eq!(ZoneId::Mother.default_duration_sec(), 30);
        assert_eq!(ZoneId::Veg.default_channels().len(), 4);
    }

    #[test]
    fn ids_serialize_lowercase() {
        assert_eq!(serde_json::to_string(&RoomId::Flower).unwrap(), "\"flower\"");
        assert_eq!(serde_json::to_string(&ZoneId::Mother).unwrap(), "\"mother\"");
    }

    // -- Tick -------------------------------------------------------------

    #[test]
    fn light_comes_on_once_boot_dwell_passes() {
        let mut veg = room(RoomId::Veg);
        let report = veg.update(&snapshot(0, 20.0, &[]));
        assert!(report.light_phase);
        assert!(!report.actuators[&Actuator::Light]);
        assert!(!report.actuators[&Actuator::Heater]);
        assert!(report.transitions.is_empty());

        let report = veg.update(&snapshot(T0, 26.0, &[]));
        assert!(report.actuators[&Actuator::Light]);
        assert_eq!(
            report.transitions,
            vec![Transition {
                actuator: Actuator::Light,
                on: true,
                at: Millis(T0)
            }]
        );
    }

    #[test]
    fn cold_room_heats() {
        let mut flower = room(RoomId::Flower);
        let report = flower.update(&snapshot(T0, 20.0, &[]));
        assert_eq!(
            report.climate,
            Some(ClimateDecision {
                heater: true,
                exhaust: false
            })
        );
        assert!(flower.bank().state(Actuator::Heater));
    }

    #[test]
    fn veg_and_mother_flood_independently() {
        let mut veg = room(RoomId::Veg);
        // Past both intervals; veg dry (1750 < 1800), mother wet (2000 > 1900).
        let t = mins(241);
        let report = veg.update(&snapshot(t, 26.0, &[(ZoneId::Veg, 1750), (ZoneId::Mother, 2000)]));

        assert_eq!(report.watering.len(), 1);
        assert!(matches!(
            report.watering[0],
            WateringEvent::FloodStarted { zone: ZoneId::Veg, .. }
        ));
        assert!(report.actuators[&Actuator::Water]);
        assert!(!report.actuators[&Actuator::Intake]);
        assert_eq!(report.zones[1].threshold, 1900.0);
    }

    #[test]
    fn multi_probe_zone_is_averaged() {
        let mut veg = room(RoomId::Veg);
        let report = veg.update(&snapshot(
            0,
            26.0,
            &[(ZoneId::Veg, 1700), (ZoneId::Veg, 1900), (ZoneId::Veg, 1800)],
        ));
        assert_eq!(report.zones[0].soil, Some(1800.0));
        assert_eq!(veg.soil_reading(ZoneId::Veg), Some(1800.0));
    }

    #[test]
    fn cached_soil_survives_a_failed_read() {
        let mut veg = room(RoomId::Veg);
        veg.update(&snapshot(0, 26.0, &[(ZoneId::Mother, 2050)]));
        let report = veg.update(&snapshot(2_000, 26.0, &[]));
        assert_eq!(report.zones[1].soil, None);
        assert_eq!(veg.soil_reading(ZoneId::Mother), Some(2050.0));
    }

    #[test]
    fn missing_climate_leaves_heater_alone() {
        let mut flower = room(RoomId::Flower);
        flower.update(&snapshot(T0, 20.0, &[]));
        let mut snap = snapshot(hours(1), 30.0, &[]);
        snap.climate = None;
        let report = flower.update(&snap);
        assert_eq!(report.climate, None);
        assert!(report.actuators[&Actuator::Heater]);
    }

    // -- Config -----------------------------------------------------------

    #[test]
    fn replaced_config_applies_next_tick() {
        let mut flower = room(RoomId::Flower);
        flower.update(&snapshot(T0, 24.0, &[]));
        assert!(!flower.bank().state(Actuator::Heater));

        let mut cfg = flower.config().clone();
        cfg.ideal_temp = 30.0;
        flower.replace_config(cfg).unwrap();

        flower.update(&snapshot(T0 + 2_000, 24.0, &[]));
        assert!(flower.bank().state(Actuator::Heater));
    }

    #[test]
    fn invalid_config_is_refused() {
        let mut veg = room(RoomId::Veg);
        let mut cfg = veg.config().clone();
        cfg.light_on_min = 0;
        cfg.light_off_min = 0;
        assert!(veg.replace_config(cfg).is_err());
        assert_eq!(veg.config(), &RoomConfig::defaults_for(RoomId::Veg));
    }

    #[test]
    fn summary_line() {
        let mut veg = room(RoomId::Veg);
        let report = veg.update(&snapshot(T0, 25.54, &[(ZoneId::Veg, 1900)]));
        assert_eq!(
            report.summary(),
            "veg t=25.5C h=60% soil[veg=1900 mother=--] on[light]"
        );
    }
}

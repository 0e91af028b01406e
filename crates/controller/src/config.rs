//! Room setpoints plus the TOML config file for wiring and timing.
//!
//! [`RoomConfig`] is the per-room value the control loop reads each tick; the
//! console edits it and the store persists it. [`Config`] is the static
//! deployment file: relay pins, soil channels, tick rate and dwell.

use std::collections::{HashMap, HashSet};
use std::ops::RangeInclusive;

use anyhow::{bail, Context, Result};
use grow_sensors::{adc, aht, SoilChannel};
use serde::{Deserialize, Serialize};

use crate::clock::{mins, secs};
use crate::relay::{Actuator, RelayPins};
use crate::room::{RoomId, ZoneId};
use crate::watering::ZoneParams;

/// Accepted ideal temperature, °C.
pub const TEMP_RANGE: RangeInclusive<f32> = 0.0..=45.0;
/// Accepted ideal relative humidity, %.
pub const HUMIDITY_RANGE: RangeInclusive<f32> = 0.0..=100.0;
/// Accepted ideal soil index on the 12-bit scale.
pub const SOIL_RANGE: RangeInclusive<i32> = 0..=grow_sensors::SOIL_FULL_SCALE as i32;

/// Longest light phase (on + off) the millisecond counter can hold.
const MAX_LIGHT_CYCLE_MIN: u64 = u32::MAX as u64 / 60_000;

// ---------------------------------------------------------------------------
// Room config
// ---------------------------------------------------------------------------

/// Setpoints and bands for one room.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RoomConfig {
    pub name: String,
    pub ideal_temp: f32,
    pub ideal_humidity: f32,
    pub ideal_soil: i32,
    pub temp_threshold: f32,
    pub humidity_threshold: f32,
    pub soil_threshold: i32,
    pub light_on_min: u32,
    pub light_off_min: u32,
}

impl RoomConfig {
    pub fn defaults_for(room: RoomId) -> Self {
        match room {
            RoomId::Veg => Self {
                name: "Veg Room".into(),
                ideal_temp: 26.0,
                ideal_humidity: 60.0,
                ideal_soil: 2000,
                temp_threshold: 1.0,
                humidity_threshold: 5.0,
                soil_threshold: 200,
                light_on_min: 18 * 60,
                light_off_min: 6 * 60,
            },
            RoomId::Flower => Self {
                name: "Flower Room".into(),
                ideal_temp: 24.0,
                ideal_humidity: 55.0,
                ideal_soil: 2200,
                temp_threshold: 1.0,
                humidity_threshold: 5.0,
                soil_threshold: 200,
                light_on_min: 12 * 60,
                light_off_min: 12 * 60,
            },
        }
    }

    pub fn light_on_ms(&self) -> u32 {
        self.light_on_min.saturating_mul(60_000)
    }

    pub fn light_off_ms(&self) -> u32 {
        self.light_off_min.saturating_mul(60_000)
    }

    /// Check every field; the error lists all violations.
    pub fn validate(&self) -> Result<()> {
        let mut errors: Vec<String> = Vec::new();

        if !self.ideal_temp.is_finite() || !TEMP_RANGE.contains(&self.ideal_temp) {
            errors.push(format!(
                "ideal_temp {} out of range [{}, {}]",
                self.ideal_temp,
                TEMP_RANGE.start(),
                TEMP_RANGE.end()
            ));
        }
        if !self.ideal_humidity.is_finite() || !HUMIDITY_RANGE.contains(&self.ideal_humidity) {
            errors.push(format!(
                "ideal_humidity {} out of range [{}, {}]",
                self.ideal_humidity,
                HUMIDITY_RANGE.start(),
                HUMIDITY_RANGE.end()
            ));
        }
        if !SOIL_RANGE.contains(&self.ideal_soil) {
            errors.push(format!(
                "ideal_soil {} out of range [{}, {}]",
                self.ideal_soil,
                SOIL_RANGE.start(),
                SOIL_RANGE.end()
            ));
        }

        // ── Bands ───────────────────────────────────────────
        if !(self.temp_threshold.is_finite() && self.temp_threshold >= 0.0) {
            errors.push(format!(
                "temp_threshold must be non-negative, got {}",
                self.temp_threshold
            ));
        }
        if !(self.humidity_threshold.is_finite() && self.humidity_threshold >= 0.0) {
            errors.push(format!(
                "humidity_threshold must be non-negative, got {}",
                self.humidity_threshold
            ));
        }
        if self.soil_threshold < 0 {
            errors.push(format!(
                "soil_threshold must be non-negative, got {}",
                self.soil_threshold
            ));
        }

        // ── Light cycle ─────────────────────────────────────
        let cycle = self.light_on_min as u64 + self.light_off_min as u64;
        if cycle == 0 {
            errors.push("light_on_min + light_off_min must be positive".into());
        } else if cycle > MAX_LIGHT_CYCLE_MIN {
            errors.push(format!(
                "light cycle of {cycle} min exceeds {MAX_LIGHT_CYCLE_MIN} min"
            ));
        }

        finish(errors)
    }
}

// ---------------------------------------------------------------------------
// Config file structures
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, Default, Deserialize)]
pub struct Config {
    #[serde(default)]
    pub timing: Timing,
    #[serde(default)]
    pub relays: Relays,
    #[serde(default)]
    pub zones: Vec<ZoneEntry>,
    #[serde(default)]
    pub climate: ClimateEntry,
}

#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct Timing {
    pub tick_ms: u64,
    pub min_dwell_sec: u32,
    pub post_water_delay_min: u32,
    /// Log a one-line summary every this many ticks (0 disables it).
    pub summary_every_ticks: u32,
}

impl Default for Timing {
    fn default() -> Self {
        Self {
            tick_ms: 2_000,
            min_dwell_sec: 10,
            post_water_delay_min: 60,
            summary_every_ticks: 30,
        }
    }
}

#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct Relays {
    /// Most relay boards switch on with a LOW input.
    pub active_low: bool,
    pub veg: RelayPins,
    pub flower: RelayPins,
}

impl Default for Relays {
    fn default() -> Self {
        Self {
            active_low: true,
            veg: RelayPins {
                exhaust: 5,
                heater: 18,
                water: 19,
                light: 21,
                intake: 22,
            },
            flower: RelayPins {
                exhaust: 23,
                heater: 25,
                water: 26,
                light: 27,
                intake: 14,
            },
        }
    }
}

/// Per-zone overrides. Anything left out keeps the zone's built-in value.
#[derive(Debug, Clone, Deserialize)]
pub struct ZoneEntry {
    pub zone: ZoneId,
    pub interval_min: Option<u32>,
    pub duration_sec: Option<u32>,
    pub soil: Option<Vec<SoilChannel>>,
}

#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct ClimateEntry {
    pub addr: u16,
}

impl Default for ClimateEntry {
    fn default() -> Self {
        Self {
            addr: aht::DEFAULT_ADDR,
        }
    }
}

// ---------------------------------------------------------------------------
// GPIO whitelist
// ---------------------------------------------------------------------------

/// BCM pins on the 40-pin header available for general use. GPIO 0-1 carry
/// the ID EEPROM; 28+ are not on the header.
const VALID_GPIO_PINS: RangeInclusive<u8> = 2..=27;

// ---------------------------------------------------------------------------
// Validation
// ---------------------------------------------------------------------------

impl Config {
    /// Validate the whole file; the error lists every violation found.
    pub fn validate(&self) -> Result<()> {
        let mut errors: Vec<String> = Vec::new();

        self.validate_timing(&mut errors);
        self.validate_relays(&mut errors);
        self.validate_zones(&mut errors);

        if !(0x03..=0x77).contains(&self.climate.addr) {
            errors.push(format!(
                "climate: addr 0x{:02x} is not a 7-bit I2C address",
                self.climate.addr
            ));
        }

        finish(errors)
    }

    fn validate_timing(&self, errors: &mut Vec<String>) {
        let t = &self.timing;
        if t.tick_ms == 0 {
            errors.push("timing: tick_ms must be positive".into());
        }
        if t.min_dwell_sec as u64 * 1_000 > u32::MAX as u64 {
            errors.push(format!("timing: min_dwell_sec {} too large", t.min_dwell_sec));
        }
        if t.post_water_delay_min as u64 * 60_000 > u32::MAX as u64 {
            errors.push(format!(
                "timing: post_water_delay_min {} too large",
                t.post_water_delay_min
            ));
        }
    }

    fn validate_relays(&self, errors: &mut Vec<String>) {
        let mut seen: HashMap<u8, String> = HashMap::new();

        for room in RoomId::ALL {
            for actuator in Actuator::ALL {
                let pin = self.relays.pins(room).pin(actuator);
                let owner = format!("{room} {actuator}");
                if !VALID_GPIO_PINS.contains(&pin) {
                    errors.push(format!(
                        "relays.{owner}: gpio {pin} is not a valid BCM GPIO pin (allowed: 2-27)"
                    ));
                } else if let Some(prev) = seen.get(&pin) {
                    errors.push(format!(
                        "relays.{owner}: gpio {pin} is already used by {prev}"
                    ));
                } else {
                    seen.insert(pin, owner);
                }
            }
        }
    }

    fn validate_zones(&self, errors: &mut Vec<String>) {
        let mut seen_zones: HashSet<ZoneId> = HashSet::new();

        for z in &self.zones {
            let ctx = format!("zone '{}'", z.zone);

            if !seen_zones.insert(z.zone) {
                errors.push(format!("{ctx}: duplicate entry"));
            }

            if let Some(interval) = z.interval_min {
                if interval == 0 {
                    errors.push(format!("{ctx}: interval_min must be positive"));
                } else if interval as u64 * 60_000 > u32::MAX as u64 {
                    errors.push(format!("{ctx}: interval_min {interval} too large"));
                }
            }
            if let Some(duration) = z.duration_sec {
                if duration == 0 {
                    errors.push(format!("{ctx}: duration_sec must be positive"));
                } else if duration as u64 * 1_000 > u32::MAX as u64 {
                    errors.push(format!("{ctx}: duration_sec {duration} too large"));
                }
            }

            if let Some(channels) = &z.soil {
                if channels.is_empty() {
                    errors.push(format!("{ctx}: soil channel list is empty"));
                }
                for ch in channels {
                    if !adc::ADDR_RANGE.contains(&ch.addr) {
                        errors.push(format!(
                            "{ctx}: soil addr 0x{:02x} outside ADS1115 range 0x48-0x4b",
                            ch.addr
                        ));
                    }
                    if ch.channel > adc::MAX_CHANNEL {
                        errors.push(format!(
                            "{ctx}: soil channel {} out of range (0-{})",
                            ch.channel,
                            adc::MAX_CHANNEL
                        ));
                    }
                }
            }
        }

        // Channels are checked after overrides are resolved so an override
        // that collides with another zone's built-in list is caught too.
        let mut owners: HashMap<SoilChannel, ZoneId> = HashMap::new();
        for zone in ZoneId::ALL {
            for ch in self.soil_channels(zone) {
                if let Some(other) = owners.insert(ch, zone) {
                    if other != zone {
                        errors.push(format!(
                            "zone '{zone}': soil channel {ch} already used by zone '{other}'"
                        ));
                    } else {
                        errors.push(format!("zone '{zone}': soil channel {ch} listed twice"));
                    }
                }
            }
        }

        // The rest period (post-water delay + interval) is one span on the
        // u32 millisecond counter.
        let max_min = u32::MAX as u64 / 60_000;
        let post = self.timing.post_water_delay_min as u64;
        for zone in ZoneId::ALL {
            let interval = self
                .entry(zone)
                .and_then(|e| e.interval_min)
                .unwrap_or(zone.default_interval_min()) as u64;
            if post <= max_min && interval <= max_min && post + interval > max_min {
                errors.push(format!(
                    "zone '{zone}': post_water_delay_min + interval_min ({} min) exceeds {max_min} min",
                    post + interval
                ));
            }
        }
    }
}

fn finish(errors: Vec<String>) -> Result<()> {
    if errors.is_empty() {
        Ok(())
    } else {
        bail!(
            "config validation failed ({} error{}):\n  - {}",
            errors.len(),
            if errors.len() == 1 { "" } else { "s" },
            errors.join("\n  - ")
        );
    }
}

// ---------------------------------------------------------------------------
// Resolved values
// ---------------------------------------------------------------------------

impl Relays {
    pub fn pins(&self, room: RoomId) -> &RelayPins {
        match room {
            RoomId::Veg => &self.veg,
            RoomId::Flower => &self.flower,
        }
    }
}

impl Config {
    fn entry(&self, zone: ZoneId) -> Option<&ZoneEntry> {
        self.zones.iter().find(|z| z.zone == zone)
    }

    pub fn min_dwell_ms(&self) -> u32 {
        secs(self.timing.min_dwell_sec)
    }

    /// Timing for `zone` with any file overrides applied.
    pub fn zone_params(&self, zone: ZoneId) -> ZoneParams {
        let entry = self.entry(zone);
        let interval_min = entry
            .and_then(|e| e.interval_min)
            .unwrap_or(zone.default_interval_min());
        let duration_sec = entry
            .and_then(|e| e.duration_sec)
            .unwrap_or(zone.default_duration_sec());

        ZoneParams {
            interval_ms: mins(interval_min),
            duration_ms: secs(duration_sec),
            post_delay_ms: mins(self.timing.post_water_delay_min),
            target: zone.soil_target(),
            actuator: zone.actuator(),
        }
    }

    pub fn soil_channels(&self, zone: ZoneId) -> Vec<SoilChannel> {
        self.entry(zone)
            .and_then(|e| e.soil.clone())
            .unwrap_or_else(|| zone.default_channels())
    }
}

// ---------------------------------------------------------------------------
// Load
// ---------------------------------------------------------------------------

/// Read, parse, and validate a TOML config file.
pub fn load(path: &str) -> Result<Config> {
    let contents =
        std::fs::read_to_string(path).with_context(|| format!("failed to read config: {path}"))?;
    parse(&contents).with_context(|| format!("invalid config: {path}"))
}

/// Load `path` if it exists, otherwise fall back to built-in defaults.
pub fn load_or_default(path: &str) -> Result<Config> {
    if std::path::Path::new(path).exists() {
        load(path)
    } else {
        tracing::warn!(path, "config file not found, using built-in wiring");
        Ok(Config::default())
    }
}

pub fn parse(contents: &str) -> Result<Config> {
    let config: Config = toml::from_str(contents).context("failed to parse config")?;
    config.validate()?;
    Ok(config)
}

// ===========================================================================
// Tests
// ===========================================================================

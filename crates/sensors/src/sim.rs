//! Stateful sensor simulator for running the controller without hardware.
//!
//! Each soil channel is a mean-reverting random walk that drifts dry, with
//! ADC noise and occasional spikes on top. While its zone floods the
//! channel soaks toward the wet end, so the watering scheduler sees the
//! effect of its own floods. The [`Scenario`] sets drift, soak rate and
//! how often a probe fails to answer. Air temperature and humidity wander
//! slowly around a fixed centre.

use std::collections::HashMap;
use std::fmt;
use std::str::FromStr;

use anyhow::{bail, Result};

use crate::{Climate, ClimateProbe, SoilChannel, SoilProbe, SOIL_FULL_SCALE};

/// Zero-mean normal sample (Box-Muller).
fn normal(sigma: f64) -> f64 {
    // 1 - u keeps the log argument in (0, 1].
    let u1 = 1.0 - fastrand::f64();
    let u2 = fastrand::f64();
    sigma * (-2.0 * u1.ln()).sqrt() * (std::f64::consts::TAU * u2).cos()
}

// ---------------------------------------------------------------------------
// Scenarios
// ---------------------------------------------------------------------------

/// How the simulated grow beds behave. Picked with `SIM_SCENARIO`.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Scenario {
    /// Beds dry past the flood threshold within a couple of hours.
    Drying,
    /// Beds sit just above the threshold and rarely call for water.
    Steady,
    /// Beds dry slowly but soak hard during a flood and drain back over
    /// the rest period.
    FloodResponse,
    /// Normal drying with probes that glitch and sometimes fail to answer.
    FaultyProbes,
}

impl Scenario {
    pub const ALL: [Scenario; 4] = [
        Scenario::Drying,
        Scenario::Steady,
        Scenario::FloodResponse,
        Scenario::FaultyProbes,
    ];

    pub fn as_str(self) -> &'static str {
        match self {
            Scenario::Drying => "drying",
            Scenario::Steady => "steady",
            Scenario::FloodResponse => "flood-response",
            Scenario::FaultyProbes => "faulty-probes",
        }
    }
}

impl FromStr for Scenario {
    type Err = anyhow::Error;

    fn from_str(s: &str) -> Result<Self> {
        let wanted = s.trim().to_ascii_lowercase().replace('_', "-");
        match Scenario::ALL.into_iter().find(|sc| sc.as_str() == wanted) {
            Some(sc) => Ok(sc),
            None => bail!(
                "unknown scenario '{s}' (expected drying, steady, flood-response or faulty-probes)"
            ),
        }
    }
}

impl fmt::Display for Scenario {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Per-step behaviour of one scenario, in 12-bit counts.
struct Profile {
    drift: f64,
    walk_sigma: f64,
    mean_reversion: f64,
    noise_sigma: f64,
    /// Counts gained per step while the zone floods.
    soak: f64,
    spike_prob: f32,
    spike_sigma: f64,
    /// Chance that a read fails outright.
    fail_prob: f32,
    /// Where a new channel starts: 0.0 = dry end, 1.0 = wet end.
    start_frac: f64,
}

impl Profile {
    fn for_scenario(scenario: Scenario) -> Self {
        match scenario {
            Scenario::Drying => Profile {
                drift: -1.5,
                walk_sigma: 8.0,
                mean_reversion: 0.002,
                noise_sigma: 12.0,
                soak: 25.0,
                spike_prob: 0.02,
                spike_sigma: 250.0,
                fail_prob: 0.0,
                start_frac: 0.55,
            },
            Scenario::Steady => Profile {
                drift: -0.1,
                walk_sigma: 3.0,
                mean_reversion: 0.01,
                noise_sigma: 5.0,
                soak: 25.0,
                spike_prob: 0.002,
                spike_sigma: 120.0,
                fail_prob: 0.0,
                start_frac: 0.55,
            },
            Scenario::FloodResponse => Profile {
                drift: -0.6,
                walk_sigma: 4.0,
                mean_reversion: 0.001,
                noise_sigma: 6.0,
                soak: 60.0,
                spike_prob: 0.005,
                spike_sigma: 150.0,
                fail_prob: 0.0,
                start_frac: 0.4,
            },
            Scenario::FaultyProbes => Profile {
                drift: -1.0,
                walk_sigma: 20.0,
                mean_reversion: 0.002,
                noise_sigma: 40.0,
                soak: 25.0,
                spike_prob: 0.10,
                spike_sigma: 400.0,
                fail_prob: 0.05,
                start_frac: 0.55,
            },
        }
    }
}

// ---------------------------------------------------------------------------
// Soil
// ---------------------------------------------------------------------------

struct ChannelState {
    base: f64,
    /// Permanent per-probe offset; two probes in the same bed never agree.
    offset: f64,
    watering: bool,
}

/// Simulated soil probes, one independent walk per channel.
pub struct SimulatedSoil {
    profile: Profile,
    dry: f64,
    wet: f64,
    channels: HashMap<SoilChannel, ChannelState>,
}

impl SimulatedSoil {
    /// `dry` and `wet` are the 12-bit readings at the two ends of the range.
    pub fn new(scenario: Scenario, dry: f64, wet: f64) -> Self {
        Self {
            profile: Profile::for_scenario(scenario),
            dry,
            wet,
            channels: HashMap::new(),
        }
    }

    fn centre(&self) -> f64 {
        (self.dry + self.wet) / 2.0
    }

    fn state_for(&mut self, channel: SoilChannel) -> &mut ChannelState {
        let range = self.wet - self.dry;
        let start = self.dry + self.profile.start_frac * range;
        let (lo, hi) = (self.dry, self.wet);
        self.channels.entry(channel).or_insert_with(|| ChannelState {
            base: (start + normal(range * 0.03)).clamp(lo, hi),
            offset: normal(range * 0.02),
            watering: false,
        })
    }

    /// Advance `channel` one step and return the instantaneous reading.
    pub fn sample(&mut self, channel: SoilChannel) -> u16 {
        let centre = self.centre();
        let (dry, wet) = (self.dry, self.wet);
        let Profile {
            drift,
            walk_sigma,
            mean_reversion,
            noise_sigma,
            soak,
            spike_prob,
            spike_sigma,
            ..
        } = self.profile;

        let state = self.state_for(channel);

        let pull = mean_reversion * (centre - state.base);
        let soak = if state.watering { soak } else { 0.0 };
        state.base =
            (state.base + drift + pull + soak + normal(walk_sigma)).clamp(dry - 100.0, wet + 100.0);

        let spike = if fastrand::f32() < spike_prob {
            normal(spike_sigma)
        } else {
            0.0
        };
        let reading = state.base + state.offset + normal(noise_sigma) + spike;

        reading.round().clamp(0.0, SOIL_FULL_SCALE as f64) as u16
    }

    pub fn channel_count(&self) -> usize {
        self.channels.len()
    }
}

impl SoilProbe for SimulatedSoil {
    fn read(&mut self, channel: SoilChannel) -> Result<u16> {
        if fastrand::f32() < self.profile.fail_prob {
            bail!("simulated probe {channel} did not answer");
        }
        Ok(self.sample(channel))
    }

    fn observe_watering(&mut self, channel: SoilChannel, active: bool) {
        self.state_for(channel).watering = active;
    }
}

// ---------------------------------------------------------------------------
// Climate
// ---------------------------------------------------------------------------

/// Simulated enclosure air: temperature and humidity each wander around a
/// centre with mean reversion.
pub struct SimulatedClimate {
    temperature_c: f64,
    humidity_pct: f64,
    centre_temp: f64,
    centre_hum: f64,
}

impl SimulatedClimate {
    pub fn new(centre_temp: f64, centre_hum: f64) -> Self {
        Self {
            temperature_c: centre_temp,
            humidity_pct: centre_hum,
            centre_temp,
            centre_hum,
        }
    }
}

impl ClimateProbe for SimulatedClimate {
    fn read(&mut self) -> Result<Climate> {
        self.temperature_c += 0.01 * (self.centre_temp - self.temperature_c) + normal(0.08);
        self.humidity_pct += 0.01 * (self.centre_hum - self.humidity_pct) + normal(0.3);
        self.humidity_pct = self.humidity_pct.clamp(0.0, 100.0);

        Ok(Climate {
            temperature_c: self.temperature_c as f32,
            humidity_pct: self.humidity_pct as f32,
        })
    }
}

// ===========================================================================
// Tests
// ===========================================================================

//! Sensor probes for the grow controller.
//!
//! Two kinds of input feed a control tick: soil moisture channels (one
//! analog reading per probe, scaled to 12 bits) and a single shared
//! temperature/humidity reading. Each has a trait so the controller can run
//! against real I2C hardware (`hw` feature) or the simulator (`sim`
//! feature, default).

use anyhow::Result;
use serde::{Deserialize, Serialize};

pub mod adc;
pub mod aht;
#[cfg(feature = "sim")]
pub mod sim;

/// Full-scale value of a soil reading. Every probe reports on this 12-bit
/// scale so setpoints stay comparable across ADCs.
pub const SOIL_FULL_SCALE: u16 = 4095;

/// One soil probe: an ADS1115 at `addr`, single-ended input `channel`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct SoilChannel {
    pub addr: u16,
    pub channel: u8,
}

impl SoilChannel {
    pub const fn new(addr: u16, channel: u8) -> Self {
        Self { addr, channel }
    }
}

impl std::fmt::Display for SoilChannel {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "0x{:02x}/{}", self.addr, self.channel)
    }
}

/// Air temperature and relative humidity from the climate sensor.
#[derive(Debug, Clone, Copy, PartialEq, Serialize)]
pub struct Climate {
    pub temperature_c: f32,
    pub humidity_pct: f32,
}

/// Source of soil moisture readings.
pub trait SoilProbe {
    /// Read one channel, 0..=[`SOIL_FULL_SCALE`]. Higher means wetter.
    fn read(&mut self, channel: SoilChannel) -> Result<u16>;

    /// Told after every tick whether the zone that owns `channel` is
    /// flooding. Real probes ignore it.
    fn observe_watering(&mut self, _channel: SoilChannel, _active: bool) {}
}

/// Source of the shared temperature/humidity reading.
pub trait ClimateProbe {
    fn read(&mut self) -> Result<Climate>;
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn soil_channel_display() {
        assert_eq!(SoilChannel::new(0x48, 2).to_string(), "0x48/2");
    }

    #[test]
    fn soil_channel_deserializes_from_inline_table() {
        #[derive(Deserialize)]
        struct Wrapper {
            soil: Vec<SoilChannel>,
        }
        let w: Wrapper = toml::from_str("soil = [{ addr = 0x49, channel = 3 }]").unwrap();
        assert_eq!(w.soil, vec![SoilChannel::new(0x49, 3)]);
    }

    #[test]
    fn soil_channels_order_by_address_then_channel() {
        let mut chans = vec![
            SoilChannel::new(0x49, 0),
            SoilChannel::new(0x48, 3),
            SoilChannel::new(0x48, 1),
        ];
        chans.sort();
        assert_eq!(
            chans,
            vec![
                SoilChannel::new(0x48, 1),
                SoilChannel::new(0x48, 3),
                SoilChannel::new(0x49, 0),
            ]
        );
    }
}

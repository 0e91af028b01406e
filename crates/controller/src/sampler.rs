//! Per-tick sensor snapshot.
//!
//! Every probe is read once per tick, before any decision is made, and the
//! rooms all decide from that same snapshot. A failed read drops that input
//! for the tick and is recorded as a fault.

use std::collections::BTreeMap;

use grow_sensors::{Climate, ClimateProbe, SoilChannel, SoilProbe};
use serde::Serialize;
use tracing::warn;

use crate::clock::Millis;
use crate::room::ZoneId;

/// Mean of the readings, or `None` when there are none.
pub fn soil_average(readings: &[u16]) -> Option<f32> {
    if readings.is_empty() {
        return None;
    }
    let sum: u32 = readings.iter().map(|&r| r as u32).sum();
    Some(sum as f32 / readings.len() as f32)
}

#[derive(Debug, Clone, Default, Serialize)]
pub struct SensorSnapshot {
    pub at: Millis,
    pub climate: Option<Climate>,
    /// Raw readings per zone; only successful reads are listed.
    pub soil: BTreeMap<ZoneId, Vec<u16>>,
    pub faults: Vec<String>,
}

impl SensorSnapshot {
    pub fn temperature(&self) -> Option<f32> {
        self.climate.map(|c| c.temperature_c)
    }

    pub fn humidity(&self) -> Option<f32> {
        self.climate.map(|c| c.humidity_pct)
    }

    pub fn soil_average(&self, zone: ZoneId) -> Option<f32> {
        self.soil.get(&zone).and_then(|r| soil_average(r))
    }
}

/// The enclosure's probes and which soil channels belong to which zone.
pub struct SensorHub<S, C> {
    soil: S,
    climate: C,
    channels: Vec<(ZoneId, Vec<SoilChannel>)>,
}

impl<S: SoilProbe, C: ClimateProbe> SensorHub<S, C> {
    pub fn new(soil: S, climate: C, channels: Vec<(ZoneId, Vec<SoilChannel>)>) -> Self {
        Self {
            soil,
            climate,
            channels,
        }
    }

    pub fn sample(&mut self, at: Millis) -> SensorSnapshot {
        let mut snap = SensorSnapshot {
            at,
            ..Default::default()
        };

        match self.climate.read() {
            Ok(c) => snap.climate = Some(c),
            Err(e) => {
                warn!(error = %format!("{e:#}"), "climate read failed");
                snap.faults.push(format!("climate: {e:#}"));
            }
        }

        for (zone, channels) in &self.channels {
            let mut readings = Vec::with_capacity(channels.len());
            for &ch in channels {
                match self.soil.read(ch) {
                    Ok(v) => readings.push(v),
                    Err(e) => {
                        warn!(zone = %zone, channel = %ch, error = %format!("{e:#}"), "soil read failed");
                        snap.faults.push(format!("{zone} soil {ch}: {e:#}"));
                    }
                }
            }
            if !readings.is_empty() {
                snap.soil.insert(*zone, readings);
            }
        }

        snap
    }

    /// Tell the probes whether `zone` is being watered.
    pub fn observe_watering(&mut self, zone: ZoneId, active: bool) {
        if let Some((_, channels)) = self.channels.iter().find(|(z, _)| *z == zone) {
            for &ch in channels {
                self.soil.observe_watering(ch, active);
            }
        }
    }
}

// ===========================================================================
// Tests
// ===========================================================================

#[cfg(test)]
mod tests {
    use super::*;
    use anyhow::{bail, Result};
    use std::collections::HashMap;

    // -- soil_average -----------------------------------------------------

    #[test]
    fn average_of_nothing_is_none() {
        assert_eq!(soil_average(&[]), None);
    }

    #[test]
    fn average_of_one_is_the_reading() {
        assert_eq!(soil_average(&[1750]), Some(1750.0));
    }

    #[test]
    fn average_is_not_truncated() {
        assert_eq!(soil_average(&[1000, 1001]), Some(1000.5));
    }

    #[test]
    fn average_of_full_scale_does_not_overflow() {
        assert_eq!(soil_average(&[4095; 4]), Some(4095.0));
    }

    // -- SensorHub --------------------------------------------------------

    /// Fixed readings per channel; channels not in the map fail.
    #[derive(Default)]
    struct FixedSoil {
        values: HashMap<SoilChannel, u16>,
        watering: HashMap<SoilChannel, bool>,
    }

    impl SoilProbe for FixedSoil {
        fn read(&mut self, ch: SoilChannel) -> Result<u16> {
            match self.values.get(&ch) {
                Some(v) => Ok(*v),
                None => bail!("no ack"),
            }
        }

        fn observe_watering(&mut self, ch: SoilChannel, active: bool) {
            self.watering.insert(ch, active);
        }
    }

    struct FixedClimate(Option<Climate>);

    impl ClimateProbe for FixedClimate {
        fn read(&mut self) -> Result<Climate> {
            match self.0 {
                Some(c) => Ok(c),
                None => bail!("busy"),
            }
        }
    }

    const A0: SoilChannel = SoilChannel::new(0x48, 0);
    const A1: SoilChannel = SoilChannel::new(0x48, 1);
    const B0: SoilChannel = SoilChannel::new(0x49, 0);

    fn hub(values: &[(SoilChannel, u16)], climate: Option<Climate>) -> SensorHub<FixedSoil, FixedClimate> {
        let soil = FixedSoil {
            values: values.iter().copied().collect(),
            ..Default::default()
        };
        SensorHub::new(
            soil,
            FixedClimate(climate),
            vec![(ZoneId::Veg, vec![A0, A1]), (ZoneId::Mother, vec![B0])],
        )
    }

    const AIR: Climate = Climate {
        temperature_c: 25.5,
        humidity_pct: 58.0,
    };

    #[test]
    fn sample_collects_every_zone() {
        let mut hub = hub(&[(A0, 1800), (A1, 1700), (B0, 2050)], Some(AIR));
        let snap = hub.sample(Millis(42));
        assert_eq!(snap.at, Millis(42));
        assert_eq!(snap.temperature(), Some(25.5));
        assert_eq!(snap.humidity(), Some(58.0));
        assert_eq!(snap.soil_average(ZoneId::Veg), Some(1750.0));
        assert_eq!(snap.soil_average(ZoneId::Mother), Some(2050.0));
        assert!(snap.faults.is_empty());
    }

    #[test]
    fn failed_channel_is_skipped() {
        let mut hub = hub(&[(A0, 1800), (B0, 2050)], Some(AIR));
        let snap = hub.sample(Millis(0));
        assert_eq!(snap.soil[&ZoneId::Veg], vec![1800]);
        assert_eq!(snap.faults.len(), 1);
        assert!(snap.faults[0].contains("0x48/1"), "{:?}", snap.faults);
    }

    #[test]
    fn zone_with_no_good_reads_has_no_average() {
        let mut hub = hub(&[(A0, 1800), (A1, 1700)], Some(AIR));
        let snap = hub.sample(Millis(0));
        assert_eq!(snap.soil_average(ZoneId::Mother), None);
        assert!(!snap.soil.contains_key(&ZoneId::Mother));
    }

    #[test]
    fn climate_failure_is_a_fault() {
        let mut hub = hub(&[(A0, 1), (A1, 1), (B0, 1)], None);
        let snap = hub.sample(Millis(0));
        assert_eq!(snap.temperature(), None);
        assert_eq!(snap.faults, vec!["climate: busy".to_string()]);
    }

    #[test]
    fn watering_is_forwarded_to_zone_channels() {
        let mut hub = hub(&[], Some(AIR));
        hub.observe_watering(ZoneId::Veg, true);
        assert_eq!(hub.soil.watering.get(&A0), Some(&true));
        assert_eq!(hub.soil.watering.get(&A1), Some(&true));
        assert_eq!(hub.soil.watering.get(&B0), None);
    }
}

//! AHT20 temperature/humidity sensor over I2C.
//!
//! One sensor serves the whole enclosure; both rooms see the same reading
//! each tick.

#[cfg(feature = "hw")]
use std::{thread, time::Duration};

#[cfg(feature = "hw")]
use anyhow::{bail, Context, Result};
#[cfg(feature = "hw")]
use rppal::i2c::I2c;

use crate::Climate;
#[cfg(feature = "hw")]
use crate::ClimateProbe;

pub const DEFAULT_ADDR: u16 = 0x38;

pub const CMD_INIT: [u8; 3] = [0xBE, 0x08, 0x00];
pub const CMD_MEASURE: [u8; 3] = [0xAC, 0x33, 0x00];

pub const STATUS_BUSY: u8 = 1 << 7;
pub const STATUS_CALIBRATED: u8 = 1 << 3;

const FULL_SCALE: f32 = (1u32 << 20) as f32;

/// Decode the six data bytes of a measurement frame (status byte first).
/// Humidity and temperature are 20-bit fields packed across bytes 1..=5.
pub fn decode_frame(frame: &[u8; 6]) -> Climate {
    let hum_raw =
        ((frame[1] as u32) << 12) | ((frame[2] as u32) << 4) | ((frame[3] as u32) >> 4);
    let temp_raw =
        (((frame[3] & 0x0F) as u32) << 16) | ((frame[4] as u32) << 8) | frame[5] as u32;

    Climate {
        temperature_c: temp_raw as f32 / FULL_SCALE * 200.0 - 50.0,
        humidity_pct: hum_raw as f32 / FULL_SCALE * 100.0,
    }
}

#[cfg(feature = "hw")]
const MEASURE_WAIT: Duration = Duration::from_millis(80);

#[cfg(feature = "hw")]
pub struct Aht20 {
    i2c: I2c,
}

#[cfg(feature = "hw")]
impl Aht20 {
    pub fn new(addr: u16) -> Result<Self> {
        let mut i2c = I2c::new().context("failed to open I2C bus for AHT20")?;
        i2c.set_slave_address(addr)
            .with_context(|| format!("failed to address AHT20 at 0x{addr:02x}"))?;

        thread::sleep(Duration::from_millis(40));
        let mut status = [0u8; 1];
        i2c.read(&mut status)?;
        if status[0] & STATUS_CALIBRATED == 0 {
            i2c.write(&CMD_INIT)?;
            thread::sleep(Duration::from_millis(10));
        }

        tracing::info!(addr = format_args!("0x{addr:02x}"), "aht20 initialised");
        Ok(Self { i2c })
    }
}

#[cfg(feature = "hw")]
impl ClimateProbe for Aht20 {
    fn read(&mut self) -> Result<Climate> {
        self.i2c.write(&CMD_MEASURE).context("aht20 trigger failed")?;
        thread::sleep(MEASURE_WAIT);

        let mut frame = [0u8; 6];
        for _ in 0..3 {
            self.i2c.read(&mut frame).context("aht20 read failed")?;
            if frame[0] & STATUS_BUSY == 0 {
                return Ok(decode_frame(&frame));
            }
            thread::sleep(Duration::from_millis(10));
        }
        bail!("aht20 still busy after measurement wait");
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn decode_zero_frame() {
        let c = decode_frame(&[0x1C, 0, 0, 0, 0, 0]);
        assert_eq!(c.humidity_pct, 0.0);
        assert_eq!(c.temperature_c, -50.0);
    }

    #[test]
    fn decode_half_scale() {
        // 0x80000 in both 20-bit fields: 50 %RH and 50 °C.
        let c = decode_frame(&[0x1C, 0x80, 0x00, 0x08, 0x00, 0x00]);
        assert!((c.humidity_pct - 50.0).abs() < 0.001, "{}", c.humidity_pct);
        assert!((c.temperature_c - 50.0).abs() < 0.001, "{}", c.temperature_c);
    }

    #[test]
    fn decode_shared_nibble_is_split() {
        // Byte 3 high nibble belongs to humidity, low nibble to temperature.
        let c = decode_frame(&[0x1C, 0x00, 0x00, 0xF0, 0x00, 0x00]);
        assert!(c.humidity_pct > 0.0);
        assert_eq!(c.temperature_c, -50.0);
    }

    #[test]
    fn decode_room_temperature() {
        // 25 °C → (25 + 50) / 200 * 2^20 = 393216 = 0x60000
        let c = decode_frame(&[0x1C, 0x00, 0x00, 0x06, 0x00, 0x00]);
        assert!((c.temperature_c - 25.0).abs() < 0.001, "{}", c.temperature_c);
    }
}

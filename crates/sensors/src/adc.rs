//! ADS1115 16-bit ADC over I2C for the soil probe arrays.
//!
//! Up to four ADS1115 boards share the bus (ADDR pin strapped to
//! 0x48..=0x4B), four single-ended inputs each. Reads are single-shot at
//! PGA ±4.096 V, 128 SPS. The 15-bit single-ended result is scaled down to
//! the 12-bit soil scale the room setpoints are written in.

#[cfg(feature = "hw")]
use std::{thread, time::Duration};

#[cfg(feature = "hw")]
use anyhow::{ensure, Context, Result};
#[cfg(feature = "hw")]
use rppal::i2c::I2c;

#[cfg(feature = "hw")]
use crate::{SoilChannel, SoilProbe};

// ── Registers ───────────────────────────────────────────────────────────────

pub const REG_CONVERSION: u8 = 0x00;
pub const REG_CONFIG: u8 = 0x01;

/// OS=1 (start), PGA=001 (±4.096 V), MODE=1 (single-shot), DR=100 (128 SPS),
/// COMP_QUE=11 (comparator off). MUX is OR-ed in per channel.
pub const CONFIG_BASE: u16 = 0b1_000_001_1_100_0_0_0_11;

const MUX_SHIFT: u8 = 12;
/// AINx vs GND for x = 0..=3.
const MUX_SINGLE_ENDED: [u16; 4] = [0b100, 0b101, 0b110, 0b111];

pub const MAX_CHANNEL: u8 = 3;
pub const ADDR_RANGE: std::ops::RangeInclusive<u16> = 0x48..=0x4B;

/// Set in the config register once a conversion has finished.
pub const OS_READY_BIT: u16 = 1 << 15;

/// Config register value for a single-ended read on `channel`.
pub fn config_for_channel(channel: u8) -> u16 {
    CONFIG_BASE | (MUX_SINGLE_ENDED[channel as usize & 0b11] << MUX_SHIFT)
}

/// Map a raw conversion result onto the 12-bit soil scale. Single-ended
/// results are never negative; bus glitches are clamped.
pub fn scale_to_soil(raw: i16) -> u16 {
    (raw.max(0) as u16) >> 3
}

// ── Driver ──────────────────────────────────────────────────────────────────

#[cfg(feature = "hw")]
const CONVERSION_WAIT: Duration = Duration::from_millis(9);

/// All ADS1115 boards on I2C bus 1.
#[cfg(feature = "hw")]
pub struct Ads1115 {
    i2c: I2c,
    current_addr: Option<u16>,
}

#[cfg(feature = "hw")]
impl Ads1115 {
    pub fn new() -> Result<Self> {
        let i2c = I2c::new().context("failed to open I2C bus for ADS1115")?;
        tracing::info!("ads1115 bus opened");
        Ok(Self {
            i2c,
            current_addr: None,
        })
    }

    fn select(&mut self, addr: u16) -> Result<()> {
        if self.current_addr != Some(addr) {
            self.i2c
                .set_slave_address(addr)
                .with_context(|| format!("failed to address ADS1115 at 0x{addr:02x}"))?;
            self.current_addr = Some(addr);
        }
        Ok(())
    }

    fn read_raw(&mut self, ch: SoilChannel) -> Result<i16> {
        ensure!(
            ch.channel <= MAX_CHANNEL,
            "ADS1115 channel {} out of range (0–{MAX_CHANNEL})",
            ch.channel
        );
        self.select(ch.addr)?;

        let [hi, lo] = config_for_channel(ch.channel).to_be_bytes();
        self.i2c.write(&[REG_CONFIG, hi, lo])?;
        thread::sleep(CONVERSION_WAIT);

        for _ in 0..3 {
            let mut status = [0u8; 2];
            self.i2c.write_read(&[REG_CONFIG], &mut status)?;
            if u16::from_be_bytes(status) & OS_READY_BIT != 0 {
                break;
            }
            thread::sleep(Duration::from_millis(2));
        }

        let mut buf = [0u8; 2];
        self.i2c.write_read(&[REG_CONVERSION], &mut buf)?;
        Ok(i16::from_be_bytes(buf))
    }
}

#[cfg(feature = "hw")]
impl SoilProbe for Ads1115 {
    fn read(&mut self, channel: SoilChannel) -> Result<u16> {
        let raw = self
            .read_raw(channel)
            .with_context(|| format!("soil read failed on {channel}"))?;
        Ok(scale_to_soil(raw))
    }
}

// ── Tests ───────────────────────────────────────────────────────────────────

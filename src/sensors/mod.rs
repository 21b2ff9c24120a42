//! Sensor subsystem: the DHT11 single-wire driver and the [`Reading`]
//! value it produces.
//!
//! A `Reading` only comes out of a transaction whose checksum matched;
//! it is `Copy` and never mutated after construction.  Newer readings
//! replace older ones wholesale in the shared store.

pub mod dht11;

use crate::error::DecodeError;

/// One validated temperature / humidity measurement.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Reading {
    temperature_c: f32,
    humidity_pct: f32,
    valid: bool,
}

impl Reading {
    /// Placeholder held by the store before the first successful transaction.
    pub const UNAVAILABLE: Self = Self {
        temperature_c: 0.0,
        humidity_pct: 0.0,
        valid: false,
    };

    /// Build a reading from the five raw bytes of a transaction.
    ///
    /// Byte order is humidity-int, humidity-frac, temperature-int,
    /// temperature-frac, checksum.  The checksum is the low 8 bits of the
    /// sum of the first four bytes; on mismatch nothing is returned.
    pub fn from_frame(frame: [u8; 5]) -> Result<Self, DecodeError> {
        let expected = frame_checksum(&frame);
        if expected != frame[4] {
            return Err(DecodeError::ChecksumMismatch {
                expected,
                received: frame[4],
            });
        }
        Ok(Self {
            humidity_pct: f32::from(frame[0]) + f32::from(frame[1]) / 10.0,
            temperature_c: f32::from(frame[2]) + f32::from(frame[3]) / 10.0,
            valid: true,
        })
    }

    pub fn temperature_c(&self) -> f32 {
        self.temperature_c
    }

    pub fn humidity_pct(&self) -> f32 {
        self.humidity_pct
    }

    pub fn is_valid(&self) -> bool {
        self.valid
    }
}

/// 8-bit truncated sum of the four data bytes.
pub fn frame_checksum(frame: &[u8; 5]) -> u8 {
    frame[..4].iter().fold(0u8, |acc, b| acc.wrapping_add(*b))
}

//! Unified error types for the EnvSense firmware.
//!
//! Every subsystem error is a small `Copy` enum so it can be logged,
//! compared in tests, and passed between the acquisition and transmission
//! threads without allocation.  Initialisation failures in `main` go
//! through `anyhow` instead.

use core::fmt;

// ---------------------------------------------------------------------------
// Protocol decode errors
// ---------------------------------------------------------------------------

/// Why a single DHT11 transaction was discarded.
///
/// The acquisition loop treats every variant the same way (attempt
/// failed); the detail exists for logs and tests.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DecodeError {
    /// The sensor never acknowledged the start pulse.
    NoResponse,
    /// A wait inside the 40-bit data phase exceeded its bound.
    BitTimeout { bit: u8 },
    /// A high phase was measured but falls outside the sane envelope.
    PulseOutOfRange { bit: u8, width_us: u32 },
    /// The 8-bit sum of the first four bytes disagrees with byte 5.
    ChecksumMismatch { expected: u8, received: u8 },
    /// The GPIO driver reported an error while driving or sampling.
    Line,
}

impl fmt::Display for DecodeError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::NoResponse => write!(f, "no response from sensor"),
            Self::BitTimeout { bit } => write!(f, "timeout on bit {bit}"),
            Self::PulseOutOfRange { bit, width_us } => {
                write!(f, "bit {bit} high phase {width_us}us out of range")
            }
            Self::ChecksumMismatch { expected, received } => write!(
                f,
                "checksum mismatch (expected 0x{expected:02X}, received 0x{received:02X})"
            ),
            Self::Line => write!(f, "GPIO line error"),
        }
    }
}

// ---------------------------------------------------------------------------
// Shared store errors
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StoreError {
    /// The guarded region could not be acquired within its bound.
    Unavailable,
    /// Only checksum-validated readings may be committed.
    InvalidReading,
}

impl fmt::Display for StoreError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Unavailable => write!(f, "store lock not acquired in time"),
            Self::InvalidReading => write!(f, "refusing to commit an invalid reading"),
        }
    }
}

// ---------------------------------------------------------------------------
// Communications errors
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CommsError {
    WifiConnectFailed,
    WifiDisconnected,
    /// The payload could not be serialised or did not fit the buffer.
    PayloadEncoding,
    /// The HTTP request could not be performed.
    HttpRequestFailed,
    /// The server answered with a non-2xx status.
    HttpStatus(u16),
}

impl fmt::Display for CommsError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::WifiConnectFailed => write!(f, "WiFi connect failed"),
            Self::WifiDisconnected => write!(f, "WiFi disconnected"),
            Self::PayloadEncoding => write!(f, "payload encoding failed"),
            Self::HttpRequestFailed => write!(f, "HTTP request failed"),
            Self::HttpStatus(code) => write!(f, "HTTP status {code}"),
        }
    }
}

//! Port traits: the hexagonal boundary between the two loops and the outside world.
//!
//! ```text
//!   Adapter ──▶ Port trait ──▶ AcquisitionLoop / TransmissionLoop
//! ```
//!
//! Driven adapters (sensor line, display, WiFi/HTTP, restart, storage)
//! implement these traits.  The loops consume them via generics, so the
//! domain core never touches hardware directly and the integration tests
//! can substitute scripted mocks.
//!
//! `PresentationPort` methods take `&self`: both loops present through the
//! same instance, so implementations serialise internally.

use std::sync::Arc;

use crate::app::payload::TelemetryPayload;
use crate::config::SystemConfig;
use crate::error::{CommsError, DecodeError};
use crate::sensors::Reading;

// ───────────────────────────────────────────────────────────────
// Sensor port (driven adapter: single-wire line → domain)
// ───────────────────────────────────────────────────────────────

/// One complete sensor transaction: wake pulse, handshake, 40 bits, checksum.
pub trait SensorPort {
    fn read_transaction(&mut self) -> Result<Reading, DecodeError>;
}

// ───────────────────────────────────────────────────────────────
// Clocks
// ───────────────────────────────────────────────────────────────

/// Monotonic microsecond counter used to time line edges.
///
/// Must be readable from inside an interrupt-free section.
pub trait MicrosClock {
    fn now_us(&self) -> u64;
}

impl<T: MicrosClock + ?Sized> MicrosClock for &T {
    fn now_us(&self) -> u64 {
        (**self).now_us()
    }
}

/// Seconds since the Unix epoch, for payload timestamps.
///
/// Without SNTP this is whatever the RTC holds (usually seconds since boot).
pub trait WallClock {
    fn unix_secs(&self) -> u64;
}

// ───────────────────────────────────────────────────────────────
// Presentation port (driven adapter: domain → display)
// ───────────────────────────────────────────────────────────────

/// Everything the loops ever put in front of a human.
pub trait PresentationPort {
    /// Show a validated measurement.
    fn show_reading(&self, temperature_c: f32, humidity_pct: f32);

    /// Sensor has failed `consecutive_failures` cycles in a row.
    fn show_warning(&self, consecutive_failures: u32);

    /// Last message before a restart.
    fn show_fatal(&self, message: &str);

    /// Network link came up or went down.
    fn show_network_state(&self, connected: bool);
}

impl<T: PresentationPort + ?Sized> PresentationPort for Arc<T> {
    fn show_reading(&self, temperature_c: f32, humidity_pct: f32) {
        (**self).show_reading(temperature_c, humidity_pct);
    }

    fn show_warning(&self, consecutive_failures: u32) {
        (**self).show_warning(consecutive_failures);
    }

    fn show_fatal(&self, message: &str) {
        (**self).show_fatal(message);
    }

    fn show_network_state(&self, connected: bool) {
        (**self).show_network_state(connected);
    }
}

// ───────────────────────────────────────────────────────────────
// Transport port (driven adapter: domain → WiFi + HTTP)
// ───────────────────────────────────────────────────────────────

/// Link management plus one-shot payload delivery.
pub trait TransportPort {
    /// Current link state as reported by the network stack.
    fn is_connected(&self) -> bool;

    /// One bounded reconnection attempt.
    ///
    /// Implementations reset their own retry bookkeeping on every call,
    /// whatever the outcome.
    fn reconnect(&mut self) -> Result<(), CommsError>;

    /// Deliver one payload.  No retry; the next period carries fresh data.
    fn send(&mut self, payload: &TelemetryPayload) -> Result<(), CommsError>;

    /// Signal strength of the current association, if any.
    fn rssi(&self) -> Option<i8>;
}

// ───────────────────────────────────────────────────────────────
// Restart port (driven adapter: domain → system reset)
// ───────────────────────────────────────────────────────────────

/// Terminal escalation when the sensor has been dead for too long.
///
/// The production implementation never returns.  Test doubles record the
/// call and return so the caller's follow-up can be observed.
pub trait RestartPort {
    fn restart(&mut self, consecutive_failures: u32, reason: &str);
}

// ───────────────────────────────────────────────────────────────
// Persistence
// ───────────────────────────────────────────────────────────────

/// Where [`SystemConfig`] lives between boots.
///
/// `save` runs [`SystemConfig::validate`] first and writes nothing on
/// failure.  `load` hands back the defaults on first boot, and a stored
/// blob that no longer validates is an error rather than a clamp.
pub trait ConfigPort {
    fn load(&self) -> Result<SystemConfig, ConfigError>;
    fn save(&self, config: &SystemConfig) -> Result<(), ConfigError>;
}

/// Namespaced blob storage backing the config and the restart log.
pub trait StoragePort {
    /// Copy the blob into `buf`; returns the number of bytes copied.
    fn read(&self, namespace: &str, key: &str, buf: &mut [u8]) -> Result<usize, StorageError>;
    /// Replace the blob.  A write is all-or-nothing.
    fn write(&mut self, namespace: &str, key: &str, data: &[u8]) -> Result<(), StorageError>;
    /// Removing an absent key succeeds.
    fn delete(&mut self, namespace: &str, key: &str) -> Result<(), StorageError>;
    fn exists(&self, namespace: &str, key: &str) -> bool;
}

#[derive(Debug)]
pub enum ConfigError {
    /// The stored blob did not deserialise.
    Corrupted,
    /// Names the offending field and its allowed range.
    ValidationFailed(&'static str),
    StorageFull,
    IoError,
}

#[derive(Debug, PartialEq, Eq)]
pub enum StorageError {
    NotFound,
    Full,
    IoError,
}

impl core::fmt::Display for ConfigError {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        match self {
            Self::Corrupted => write!(f, "stored config unreadable"),
            Self::ValidationFailed(why) => write!(f, "config rejected: {why}"),
            Self::StorageFull => write!(f, "NVS partition full"),
            Self::IoError => write!(f, "NVS access failed"),
        }
    }
}

impl core::error::Error for ConfigError {}

impl core::fmt::Display for StorageError {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        match self {
            Self::NotFound => write!(f, "no such key"),
            Self::Full => write!(f, "NVS partition full"),
            Self::IoError => write!(f, "NVS access failed"),
        }
    }
}

impl core::error::Error for StorageError {}

//! Telemetry payload sent by the transmission loop.
//!
//! ```json
//! {"device_id":"ESP32_SENSOR_01","timestamp":1234,"temperature":23.1,"humidity":60.0,"rssi":-61}
//! ```
//!
//! Readings are rounded to two decimals on the wire.  When the store holds
//! no valid reading (or could not be read in time) both readings carry the
//! `-999` sentinel instead, so the server sees the device is alive but the
//! sensor is not.

use serde::{Serialize, Serializer};

use crate::app::store::StoreSnapshot;
use crate::error::CommsError;

/// Value sent in place of a reading the device does not have.
pub const SENTINEL: f32 = -999.0;

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct TelemetryPayload {
    pub device_id: heapless::String<32>,
    /// Seconds from the wall clock at build time.
    pub timestamp: u64,
    #[serde(serialize_with = "two_decimals")]
    pub temperature: f32,
    #[serde(serialize_with = "two_decimals")]
    pub humidity: f32,
    /// dBm of the current association; 0 when unknown.
    pub rssi: i32,
}

impl TelemetryPayload {
    /// Build from whatever the store produced this cycle.
    ///
    /// `None` (lock timeout) and an invalid reading both map to sentinels.
    pub fn from_snapshot(
        device_id: &heapless::String<32>,
        timestamp: u64,
        snapshot: Option<&StoreSnapshot>,
        rssi: Option<i8>,
    ) -> Self {
        let (temperature, humidity) = match snapshot {
            Some(s) if s.reading.is_valid() => {
                (s.reading.temperature_c(), s.reading.humidity_pct())
            }
            _ => (SENTINEL, SENTINEL),
        };
        Self {
            device_id: device_id.clone(),
            timestamp,
            temperature,
            humidity,
            rssi: rssi.map_or(0, i32::from),
        }
    }

    /// `false` when both readings are sentinels.
    pub fn has_reading(&self) -> bool {
        !(is_sentinel(self.temperature) && is_sentinel(self.humidity))
    }

    pub fn to_json(&self) -> Result<String, CommsError> {
        serde_json::to_string(self).map_err(|_| CommsError::PayloadEncoding)
    }
}

fn is_sentinel(v: f32) -> bool {
    (v - SENTINEL).abs() < f32::EPSILON
}

fn round2(v: f32) -> f64 {
    (f64::from(v) * 100.0).round() / 100.0
}

fn two_decimals<S: Serializer>(v: &f32, s: S) -> Result<S::Ok, S::Error> {
    s.serialize_f64(round2(*v))
}

//! System configuration parameters
//!
//! All tunable parameters for the EnvSense system.  The health thresholds
//! and loop periods are policy, not protocol: they are expected to be
//! tuned per installation and can be overridden via NVS.

use serde::{Deserialize, Serialize};

use crate::app::ports::ConfigError;

/// Network transport settings.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct NetworkConfig {
    /// WiFi network name (1-32 printable ASCII bytes).
    pub ssid: heapless::String<32>,
    /// WPA2 passphrase (8-64 bytes, or empty for an open network).
    pub password: heapless::String<64>,
    /// HTTP endpoint that receives the JSON payload.
    pub server_url: heapless::String<128>,
    /// HTTP request timeout (milliseconds)
    pub http_timeout_ms: u32,
    /// Connection attempts per reconnect call before giving up
    pub connect_retries: u8,
}

impl Default for NetworkConfig {
    fn default() -> Self {
        Self {
            ssid: heapless_str("TempRouter"),
            password: heapless_str("QPWO0192"),
            server_url: heapless_str("http://192.168.0.246:3000/api/sensor-data"),
            http_timeout_ms: 10_000,
            connect_retries: 5,
        }
    }
}

/// Core system configuration
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SystemConfig {
    // --- Acquisition ---
    /// Acquisition loop period (milliseconds)
    pub acquisition_period_ms: u32,
    /// Quiescent time before driving the start pulse (milliseconds)
    pub settle_delay_ms: u32,
    /// Decode attempts per acquisition cycle
    pub max_attempts: u8,
    /// Delay between decode attempts (milliseconds)
    pub retry_delay_ms: u32,

    // --- Health policy ---
    /// Consecutive failed cycles before the display shows a warning
    pub warn_threshold: u32,
    /// Consecutive failed cycles before the device restarts
    pub restart_threshold: u32,

    // --- Transmission ---
    /// Transmission loop period (milliseconds)
    pub transmit_period_ms: u32,
    /// Delay before the first network activity (milliseconds)
    pub transmit_warmup_ms: u32,

    // --- Sharing ---
    /// Bounded wait on the shared reading store (milliseconds)
    pub store_lock_timeout_ms: u32,

    // --- Identity / network ---
    /// Device identifier; empty = derive from the factory MAC.
    pub device_id: heapless::String<32>,
    pub network: NetworkConfig,
}

impl Default for SystemConfig {
    fn default() -> Self {
        Self {
            // Acquisition
            acquisition_period_ms: 10_000, // DHT11 needs >= 2s between reads
            settle_delay_ms: 200,
            max_attempts: 3,
            retry_delay_ms: 500,

            // Health policy (~30s warn, ~60s restart at the default period)
            warn_threshold: 3,
            restart_threshold: 6,

            // Transmission
            transmit_period_ms: 30_000,
            transmit_warmup_ms: 10_000,

            // Sharing
            store_lock_timeout_ms: 100,

            device_id: heapless_str("ESP32_SENSOR_01"),
            network: NetworkConfig::default(),
        }
    }
}

impl SystemConfig {
    /// Range-check every field.  Invalid values are rejected, never clamped.
    pub fn validate(&self) -> Result<(), ConfigError> {
        if !(2_000..=3_600_000).contains(&self.acquisition_period_ms) {
            return Err(ConfigError::ValidationFailed(
                "acquisition_period_ms must be 2000–3600000",
            ));
        }
        if self.settle_delay_ms > 1_000 {
            return Err(ConfigError::ValidationFailed("settle_delay_ms must be <= 1000"));
        }
        if !(1..=10).contains(&self.max_attempts) {
            return Err(ConfigError::ValidationFailed("max_attempts must be 1–10"));
        }
        if self.retry_delay_ms > 5_000 {
            return Err(ConfigError::ValidationFailed("retry_delay_ms must be <= 5000"));
        }
        let cycle_budget = self
            .retry_delay_ms
            .checked_mul(u32::from(self.max_attempts.saturating_sub(1)))
            .and_then(|retries| retries.checked_add(self.settle_delay_ms));
        if cycle_budget.is_none_or(|budget| budget >= self.acquisition_period_ms) {
            return Err(ConfigError::ValidationFailed(
                "settle + retry delays must fit inside acquisition_period_ms",
            ));
        }
        if self.warn_threshold == 0 {
            return Err(ConfigError::ValidationFailed("warn_threshold must be >= 1"));
        }
        if self.restart_threshold <= self.warn_threshold {
            return Err(ConfigError::ValidationFailed(
                "restart_threshold must be > warn_threshold",
            ));
        }
        if !(1_000..=3_600_000).contains(&self.transmit_period_ms) {
            return Err(ConfigError::ValidationFailed(
                "transmit_period_ms must be 1000–3600000",
            ));
        }
        if !(10..=1_000).contains(&self.store_lock_timeout_ms) {
            return Err(ConfigError::ValidationFailed(
                "store_lock_timeout_ms must be 10–1000",
            ));
        }
        if self.network.server_url.is_empty() {
            return Err(ConfigError::ValidationFailed("server_url must not be empty"));
        }
        if self.network.connect_retries == 0 {
            return Err(ConfigError::ValidationFailed("connect_retries must be >= 1"));
        }
        Ok(())
    }
}

/// Build a fixed-capacity string from a literal, truncating at capacity.
fn heapless_str<const N: usize>(s: &str) -> heapless::String<N> {
    let mut out = heapless::String::new();
    for c in s.chars() {
        if out.push(c).is_err() {
            break;
        }
    }
    out
}

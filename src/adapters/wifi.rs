//! WiFi station + HTTP transport adapter.
//!
//! Implements [`TransportPort`]: link supervision for the transmission
//! loop plus a one-shot JSON POST of each [`TelemetryPayload`].
//!
//! ## cfg gating
//!
//! - **`target_os = "espidf"`**: `BlockingWifi<EspWifi>` in STA mode and
//!   `EspHttpConnection` for the POST.
//! - **all other targets**: deterministic simulation with test hooks.
//!
//! ## Reconnection policy
//!
//! The transmission loop decides *when* to reconnect (every other period
//! while offline).  Each [`TransportPort::reconnect`] call starts from a
//! fresh retry count and makes up to `connect_retries` attempts.

use core::fmt;
use log::{debug, error, info, warn};

use crate::app::payload::TelemetryPayload;
use crate::app::ports::TransportPort;
use crate::config::NetworkConfig;
use crate::error::CommsError;

#[cfg(target_os = "espidf")]
use esp_idf_svc::{
    eventloop::EspSystemEventLoop,
    hal::modem::Modem,
    http::client::{Configuration as HttpConfiguration, EspHttpConnection},
    http::Method,
    io::Write as _,
    nvs::EspDefaultNvsPartition,
    wifi::{AuthMethod, BlockingWifi, ClientConfiguration, Configuration, EspWifi},
};

/// Sent with every POST.
pub const USER_AGENT: &str = "ESP32-SensorMonitor/1.0";

// ───────────────────────────────────────────────────────────────
// Errors
// ───────────────────────────────────────────────────────────────

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ConnectivityError {
    InvalidSsid,
    InvalidPassword,
    InvalidServerUrl,
    ConnectionFailed,
}

impl fmt::Display for ConnectivityError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::InvalidSsid => write!(f, "SSID invalid (must be 1-32 printable ASCII bytes)"),
            Self::InvalidPassword => write!(
                f,
                "password invalid (must be 8-64 bytes for WPA2, or empty for open)"
            ),
            Self::InvalidServerUrl => write!(f, "server URL must start with http:// or https://"),
            Self::ConnectionFailed => write!(f, "WiFi connection failed"),
        }
    }
}

impl core::error::Error for ConnectivityError {}

// ───────────────────────────────────────────────────────────────
// Connection state
// ───────────────────────────────────────────────────────────────

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum WifiState {
    Disconnected,
    Connecting { attempt: u8 },
    Connected,
    Failed,
}

/// Human-readable signal grade for the logs.
pub fn signal_grade(rssi: i8) -> &'static str {
    match rssi {
        r if r > -50 => "Excellent",
        r if r > -60 => "Good",
        r if r > -70 => "Fair",
        _ => "Poor",
    }
}

// ───────────────────────────────────────────────────────────────
// Validation
// ───────────────────────────────────────────────────────────────

fn is_printable_ascii(s: &str) -> bool {
    s.bytes().all(|b| (0x20..=0x7E).contains(&b))
}

fn validate_ssid(ssid: &str) -> Result<(), ConnectivityError> {
    if ssid.is_empty() || ssid.len() > 32 || !is_printable_ascii(ssid) {
        return Err(ConnectivityError::InvalidSsid);
    }
    Ok(())
}

fn validate_password(password: &str) -> Result<(), ConnectivityError> {
    if password.is_empty() {
        return Ok(());
    }
    if password.len() < 8 || password.len() > 64 {
        return Err(ConnectivityError::InvalidPassword);
    }
    Ok(())
}

fn validate_url(url: &str) -> Result<(), ConnectivityError> {
    if url.starts_with("http://") || url.starts_with("https://") {
        Ok(())
    } else {
        Err(ConnectivityError::InvalidServerUrl)
    }
}

fn validate(cfg: &NetworkConfig) -> Result<(), ConnectivityError> {
    validate_ssid(&cfg.ssid)?;
    validate_password(&cfg.password)?;
    validate_url(&cfg.server_url)
}

// ───────────────────────────────────────────────────────────────
// Transport
// ───────────────────────────────────────────────────────────────

pub struct WifiTransport {
    state: WifiState,
    ssid: heapless::String<32>,
    server_url: heapless::String<128>,
    http_timeout_ms: u32,
    max_retries: u8,
    /// Attempts made by the current `reconnect()` call.
    retry_count: u8,
    last_rssi: Option<i8>,
    #[cfg(target_os = "espidf")]
    wifi: BlockingWifi<EspWifi<'static>>,
    #[cfg(not(target_os = "espidf"))]
    sim: SimLink,
}

/// Host-side stand-in for the radio and the server.
#[cfg(not(target_os = "espidf"))]
#[derive(Debug)]
struct SimLink {
    up: bool,
    failing_connects: u32,
    http_status: u16,
    sent: Vec<String>,
}

impl WifiTransport {
    /// Bring up the WiFi driver in STA mode.  Does not associate yet; the
    /// transmission loop's first cycle does that through `reconnect()`.
    #[cfg(target_os = "espidf")]
    pub fn new(
        modem: Modem,
        sysloop: EspSystemEventLoop,
        nvs: EspDefaultNvsPartition,
        cfg: &NetworkConfig,
    ) -> anyhow::Result<Self> {
        validate(cfg)?;

        let mut wifi = BlockingWifi::wrap(EspWifi::new(modem, sysloop.clone(), Some(nvs))?, sysloop)?;
        wifi.set_configuration(&Configuration::Client(ClientConfiguration {
            ssid: cfg
                .ssid
                .as_str()
                .try_into()
                .map_err(|_| ConnectivityError::InvalidSsid)?,
            password: cfg
                .password
                .as_str()
                .try_into()
                .map_err(|_| ConnectivityError::InvalidPassword)?,
            auth_method: if cfg.password.is_empty() {
                AuthMethod::None
            } else {
                AuthMethod::WPA2Personal
            },
            ..Default::default()
        }))?;
        wifi.start()?;
        info!("WiFi: STA started (SSID='{}')", cfg.ssid);

        Ok(Self::from_parts(cfg, wifi))
    }

    /// Simulated transport; the link starts down.
    #[cfg(not(target_os = "espidf"))]
    pub fn new(cfg: &NetworkConfig) -> Result<Self, ConnectivityError> {
        validate(cfg)?;
        info!("WiFi(sim): transport ready (SSID='{}')", cfg.ssid);
        Ok(Self::from_parts(
            cfg,
            SimLink {
                up: false,
                failing_connects: 0,
                http_status: 200,
                sent: Vec::new(),
            },
        ))
    }

    fn from_parts(
        cfg: &NetworkConfig,
        #[cfg(target_os = "espidf")] wifi: BlockingWifi<EspWifi<'static>>,
        #[cfg(not(target_os = "espidf"))] sim: SimLink,
    ) -> Self {
        Self {
            state: WifiState::Disconnected,
            ssid: cfg.ssid.clone(),
            server_url: cfg.server_url.clone(),
            http_timeout_ms: cfg.http_timeout_ms,
            max_retries: cfg.connect_retries.max(1),
            retry_count: 0,
            last_rssi: None,
            #[cfg(target_os = "espidf")]
            wifi,
            #[cfg(not(target_os = "espidf"))]
            sim,
        }
    }

    pub fn state(&self) -> WifiState {
        self.state
    }

    pub fn retry_count(&self) -> u8 {
        self.retry_count
    }

    // ── Platform-specific ─────────────────────────────────────

    #[cfg(target_os = "espidf")]
    fn platform_connect(&mut self) -> Result<(), ConnectivityError> {
        if let Err(e) = self.wifi.connect() {
            debug!("WiFi: connect error {:?}", e);
            return Err(ConnectivityError::ConnectionFailed);
        }
        if let Err(e) = self.wifi.wait_netif_up() {
            debug!("WiFi: netif error {:?}", e);
            return Err(ConnectivityError::ConnectionFailed);
        }
        Ok(())
    }

    #[cfg(not(target_os = "espidf"))]
    fn platform_connect(&mut self) -> Result<(), ConnectivityError> {
        if self.sim.failing_connects > 0 {
            self.sim.failing_connects -= 1;
            return Err(ConnectivityError::ConnectionFailed);
        }
        self.sim.up = true;
        Ok(())
    }

    #[cfg(target_os = "espidf")]
    fn platform_is_connected(&self) -> bool {
        self.wifi.is_connected().unwrap_or(false)
    }

    #[cfg(not(target_os = "espidf"))]
    fn platform_is_connected(&self) -> bool {
        self.sim.up
    }

    #[cfg(target_os = "espidf")]
    fn platform_rssi(&self) -> Option<i8> {
        use esp_idf_svc::sys::{ESP_OK, esp_wifi_sta_get_ap_info, wifi_ap_record_t};
        let mut ap_info: wifi_ap_record_t = unsafe { core::mem::zeroed() };
        let ret = unsafe { esp_wifi_sta_get_ap_info(&mut ap_info) };
        if ret == ESP_OK { Some(ap_info.rssi) } else { None }
    }

    #[cfg(not(target_os = "espidf"))]
    fn platform_rssi(&self) -> Option<i8> {
        self.sim.up.then_some(-61)
    }

    /// POST `body` and return the HTTP status.
    #[cfg(target_os = "espidf")]
    fn platform_post(&mut self, body: &str) -> Result<u16, CommsError> {
        let mut conn = EspHttpConnection::new(&HttpConfiguration {
            timeout: Some(core::time::Duration::from_millis(u64::from(
                self.http_timeout_ms,
            ))),
            ..Default::default()
        })
        .map_err(|_| CommsError::HttpRequestFailed)?;

        let content_length = body.len().to_string();
        let headers = [
            ("Content-Type", "application/json"),
            ("User-Agent", USER_AGENT),
            ("Accept", "application/json"),
            ("Content-Length", content_length.as_str()),
        ];
        conn.initiate_request(Method::Post, &self.server_url, &headers)
            .map_err(|_| CommsError::HttpRequestFailed)?;
        conn.write_all(body.as_bytes())
            .map_err(|_| CommsError::HttpRequestFailed)?;
        conn.initiate_response()
            .map_err(|_| CommsError::HttpRequestFailed)?;
        Ok(conn.status())
    }

    #[cfg(not(target_os = "espidf"))]
    fn platform_post(&mut self, body: &str) -> Result<u16, CommsError> {
        debug!(
            "WiFi(sim): POST {} ({} ms timeout, {})",
            self.server_url, self.http_timeout_ms, USER_AGENT
        );
        self.sim.sent.push(body.to_string());
        Ok(self.sim.http_status)
    }
}

// ── Simulation hooks ──────────────────────────────────────────

#[cfg(not(target_os = "espidf"))]
impl WifiTransport {
    /// Drop the association as if the AP went away.
    pub fn sim_drop_link(&mut self) {
        self.sim.up = false;
    }

    /// Make the next `n` association attempts fail.
    pub fn sim_fail_next_connects(&mut self, n: u32) {
        self.sim.failing_connects = n;
    }

    /// Status code the simulated server answers with.
    pub fn sim_set_http_status(&mut self, status: u16) {
        self.sim.http_status = status;
    }

    /// Every body POSTed so far.
    pub fn sim_sent(&self) -> &[String] {
        &self.sim.sent
    }
}

// ───────────────────────────────────────────────────────────────
// TransportPort
// ───────────────────────────────────────────────────────────────

impl TransportPort for WifiTransport {
    fn is_connected(&self) -> bool {
        self.platform_is_connected()
    }

    fn reconnect(&mut self) -> Result<(), CommsError> {
        self.retry_count = 0;
        if self.platform_is_connected() {
            self.state = WifiState::Connected;
            return Ok(());
        }

        info!("WiFi: connecting to '{}'", self.ssid);
        while self.retry_count < self.max_retries {
            self.retry_count += 1;
            self.state = WifiState::Connecting {
                attempt: self.retry_count,
            };
            match self.platform_connect() {
                Ok(()) => {
                    self.state = WifiState::Connected;
                    self.last_rssi = self.platform_rssi();
                    match self.last_rssi {
                        Some(rssi) => info!(
                            "WiFi: connected, RSSI {} dBm ({})",
                            rssi,
                            signal_grade(rssi)
                        ),
                        None => info!("WiFi: connected"),
                    }
                    return Ok(());
                }
                Err(e) => warn!(
                    "WiFi: attempt {}/{} failed: {}",
                    self.retry_count, self.max_retries, e
                ),
            }
        }

        self.state = WifiState::Failed;
        self.last_rssi = None;
        error!("WiFi: giving up after {} attempts", self.max_retries);
        Err(CommsError::WifiConnectFailed)
    }

    fn send(&mut self, payload: &TelemetryPayload) -> Result<(), CommsError> {
        if !self.platform_is_connected() {
            self.state = WifiState::Disconnected;
            return Err(CommsError::WifiDisconnected);
        }
        let body = payload.to_json()?;
        debug!("WiFi: payload {}", body);

        let status = self.platform_post(&body)?;
        match status {
            200..=299 => Ok(()),
            400..=499 => {
                warn!("WiFi: server rejected payload (client error {})", status);
                Err(CommsError::HttpStatus(status))
            }
            500..=599 => {
                warn!("WiFi: server error {}", status);
                Err(CommsError::HttpStatus(status))
            }
            _ => {
                warn!("WiFi: unexpected HTTP status {}", status);
                Err(CommsError::HttpStatus(status))
            }
        }
    }

    fn rssi(&self) -> Option<i8> {
        if self.platform_is_connected() {
            self.platform_rssi().or(self.last_rssi)
        } else {
            None
        }
    }
}

// ───────────────────────────────────────────────────────────────
// Tests
// ───────────────────────────────────────────────────────────────

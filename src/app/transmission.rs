//! Transmission loop: link supervision and periodic telemetry upload.
//!
//! ```text
//!  SharedReadingStore ──▶ ┌─────────────────────────┐ ──▶ TransportPort
//!                         │    TransmissionLoop     │
//!  WallClock          ──▶ │  ConnectionState · tick │ ──▶ PresentationPort
//!                         └─────────────────────────┘
//! ```
//!
//! Each period either sends one payload (link up) or, while the link is
//! down, attempts a reconnect on every other period counted from the
//! moment the loss was observed.  The first attempt therefore happens in
//! the same period the loss is seen.  Send failures are logged and never
//! trigger a reconnect by themselves; the next period carries fresh data.

use std::sync::Arc;
use std::time::Duration;

use log::{debug, info, warn};

use crate::app::payload::TelemetryPayload;
use crate::app::ports::{MicrosClock, PresentationPort, TransportPort, WallClock};
use crate::app::store::SharedReadingStore;
use crate::config::SystemConfig;
use crate::error::CommsError;
use crate::scheduler::PeriodicTicker;

// ───────────────────────────────────────────────────────────────
// Connection bookkeeping
// ───────────────────────────────────────────────────────────────

/// Link state as the transmission loop last saw it.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ConnectionState {
    connected: bool,
    /// Cycle index at which the current outage was observed.
    disconnected_since_tick: u64,
    /// Cycles completed by the loop.
    tick: u64,
    attempts_since_last_success: u32,
}

impl Default for ConnectionState {
    fn default() -> Self {
        Self::new()
    }
}

impl ConnectionState {
    /// Boot state: disconnected since cycle 0.
    pub fn new() -> Self {
        Self {
            connected: false,
            disconnected_since_tick: 0,
            tick: 0,
            attempts_since_last_success: 0,
        }
    }

    pub fn is_connected(&self) -> bool {
        self.connected
    }

    pub fn tick(&self) -> u64 {
        self.tick
    }

    pub fn attempts_since_last_success(&self) -> u32 {
        self.attempts_since_last_success
    }

    /// Cycles elapsed since the outage began (0 in the cycle it is seen).
    pub fn cycles_since_disconnect(&self) -> u64 {
        self.tick.saturating_sub(self.disconnected_since_tick)
    }

    /// Reconnect on even offsets from the start of the outage.
    pub fn should_attempt_reconnect(&self) -> bool {
        !self.connected && self.cycles_since_disconnect() % 2 == 0
    }

    /// Fold the transport's reported link state in.  Returns the new state
    /// on an edge.
    pub fn observe(&mut self, link_up: bool) -> Option<bool> {
        match (self.connected, link_up) {
            (false, true) => {
                self.mark_connected();
                Some(true)
            }
            (true, false) => {
                self.connected = false;
                self.disconnected_since_tick = self.tick;
                Some(false)
            }
            _ => None,
        }
    }

    fn record_attempt(&mut self) {
        self.attempts_since_last_success = self.attempts_since_last_success.saturating_add(1);
    }

    fn mark_connected(&mut self) {
        self.connected = true;
        self.attempts_since_last_success = 0;
    }

    fn advance(&mut self) {
        self.tick += 1;
    }
}

// ───────────────────────────────────────────────────────────────
// Loop
// ───────────────────────────────────────────────────────────────

/// What one cycle did.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TransmitOutcome {
    /// Payload delivered.  `has_reading` is false for a sentinel payload.
    Sent { has_reading: bool },
    SendFailed(CommsError),
    Reconnected,
    ReconnectFailed(CommsError),
    /// Disconnected, but this is an odd cycle of the outage.
    Waiting,
}

/// Transmission timing, lifted out of [`SystemConfig`].
#[derive(Debug, Clone, PartialEq)]
pub struct TransmissionSettings {
    pub period_ms: u32,
    pub warmup_ms: u32,
    pub device_id: heapless::String<32>,
}

impl From<&SystemConfig> for TransmissionSettings {
    fn from(cfg: &SystemConfig) -> Self {
        Self {
            period_ms: cfg.transmit_period_ms,
            warmup_ms: cfg.transmit_warmup_ms,
            device_id: cfg.device_id.clone(),
        }
    }
}

pub struct TransmissionLoop {
    settings: TransmissionSettings,
    store: Arc<SharedReadingStore>,
    state: ConnectionState,
    sent: u32,
}

impl TransmissionLoop {
    pub fn new(settings: TransmissionSettings, store: Arc<SharedReadingStore>) -> Self {
        Self {
            settings,
            store,
            state: ConnectionState::new(),
            sent: 0,
        }
    }

    pub fn state(&self) -> &ConnectionState {
        &self.state
    }

    pub fn sent_count(&self) -> u32 {
        self.sent
    }

    /// Run one transmission cycle.
    pub fn run_cycle(
        &mut self,
        transport: &mut impl TransportPort,
        presenter: &impl PresentationPort,
        wall: &impl WallClock,
    ) -> TransmitOutcome {
        if let Some(up) = self.state.observe(transport.is_connected()) {
            if up {
                info!("Transmit: link up");
            } else {
                warn!("Transmit: link lost at cycle {}", self.state.tick());
            }
            presenter.show_network_state(up);
        }

        let outcome = if self.state.is_connected() {
            self.send(transport, wall)
        } else if self.state.should_attempt_reconnect() {
            self.reconnect(transport, presenter)
        } else {
            debug!(
                "Transmit: offline, next reconnect in 1 cycle ({} since loss)",
                self.state.cycles_since_disconnect()
            );
            TransmitOutcome::Waiting
        };

        self.state.advance();
        outcome
    }

    fn reconnect(
        &mut self,
        transport: &mut impl TransportPort,
        presenter: &impl PresentationPort,
    ) -> TransmitOutcome {
        self.state.record_attempt();
        info!(
            "Transmit: reconnect attempt {} ({} cycle(s) since loss)",
            self.state.attempts_since_last_success(),
            self.state.cycles_since_disconnect()
        );
        match transport.reconnect() {
            Ok(()) => {
                self.state.mark_connected();
                info!("Transmit: reconnected");
                presenter.show_network_state(true);
                TransmitOutcome::Reconnected
            }
            Err(e) => {
                warn!("Transmit: reconnect failed: {}", e);
                TransmitOutcome::ReconnectFailed(e)
            }
        }
    }

    fn send(
        &mut self,
        transport: &mut impl TransportPort,
        wall: &impl WallClock,
    ) -> TransmitOutcome {
        let snapshot = match self.store.try_read() {
            Ok(s) => Some(s),
            Err(e) => {
                warn!("Transmit: {}, sending sentinel payload", e);
                None
            }
        };
        if let Some(s) = &snapshot {
            if s.reading.is_valid() && !s.fresh {
                debug!("Transmit: no new reading since seq {}", s.sequence);
            }
        }

        let payload = TelemetryPayload::from_snapshot(
            &self.settings.device_id,
            wall.unix_secs(),
            snapshot.as_ref(),
            transport.rssi(),
        );
        let has_reading = payload.has_reading();

        match transport.send(&payload) {
            Ok(()) => {
                self.sent = self.sent.wrapping_add(1);
                info!(
                    "Transmit: sent {:.2}C {:.2}% rssi {}",
                    payload.temperature, payload.humidity, payload.rssi
                );
                TransmitOutcome::Sent { has_reading }
            }
            Err(e) => {
                warn!("Transmit: send failed: {}", e);
                TransmitOutcome::SendFailed(e)
            }
        }
    }

    /// Warm up, then run forever on the calling thread.
    pub fn run(
        mut self,
        mut transport: impl TransportPort,
        presenter: impl PresentationPort,
        clock: &(impl MicrosClock + WallClock),
    ) -> ! {
        info!(
            "Transmit: warm-up {} ms, then every {} ms",
            self.settings.warmup_ms, self.settings.period_ms
        );
        std::thread::sleep(Duration::from_millis(u64::from(self.settings.warmup_ms)));

        let mut ticker = PeriodicTicker::new(
            "Transmit",
            clock.now_us() / 1_000,
            u64::from(self.settings.period_ms),
        );
        loop {
            self.run_cycle(&mut transport, &presenter, clock);
            ticker.sleep_until_next(clock);
        }
    }
}

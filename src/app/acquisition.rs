//! Acquisition loop: sensor transactions, health escalation, display.
//!
//! ```text
//!  SensorPort ──▶ ┌───────────────────────────┐ ──▶ SharedReadingStore
//!                 │      AcquisitionLoop      │
//!  DelayNs    ──▶ │  retries · FailureState   │ ──▶ PresentationPort
//!                 └───────────────────────────┘ ──▶ RestartPort
//! ```
//!
//! One cycle per period: settle, up to `max_attempts` transactions, then
//! either commit and display the reading or escalate the failure streak.
//! Ports are injected at call sites so the whole cycle runs against
//! mocks on the host.

use std::sync::Arc;

use embedded_hal::delay::DelayNs;
use log::{debug, error, info, warn};

use crate::app::health::{FailureState, HealthAction, HealthPolicy};
use crate::app::ports::{MicrosClock, PresentationPort, RestartPort, SensorPort};
use crate::app::store::SharedReadingStore;
use crate::config::SystemConfig;
use crate::drivers::watchdog::Watchdog;
use crate::error::DecodeError;
use crate::scheduler::PeriodicTicker;
use crate::sensors::Reading;

/// Shown on the display right before a restart.
pub const FATAL_MESSAGE: &str = "RESTART";

/// Acquisition timing and escalation knobs, lifted out of [`SystemConfig`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct AcquisitionSettings {
    pub period_ms: u32,
    pub settle_delay_ms: u32,
    pub max_attempts: u8,
    pub retry_delay_ms: u32,
    pub policy: HealthPolicy,
}

impl From<&SystemConfig> for AcquisitionSettings {
    fn from(cfg: &SystemConfig) -> Self {
        Self {
            period_ms: cfg.acquisition_period_ms,
            settle_delay_ms: cfg.settle_delay_ms,
            max_attempts: cfg.max_attempts.max(1),
            retry_delay_ms: cfg.retry_delay_ms,
            policy: HealthPolicy::from(cfg),
        }
    }
}

/// What one cycle did.
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum CycleOutcome {
    /// A reading was decoded.  `sequence` is `None` if the store could not
    /// be updated in time.
    Acquired {
        reading: Reading,
        attempts: u8,
        sequence: Option<u32>,
    },
    /// Every attempt failed.
    Failed {
        last_error: DecodeError,
        consecutive_failures: u32,
        action: HealthAction,
    },
}

pub struct AcquisitionLoop {
    settings: AcquisitionSettings,
    store: Arc<SharedReadingStore>,
    failures: FailureState,
    /// Sequence number of the last successful commit.
    committed_sequence: u32,
    /// Local copy of the last good reading, for when the store is busy.
    last_good: Option<Reading>,
    cycle_count: u64,
}

impl AcquisitionLoop {
    pub fn new(settings: AcquisitionSettings, store: Arc<SharedReadingStore>) -> Self {
        Self {
            settings,
            store,
            failures: FailureState::new(),
            committed_sequence: 0,
            last_good: None,
            cycle_count: 0,
        }
    }

    pub fn consecutive_failures(&self) -> u32 {
        self.failures.consecutive_failures()
    }

    pub fn cycle_count(&self) -> u64 {
        self.cycle_count
    }

    pub fn last_good(&self) -> Option<Reading> {
        self.last_good
    }

    // ── Per-cycle orchestration ───────────────────────────────

    /// Run one acquisition cycle.
    pub fn run_cycle(
        &mut self,
        sensor: &mut impl SensorPort,
        delay: &mut impl DelayNs,
        presenter: &impl PresentationPort,
        restarter: &mut impl RestartPort,
    ) -> CycleOutcome {
        self.cycle_count += 1;
        delay.delay_ms(self.settings.settle_delay_ms);

        match self.acquire(sensor, delay) {
            Ok((reading, attempts)) => self.on_success(reading, attempts, presenter),
            Err(last_error) => self.on_failure(last_error, presenter, restarter),
        }
    }

    /// Up to `max_attempts` transactions with a fixed delay in between.
    fn acquire(
        &mut self,
        sensor: &mut impl SensorPort,
        delay: &mut impl DelayNs,
    ) -> Result<(Reading, u8), DecodeError> {
        let max = self.settings.max_attempts.max(1);
        let mut last_error = DecodeError::NoResponse;
        for attempt in 1..=max {
            match sensor.read_transaction() {
                Ok(reading) => return Ok((reading, attempt)),
                Err(e) => {
                    debug!("Acquire: attempt {}/{} failed: {}", attempt, max, e);
                    last_error = e;
                }
            }
            if attempt < max {
                delay.delay_ms(self.settings.retry_delay_ms);
            }
        }
        Err(last_error)
    }

    fn on_success(
        &mut self,
        reading: Reading,
        attempts: u8,
        presenter: &impl PresentationPort,
    ) -> CycleOutcome {
        let ended = self.failures.record_success();
        if ended > 0 {
            info!("Acquire: sensor recovered after {} failed cycle(s)", ended);
        }
        self.last_good = Some(reading);

        let next = self.committed_sequence.wrapping_add(1);
        let sequence = match self.store.commit(reading, next) {
            Ok(()) => {
                self.committed_sequence = next;
                Some(next)
            }
            Err(e) => {
                warn!("Acquire: commit skipped this cycle: {}", e);
                None
            }
        };

        info!(
            "Acquire: {:.1}C {:.1}% (attempt {}, seq {:?})",
            reading.temperature_c(),
            reading.humidity_pct(),
            attempts,
            sequence
        );
        presenter.show_reading(reading.temperature_c(), reading.humidity_pct());

        CycleOutcome::Acquired {
            reading,
            attempts,
            sequence,
        }
    }

    fn on_failure(
        &mut self,
        last_error: DecodeError,
        presenter: &impl PresentationPort,
        restarter: &mut impl RestartPort,
    ) -> CycleOutcome {
        let action = self.failures.record_failure(&self.settings.policy);
        let failures = self.failures.consecutive_failures();
        warn!(
            "Acquire: all {} attempt(s) failed ({}), {} consecutive",
            self.settings.max_attempts, last_error, failures
        );

        match action {
            HealthAction::PresentCached => self.present_cached(presenter),
            HealthAction::Warn { failures } => {
                warn!("Acquire: sensor degraded, {} cycles without data", failures);
                presenter.show_warning(failures);
            }
            HealthAction::Restart { failures } => {
                error!(
                    "Acquire: sensor dead for {} cycles, restarting device",
                    failures
                );
                presenter.show_fatal(FATAL_MESSAGE);
                let mut reason: heapless::String<48> = heapless::String::new();
                let _ = core::fmt::write(
                    &mut reason,
                    format_args!("DHT11 unresponsive for {failures} cycles"),
                );
                restarter.restart(failures, &reason);
            }
            HealthAction::Hold => {}
        }

        CycleOutcome::Failed {
            last_error,
            consecutive_failures: failures,
            action,
        }
    }

    /// Re-show the newest good reading.  The local copy follows every
    /// success, including ones whose commit timed out, so the store is
    /// only asked before the first local success.
    fn present_cached(&self, presenter: &impl PresentationPort) {
        let cached = self.last_good.or_else(|| match self.store.try_peek() {
            Ok(snapshot) if snapshot.reading.is_valid() => Some(snapshot.reading),
            Ok(_) => None,
            Err(e) => {
                debug!("Acquire: store busy ({}), nothing cached", e);
                None
            }
        });
        if let Some(r) = cached {
            presenter.show_reading(r.temperature_c(), r.humidity_pct());
        }
    }

    // ── Loop ──────────────────────────────────────────────────

    /// Run forever on the calling thread.
    pub fn run(
        mut self,
        mut sensor: impl SensorPort,
        mut delay: impl DelayNs,
        presenter: impl PresentationPort,
        mut restarter: impl RestartPort,
        clock: &impl MicrosClock,
        watchdog: &Watchdog,
    ) -> ! {
        info!(
            "Acquire: loop started (period {} ms, {} attempts, warn at {}, restart at {})",
            self.settings.period_ms,
            self.settings.max_attempts,
            self.settings.policy.warn_threshold,
            self.settings.policy.restart_threshold
        );
        let mut ticker = PeriodicTicker::new(
            "Acquire",
            clock.now_us() / 1_000,
            u64::from(self.settings.period_ms),
        );
        loop {
            watchdog.feed();
            self.run_cycle(&mut sensor, &mut delay, &presenter, &mut restarter);
            watchdog.feed();
            ticker.sleep_until_next(clock);
        }
    }
}

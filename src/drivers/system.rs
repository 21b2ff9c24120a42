//! System restart driver.
//!
//! [`SystemRestart`] is the production [`RestartPort`]: it persists a
//! [`RestartRecord`] to the NVS ring buffer, gives the logger a moment to
//! drain, then resets the chip.  The host build exits the process instead.

use log::error;

use crate::adapters::time::Esp32TimeAdapter;
use crate::app::ports::{RestartPort, StoragePort};
use crate::diagnostics::{RestartLog, RestartRecord};

/// Exit code used by the host build in place of a chip reset.
pub const SIM_RESTART_EXIT_CODE: i32 = 75;

/// Time allowed for the UART log to flush before reset.
const LOG_FLUSH_MS: u64 = 100;

pub struct SystemRestart<S> {
    storage: S,
    log: RestartLog,
    time: Esp32TimeAdapter,
}

impl<S: StoragePort> SystemRestart<S> {
    pub fn new(storage: S, time: Esp32TimeAdapter) -> Self {
        let mut log = RestartLog::new();
        log.init(&storage);
        Self { storage, log, time }
    }

    /// Persist the record without restarting.
    pub fn record(&mut self, consecutive_failures: u32, reason: &str) -> RestartRecord {
        let record = RestartRecord::new(self.time.uptime_secs(), consecutive_failures, reason);
        self.log.write_entry(&mut self.storage, &record);
        record
    }

    pub fn storage(&self) -> &S {
        &self.storage
    }

    #[cfg(target_os = "espidf")]
    fn reset() -> ! {
        esp_idf_svc::hal::reset::restart()
    }

    #[cfg(not(target_os = "espidf"))]
    fn reset() -> ! {
        std::process::exit(SIM_RESTART_EXIT_CODE)
    }
}

impl<S: StoragePort> RestartPort for SystemRestart<S> {
    fn restart(&mut self, consecutive_failures: u32, reason: &str) {
        let record = self.record(consecutive_failures, reason);
        error!(
            "System: restarting at {}s uptime: {}",
            record.uptime_secs, record.reason
        );
        std::thread::sleep(std::time::Duration::from_millis(LOG_FLUSH_MS));
        Self::reset()
    }
}

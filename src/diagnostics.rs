//! Restart logging.
//!
//! Stores up to 4 restart records in an NVS ring buffer under the
//! "restart" namespace.  A record is written right before a deliberate
//! restart (sensor dead too long) and by the panic hook, so the next boot
//! can report why the previous run ended.

use serde::{Deserialize, Serialize};

use crate::app::ports::StoragePort;

const RESTART_RING_SLOTS: usize = 4;
const RESTART_NAMESPACE: &str = "restart";
const RESTART_INDEX_KEY: &str = "rst_idx";

/// Why the previous run ended.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RestartRecord {
    pub uptime_secs: u64,
    /// Consecutive failed acquisition cycles at the time (0 for a panic).
    pub consecutive_failures: u32,
    pub reason: heapless::String<48>,
}

impl RestartRecord {
    pub fn new(uptime_secs: u64, consecutive_failures: u32, reason: &str) -> Self {
        let mut r = heapless::String::new();
        for c in reason.chars() {
            if r.push(c).is_err() {
                break;
            }
        }
        Self {
            uptime_secs,
            consecutive_failures,
            reason: r,
        }
    }
}

/// NVS-backed ring buffer for restart records.
#[derive(Debug, Default)]
pub struct RestartLog {
    write_index: usize,
}

impl RestartLog {
    pub fn new() -> Self {
        Self::default()
    }

    /// Load the write index from NVS, or default to 0.
    pub fn init(&mut self, nvs: &dyn StoragePort) {
        let mut buf = [0u8; 4];
        if let Ok(4) = nvs.read(RESTART_NAMESPACE, RESTART_INDEX_KEY, &mut buf) {
            self.write_index = u32::from_le_bytes(buf) as usize % RESTART_RING_SLOTS;
        }
    }

    /// Write a record to the next ring slot and advance the index.
    pub fn write_entry(&mut self, nvs: &mut dyn StoragePort, record: &RestartRecord) {
        let slot_key = Self::slot_key(self.write_index);
        match postcard::to_allocvec(record) {
            Ok(bytes) => {
                if let Err(e) = nvs.write(RESTART_NAMESPACE, &slot_key, &bytes) {
                    log::warn!("RestartLog: write failed: {}", e);
                }
            }
            Err(_) => log::warn!("RestartLog: encode failed"),
        }

        self.write_index = (self.write_index + 1) % RESTART_RING_SLOTS;
        let idx_bytes = (self.write_index as u32).to_le_bytes();
        let _ = nvs.write(RESTART_NAMESPACE, RESTART_INDEX_KEY, &idx_bytes);
    }

    /// Read all stored records, oldest slot first.
    pub fn read_all(&self, nvs: &dyn StoragePort) -> heapless::Vec<RestartRecord, RESTART_RING_SLOTS> {
        let mut entries = heapless::Vec::new();
        for i in 0..RESTART_RING_SLOTS {
            let slot_key = Self::slot_key(i);
            let mut buf = [0u8; 96];
            if let Ok(len) = nvs.read(RESTART_NAMESPACE, &slot_key, &mut buf) {
                if let Ok(entry) = postcard::from_bytes::<RestartRecord>(&buf[..len]) {
                    let _ = entries.push(entry);
                }
            }
        }
        entries
    }

    /// Erase all records and reset the index.
    pub fn clear(&mut self, nvs: &mut dyn StoragePort) {
        for i in 0..RESTART_RING_SLOTS {
            let _ = nvs.delete(RESTART_NAMESPACE, &Self::slot_key(i));
        }
        let _ = nvs.delete(RESTART_NAMESPACE, RESTART_INDEX_KEY);
        self.write_index = 0;
    }

    pub fn count(&self, nvs: &dyn StoragePort) -> usize {
        (0..RESTART_RING_SLOTS)
            .filter(|i| nvs.exists(RESTART_NAMESPACE, &Self::slot_key(*i)))
            .count()
    }

    fn slot_key(index: usize) -> heapless::String<8> {
        let mut s = heapless::String::new();
        let _ = core::fmt::Write::write_fmt(&mut s, format_args!("r{}", index));
        s
    }
}

/// Log every stored record at boot.  Returns how many there were.
pub fn report_previous_restarts(nvs: &dyn StoragePort) -> usize {
    let log = RestartLog::new();
    let records = log.read_all(nvs);
    for r in &records {
        log::warn!(
            "Previous restart at {}s uptime after {} failed cycles: {}",
            r.uptime_secs,
            r.consecutive_failures,
            r.reason
        );
    }
    records.len()
}

// ───────────────────────────────────────────────────────────────
// Panic hook: writes a RestartRecord to NVS before reset
// ───────────────────────────────────────────────────────────────

/// Install a panic hook that persists the panic message to NVS.
///
/// Must be called once during init, after NVS is ready.
pub fn install_panic_handler() {
    std::panic::set_hook(Box::new(|info| {
        let reason = if let Some(msg) = info.payload().downcast_ref::<&str>() {
            *msg
        } else if let Some(msg) = info.payload().downcast_ref::<String>() {
            msg.as_str()
        } else {
            "unknown panic"
        };

        log::error!("PANIC: {}", reason);

        #[cfg(target_os = "espidf")]
        {
            let uptime = crate::adapters::time::Esp32TimeAdapter::new().uptime_secs();
            let record = RestartRecord::new(uptime, 0, reason);

            // main() has already initialised the partition, so this only
            // reopens a handle.
            match crate::adapters::nvs::NvsAdapter::new() {
                Ok(mut nvs) => {
                    let mut restart_log = RestartLog::new();
                    restart_log.init(&nvs);
                    restart_log.write_entry(&mut nvs, &record);
                }
                Err(_) => {
                    log::error!("Panic handler: NVS unavailable, record not persisted");
                }
            }
        }
    }));
}

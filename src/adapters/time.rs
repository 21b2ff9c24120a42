//! ESP32 time adapter.
//!
//! One source for every clock the loops need:
//!
//! - [`MicrosClock`] for DHT11 edge timing and loop deadlines,
//! - [`WallClock`] for payload timestamps.
//!
//! - **`target_os = "espidf"`**: `esp_timer_get_time()` (microsecond,
//!   monotonic, safe to read with interrupts masked) and `gettimeofday()`.
//! - **`not(target_os = "espidf")`**: `std::time::Instant` / `SystemTime`.

use crate::app::ports::{MicrosClock, WallClock};

/// Time adapter for the ESP32 platform.
#[derive(Debug, Clone, Copy)]
pub struct Esp32TimeAdapter {
    #[cfg(not(target_os = "espidf"))]
    start: std::time::Instant,
}

impl Default for Esp32TimeAdapter {
    fn default() -> Self {
        Self::new()
    }
}

impl Esp32TimeAdapter {
    pub fn new() -> Self {
        Self {
            #[cfg(not(target_os = "espidf"))]
            start: std::time::Instant::now(),
        }
    }

    /// Microseconds since boot (monotonic).
    #[cfg(target_os = "espidf")]
    pub fn uptime_us(&self) -> u64 {
        (unsafe { esp_idf_svc::sys::esp_timer_get_time() }) as u64
    }

    /// Microseconds since construction (monotonic).
    #[cfg(not(target_os = "espidf"))]
    pub fn uptime_us(&self) -> u64 {
        self.start.elapsed().as_micros() as u64
    }

    /// Seconds since boot (monotonic).
    pub fn uptime_secs(&self) -> u64 {
        self.uptime_us() / 1_000_000
    }
}

impl MicrosClock for Esp32TimeAdapter {
    fn now_us(&self) -> u64 {
        self.uptime_us()
    }
}

impl WallClock for Esp32TimeAdapter {
    /// RTC seconds.  Without SNTP this counts from boot.
    #[cfg(target_os = "espidf")]
    fn unix_secs(&self) -> u64 {
        let mut tv = esp_idf_svc::sys::timeval {
            tv_sec: 0,
            tv_usec: 0,
        };
        if unsafe { esp_idf_svc::sys::gettimeofday(&mut tv, core::ptr::null_mut()) } != 0
            || tv.tv_sec < 0
        {
            return self.uptime_secs();
        }
        tv.tv_sec as u64
    }

    #[cfg(not(target_os = "espidf"))]
    fn unix_secs(&self) -> u64 {
        std::time::SystemTime::now()
            .duration_since(std::time::UNIX_EPOCH)
            .map_or_else(|_| self.uptime_secs(), |d| d.as_secs())
    }
}

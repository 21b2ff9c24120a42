//! DHT11 single-wire protocol decoder.
//!
//! One transaction on the open-drain data line:
//!
//! ```text
//!  host  ──┐ 18 ms  ┌─ 30 us ─┐
//!          └────────┘         │ release
//!  sensor                     └─ 80 us low ─┬─ 80 us high ─┐
//!                                           │              │
//!  40 x [ ~50 us low ][ high: ~27 us = 0 / ~70 us = 1 ]  ──┘
//! ```
//!
//! The wake pulse is a plain blocking delay.  Everything from the release
//! of the line to the last bit runs inside [`without_preemption`] so that
//! a scheduler tick or WiFi interrupt cannot stretch a measured pulse.
//! Every wait is bounded by an [`EdgeWait`], so the section always ends.
//!
//! ## Dual-target design
//!
//! The decoder is generic over embedded-hal 1.0 pin and delay traits plus a
//! [`MicrosClock`].  On ESP-IDF the pin is a `PinDriver` in
//! input-output-open-drain mode and the clock is `esp_timer_get_time()`.
//! On host the integration tests drive it with a simulated waveform.

use embedded_hal::delay::DelayNs;
use embedded_hal::digital::{InputPin, OutputPin};
use log::debug;

use crate::app::ports::{MicrosClock, SensorPort};
use crate::error::DecodeError;
use crate::sensors::Reading;

/// Bits in one transaction: 4 data bytes plus the checksum byte.
pub const FRAME_BITS: u8 = 40;

// ───────────────────────────────────────────────────────────────
// Timing constants
// ───────────────────────────────────────────────────────────────

/// Datasheet-derived timing envelope for one transaction (all microseconds).
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ProtocolTiming {
    /// Host pulls the line low for at least 18 ms to wake the sensor.
    pub start_low_us: u32,
    /// Host releases the line for 20-40 us before listening.
    pub start_high_us: u32,
    /// Bound on each of the three acknowledgement waits.
    pub response_timeout_us: u32,
    /// Bound on each wait inside the data phase.
    pub bit_timeout_us: u32,
    /// High phases at least this long decode as 1.
    pub bit_threshold_us: u32,
    /// Shortest plausible high phase.
    pub min_high_us: u32,
    /// Longest plausible high phase.
    pub max_high_us: u32,
}

impl ProtocolTiming {
    pub const DHT11: Self = Self {
        start_low_us: 18_000,
        start_high_us: 30,
        response_timeout_us: 200,
        bit_timeout_us: 200,
        bit_threshold_us: 50,
        min_high_us: 15,
        max_high_us: 100,
    };

    /// Classify a measured high phase.  `None` means noise, not data.
    pub fn classify(&self, width_us: u32) -> Option<bool> {
        if width_us < self.min_high_us || width_us > self.max_high_us {
            return None;
        }
        Some(width_us >= self.bit_threshold_us)
    }
}

impl Default for ProtocolTiming {
    fn default() -> Self {
        Self::DHT11
    }
}

// ───────────────────────────────────────────────────────────────
// Bounded edge wait
// ───────────────────────────────────────────────────────────────

/// Result of sampling the line once against an [`EdgeWait`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum WaitStep {
    /// Line is not at the expected level yet and time remains.
    Pending,
    /// Line reached the expected level after `elapsed_us`.
    Reached { elapsed_us: u32 },
    /// Deadline passed without the level being observed.
    Expired,
}

/// A single "wait for level X, at most T microseconds" step.
///
/// Pure state: the caller samples the line and the clock and feeds both in,
/// which keeps the polling loop trivially bounded and host-testable.
#[derive(Debug, Clone, Copy)]
pub struct EdgeWait {
    expected_high: bool,
    started_us: u64,
    timeout_us: u32,
}

impl EdgeWait {
    pub fn start(expected_high: bool, now_us: u64, timeout_us: u32) -> Self {
        Self {
            expected_high,
            started_us: now_us,
            timeout_us,
        }
    }

    /// Evaluate one sample.  A level seen only after the deadline counts as
    /// expired: the pulse already violated its bound.
    pub fn poll(&self, level_high: bool, now_us: u64) -> WaitStep {
        let elapsed = now_us.saturating_sub(self.started_us);
        if elapsed > u64::from(self.timeout_us) {
            return WaitStep::Expired;
        }
        if level_high == self.expected_high {
            WaitStep::Reached {
                elapsed_us: elapsed as u32,
            }
        } else {
            WaitStep::Pending
        }
    }
}

/// Spin on the line until `expected_high` is observed or the bound passes.
///
/// `Ok(Some(elapsed))` on success, `Ok(None)` on timeout.
fn wait_for_level<P, C>(
    pin: &mut P,
    clock: &C,
    expected_high: bool,
    timeout_us: u32,
) -> Result<Option<u32>, DecodeError>
where
    P: InputPin,
    C: MicrosClock,
{
    let wait = EdgeWait::start(expected_high, clock.now_us(), timeout_us);
    loop {
        let level = pin.is_high().map_err(|_| DecodeError::Line)?;
        match wait.poll(level, clock.now_us()) {
            WaitStep::Pending => {}
            WaitStep::Reached { elapsed_us } => return Ok(Some(elapsed_us)),
            WaitStep::Expired => return Ok(None),
        }
    }
}

// ───────────────────────────────────────────────────────────────
// Line ownership
// ───────────────────────────────────────────────────────────────

/// Drives the data line for the duration of a transaction and hands it
/// back to the pull-up (released high) on every exit path.
struct LineGuard<'a, P: OutputPin> {
    pin: &'a mut P,
}

impl<'a, P: OutputPin> LineGuard<'a, P> {
    fn new(pin: &'a mut P) -> Self {
        Self { pin }
    }
}

impl<P: OutputPin> core::ops::Deref for LineGuard<'_, P> {
    type Target = P;

    fn deref(&self) -> &P {
        self.pin
    }
}

impl<P: OutputPin> core::ops::DerefMut for LineGuard<'_, P> {
    fn deref_mut(&mut self) -> &mut P {
        self.pin
    }
}

impl<P: OutputPin> Drop for LineGuard<'_, P> {
    fn drop(&mut self) {
        let _ = self.pin.set_high();
    }
}

// ───────────────────────────────────────────────────────────────
// Interrupt-free section
// ───────────────────────────────────────────────────────────────

/// Run `f` with interrupts masked on the current core.
#[cfg(target_os = "espidf")]
fn without_preemption<R>(f: impl FnOnce() -> R) -> R {
    esp_idf_hal::interrupt::free(f)
}

/// Host fallback: a process-wide critical section.
#[cfg(not(target_os = "espidf"))]
fn without_preemption<R>(f: impl FnOnce() -> R) -> R {
    critical_section::with(|_| f())
}

// ───────────────────────────────────────────────────────────────
// Decoder
// ───────────────────────────────────────────────────────────────

/// DHT11 driver bound to one open-drain data line.
pub struct Dht11<P, D, C> {
    pin: P,
    delay: D,
    clock: C,
    timing: ProtocolTiming,
}

impl<P, D, C> Dht11<P, D, C>
where
    P: InputPin + OutputPin,
    D: DelayNs,
    C: MicrosClock,
{
    pub fn new(pin: P, delay: D, clock: C) -> Self {
        Self::with_timing(pin, delay, clock, ProtocolTiming::DHT11)
    }

    pub fn with_timing(pin: P, delay: D, clock: C, timing: ProtocolTiming) -> Self {
        Self {
            pin,
            delay,
            clock,
            timing,
        }
    }

    pub fn timing(&self) -> &ProtocolTiming {
        &self.timing
    }

    /// Run one full transaction.
    ///
    /// On any failure the line is released high before returning and no
    /// partial data escapes.
    pub fn decode_transaction(&mut self) -> Result<Reading, DecodeError> {
        let Self {
            pin,
            delay,
            clock,
            timing,
        } = self;
        let timing = *timing;

        let mut line = LineGuard::new(pin);
        line.set_low().map_err(|_| DecodeError::Line)?;
        delay.delay_us(timing.start_low_us);

        let frame = without_preemption(|| {
            line.set_high().map_err(|_| DecodeError::Line)?;
            delay.delay_us(timing.start_high_us);
            read_frame(&mut *line, &*clock, &timing)
        })?;
        drop(line);

        let reading = Reading::from_frame(frame)?;
        debug!(
            "DHT11: frame {:02X?} -> {:.1}C {:.1}%",
            frame,
            reading.temperature_c(),
            reading.humidity_pct()
        );
        Ok(reading)
    }
}

impl<P, D, C> SensorPort for Dht11<P, D, C>
where
    P: InputPin + OutputPin,
    D: DelayNs,
    C: MicrosClock,
{
    fn read_transaction(&mut self) -> Result<Reading, DecodeError> {
        self.decode_transaction()
    }
}

/// Acknowledge handshake followed by the 40-bit data phase.
fn read_frame<P, C>(pin: &mut P, clock: &C, timing: &ProtocolTiming) -> Result<[u8; 5], DecodeError>
where
    P: InputPin,
    C: MicrosClock,
{
    // Sensor pulls low, releases high, then pulls low for the first bit.
    for expected_high in [false, true, false] {
        wait_for_level(pin, clock, expected_high, timing.response_timeout_us)?
            .ok_or(DecodeError::NoResponse)?;
    }

    let mut frame = [0u8; 5];
    for bit in 0..FRAME_BITS {
        wait_for_level(pin, clock, true, timing.bit_timeout_us)?
            .ok_or(DecodeError::BitTimeout { bit })?;
        let width_us = wait_for_level(pin, clock, false, timing.bit_timeout_us)?
            .ok_or(DecodeError::BitTimeout { bit })?;
        let one = timing
            .classify(width_us)
            .ok_or(DecodeError::PulseOutOfRange { bit, width_us })?;

        let byte = &mut frame[usize::from(bit / 8)];
        *byte <<= 1;
        if one {
            *byte |= 1;
        }
    }
    Ok(frame)
}

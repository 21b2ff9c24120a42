//! Mock hardware for integration tests.
//!
//! A simulated microsecond clock drives everything: the DHT11 data line
//! plays back a scripted waveform against it, delays advance it, and each
//! clock read ticks it forward so polling loops always make progress.

#![allow(dead_code)]

use std::cell::{Cell, RefCell};
use std::collections::VecDeque;
use std::convert::Infallible;
use std::rc::Rc;

use embedded_hal::delay::DelayNs;
use embedded_hal::digital::{ErrorType, InputPin, OutputPin};

use envsense::app::payload::TelemetryPayload;
use envsense::app::ports::{MicrosClock, PresentationPort, RestartPort, TransportPort, WallClock};
use envsense::error::CommsError;

// ── Simulated clock ───────────────────────────────────────────

#[derive(Clone, Default)]
pub struct SimClock {
    now: Rc<Cell<u64>>,
}

impl SimClock {
    pub fn new() -> Self {
        Self::default()
    }

    /// Current time without ticking.
    pub fn peek(&self) -> u64 {
        self.now.get()
    }

    pub fn advance(&self, us: u64) {
        self.now.set(self.now.get() + us);
    }
}

impl MicrosClock for SimClock {
    fn now_us(&self) -> u64 {
        let t = self.now.get();
        self.now.set(t + 1);
        t
    }
}

// ── Simulated delay ───────────────────────────────────────────

#[derive(Clone)]
pub struct SimDelay {
    clock: SimClock,
}

impl SimDelay {
    pub fn new(clock: &SimClock) -> Self {
        Self {
            clock: clock.clone(),
        }
    }
}

impl DelayNs for SimDelay {
    fn delay_ns(&mut self, ns: u32) {
        self.clock.advance(u64::from(ns).div_ceil(1_000));
    }
}

// ── DHT11 waveform ────────────────────────────────────────────

/// Bus activity after the host releases the line, as (level, duration) runs.
#[derive(Debug, Clone)]
pub struct Waveform {
    runs: Vec<(bool, u64)>,
    /// Level held once the runs are exhausted.
    tail_high: bool,
}

/// Nominal high width for a 0 bit.
pub const ZERO_HIGH_US: u64 = 26;
/// Nominal high width for a 1 bit.
pub const ONE_HIGH_US: u64 = 70;

impl Waveform {
    /// A well-formed response carrying `frame`.
    pub fn frame(frame: [u8; 5]) -> Self {
        Self::with_widths(frame_widths(frame))
    }

    /// A response whose bit high phases have the given widths.
    pub fn with_widths(widths: Vec<u64>) -> Self {
        let mut runs = vec![(true, 30), (false, 80), (true, 80)];
        for w in widths {
            runs.push((false, 50));
            runs.push((true, w));
        }
        runs.push((false, 50));
        Self {
            runs,
            tail_high: true,
        }
    }

    /// The sensor stops driving after `bits` data bits and the line is
    /// stuck low.
    pub fn truncated(frame: [u8; 5], bits: usize) -> Self {
        let widths: Vec<u64> = frame_widths(frame).into_iter().take(bits).collect();
        let mut w = Self::with_widths(widths);
        w.tail_high = false;
        w
    }

    /// The sensor acknowledges with a low pulse and then holds the line low.
    pub fn ack_stuck_low() -> Self {
        Self {
            runs: vec![(true, 30)],
            tail_high: false,
        }
    }

    /// The sensor acknowledges and releases high, but never starts bit 0.
    pub fn ack_without_data() -> Self {
        Self {
            runs: vec![(true, 30), (false, 80)],
            tail_high: true,
        }
    }

    fn level_at(&self, mut offset: u64) -> bool {
        for &(level, len) in &self.runs {
            if offset < len {
                return level;
            }
            offset -= len;
        }
        self.tail_high
    }
}

/// High-phase widths for every bit of `frame`, MSB first.
pub fn frame_widths(frame: [u8; 5]) -> Vec<u64> {
    frame
        .iter()
        .flat_map(|byte| (0..8).rev().map(move |i| (byte >> i) & 1 == 1))
        .map(|one| if one { ONE_HIGH_US } else { ZERO_HIGH_US })
        .collect()
}

/// Frame with a correct checksum.
pub fn valid_frame(humidity: u8, temperature: u8) -> [u8; 5] {
    [
        humidity,
        0,
        temperature,
        0,
        humidity.wrapping_add(temperature),
    ]
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LineOp {
    DriveLow,
    Release,
}

struct PinState {
    driven_low: bool,
    active: Option<(u64, Waveform)>,
    queued: VecDeque<Waveform>,
    ops: Vec<LineOp>,
}

/// Open-drain data line.  Each low-to-released transition starts the next
/// queued waveform; with nothing queued the pull-up holds it high.
#[derive(Clone)]
pub struct WaveformPin {
    clock: SimClock,
    state: Rc<RefCell<PinState>>,
}

impl WaveformPin {
    pub fn new(clock: &SimClock) -> Self {
        Self {
            clock: clock.clone(),
            state: Rc::new(RefCell::new(PinState {
                driven_low: false,
                active: None,
                queued: VecDeque::new(),
                ops: Vec::new(),
            })),
        }
    }

    pub fn queue(&self, waveform: Waveform) {
        self.state.borrow_mut().queued.push_back(waveform);
    }

    pub fn ops(&self) -> Vec<LineOp> {
        self.state.borrow().ops.clone()
    }

    /// True if the host is not holding the line low.
    pub fn released(&self) -> bool {
        !self.state.borrow().driven_low
    }

    pub fn transactions_started(&self) -> usize {
        self.state
            .borrow()
            .ops
            .iter()
            .filter(|op| **op == LineOp::DriveLow)
            .count()
    }
}

impl ErrorType for WaveformPin {
    type Error = Infallible;
}

impl OutputPin for WaveformPin {
    fn set_low(&mut self) -> Result<(), Infallible> {
        let mut s = self.state.borrow_mut();
        s.driven_low = true;
        s.active = None;
        s.ops.push(LineOp::DriveLow);
        Ok(())
    }

    fn set_high(&mut self) -> Result<(), Infallible> {
        let mut s = self.state.borrow_mut();
        if s.driven_low {
            s.driven_low = false;
            let now = self.clock.peek();
            s.active = s.queued.pop_front().map(|w| (now, w));
        }
        s.ops.push(LineOp::Release);
        Ok(())
    }
}

impl InputPin for WaveformPin {
    fn is_high(&mut self) -> Result<bool, Infallible> {
        let s = self.state.borrow();
        if s.driven_low {
            return Ok(false);
        }
        Ok(match &s.active {
            Some((start, wave)) => wave.level_at(self.clock.peek().saturating_sub(*start)),
            None => true,
        })
    }

    fn is_low(&mut self) -> Result<bool, Infallible> {
        self.is_high().map(|h| !h)
    }
}

// ── Presentation ──────────────────────────────────────────────

#[derive(Debug, Clone, PartialEq)]
pub enum Shown {
    Reading(f32, f32),
    Warning(u32),
    Fatal(String),
    Network(bool),
}

#[derive(Default)]
pub struct RecordingPresenter {
    pub shown: RefCell<Vec<Shown>>,
}

impl RecordingPresenter {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn take(&self) -> Vec<Shown> {
        std::mem::take(&mut *self.shown.borrow_mut())
    }

    pub fn count(&self, pred: impl Fn(&Shown) -> bool) -> usize {
        self.shown.borrow().iter().filter(|s| pred(s)).count()
    }
}

impl PresentationPort for RecordingPresenter {
    fn show_reading(&self, temperature_c: f32, humidity_pct: f32) {
        self.shown
            .borrow_mut()
            .push(Shown::Reading(temperature_c, humidity_pct));
    }

    fn show_warning(&self, consecutive_failures: u32) {
        self.shown
            .borrow_mut()
            .push(Shown::Warning(consecutive_failures));
    }

    fn show_fatal(&self, message: &str) {
        self.shown.borrow_mut().push(Shown::Fatal(message.to_string()));
    }

    fn show_network_state(&self, connected: bool) {
        self.shown.borrow_mut().push(Shown::Network(connected));
    }
}

// ── Restart ───────────────────────────────────────────────────

#[derive(Default)]
pub struct RecordingRestarter {
    pub requests: Vec<(u32, String)>,
}

impl RestartPort for RecordingRestarter {
    fn restart(&mut self, consecutive_failures: u32, reason: &str) {
        self.requests.push((consecutive_failures, reason.to_string()));
    }
}

// ── Transport ─────────────────────────────────────────────────

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TransportCall {
    Reconnect,
    Send,
}

/// Link whose state and failures are set by the test.
#[derive(Default)]
pub struct ScriptedTransport {
    pub link_up: bool,
    /// Results handed out by successive `reconnect` calls; `Ok` when empty.
    pub reconnect_results: VecDeque<Result<(), CommsError>>,
    /// Results handed out by successive `send` calls; `Ok` when empty.
    pub send_results: VecDeque<Result<(), CommsError>>,
    pub rssi: Option<i8>,
    pub calls: Vec<TransportCall>,
    pub sent: Vec<TelemetryPayload>,
}

impl ScriptedTransport {
    pub fn new(link_up: bool) -> Self {
        Self {
            link_up,
            ..Default::default()
        }
    }

    pub fn reconnects(&self) -> usize {
        self.calls
            .iter()
            .filter(|c| **c == TransportCall::Reconnect)
            .count()
    }
}

impl TransportPort for ScriptedTransport {
    fn is_connected(&self) -> bool {
        self.link_up
    }

    fn reconnect(&mut self) -> Result<(), CommsError> {
        self.calls.push(TransportCall::Reconnect);
        let result = self.reconnect_results.pop_front().unwrap_or(Ok(()));
        self.link_up = result.is_ok();
        result
    }

    fn send(&mut self, payload: &TelemetryPayload) -> Result<(), CommsError> {
        self.calls.push(TransportCall::Send);
        self.sent.push(payload.clone());
        self.send_results.pop_front().unwrap_or(Ok(()))
    }

    fn rssi(&self) -> Option<i8> {
        if self.link_up { self.rssi } else { None }
    }
}

// ── Wall clock ────────────────────────────────────────────────

pub struct FixedWallClock(pub u64);

impl WallClock for FixedWallClock {
    fn unix_secs(&self) -> u64 {
        self.0
    }
}

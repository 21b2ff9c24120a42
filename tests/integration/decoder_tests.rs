//! DHT11 decoder against a simulated data line.
//!
//! Covers the full transaction: wake pulse, acknowledge handshake, 40-bit
//! data phase and checksum, plus every failure class and the guarantee
//! that the line is handed back to the pull-up on every exit path.

use std::sync::Arc;

use envsense::app::acquisition::{AcquisitionLoop, AcquisitionSettings, CycleOutcome};
use envsense::app::health::HealthAction;
use envsense::app::store::SharedReadingStore;
use envsense::config::SystemConfig;
use envsense::error::DecodeError;
use envsense::sensors::dht11::Dht11;

use crate::mock_hw::{
    LineOp, RecordingPresenter, RecordingRestarter, SimClock, SimDelay, Waveform, WaveformPin,
    ONE_HIGH_US, ZERO_HIGH_US, frame_widths, valid_frame,
};

fn rig() -> (Dht11<WaveformPin, SimDelay, SimClock>, WaveformPin, SimClock) {
    let clock = SimClock::new();
    let pin = WaveformPin::new(&clock);
    let dht = Dht11::new(pin.clone(), SimDelay::new(&clock), clock.clone());
    (dht, pin, clock)
}

#[test]
fn decodes_well_formed_frame() {
    let (mut dht, pin, _) = rig();
    pin.queue(Waveform::frame([60, 0, 23, 0, 83]));

    let r = dht.decode_transaction().unwrap();

    assert!(r.is_valid());
    assert!((r.temperature_c() - 23.0).abs() < f32::EPSILON);
    assert!((r.humidity_pct() - 60.0).abs() < f32::EPSILON);
    assert_eq!(pin.ops().first(), Some(&LineOp::DriveLow));
    assert!(pin.released());
}

#[test]
fn wake_pulse_lasts_at_least_18ms() {
    let (mut dht, pin, clock) = rig();
    pin.queue(Waveform::frame(valid_frame(40, 20)));
    let before = clock.peek();

    dht.decode_transaction().unwrap();

    // 18 ms low + 30 us release + 83 us handshake + 40 bits.
    assert!(clock.peek() - before >= 18_000);
}

#[test]
fn decodes_fractional_bytes() {
    let (mut dht, pin, _) = rig();
    let mut frame = [45, 5, 21, 7, 0];
    frame[4] = envsense::sensors::frame_checksum(&frame);
    pin.queue(Waveform::frame(frame));

    let r = dht.decode_transaction().unwrap();

    assert!((r.humidity_pct() - 45.5).abs() < 1e-4);
    assert!((r.temperature_c() - 21.7).abs() < 1e-4);
}

#[test]
fn silent_sensor_is_no_response() {
    let (mut dht, pin, _) = rig();

    assert_eq!(dht.decode_transaction(), Err(DecodeError::NoResponse));
    assert!(pin.released());
}

#[test]
fn ack_that_never_releases_is_no_response() {
    let (mut dht, pin, _) = rig();
    pin.queue(Waveform::ack_stuck_low());

    assert_eq!(dht.decode_transaction(), Err(DecodeError::NoResponse));
    assert!(pin.released());
}

#[test]
fn missing_first_bit_is_no_response() {
    let (mut dht, pin, _) = rig();
    pin.queue(Waveform::ack_without_data());

    assert_eq!(dht.decode_transaction(), Err(DecodeError::NoResponse));
    assert_eq!(pin.ops().last(), Some(&LineOp::Release));
    assert!(pin.released());
}

#[test]
fn line_stuck_low_mid_frame_times_out_at_that_bit() {
    let (mut dht, pin, _) = rig();
    pin.queue(Waveform::truncated([60, 0, 23, 0, 83], 17));

    assert_eq!(
        dht.decode_transaction(),
        Err(DecodeError::BitTimeout { bit: 17 })
    );
    assert_eq!(pin.ops().last(), Some(&LineOp::Release));
    assert!(pin.released());
}

#[test]
fn overlong_high_phase_is_out_of_range() {
    let (mut dht, pin, _) = rig();
    let mut widths = frame_widths(valid_frame(50, 25));
    widths[9] = 130;
    pin.queue(Waveform::with_widths(widths));

    match dht.decode_transaction() {
        Err(DecodeError::PulseOutOfRange { bit, width_us }) => {
            assert_eq!(bit, 9);
            assert!(width_us > 100, "measured {width_us}");
        }
        other => panic!("expected PulseOutOfRange, got {other:?}"),
    }
}

#[test]
fn glitch_pulse_is_out_of_range() {
    let (mut dht, pin, _) = rig();
    let mut widths = frame_widths(valid_frame(50, 25));
    widths[0] = 5;
    pin.queue(Waveform::with_widths(widths));

    assert!(matches!(
        dht.decode_transaction(),
        Err(DecodeError::PulseOutOfRange { bit: 0, .. })
    ));
}

#[test]
fn corrupted_checksum_is_rejected() {
    let (mut dht, pin, _) = rig();
    pin.queue(Waveform::frame([60, 0, 23, 0, 84]));

    assert_eq!(
        dht.decode_transaction(),
        Err(DecodeError::ChecksumMismatch {
            expected: 83,
            received: 84
        })
    );
    assert!(pin.released());
}

#[test]
fn widths_on_either_side_of_threshold() {
    let (mut dht, pin, _) = rig();
    // All zeros except the checksum byte, which must also be zero.
    let widths = vec![ZERO_HIGH_US; 40];
    pin.queue(Waveform::with_widths(widths));
    let r = dht.decode_transaction().unwrap();
    assert!(r.temperature_c().abs() < f32::EPSILON);

    let mut widths = vec![ZERO_HIGH_US; 40];
    // humidity-int = 0x80, checksum = 0x80
    widths[0] = ONE_HIGH_US;
    widths[32] = ONE_HIGH_US;
    pin.queue(Waveform::with_widths(widths));
    let r = dht.decode_transaction().unwrap();
    assert!((r.humidity_pct() - 128.0).abs() < f32::EPSILON);
}

#[test]
fn failed_decode_leaves_store_untouched() {
    let (mut dht, pin, clock) = rig();
    let store = Arc::new(SharedReadingStore::default());
    let settings = AcquisitionSettings::from(&SystemConfig::default());
    let mut acq = AcquisitionLoop::new(settings, Arc::clone(&store));
    let presenter = RecordingPresenter::new();
    let mut restarter = RecordingRestarter::default();
    let mut delay = SimDelay::new(&clock);

    for _ in 0..settings.max_attempts {
        pin.queue(Waveform::truncated([60, 0, 23, 0, 83], 17));
    }

    let outcome = acq.run_cycle(&mut dht, &mut delay, &presenter, &mut restarter);

    assert_eq!(
        outcome,
        CycleOutcome::Failed {
            last_error: DecodeError::BitTimeout { bit: 17 },
            consecutive_failures: 1,
            action: HealthAction::PresentCached,
        }
    );
    assert_eq!(pin.transactions_started(), usize::from(settings.max_attempts));
    assert!(pin.released());

    let snap = store.try_peek().unwrap();
    assert!(!snap.reading.is_valid());
    assert_eq!(snap.sequence, 0);
    assert!(!snap.fresh);
}

//! Acquisition loop end to end: decoder → retries → store → display,
//! and the warn / restart escalation for a dead sensor.

use std::sync::Arc;
use std::time::Duration;

use envsense::adapters::display::{Colour, DisplaySurface, ScreenPresenter};
use envsense::app::acquisition::{AcquisitionLoop, AcquisitionSettings, CycleOutcome, FATAL_MESSAGE};
use envsense::app::health::HealthAction;
use envsense::app::store::SharedReadingStore;
use envsense::config::SystemConfig;
use envsense::sensors::dht11::Dht11;

use crate::mock_hw::{
    RecordingPresenter, RecordingRestarter, Shown, SimClock, SimDelay, Waveform, WaveformPin,
    valid_frame,
};

struct Rig {
    dht: Dht11<WaveformPin, SimDelay, SimClock>,
    pin: WaveformPin,
    delay: SimDelay,
    store: Arc<SharedReadingStore>,
    acq: AcquisitionLoop,
    presenter: RecordingPresenter,
    restarter: RecordingRestarter,
}

impl Rig {
    fn new(config: &SystemConfig) -> Self {
        let clock = SimClock::new();
        let pin = WaveformPin::new(&clock);
        let store = Arc::new(SharedReadingStore::default());
        Self {
            dht: Dht11::new(pin.clone(), SimDelay::new(&clock), clock.clone()),
            pin,
            delay: SimDelay::new(&clock),
            acq: AcquisitionLoop::new(AcquisitionSettings::from(config), Arc::clone(&store)),
            store,
            presenter: RecordingPresenter::new(),
            restarter: RecordingRestarter::default(),
        }
    }

    fn cycle(&mut self) -> CycleOutcome {
        self.acq.run_cycle(
            &mut self.dht,
            &mut self.delay,
            &self.presenter,
            &mut self.restarter,
        )
    }
}

#[test]
fn good_cycle_commits_and_presents() {
    let mut rig = Rig::new(&SystemConfig::default());
    rig.pin.queue(Waveform::frame(valid_frame(60, 23)));

    let outcome = rig.cycle();

    assert!(matches!(
        outcome,
        CycleOutcome::Acquired {
            attempts: 1,
            sequence: Some(1),
            ..
        }
    ));
    let snap = rig.store.try_read().unwrap();
    assert!(snap.fresh);
    assert_eq!(snap.sequence, 1);
    assert!((snap.reading.temperature_c() - 23.0).abs() < f32::EPSILON);
    assert_eq!(rig.presenter.take(), vec![Shown::Reading(23.0, 60.0)]);
}

#[test]
fn retry_recovers_within_one_cycle() {
    let mut rig = Rig::new(&SystemConfig::default());
    rig.pin.queue(Waveform::truncated(valid_frame(60, 23), 5));
    rig.pin.queue(Waveform::frame(valid_frame(61, 24)));

    let outcome = rig.cycle();

    assert!(matches!(outcome, CycleOutcome::Acquired { attempts: 2, .. }));
    assert_eq!(rig.acq.consecutive_failures(), 0);
    assert_eq!(rig.pin.transactions_started(), 2);
}

#[test]
fn failed_cycle_reshows_last_good_reading() {
    let mut rig = Rig::new(&SystemConfig::default());
    rig.pin.queue(Waveform::frame(valid_frame(55, 21)));
    rig.cycle();
    rig.presenter.take();

    // Nothing queued: every attempt sees no response.
    let outcome = rig.cycle();

    assert!(matches!(
        outcome,
        CycleOutcome::Failed {
            consecutive_failures: 1,
            action: HealthAction::PresentCached,
            ..
        }
    ));
    assert_eq!(rig.presenter.take(), vec![Shown::Reading(21.0, 55.0)]);
    assert_eq!(rig.store.try_peek().unwrap().sequence, 1);
}

#[test]
fn dead_sensor_warns_once_then_restarts_once() {
    let mut rig = Rig::new(&SystemConfig::default());

    for _ in 0..8 {
        rig.cycle();
    }

    assert_eq!(rig.presenter.count(|s| matches!(s, Shown::Warning(_))), 1);
    assert_eq!(rig.presenter.count(|s| matches!(s, Shown::Warning(3))), 1);
    assert_eq!(
        rig.presenter
            .count(|s| *s == Shown::Fatal(FATAL_MESSAGE.to_string())),
        1
    );
    assert_eq!(rig.restarter.requests.len(), 1);
    assert_eq!(rig.restarter.requests[0].0, 6);
    assert!(rig.restarter.requests[0].1.contains("6 cycles"));
    assert_eq!(rig.acq.consecutive_failures(), 8);
    assert_eq!(rig.acq.cycle_count(), 8);
}

#[test]
fn recovery_resets_escalation() {
    let mut rig = Rig::new(&SystemConfig::default());
    for _ in 0..4 {
        rig.cycle();
    }
    rig.pin.queue(Waveform::frame(valid_frame(50, 20)));
    rig.cycle();
    assert_eq!(rig.acq.consecutive_failures(), 0);

    for _ in 0..3 {
        rig.cycle();
    }
    assert_eq!(rig.presenter.count(|s| matches!(s, Shown::Warning(_))), 2);
    assert!(rig.restarter.requests.is_empty());
}

#[test]
fn busy_store_skips_commit_but_still_presents() {
    let config = SystemConfig::default();
    let mut rig = Rig::new(&config);
    let store = Arc::new(SharedReadingStore::new(Duration::from_millis(10)));
    rig.acq = AcquisitionLoop::new(AcquisitionSettings::from(&config), Arc::clone(&store));
    rig.store = Arc::clone(&store);

    let holder = {
        let store = Arc::clone(&store);
        std::thread::spawn(move || store.hold_for(Duration::from_millis(300)))
    };
    std::thread::sleep(Duration::from_millis(50));

    rig.pin.queue(Waveform::frame(valid_frame(60, 23)));
    let outcome = rig.cycle();
    holder.join().unwrap().unwrap();

    assert!(matches!(outcome, CycleOutcome::Acquired { sequence: None, .. }));
    assert_eq!(rig.presenter.take(), vec![Shown::Reading(23.0, 60.0)]);
    assert_eq!(store.try_peek().unwrap().sequence, 0);
    assert_eq!(rig.acq.last_good().map(|r| r.is_valid()), Some(true));
}

#[test]
fn reshow_after_timed_out_commit_keeps_newest_reading() {
    let config = SystemConfig::default();
    let mut rig = Rig::new(&config);
    let store = Arc::new(SharedReadingStore::new(Duration::from_millis(10)));
    rig.acq = AcquisitionLoop::new(AcquisitionSettings::from(&config), Arc::clone(&store));
    rig.store = Arc::clone(&store);

    rig.pin.queue(Waveform::frame(valid_frame(60, 23)));
    rig.cycle();

    let holder = {
        let store = Arc::clone(&store);
        std::thread::spawn(move || store.hold_for(Duration::from_millis(300)))
    };
    std::thread::sleep(Duration::from_millis(50));
    rig.pin.queue(Waveform::frame(valid_frame(61, 25)));
    let second = rig.cycle();
    holder.join().unwrap().unwrap();
    assert!(matches!(second, CycleOutcome::Acquired { sequence: None, .. }));

    // Nothing queued, so this cycle fails and re-shows from cache.
    rig.cycle();

    assert_eq!(
        rig.presenter.take(),
        vec![
            Shown::Reading(23.0, 60.0),
            Shown::Reading(25.0, 61.0),
            Shown::Reading(25.0, 61.0),
        ]
    );
    assert_eq!(store.try_peek().unwrap().sequence, 1);
}

#[derive(Default)]
struct Lines(Vec<String>);

impl DisplaySurface for Lines {
    fn clear(&mut self, _background: Colour) {
        self.0.clear();
    }

    fn draw_text(&mut self, _x: u16, _y: u16, text: &str, _fg: Colour, _bg: Colour) {
        self.0.push(text.to_string());
    }
}

#[test]
fn screen_presenter_renders_acquired_reading() {
    let clock = SimClock::new();
    let pin = WaveformPin::new(&clock);
    let mut dht = Dht11::new(pin.clone(), SimDelay::new(&clock), clock.clone());
    let store = Arc::new(SharedReadingStore::default());
    let mut acq = AcquisitionLoop::new(AcquisitionSettings::from(&SystemConfig::default()), store);
    let screen = ScreenPresenter::new(Lines::default());
    let mut restarter = RecordingRestarter::default();

    pin.queue(Waveform::frame(valid_frame(60, 23)));
    acq.run_cycle(&mut dht, &mut SimDelay::new(&clock), &screen, &mut restarter);

    let lines = screen.into_surface().0;
    assert!(lines.iter().any(|l| l.contains("23.0C")), "{lines:?}");
    assert!(lines.iter().any(|l| l.contains("60%")), "{lines:?}");
}

//! Transmission loop against a scripted link: sentinel payloads,
//! alternate-cycle reconnects and link-state presentation.

use std::sync::Arc;

use envsense::app::payload::SENTINEL;
use envsense::app::store::SharedReadingStore;
use envsense::app::transmission::{TransmissionLoop, TransmissionSettings, TransmitOutcome};
use envsense::config::SystemConfig;
use envsense::error::CommsError;
use envsense::sensors::Reading;

use crate::mock_hw::{
    FixedWallClock, RecordingPresenter, ScriptedTransport, Shown, TransportCall,
};

const NOW: FixedWallClock = FixedWallClock(1_700_000_000);

fn make_loop() -> (TransmissionLoop, Arc<SharedReadingStore>) {
    let store = Arc::new(SharedReadingStore::default());
    let settings = TransmissionSettings::from(&SystemConfig::default());
    (TransmissionLoop::new(settings, Arc::clone(&store)), store)
}

fn commit(store: &SharedReadingStore, humidity: u8, temperature: u8, seq: u32) {
    let reading = Reading::from_frame([
        humidity,
        0,
        temperature,
        0,
        humidity.wrapping_add(temperature),
    ])
    .unwrap();
    store.commit(reading, seq).unwrap();
}

#[test]
fn empty_store_sends_sentinels() {
    let (mut tx, _store) = make_loop();
    let mut link = ScriptedTransport::new(true);
    let presenter = RecordingPresenter::new();

    let outcome = tx.run_cycle(&mut link, &presenter, &NOW);

    assert_eq!(outcome, TransmitOutcome::Sent { has_reading: false });
    let p = &link.sent[0];
    assert_eq!(p.temperature, SENTINEL);
    assert_eq!(p.humidity, SENTINEL);
    assert_eq!(p.timestamp, 1_700_000_000);
    assert_eq!(p.device_id.as_str(), "ESP32_SENSOR_01");
    assert!(p.to_json().unwrap().contains("\"temperature\":-999.0"));
}

#[test]
fn committed_reading_goes_out_once_as_fresh() {
    let (mut tx, store) = make_loop();
    let mut link = ScriptedTransport::new(true);
    link.rssi = Some(-61);
    let presenter = RecordingPresenter::new();
    commit(&store, 60, 23, 1);

    tx.run_cycle(&mut link, &presenter, &NOW);
    tx.run_cycle(&mut link, &presenter, &NOW);

    assert_eq!(link.sent.len(), 2);
    assert_eq!(link.sent[0].temperature, 23.0);
    assert_eq!(link.sent[0].rssi, -61);
    // Same reading re-sent; the store still holds it, only freshness moved.
    assert_eq!(link.sent[1].temperature, 23.0);
    assert!(!store.try_peek().unwrap().fresh);
    assert_eq!(tx.sent_count(), 2);
}

#[test]
fn outage_reconnects_on_alternate_cycles() {
    let (mut tx, _store) = make_loop();
    let mut link = ScriptedTransport::new(true);
    let presenter = RecordingPresenter::new();

    tx.run_cycle(&mut link, &presenter, &NOW);
    link.link_up = false;
    link.reconnect_results = [
        Err(CommsError::WifiConnectFailed),
        Err(CommsError::WifiConnectFailed),
        Ok(()),
    ]
    .into_iter()
    .collect();

    let outcomes: Vec<_> = (0..6)
        .map(|_| tx.run_cycle(&mut link, &presenter, &NOW))
        .collect();

    assert_eq!(
        outcomes,
        vec![
            TransmitOutcome::ReconnectFailed(CommsError::WifiConnectFailed),
            TransmitOutcome::Waiting,
            TransmitOutcome::ReconnectFailed(CommsError::WifiConnectFailed),
            TransmitOutcome::Waiting,
            TransmitOutcome::Reconnected,
            TransmitOutcome::Sent { has_reading: false },
        ]
    );
    assert_eq!(link.reconnects(), 3);
    assert_eq!(tx.state().attempts_since_last_success(), 0);
}

#[test]
fn link_edges_are_presented() {
    let (mut tx, _store) = make_loop();
    let mut link = ScriptedTransport::new(false);
    let presenter = RecordingPresenter::new();

    // Boot: disconnected, first cycle reconnects successfully.
    tx.run_cycle(&mut link, &presenter, &NOW);
    link.link_up = false;
    tx.run_cycle(&mut link, &presenter, &NOW);

    let shown = presenter.take();
    assert_eq!(shown.first(), Some(&Shown::Network(true)));
    assert!(shown.contains(&Shown::Network(false)));
}

#[test]
fn send_failure_does_not_trigger_reconnect() {
    let (mut tx, store) = make_loop();
    let mut link = ScriptedTransport::new(true);
    link.send_results = [Err(CommsError::HttpStatus(500))].into_iter().collect();
    let presenter = RecordingPresenter::new();
    commit(&store, 40, 19, 1);

    let first = tx.run_cycle(&mut link, &presenter, &NOW);
    let second = tx.run_cycle(&mut link, &presenter, &NOW);

    assert_eq!(first, TransmitOutcome::SendFailed(CommsError::HttpStatus(500)));
    assert_eq!(second, TransmitOutcome::Sent { has_reading: true });
    assert_eq!(link.calls, vec![TransportCall::Send, TransportCall::Send]);
    assert_eq!(tx.sent_count(), 1);
}

#[test]
fn busy_store_sends_sentinel_instead_of_waiting() {
    use std::time::Duration;

    let store = Arc::new(SharedReadingStore::new(Duration::from_millis(10)));
    commit(&store, 60, 23, 1);
    let mut tx = TransmissionLoop::new(
        TransmissionSettings::from(&SystemConfig::default()),
        Arc::clone(&store),
    );
    let mut link = ScriptedTransport::new(true);
    let presenter = RecordingPresenter::new();

    let holder = {
        let store = Arc::clone(&store);
        std::thread::spawn(move || store.hold_for(Duration::from_millis(300)))
    };
    std::thread::sleep(Duration::from_millis(50));

    let outcome = tx.run_cycle(&mut link, &presenter, &NOW);
    holder.join().unwrap().unwrap();

    assert_eq!(outcome, TransmitOutcome::Sent { has_reading: false });
    // The reading was never observed, so it is still fresh.
    assert!(store.try_peek().unwrap().fresh);
}

//! EnvSense firmware entry point.
//!
//! Two loops on two cores share one reading store.
//!
//! ```text
//! ┌────────────────────────────────────────────────────────────────┐
//! │                      Adapters (outer ring)                     │
//! │                                                                │
//! │  Dht11<PinDriver>  ScreenPresenter  NvsAdapter   Esp32Time     │
//! │  (SensorPort)      (Presentation)   (Config+NVS) (Clocks)      │
//! │  WifiTransport     SystemRestart                               │
//! │  (TransportPort)   (RestartPort)                               │
//! │                                                                │
//! │  ──────────────── Port Trait Boundary ───────────────────      │
//! │                                                                │
//! │  ┌──────────────────────┐        ┌──────────────────────┐      │
//! │  │  AcquisitionLoop     │ commit │  TransmissionLoop    │      │
//! │  │  APP core, pri 10    ├───────►│  PRO core, pri 5     │      │
//! │  │  retries · health    │ Shared │  reconnect · POST    │      │
//! │  └──────────────────────┘ Store  └──────────────────────┘      │
//! └────────────────────────────────────────────────────────────────┘
//! ```
#![deny(unused_must_use)]

// ── Imports ───────────────────────────────────────────────────
use std::sync::Arc;
use std::time::Duration;

use anyhow::{Context, Result};
use log::{error, info, warn};

use esp_idf_hal::delay::{Ets, FreeRtos};
use esp_idf_hal::gpio::{PinDriver, Pull};
use esp_idf_hal::peripherals::Peripherals;
use esp_idf_svc::eventloop::EspSystemEventLoop;
use esp_idf_svc::nvs::EspDefaultNvsPartition;

use envsense::adapters::device_id;
use envsense::adapters::display::{LogSurface, ScreenPresenter};
use envsense::adapters::nvs::NvsAdapter;
use envsense::adapters::time::Esp32TimeAdapter;
use envsense::adapters::wifi::WifiTransport;
use envsense::app::acquisition::{AcquisitionLoop, AcquisitionSettings};
use envsense::app::ports::ConfigPort;
use envsense::app::store::SharedReadingStore;
use envsense::app::transmission::{TransmissionLoop, TransmissionSettings};
use envsense::config::SystemConfig;
use envsense::diagnostics;
use envsense::drivers::system::SystemRestart;
use envsense::drivers::task_pin::{spawn_on_core, ACQUISITION_TASK, TRANSMISSION_TASK};
use envsense::drivers::watchdog::Watchdog;
use envsense::pins;
use envsense::sensors::dht11::Dht11;

// ── Main ──────────────────────────────────────────────────────

fn main() -> Result<()> {
    // ── 1. ESP-IDF bootstrap ──────────────────────────────────
    esp_idf_svc::sys::link_patches();
    esp_idf_logger::init()?;

    info!("╔══════════════════════════════════════╗");
    info!("║  EnvSense v{}                        ║", env!("CARGO_PKG_VERSION"));
    info!("╚══════════════════════════════════════╝");

    diagnostics::install_panic_handler();

    // ── 2. Load config from NVS (or defaults) ─────────────────
    let nvs = NvsAdapter::new().context("NVS init")?;
    let config = match nvs.load() {
        Ok(cfg) => {
            info!("Config loaded from NVS");
            cfg
        }
        Err(e) => {
            warn!("NVS config load failed ({}), using defaults", e);
            SystemConfig::default()
        }
    };
    diagnostics::report_previous_restarts(&nvs);

    // ── 3. Device identity ────────────────────────────────────
    let mac = device_id::read_mac();
    let dev_id = device_id::resolve_device_id(&config.device_id, &mac);
    info!("Device ID: {}", dev_id);

    // ── 4. Shared state + presentation ────────────────────────
    let store = Arc::new(SharedReadingStore::new(Duration::from_millis(u64::from(
        config.store_lock_timeout_ms,
    ))));
    let presenter = Arc::new(ScreenPresenter::new(LogSurface::new()));
    presenter.splash();

    // ── 5. Peripherals ────────────────────────────────────────
    let peripherals = Peripherals::take()?;
    let sysloop = EspSystemEventLoop::take()?;
    let nvs_partition = EspDefaultNvsPartition::take()?;
    let time = Esp32TimeAdapter::new();

    let mut data_pin = PinDriver::input_output_od(peripherals.pins.gpio22)?;
    data_pin.set_pull(Pull::Up)?;
    data_pin.set_high()?;
    info!("DHT11: data line on GPIO {}", pins::DHT11_DATA_GPIO);
    let sensor = Dht11::new(data_pin, Ets, time);

    let transport = WifiTransport::new(peripherals.modem, sysloop, nvs_partition, &config.network)?;

    // ── 6. Acquisition task (APP core) ────────────────────────
    let acquisition = AcquisitionLoop::new(AcquisitionSettings::from(&config), Arc::clone(&store));
    let acq_presenter = Arc::clone(&presenter);
    let restarter = SystemRestart::new(nvs, time);
    let acq_period = config.acquisition_period_ms;
    let _acq = spawn_on_core(ACQUISITION_TASK, move || {
        let watchdog = Watchdog::new(Watchdog::timeout_for_period(acq_period));
        acquisition.run(sensor, FreeRtos, acq_presenter, restarter, &time, &watchdog)
    })
    .context("spawn acquisition task")?;

    // ── 7. Transmission task (PRO core) ───────────────────────
    let mut tx_settings = TransmissionSettings::from(&config);
    tx_settings.device_id = dev_id;
    let transmission = TransmissionLoop::new(tx_settings, Arc::clone(&store));
    let tx_presenter = Arc::clone(&presenter);
    let _tx = spawn_on_core(TRANSMISSION_TASK, move || {
        transmission.run(transport, tx_presenter, &time)
    })
    .context("spawn transmission task")?;

    info!("Main: loops running");

    // ── 8. Park ───────────────────────────────────────────────
    // Both loops diverge; the main task only has to stay alive so the
    // spawned threads' stacks are not reclaimed.
    loop {
        std::thread::park();
        error!("Main: unexpected unpark");
    }
}

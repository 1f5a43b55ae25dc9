//! Deterministic harness for driving the generator state machine: a fixed
//! clock, scripted telemetry, and a recording remote switch.

#![allow(dead_code)]

use chrono::{DateTime, Duration, Utc};
use std::collections::HashMap;
use std::sync::{Arc, Mutex};
use talos::clock::Clock;
use talos::config::Config;
use talos::driver::{DeviceError, DriverCommand, GensetDriver};
use talos::relay::RemoteSwitch;
use talos::settings::SettingsStore;
use talos::telemetry::{ServiceInfo, TelemetrySource};
use tokio::sync::mpsc;

pub const VEBUS: &str = "com.victronenergy.vebus.ttyO1";
pub const SYSTEM: &str = "com.victronenergy.system";
pub const SETTINGS: &str = "com.victronenergy.settings";

/// Manually advanced clock state
pub struct ClockState {
    mono: Mutex<f64>,
    wall: Mutex<DateTime<Utc>>,
}

impl ClockState {
    pub fn new(start_mono: f64, wall: DateTime<Utc>) -> Arc<Self> {
        Arc::new(Self {
            mono: Mutex::new(start_mono),
            wall: Mutex::new(wall),
        })
    }

    pub fn advance(&self, secs: f64) {
        *self.mono.lock().unwrap() += secs;
        let mut wall = self.wall.lock().unwrap();
        *wall += Duration::milliseconds((secs * 1000.0) as i64);
    }
}

pub struct SharedClock(pub Arc<ClockState>);

impl Clock for SharedClock {
    fn monotonic_secs(&self) -> f64 {
        *self.0.mono.lock().unwrap()
    }

    fn now_utc(&self) -> DateTime<Utc> {
        *self.0.wall.lock().unwrap()
    }
}

/// Scripted telemetry values plus a log of fire-and-forget writes
#[derive(Default)]
pub struct TelemetryState {
    values: Mutex<HashMap<(String, String), serde_json::Value>>,
    writes: Mutex<Vec<(String, String, f64)>>,
    services: Mutex<Vec<ServiceInfo>>,
}

impl TelemetryState {
    pub fn new() -> Arc<Self> {
        Arc::new(Self::default())
    }

    pub fn set(&self, service: &str, path: &str, value: f64) {
        self.values.lock().unwrap().insert(
            (service.to_string(), path.to_string()),
            serde_json::json!(value),
        );
    }

    pub fn set_text(&self, service: &str, path: &str, value: &str) {
        self.values.lock().unwrap().insert(
            (service.to_string(), path.to_string()),
            serde_json::json!(value),
        );
    }

    pub fn clear(&self, service: &str, path: &str) {
        self.values
            .lock()
            .unwrap()
            .remove(&(service.to_string(), path.to_string()));
    }

    pub fn add_service(&self, name: &str, device_instance: Option<u32>) {
        self.services.lock().unwrap().push(ServiceInfo {
            name: name.to_string(),
            device_instance,
        });
    }

    /// Last value written to a path, if any
    pub fn last_write(&self, service: &str, path: &str) -> Option<f64> {
        self.writes
            .lock()
            .unwrap()
            .iter()
            .rev()
            .find(|(s, p, _)| s == service && p == path)
            .map(|(_, _, v)| *v)
    }

    pub fn write_count(&self, service: &str, path: &str) -> usize {
        self.writes
            .lock()
            .unwrap()
            .iter()
            .filter(|(s, p, _)| s == service && p == path)
            .count()
    }
}

pub struct SharedTelemetry(pub Arc<TelemetryState>);

impl TelemetrySource for SharedTelemetry {
    fn read(&self, service: &str, path: &str) -> Option<f64> {
        self.0
            .values
            .lock()
            .unwrap()
            .get(&(service.to_string(), path.to_string()))
            .and_then(|v| v.as_f64())
    }

    fn read_text(&self, service: &str, path: &str) -> Option<String> {
        self.0
            .values
            .lock()
            .unwrap()
            .get(&(service.to_string(), path.to_string()))
            .and_then(|v| v.as_str().map(|s| s.to_string()))
    }

    fn write_async(&self, service: &str, path: &str, value: f64) {
        self.0
            .writes
            .lock()
            .unwrap()
            .push((service.to_string(), path.to_string(), value));
    }

    fn list_services(&self) -> Vec<ServiceInfo> {
        self.0.services.lock().unwrap().clone()
    }
}

/// Recording remote switch with an injectable fault
#[derive(Default)]
pub struct SwitchState {
    pub on: bool,
    pub fault: Option<DeviceError>,
    pub commands: Vec<bool>,
}

pub struct MockSwitch(pub Arc<Mutex<SwitchState>>);

impl RemoteSwitch for MockSwitch {
    fn switch_state(&self) -> bool {
        self.0.lock().unwrap().on
    }

    fn set_switch_state(&mut self, on: bool) {
        let mut state = self.0.lock().unwrap();
        state.on = on;
        state.commands.push(on);
    }

    fn fault(&self) -> DeviceError {
        self.0.lock().unwrap().fault.unwrap_or(DeviceError::None)
    }
}

/// A fully wired driver over the fakes
pub struct Harness {
    pub clock: Arc<ClockState>,
    pub telemetry: Arc<TelemetryState>,
    pub switch: Arc<Mutex<SwitchState>>,
    pub driver: GensetDriver,
    pub commands_tx: mpsc::UnboundedSender<DriverCommand>,
    _settings_dir: tempfile::TempDir,
}

impl Harness {
    pub fn new() -> Self {
        Self::at(0.0, default_wall())
    }

    pub fn at(start_mono: f64, wall: DateTime<Utc>) -> Self {
        let settings_dir = tempfile::tempdir().unwrap();
        let settings_path = settings_dir
            .path()
            .join("settings.json")
            .to_string_lossy()
            .to_string();

        let config = Config {
            settings_file: settings_path.clone(),
            ..Config::default()
        };
        let settings = SettingsStore::new(&settings_path);

        let clock = ClockState::new(start_mono, wall);
        let telemetry = TelemetryState::new();
        let switch = Arc::new(Mutex::new(SwitchState::default()));

        let (commands_tx, commands_rx) = mpsc::unbounded_channel();
        let driver = GensetDriver::with_parts(
            config,
            settings,
            Arc::new(SharedTelemetry(Arc::clone(&telemetry))),
            Box::new(MockSwitch(Arc::clone(&switch))),
            Box::new(SharedClock(Arc::clone(&clock))),
            commands_rx,
            commands_tx.clone(),
        );

        Self {
            clock,
            telemetry,
            switch,
            driver,
            commands_tx,
            _settings_dir: settings_dir,
        }
    }

    /// Wire up a healthy single-Multi system: generator on AC input 1,
    /// vebus present, the generator recognized as the active AC source.
    pub fn with_generator_system(self) -> Self {
        self.telemetry
            .set(SETTINGS, "/Settings/SystemSetup/AcInput1", 2.0);
        self.telemetry.set(SYSTEM, "/Ac/In/NumberOfAcInputs", 1.0);
        self.telemetry.set_text(SYSTEM, "/VebusService", VEBUS);
        self.telemetry.set(VEBUS, "/Ac/ActiveIn/Connected", 1.0);
        self.telemetry.set(SYSTEM, "/Ac/ActiveIn/Source", 2.0);
        self
    }

    pub fn set_soc(&self, soc: f64) {
        self.telemetry.set(SYSTEM, "/Dc/Battery/Soc", soc);
    }

    pub fn switch_is_on(&self) -> bool {
        self.switch.lock().unwrap().on
    }

    /// Advance the clock and run ticks at a 1 s cadence
    pub fn run_ticks(&mut self, n: u64) {
        for _ in 0..n {
            self.clock.advance(1.0);
            self.driver.tick();
        }
    }
}

fn default_wall() -> DateTime<Utc> {
    DateTime::parse_from_rfc3339("2026-03-10T12:00:00Z")
        .unwrap()
        .with_timezone(&Utc)
}

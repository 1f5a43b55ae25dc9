//! Core driver logic for Talos
//!
//! The driver owns the generator state machine and orchestrates condition
//! evaluation, test-run scheduling, runtime accounting and alarm tracking.
//! An external 1 s timer drives `tick()`; every read inside a tick is a
//! non-blocking telemetry lookup and every output write is fire-and-forget.

mod commands;
mod machine;
mod snapshot;
mod tick;
mod types;

pub use types::{DeviceError, DriverCommand, GeneratorState, RunReason, StatusSnapshot};

use crate::alarms::AlarmMonitor;
use crate::clock::{Clock, SystemClock};
use crate::conditions::ConditionRegistry;
use crate::config::Config;
use crate::dbus::{DbusMonitor, DbusService};
use crate::error::Result;
use crate::logging::get_logger;
use crate::relay::{RemoteSwitch, SystemRelay};
use crate::runtime::RuntimeAccountant;
use crate::scheduler::TestRunScheduler;
use crate::settings::SettingsStore;
use crate::telemetry::{BATTERY_PREFIX, Battery, SYSTEM_SERVICE, TelemetrySource};
use chrono_tz::Tz;
use std::sync::Arc;
use tokio::sync::mpsc;
use tokio::time::{Duration, interval};

/// Fixed delay between dropping the relay and restoring AC-input load,
/// giving the engine time to actually coast to a stop
pub(crate) const WAIT_FOR_ENGINE_STOP: f64 = 15.0;

/// Main driver for Talos
pub struct GensetDriver {
    /// Configuration
    config: Config,

    /// Logger with context
    logger: crate::logging::StructuredLogger,

    /// Settings store shared with the GUI
    pub(crate) settings: SettingsStore,

    /// Telemetry reads and fire-and-forget writes
    pub(crate) telemetry: Arc<dyn TelemetrySource>,

    /// Generator start relay
    pub(crate) switch: Box<dyn RemoteSwitch>,

    /// Monotonic and wall clocks
    pub(crate) clock: Box<dyn Clock>,

    /// D-Bus status service, absent until `run` or in tests
    dbus: Option<DbusService>,

    /// Timezone for calendar arithmetic
    pub(crate) tz: Tz,

    pub(crate) conditions: ConditionRegistry,
    pub(crate) scheduler: TestRunScheduler,
    pub(crate) runtime: RuntimeAccountant,
    pub(crate) alarms: AlarmMonitor,

    pub(crate) state: GeneratorState,
    pub(crate) run_reason: RunReason,
    pub(crate) device_error: DeviceError,
    pub(crate) error_logged: bool,

    /// Monotonic timestamp taken at the start of the current tick
    pub(crate) current_time: f64,
    pub(crate) warmup_end_time: f64,
    pub(crate) cooldown_end_time: f64,
    pub(crate) post_cooldown_end_time: f64,
    /// Monotonic timestamp at which the current run began
    pub(crate) start_time: f64,
    /// Published current-run seconds
    pub(crate) runtime_secs: i64,

    pub(crate) manual_start: bool,
    pub(crate) manual_start_timer: i64,
    pub(crate) manual_timer_mark: Option<f64>,

    /// UTC-midnight key of the last day rollover
    pub(crate) last_counters_check: i64,
    pub(crate) quiet_hours: bool,

    pub(crate) ac1_is_ignored: bool,
    pub(crate) ac2_is_ignored: bool,
    /// Physical AC input currently wired to the generator (0 = none)
    pub(crate) generator_ac_input: u8,
    /// The active AC source is recognized as the generator this tick
    pub(crate) ac_in_is_generator: bool,

    pub(crate) vebus_service: Option<String>,
    /// Resolved battery source as (service, value prefix)
    pub(crate) battery_service: Option<(String, String)>,

    // Derived values published on the status surface
    pub(crate) today_runtime: i64,
    pub(crate) interval_runtime: i64,
    pub(crate) accumulated_total: i64,
    pub(crate) service_counter: Option<i64>,
    pub(crate) next_test_run: Option<i64>,
    pub(crate) skip_test_run: Option<bool>,

    commands_rx: mpsc::UnboundedReceiver<DriverCommand>,
    commands_tx: mpsc::UnboundedSender<DriverCommand>,
    shutdown_tx: mpsc::UnboundedSender<()>,
    shutdown_rx: mpsc::UnboundedReceiver<()>,
}

impl GensetDriver {
    /// Create a production driver instance bound to D-Bus
    pub async fn new(
        commands_rx: mpsc::UnboundedReceiver<DriverCommand>,
        commands_tx: mpsc::UnboundedSender<DriverCommand>,
    ) -> Result<Self> {
        let config = Config::load().inspect_err(|e| {
            eprintln!("Failed to load configuration: {}", e);
        })?;
        config.validate()?;

        // Initialize logging
        crate::logging::init_logging(&config.logging)?;
        let logger = get_logger("driver");
        logger.info("Initializing generator start/stop driver");

        let mut settings = SettingsStore::new(&config.settings_file);
        if let Err(e) = settings.load() {
            logger.warn(&format!("Settings load failed, using defaults: {}", e));
        }

        let telemetry: Arc<dyn TelemetrySource> =
            match DbusMonitor::connect(crate::dbus::monitored_tree()).await {
                Ok(monitor) => monitor,
                Err(e) if !config.require_dbus => {
                    logger.warn(&format!("D-Bus unavailable ({}), running detached", e));
                    DbusMonitor::disconnected()
                }
                Err(e) => return Err(e),
            };

        let switch = Box::new(SystemRelay::new(
            Arc::clone(&telemetry),
            &config.relay.service,
            &config.relay.path,
        ));
        let clock = Box::new(SystemClock::new());

        Ok(Self::with_parts(
            config,
            settings,
            telemetry,
            switch,
            clock,
            commands_rx,
            commands_tx,
        ))
    }

    /// Assemble a driver from explicit parts. Used by `new` and by the
    /// deterministic test harness.
    pub fn with_parts(
        config: Config,
        settings: SettingsStore,
        telemetry: Arc<dyn TelemetrySource>,
        switch: Box<dyn RemoteSwitch>,
        clock: Box<dyn Clock>,
        commands_rx: mpsc::UnboundedReceiver<DriverCommand>,
        commands_tx: mpsc::UnboundedSender<DriverCommand>,
    ) -> Self {
        let (shutdown_tx, shutdown_rx) = mpsc::unbounded_channel();
        let tz = config.tz();
        let now_mono = clock.monotonic_secs();

        Self {
            logger: get_logger("driver"),
            settings,
            telemetry,
            switch,
            clock,
            dbus: None,
            tz,
            conditions: ConditionRegistry::new(),
            scheduler: TestRunScheduler::new(tz),
            runtime: RuntimeAccountant::new(),
            alarms: AlarmMonitor::new(now_mono),
            state: GeneratorState::Stopped,
            run_reason: RunReason::Stopped,
            device_error: DeviceError::None,
            error_logged: false,
            current_time: now_mono,
            warmup_end_time: 0.0,
            cooldown_end_time: 0.0,
            post_cooldown_end_time: 0.0,
            start_time: 0.0,
            runtime_secs: 0,
            manual_start: false,
            manual_start_timer: 0,
            manual_timer_mark: None,
            last_counters_check: 0,
            quiet_hours: false,
            ac1_is_ignored: false,
            ac2_is_ignored: false,
            generator_ac_input: 0,
            ac_in_is_generator: false,
            vebus_service: None,
            battery_service: None,
            today_runtime: 0,
            interval_runtime: 0,
            accumulated_total: 0,
            service_counter: None,
            next_test_run: None,
            skip_test_run: None,
            commands_rx,
            commands_tx,
            shutdown_tx,
            shutdown_rx,
            config,
        }
    }

    /// Run the driver main loop
    pub async fn run(&mut self) -> Result<()> {
        self.logger.info("Starting generator start/stop main loop");

        let mut dbus =
            DbusService::new(self.config.device_instance, self.commands_tx.clone()).await?;
        match dbus.start().await {
            Ok(()) => {
                self.register_status_paths(&mut dbus).await;
                self.dbus = Some(dbus);
            }
            Err(e) if !self.config.require_dbus => {
                self.logger
                    .warn(&format!("Status service unavailable ({}), continuing", e));
            }
            Err(e) => return Err(e),
        }

        // Take control of the remote switch. A crash during warm-up or
        // cool-down may have left the Multi ignoring an AC input, so force
        // the ignore flags to a sane value on startup.
        self.update_remote_switch();
        if self.settings.get_float("cooldowntime") > 0.0
            || self.settings.get_float("warmuptime") > 0.0
        {
            self.set_ignore_ac(1, false);
            self.set_ignore_ac(2, false);
        }
        self.update_accumulated_time();

        let mut tick_interval = interval(Duration::from_millis(self.config.tick_interval_ms));

        loop {
            tokio::select! {
                _ = tick_interval.tick() => {
                    self.tick();
                    self.publish_status().await;
                }
                Some(cmd) = self.commands_rx.recv() => {
                    self.handle_command(cmd);
                }
                _ = self.shutdown_rx.recv() => {
                    self.logger.info("Shutdown signal received");
                    break;
                }
            }
        }

        self.disable().await;
        Ok(())
    }

    /// Release the remote switch control point and drop derived outputs
    pub async fn disable(&mut self) {
        self.logger
            .info("Disabling auto start/stop, releasing control of remote switch");
        self.ignore_ac(false);
        if let Some(mut dbus) = self.dbus.take()
            && let Err(e) = dbus.stop().await
        {
            self.logger.warn(&format!("Status service stop failed: {}", e));
        }
    }

    /// Request shutdown
    pub fn request_shutdown(&self) {
        self.shutdown_tx.send(()).ok();
    }

    /// Sender that triggers a shutdown when signalled
    pub fn shutdown_handle(&self) -> mpsc::UnboundedSender<()> {
        self.shutdown_tx.clone()
    }

    /// Get configuration reference
    pub fn config(&self) -> &Config {
        &self.config
    }

    /// Current generator state
    pub fn state(&self) -> GeneratorState {
        self.state
    }

    /// Reason the generator is currently running
    pub fn run_reason(&self) -> RunReason {
        self.run_reason
    }

    /// Settings handle (the GUI normally edits these over D-Bus)
    pub fn settings(&self) -> &SettingsStore {
        &self.settings
    }

    /// Mutable settings handle
    pub fn settings_mut(&mut self) -> &mut SettingsStore {
        &mut self.settings
    }

    /// Current ignore state of the two AC inputs
    pub fn ac_ignore_flags(&self) -> (bool, bool) {
        (self.ac1_is_ignored, self.ac2_is_ignored)
    }

    async fn publish_status(&mut self) {
        let snapshot = self.build_status_snapshot();
        if let Some(dbus) = &mut self.dbus
            && let Err(e) = dbus.update_paths(Self::status_paths(&snapshot)).await
        {
            self.logger
                .warn(&format!("Failed to publish status: {}", e));
        }
    }

    /// Track the vebus service selected by systemcalc and the configured
    /// battery source. Either can change at runtime.
    pub(crate) fn refresh_services(&mut self) {
        let vebus = self
            .telemetry
            .read_text(SYSTEM_SERVICE, "/VebusService")
            .filter(|s| !s.is_empty() && s != "---");
        if vebus != self.vebus_service {
            match &vebus {
                Some(name) => self.logger.info(&format!(
                    "Vebus service ({}) found, using it for generator start/stop",
                    name
                )),
                None => self
                    .logger
                    .info("Vebus service disappeared, stop evaluating related conditions"),
            }
            self.vebus_service = vebus;
        }

        let selection = self.settings.get_string("batterymeasurement");
        let resolved = self.resolve_battery_service(&selection);
        if resolved != self.battery_service {
            match &resolved {
                Some((service, _)) => self.logger.info(&format!(
                    "Battery service ({}) found, using it for generator start/stop",
                    service
                )),
                None if selection == "nobattery" => self
                    .logger
                    .info("Battery monitoring disabled, stop evaluating related conditions"),
                None => self.logger.info("Error getting battery service"),
            }
            self.battery_service = resolved;
            self.conditions.revalidate_battery_conditions();
        }
    }

    /// Map the `batterymeasurement` setting to a concrete service and prefix
    fn resolve_battery_service(&self, selection: &str) -> Option<(String, String)> {
        match selection {
            "default" => Some((SYSTEM_SERVICE.to_string(), BATTERY_PREFIX.to_string())),
            "nobattery" | "" => None,
            custom => {
                // e.g. "com_victronenergy_battery_288/Dc/0": device instance
                // 288 with the value prefix /Dc/0
                let (head, prefix) = custom.split_once('/')?;
                let instance: u32 = head.rsplit('_').next()?.parse().ok()?;
                let service_type = if head.contains("vebus") {
                    "vebus"
                } else {
                    "battery"
                };
                let service = self
                    .telemetry
                    .list_services()
                    .into_iter()
                    .find(|s| s.name.contains(service_type) && s.device_instance == Some(instance))?;
                Some((service.name, format!("/{}", prefix)))
            }
        }
    }

    /// View over the currently selected battery source
    pub(crate) fn battery(&self) -> Option<Battery> {
        self.battery_service
            .as_ref()
            .map(|(service, prefix)| Battery::new(Arc::clone(&self.telemetry), service, prefix))
    }

    async fn register_status_paths(&self, dbus: &mut DbusService) {
        let writable = [
            "/ManualStart",
            "/ManualStartTimer",
            "/AutoStartEnabled",
            "/ServiceCounterReset",
        ];
        let read_only = [
            "/State",
            "/RunningByCondition",
            "/RunningByConditionCode",
            "/Error",
            "/Runtime",
            "/TodayRuntime",
            "/AccumulatedRuntime",
            "/TestRunIntervalRuntime",
            "/NextTestRun",
            "/SkipTestRun",
            "/QuietHours",
            "/ServiceCounter",
            "/Alarms/NoGeneratorAtAcIn",
            "/Alarms/ServiceIntervalExceeded",
            "/Alarms/AutoStartDisabled",
        ];
        for path in read_only {
            let _ = dbus.ensure_item(path, serde_json::json!(0), false).await;
        }
        for path in writable {
            let _ = dbus.ensure_item(path, serde_json::json!(0), true).await;
        }

        let _ = dbus
            .ensure_item("/Mgmt/ProcessName", serde_json::json!("talos"), false)
            .await;
        let _ = dbus
            .ensure_item(
                "/Mgmt/ProcessVersion",
                serde_json::json!(env!("APP_VERSION")),
                false,
            )
            .await;
        let _ = dbus
            .ensure_item("/Mgmt/Connection", serde_json::json!("D-Bus"), false)
            .await;
        let _ = dbus
            .ensure_item(
                "/DeviceInstance",
                serde_json::json!(self.config.device_instance),
                false,
            )
            .await;
        let _ = dbus
            .ensure_item(
                "/ProductName",
                serde_json::json!("Generator start/stop"),
                false,
            )
            .await;
        let _ = dbus
            .ensure_item("/Connected", serde_json::json!(1), false)
            .await;
        let _ = dbus
            .ensure_item(
                "/GensetService",
                serde_json::json!(self.config.relay.service.clone()),
                false,
            )
            .await;
        let _ = dbus
            .ensure_item(
                "/AutoStartEnabled",
                serde_json::json!(self.settings.get_int("autostart")),
                true,
            )
            .await;
    }
}

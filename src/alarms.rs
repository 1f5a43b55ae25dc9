//! Sticky alarm tracking
//!
//! Three independent alarms: generator expected but not detected at the AC
//! input, service interval used up, and autostart left disabled. Alarms are
//! published as 0 (clear) or 2 (active).

use crate::conditions::RETRY_LIMIT;
use crate::logging::get_logger;

/// Seconds autostart may stay disabled before the matching alarm raises
pub const AUTOSTART_DISABLED_ALARM_TIME: f64 = 600.0;

/// Published alarm value
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum AlarmState {
    #[default]
    Ok,
    Alarm,
}

impl AlarmState {
    pub fn code(self) -> u32 {
        match self {
            AlarmState::Ok => 0,
            AlarmState::Alarm => 2,
        }
    }
}

/// Per-tick generator detection outcome fed by the state machine
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum GeneratorDetection {
    /// Generator stopped, nothing to detect
    Stopped,
    /// The inverter does not report its active input; skip this tick
    Unsupported,
    /// The active AC input carries generator power
    Detected,
    /// The generator should be feeding the input but is not seen there
    NotDetected,
}

/// Tracks the three sticky alarms
pub struct AlarmMonitor {
    pub no_generator_at_ac_in: AlarmState,
    pub service_interval_exceeded: AlarmState,
    pub auto_start_disabled: AlarmState,
    detection_timeout: u32,
    unable_to_start: bool,
    autostart_last_enabled: f64,
    logger: crate::logging::StructuredLogger,
}

impl AlarmMonitor {
    pub fn new(now_mono: f64) -> Self {
        Self {
            no_generator_at_ac_in: AlarmState::Ok,
            service_interval_exceeded: AlarmState::Ok,
            auto_start_disabled: AlarmState::Ok,
            detection_timeout: 0,
            unable_to_start: false,
            autostart_last_enabled: now_mono,
            logger: get_logger("alarms"),
        }
    }

    /// Process this tick's generator-at-AC-input detection. The alarm only
    /// raises after the detection failed continuously for [`RETRY_LIMIT`]
    /// ticks, and only while the feature is enabled.
    pub fn update_generator_detection(
        &mut self,
        feature_enabled: bool,
        detection: GeneratorDetection,
    ) {
        if !feature_enabled {
            self.reset_detection();
            return;
        }

        match detection {
            GeneratorDetection::Stopped => self.reset_detection(),
            GeneratorDetection::Unsupported => {}
            GeneratorDetection::Detected => {
                if self.unable_to_start {
                    self.logger
                        .info("Generator detected at inverter AC input, alarm removed");
                }
                self.reset_detection();
            }
            GeneratorDetection::NotDetected => {
                if self.detection_timeout < RETRY_LIMIT {
                    self.detection_timeout += 1;
                }
                if self.detection_timeout >= RETRY_LIMIT && !self.unable_to_start {
                    self.unable_to_start = true;
                    self.no_generator_at_ac_in = AlarmState::Alarm;
                    self.logger
                        .info("Generator not detected at inverter AC input, triggering alarm");
                }
            }
        }
    }

    /// Clear detection bookkeeping and the alarm
    pub fn reset_detection(&mut self) {
        self.detection_timeout = 0;
        self.unable_to_start = false;
        self.no_generator_at_ac_in = AlarmState::Ok;
    }

    /// Raise or clear the service alarm at the interval's zero crossing
    pub fn set_service_interval_exceeded(&mut self, exceeded: bool) {
        self.service_interval_exceeded = if exceeded {
            AlarmState::Alarm
        } else {
            AlarmState::Ok
        };
    }

    /// Track how long autostart has been administratively disabled
    pub fn update_autostart_disabled(
        &mut self,
        autostart_enabled: bool,
        alarm_enabled: bool,
        now_mono: f64,
    ) {
        if autostart_enabled || !alarm_enabled {
            self.autostart_last_enabled = now_mono;
            self.auto_start_disabled = AlarmState::Ok;
            return;
        }

        let disabled_for = now_mono - self.autostart_last_enabled;
        if disabled_for > AUTOSTART_DISABLED_ALARM_TIME
            && self.auto_start_disabled != AlarmState::Alarm
        {
            self.logger.info(&format!(
                "Autostart was left disabled for more than {} seconds, triggering alarm",
                disabled_for as i64
            ));
            self.auto_start_disabled = AlarmState::Alarm;
        }
    }
}

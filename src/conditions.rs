//! Start/stop condition framework
//!
//! Each condition monitors one quantity (SOC, AC load, battery current,
//! battery voltage, inverter alarms, AC-input availability) against a
//! start/stop threshold pair with optional dwell timers. A condition that
//! cannot be read keeps retrying for a bounded number of ticks before it is
//! marked invalid, which frees the slot for other start conditions and feeds
//! the communication-lost policy upstream.

use crate::logging::get_logger;

/// Consecutive missing-value reads tolerated before a condition is
/// invalidated. One tick per retry.
pub const RETRY_LIMIT: u32 = 300;

/// Which external domain a condition monitors
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum MonitoringDomain {
    /// Battery monitor (direct service or system aggregate)
    Battery,
    /// Inverter/charger (vebus) service
    Inverter,
}

/// The fixed, closed set of monitored conditions
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ConditionKind {
    Soc,
    AcLoad,
    BatteryCurrent,
    BatteryVoltage,
    InverterHighTemp,
    InverterOverload,
    StopOnAc1,
    StopOnAc2,
}

impl ConditionKind {
    /// Evaluation priority. The first condition whose `reached` flips true
    /// names the start reason, so this order is part of the contract.
    pub const EVALUATION_ORDER: [ConditionKind; 8] = [
        ConditionKind::Soc,
        ConditionKind::AcLoad,
        ConditionKind::BatteryCurrent,
        ConditionKind::BatteryVoltage,
        ConditionKind::InverterHighTemp,
        ConditionKind::InverterOverload,
        ConditionKind::StopOnAc1,
        ConditionKind::StopOnAc2,
    ];

    /// The analog/inverter conditions, excluding the stop-on-AC overrides
    pub const VALUE_CONDITIONS: [ConditionKind; 6] = [
        ConditionKind::Soc,
        ConditionKind::AcLoad,
        ConditionKind::BatteryCurrent,
        ConditionKind::BatteryVoltage,
        ConditionKind::InverterHighTemp,
        ConditionKind::InverterOverload,
    ];

    /// Settings key stem and log name
    pub fn name(self) -> &'static str {
        match self {
            ConditionKind::Soc => "soc",
            ConditionKind::AcLoad => "acload",
            ConditionKind::BatteryCurrent => "batterycurrent",
            ConditionKind::BatteryVoltage => "batteryvoltage",
            ConditionKind::InverterHighTemp => "inverterhightemp",
            ConditionKind::InverterOverload => "inverteroverload",
            ConditionKind::StopOnAc1 => "stoponac1",
            ConditionKind::StopOnAc2 => "stoponac2",
        }
    }

    pub fn monitoring(self) -> MonitoringDomain {
        match self {
            ConditionKind::Soc | ConditionKind::BatteryCurrent | ConditionKind::BatteryVoltage => {
                MonitoringDomain::Battery
            }
            _ => MonitoringDomain::Inverter,
        }
    }

    /// Boolean conditions use the implicit thresholds start=1 / stop=0
    pub fn is_boolean(self) -> bool {
        matches!(
            self,
            ConditionKind::InverterHighTemp
                | ConditionKind::InverterOverload
                | ConditionKind::StopOnAc1
                | ConditionKind::StopOnAc2
        )
    }

    /// Timed conditions confirm start/stop only after a dwell period
    pub fn is_timed(self) -> bool {
        !matches!(
            self,
            ConditionKind::Soc | ConditionKind::StopOnAc1 | ConditionKind::StopOnAc2
        )
    }
}

/// Per-tick evaluation parameters, resolved from settings by the caller
/// (quiet hours swap in the `qh_` threshold namespace).
#[derive(Debug, Clone, Copy)]
pub struct EvalParams {
    pub enabled: bool,
    pub start_value: f64,
    pub stop_value: f64,
    /// Seconds the start test must hold before confirming
    pub start_timer: f64,
    /// Seconds the stop test must hold before clearing
    pub stop_timer: f64,
    /// False when the monitored domain has no selected source (e.g. battery
    /// monitoring disabled); the condition is then reset, not retried.
    pub monitor_available: bool,
}

impl Default for EvalParams {
    fn default() -> Self {
        Self {
            enabled: true,
            start_value: 1.0,
            stop_value: 0.0,
            start_timer: 0.0,
            stop_timer: 0.0,
            monitor_available: true,
        }
    }
}

/// One monitored start/stop rule with hysteresis and dwell state
pub struct Condition {
    pub kind: ConditionKind,
    /// Latched decision: set by a sustained start, cleared by a sustained stop
    pub reached: bool,
    /// False after RETRY_LIMIT consecutive missing values
    pub valid: bool,
    pub enabled: bool,
    pub retries: u32,
    /// Monotonic timestamp at which the pending start dwell began
    start_timer: Option<f64>,
    /// Monotonic timestamp at which the pending stop dwell began
    stop_timer: Option<f64>,
    logger: crate::logging::StructuredLogger,
}

impl Condition {
    pub fn new(kind: ConditionKind) -> Self {
        Self {
            kind,
            reached: false,
            valid: true,
            enabled: false,
            retries: 0,
            start_timer: None,
            stop_timer: None,
            logger: get_logger("conditions"),
        }
    }

    /// Clear the latched decision and any dwell in progress
    pub fn reset(&mut self) {
        self.reached = false;
        if self.kind.is_timed() {
            self.start_timer = None;
            self.stop_timer = None;
        }
    }

    /// Evaluate one sample. Returns the new `reached` state.
    ///
    /// `now` is a monotonic timestamp in seconds used for dwell accounting.
    pub fn evaluate(&mut self, value: Option<f64>, params: &EvalParams, now: f64) -> bool {
        if !self.check_value(value, params) {
            // A start condition that latched before the outage stays latched
            // while retries are still being attempted.
            if self.reached && self.retries > 0 && self.retries <= RETRY_LIMIT {
                return true;
            }
            return false;
        }

        let Some(value) = value else {
            return false;
        };

        let (start_value, stop_value) = if self.kind.is_boolean() {
            (1.0, 0.0)
        } else {
            (params.start_value, params.stop_value)
        };

        // The threshold pair determines the comparison direction: a start
        // above the stop means "start high, stop low" and vice versa.
        let start_is_greater = start_value > stop_value;

        // Once reached, only the stop threshold can clear the decision.
        let mut start = self.reached
            || if start_is_greater {
                value >= start_value
            } else {
                value <= start_value
            };
        let mut stop = if start_is_greater {
            value <= stop_value
        } else {
            value >= stop_value
        };

        if self.kind.is_timed() {
            if !self.reached && start {
                let began = *self.start_timer.get_or_insert(now);
                start = now - began >= params.start_timer;
                if start {
                    self.stop_timer = None;
                }
            } else {
                self.start_timer = None;
            }

            if self.reached && stop {
                let began = *self.stop_timer.get_or_insert(now);
                stop = now - began >= params.stop_timer;
                if stop {
                    self.stop_timer = None;
                }
            } else {
                self.stop_timer = None;
            }
        }

        self.reached = start && !stop;
        self.reached
    }

    /// Administrative and retry bookkeeping shared by every evaluation.
    /// Returns true when the sampled value should be compared to thresholds.
    fn check_value(&mut self, value: Option<f64>, params: &EvalParams) -> bool {
        let name = self.kind.name();

        if !params.enabled {
            if self.enabled {
                self.enabled = false;
                self.logger.info(&format!("Disabling ({}) condition", name));
                self.retries = 0;
                self.valid = true;
                self.reset();
            }
            return false;
        } else if !self.enabled {
            self.enabled = true;
            self.logger.info(&format!("Enabling ({}) condition", name));
        }

        if !params.monitor_available {
            // No monitor selected for this domain: suspend without retrying
            self.reset();
            return false;
        }

        match value {
            None if self.valid => {
                self.retries += 1;
                if self.retries >= RETRY_LIMIT {
                    self.logger.info(&format!(
                        "Error getting ({}) value, skipping evaluation till a valid value arrives",
                        name
                    ));
                    self.reset();
                    self.valid = false;
                } else if self.retries == 1 || self.retries % 10 == 0 {
                    self.logger.info(&format!(
                        "Error getting ({}) value, retrying(#{})",
                        name, self.retries
                    ));
                }
                false
            }
            None => false,
            Some(_) => {
                if !self.valid || self.retries > 0 {
                    self.logger.info(&format!(
                        "Success getting ({}) value, resuming evaluation",
                        name
                    ));
                    self.valid = true;
                    self.retries = 0;
                }
                true
            }
        }
    }
}

/// Fixed, priority-ordered collection of all conditions
pub struct ConditionRegistry {
    conditions: Vec<Condition>,
}

impl ConditionRegistry {
    pub fn new() -> Self {
        Self {
            conditions: ConditionKind::EVALUATION_ORDER
                .iter()
                .map(|&kind| Condition::new(kind))
                .collect(),
        }
    }

    pub fn get(&self, kind: ConditionKind) -> &Condition {
        // EVALUATION_ORDER covers every variant, so the lookup cannot miss
        match self.conditions.iter().find(|c| c.kind == kind) {
            Some(condition) => condition,
            None => unreachable!("registry holds every condition kind"),
        }
    }

    pub fn get_mut(&mut self, kind: ConditionKind) -> &mut Condition {
        match self.conditions.iter_mut().find(|c| c.kind == kind) {
            Some(condition) => condition,
            None => unreachable!("registry holds every condition kind"),
        }
    }

    pub fn iter_mut(&mut self) -> impl Iterator<Item = &mut Condition> {
        self.conditions.iter_mut()
    }

    /// True when any enabled condition has exhausted its retry budget
    pub fn communication_lost(&self) -> bool {
        self.conditions
            .iter()
            .any(|c| c.enabled && c.retries >= RETRY_LIMIT)
    }

    /// Battery-domain conditions resume evaluation after the monitored
    /// battery service changed.
    pub fn revalidate_battery_conditions(&mut self) {
        for condition in &mut self.conditions {
            if condition.kind.monitoring() == MonitoringDomain::Battery {
                condition.valid = true;
                condition.retries = 0;
            }
        }
    }
}

impl Default for ConditionRegistry {
    fn default() -> Self {
        Self::new()
    }
}

use super::{GensetDriver, GeneratorState, RunReason};
use crate::conditions::{ConditionKind, EvalParams, MonitoringDomain};
use crate::scheduler::{TestRunInputs, quiet_hours_active};
use crate::telemetry::{SYSTEM_SERVICE, present_sum, safe_max};
use chrono::{TimeZone, Timelike, Utc};

impl GensetDriver {
    /// One decision pass, driven externally once per second. Never blocks and
    /// never aborts past partial failures; there is always more state to
    /// update this period.
    pub fn tick(&mut self) {
        self.refresh_generator_ac_input();
        self.current_time = self.clock.monotonic_secs();
        self.refresh_services();
        self.check_remote_status();
        self.evaluate_startstop_conditions();
        self.evaluate_autostart_disabled_alarm();
        self.detect_generator_at_acinput();

        // Shed load on the generator's AC input during warm-up and the whole
        // wind-down, restore it everywhere else. An external transfer switch
        // can move the generator to another input mid-run, so this is
        // re-applied every pass rather than on state entry.
        let state = self.state;
        self.ignore_ac(state.sheds_ac_load());

        // Re-arm the cool-down window while the generator carries the load
        if state == GeneratorState::Running && self.ac_in_is_generator {
            self.cooldown_end_time = self.current_time + self.settings.get_float("cooldowntime");
        }
    }

    pub(crate) fn evaluate_startstop_conditions(&mut self) {
        if self.device_error != super::DeviceError::None {
            // First evaluation after a fault: freeze the state machine
            if !self.error_logged {
                self.error_logged = true;
                self.state = GeneratorState::Error;
                self.logger.info(&format!(
                    "Error: #{} - {}, stop controlling remote switch",
                    self.device_error.code(),
                    self.device_error.description()
                ));
            }
        } else if self.error_logged {
            // Fault cleared: resume from whatever the relay is physically doing
            self.error_logged = false;
            self.state = if self.switch.switch_state() {
                GeneratorState::Running
            } else {
                GeneratorState::Stopped
            };
            self.logger
                .info("Error state cleared, taking control of remote switch");
        }

        let active_reason = self.run_reason;
        let today = self.today_utc_key();
        let running = matches!(
            self.state,
            GeneratorState::Running | GeneratorState::Warmup
        );

        self.check_quiet_hours();

        // New day: roll the counters while stopped
        if self.last_counters_check < today && self.state == GeneratorState::Stopped {
            self.last_counters_check = today;
            self.update_accumulated_time();
        }

        // Update current and accumulated runtime. The accumulated total is
        // only booked once per 60 s while running; stop books the remainder.
        if self.state.in_run_cycle() {
            let elapsed = self.current_time - self.start_time;
            if elapsed - self.runtime.last_update() as f64 >= 60.0 {
                self.runtime_secs = elapsed as i64;
                self.update_accumulated_time();
            } else if self.runtime.last_update() == 0 {
                self.runtime_secs = elapsed as i64;
            }
        }

        // Decisions are suspended entirely while a device fault is present
        if self.state == GeneratorState::Error {
            return;
        }

        let mut start = false;
        let mut start_reason: Option<RunReason> = None;

        if self.evaluate_manual_start() {
            start_reason = Some(RunReason::Manual);
            start = true;
        }

        // Conditions are only evaluated while autostart is enabled
        if self.settings.get_int("autostart") == 1 {
            if self.evaluate_testrun_condition() {
                start_reason = Some(RunReason::TestRun);
                start = true;
            }

            // Stop-on-AC overrides go first: when incoming AC power returns
            // the generator stops immediately, preempting every analog
            // condition. Manual and test-run starts are immune.
            let stop_on_ac1 = self.evaluate_condition(ConditionKind::StopOnAc1);
            let stop_on_ac2 = self.evaluate_condition(ConditionKind::StopOnAc2);
            let stop_by_ac = !matches!(start_reason, Some(r) if r.is_override())
                && (stop_on_ac1 || stop_on_ac2);

            if stop_by_ac && running && !active_reason.is_override() {
                self.logger.info("AC input available, stopping");
            }

            for kind in ConditionKind::VALUE_CONDITIONS {
                if stop_by_ac {
                    start = false;
                    if running {
                        self.conditions.get_mut(kind).reset();
                        continue;
                    }
                    break;
                }

                // No short-circuiting: every evaluation advances its own
                // dwell and retry state
                let reached = self.evaluate_condition(kind);
                start = reached || start;
                if start && start_reason.is_none() {
                    start_reason = Some(kind.into());
                }
            }

            // With no condition reached, a sustained communication loss may
            // still force a start or keep the generator running
            if !start && self.conditions.communication_lost() {
                let policy = self.settings.get_int("onlosscommunication");
                if policy == 1 {
                    start = true;
                    start_reason = Some(RunReason::LossOfCommunication);
                }
                if running && policy == 2 {
                    start = true;
                    start_reason = Some(RunReason::LossOfCommunication);
                }
            }
        }

        if start {
            let reason = start_reason.unwrap_or(active_reason);
            self.start_generator(reason);
        } else if self.runtime_secs >= self.settings.get_int("minimumruntime") * 60
            || active_reason == RunReason::Manual
        {
            self.stop_generator();
        }
    }

    /// Evaluate one condition against its current telemetry sample
    pub(crate) fn evaluate_condition(&mut self, kind: ConditionKind) -> bool {
        let value = self.condition_value(kind);
        let params = self.eval_params(kind);
        self.conditions
            .get_mut(kind)
            .evaluate(value, &params, self.current_time)
    }

    /// Resolve thresholds and dwell times from settings. Quiet hours swap in
    /// the `qh_` threshold namespace; dwell times are shared.
    pub(crate) fn eval_params(&self, kind: ConditionKind) -> EvalParams {
        let name = kind.name();
        let enabled = self.settings.get_int(&format!("{}enabled", name)) == 1;

        let (start_value, stop_value) = if kind.is_boolean() {
            (1.0, 0.0)
        } else {
            let prefix = if self.quiet_hours { "qh_" } else { "" };
            (
                self.settings.get_float(&format!("{}{}start", prefix, name)),
                self.settings.get_float(&format!("{}{}stop", prefix, name)),
            )
        };

        let (start_timer, stop_timer) = if kind.is_timed() {
            (
                self.settings.get_float(&format!("{}starttimer", name)),
                self.settings.get_float(&format!("{}stoptimer", name)),
            )
        } else {
            (0.0, 0.0)
        };

        let monitor_available = kind.monitoring() != MonitoringDomain::Battery
            || self.settings.get_string("batterymeasurement") != "nobattery";

        EvalParams {
            enabled,
            start_value,
            stop_value,
            start_timer,
            stop_timer,
            monitor_available,
        }
    }

    /// Current sample for a condition, `None` when unreadable
    pub(crate) fn condition_value(&self, kind: ConditionKind) -> Option<f64> {
        match kind {
            ConditionKind::Soc => self.battery()?.soc(),
            ConditionKind::AcLoad => self.ac_load_value(),
            // Monitored in the discharge direction
            ConditionKind::BatteryCurrent => self.battery()?.current().map(|c| -c),
            ConditionKind::BatteryVoltage => self.battery()?.voltage(),
            ConditionKind::InverterHighTemp => self.inverter_alarm_value("HighTemperature"),
            ConditionKind::InverterOverload => self.inverter_alarm_value("Overload"),
            ConditionKind::StopOnAc1 => self.ac_input_available(1),
            ConditionKind::StopOnAc2 => self.ac_input_available(2),
        }
    }

    fn ac_load_value(&self) -> Option<f64> {
        let vebus = self.vebus_service.clone().unwrap_or_default();
        let mut load_on_ac_out = [None; 3];
        let mut total_consumption = [None; 3];

        for (i, phase) in ["L1", "L2", "L3"].iter().enumerate() {
            // Raw inverted power comes from the inverter itself; systemcalc
            // only provides the consumption split
            load_on_ac_out[i] = self
                .telemetry
                .read(&vebus, &format!("/Ac/Out/{}/P", phase));

            let on_input = self
                .telemetry
                .read(SYSTEM_SERVICE, &format!("/Ac/ConsumptionOnInput/{}/Power", phase));
            let on_output = self
                .telemetry
                .read(SYSTEM_SERVICE, &format!("/Ac/ConsumptionOnOutput/{}/Power", phase));
            total_consumption[i] = Some(present_sum(&[on_input, on_output]));
        }

        // Invalidate if the vebus device is not available
        load_on_ac_out[0]?;

        match self.settings.get_int("acloadmeasurement") {
            // Total consumption
            0 => Some(present_sum(&total_consumption)),
            // Load on inverter AC out
            1 => Some(present_sum(&load_on_ac_out)),
            // Highest phase load
            2 => safe_max(&load_on_ac_out),
            _ => None,
        }
    }

    fn inverter_alarm_value(&self, alarm: &str) -> Option<f64> {
        let vebus = self.vebus_service.clone().unwrap_or_default();
        let aggregate = self.telemetry.read(&vebus, &format!("/Alarms/{}", alarm));
        if aggregate.is_some() {
            return aggregate;
        }

        // A Multi on VE.Bus splits its alarms per phase; take the worst
        let per_phase: Vec<Option<f64>> = ["L1", "L2", "L3"]
            .iter()
            .map(|phase| {
                self.telemetry
                    .read(&vebus, &format!("/Alarms/{}/{}", phase, alarm))
            })
            .collect();
        safe_max(&per_phase)
    }

    fn ac_input_available(&self, input: u8) -> Option<f64> {
        let vebus = self.vebus_service.clone().unwrap_or_default();
        let available = self
            .telemetry
            .read(&vebus, &format!("/Ac/State/AcIn{}Available", input));

        if let Some(v) = available {
            return Some(if v != 0.0 { 1.0 } else { 0.0 });
        }

        if input != 1 {
            return None;
        }

        // Older firmware does not publish availability for AC-in-1; derive
        // it from the active input being connected
        let active_input = self.telemetry.read(&vebus, "/Ac/ActiveIn/ActiveInput");
        let connected = self.telemetry.read(&vebus, "/Ac/ActiveIn/Connected");
        match (active_input, connected) {
            (Some(active), Some(connected)) => {
                Some(if active == 0.0 && connected == 1.0 { 1.0 } else { 0.0 })
            }
            _ => None,
        }
    }

    pub(crate) fn evaluate_manual_start(&mut self) -> bool {
        if !self.manual_start {
            if self.run_reason == RunReason::Manual {
                self.manual_start_timer = 0;
                self.manual_timer_mark = None;
            }
            return false;
        }

        let mut start = true;

        // An optional countdown releases manual start once it reaches zero;
        // without one the generator runs until manually stopped.
        if self.manual_start_timer != 0 {
            let mark = *self.manual_timer_mark.get_or_insert(self.current_time);
            let elapsed = (self.current_time - mark) as i64;
            if elapsed > 0 {
                self.manual_start_timer -= elapsed;
                self.manual_timer_mark = Some(mark + elapsed as f64);
            }

            start = self.manual_start_timer > 0;
            self.manual_start = start;
            if !start {
                self.manual_start_timer = 0;
                self.manual_timer_mark = None;
            }
        }

        start
    }

    pub(crate) fn evaluate_testrun_condition(&mut self) -> bool {
        if self.settings.get_int("testrunenabled") == 0 {
            self.skip_test_run = None;
            self.next_test_run = None;
            return false;
        }

        let soc = self.battery().and_then(|b| b.soc());
        let inputs = TestRunInputs {
            enabled: true,
            start_date: self.settings.get_int("testrunstartdate"),
            start_time: self.settings.get_int("testrunstarttimer"),
            interval_days: self.settings.get_int("testruninterval"),
            duration: self.settings.get_int("testrunruntime"),
            skip_runtime: self.settings.get_int("testrunskipruntime"),
            run_till_battery_full: self.settings.get_int("testruntillbatteryfull") == 1,
            soc,
            interval_runtime: self.interval_runtime,
            running_by_test_run: self.run_reason == RunReason::TestRun,
        };

        let decision = self.scheduler.evaluate(self.clock.now_utc(), &inputs);
        self.skip_test_run = decision.skip;
        self.next_test_run = decision.next_run;
        decision.start
    }

    pub(crate) fn check_quiet_hours(&mut self) {
        let mut active = false;
        if self.settings.get_int("quiethoursenabled") == 1 {
            let local = self.clock.now_utc().with_timezone(&self.tz);
            let seconds = i64::from(local.time().num_seconds_from_midnight());
            active = quiet_hours_active(
                seconds,
                self.settings.get_int("quiethoursstarttime"),
                self.settings.get_int("quiethoursendtime"),
            );
        }

        if !self.quiet_hours && active {
            self.logger.info("Entering quiet mode");
        } else if self.quiet_hours && !active {
            self.logger.info("Leaving quiet mode");
        }
        self.quiet_hours = active;
    }

    pub(crate) fn evaluate_autostart_disabled_alarm(&mut self) {
        let autostart_enabled = self.settings.get_int("autostart") == 1;
        let alarm_enabled = self.settings.get_int("autostartdisabledalarm") == 1;
        self.alarms
            .update_autostart_disabled(autostart_enabled, alarm_enabled, self.current_time);
    }

    /// Book runtime into the persisted counters and refresh derived totals
    pub(crate) fn update_accumulated_time(&mut self) {
        let today = self.today_utc_key();
        let totals = self
            .runtime
            .update(self.runtime_secs, today, &mut self.settings);
        self.today_runtime = totals.today_runtime;
        self.interval_runtime = totals.test_run_interval_runtime;
        self.accumulated_total = totals.accumulated_total;
        self.service_counter = totals.service_counter;
        self.alarms
            .set_service_interval_exceeded(totals.service_interval_exceeded);
    }

    /// UTC-midnight timestamp keying today's history bucket
    pub(crate) fn today_utc_key(&self) -> i64 {
        let date = self.clock.now_utc().with_timezone(&self.tz).date_naive();
        Utc.from_utc_datetime(&date.and_hms_opt(0, 0, 0).unwrap_or_default())
            .timestamp()
    }
}

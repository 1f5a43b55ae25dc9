use super::{GensetDriver, GeneratorState, RunReason, WAIT_FOR_ENGINE_STOP};
use crate::alarms::GeneratorDetection;
use crate::telemetry::{SETTINGS_SERVICE, SYSTEM_SERVICE};

impl GensetDriver {
    /// Determine which physical AC input is wired to the generator. An
    /// external transfer switch can change this at runtime, so it is
    /// recomputed every tick. Input source type 2 means generator.
    pub(crate) fn refresh_generator_ac_input(&mut self) {
        let input1 = self
            .telemetry
            .read(SETTINGS_SERVICE, "/Settings/SystemSetup/AcInput1");
        let input_count = self
            .telemetry
            .read(SYSTEM_SERVICE, "/Ac/In/NumberOfAcInputs")
            .unwrap_or(0.0);
        let input2 = self
            .telemetry
            .read(SETTINGS_SERVICE, "/Settings/SystemSetup/AcInput2");

        self.generator_ac_input = if input1 == Some(2.0) {
            1
        } else if input_count >= 2.0 && input2 == Some(2.0) {
            2
        } else {
            // no generator input found
            0
        };
    }

    /// Pick up any fault reported by the controlled device
    pub(crate) fn check_remote_status(&mut self) {
        self.device_error = self.switch.fault();
    }

    /// Command the relay to match the current state. The engine must run in
    /// Running, Warm-up and Cool-down; Stopping keeps it off while AC-input
    /// load stays shed.
    pub(crate) fn update_remote_switch(&mut self) {
        let on = matches!(
            self.state,
            GeneratorState::Running | GeneratorState::Warmup | GeneratorState::Cooldown
        );
        self.switch.set_switch_state(on);
    }

    /// Apply a positive start decision
    pub(crate) fn start_generator(&mut self, reason: RunReason) {
        let fresh_start = match self.state {
            GeneratorState::Cooldown | GeneratorState::Stopping => {
                // Start request during wind-down: abort and return to running.
                // The relay may already have been dropped in Stopping.
                self.logger.info("Aborting cool-down - returning to running");
                self.state = GeneratorState::Running;
                self.update_remote_switch();
                false
            }
            GeneratorState::Warmup => {
                if self.current_time > self.warmup_end_time {
                    self.logger.info("Warm-up complete");
                    self.state = GeneratorState::Running;
                }
                false
            }
            GeneratorState::Running if self.switch.switch_state() => false,
            _ => true,
        };

        if fresh_start {
            self.logger
                .info(&format!("Starting generator by {} condition", reason.label()));

            // With a warm-up time configured, always pass through warm-up
            // regardless of which AC input is in use
            let warm_up = self.settings.get_float("warmuptime");
            if warm_up > 0.0 {
                self.warmup_end_time = self.current_time + warm_up;
                self.logger.info("Starting warm-up");
                self.state = GeneratorState::Warmup;
            } else {
                self.state = GeneratorState::Running;
                self.warmup_end_time = 0.0;
            }

            self.cooldown_end_time = 0.0;
            self.post_cooldown_end_time = 0.0;
            self.update_remote_switch();
            self.start_time = self.current_time;
        } else if self.run_reason != reason {
            self.logger.info(&format!(
                "Generator previously running by {} condition is now running by {} condition",
                self.run_reason.label(),
                reason.label()
            ));
        }

        self.run_reason = reason;
    }

    /// Apply a stop decision, sequencing cool-down and the engine-stop wait
    pub(crate) fn stop_generator(&mut self) {
        let state = self.state;
        if !(state.in_run_cycle() || self.switch.switch_state()) {
            return;
        }

        // Run through the cool-down period first; its end time is re-armed
        // every tick while the generator feeds the AC input
        if self.current_time < self.cooldown_end_time {
            if state != GeneratorState::Cooldown {
                self.state = GeneratorState::Cooldown;
                self.logger.info("Starting cool-down");
            }
            return;
        }

        if state == GeneratorState::Cooldown {
            // Cool-down has elapsed: stop the engine, but keep the AC input
            // shed until the engine has actually coasted to a stop
            self.logger.info("Starting post cool-down");
            self.post_cooldown_end_time = self.current_time + WAIT_FOR_ENGINE_STOP;
            self.state = GeneratorState::Stopping;
            self.update_remote_switch();
            self.logger.info(&format!(
                "Stopping generator that was running by {} condition",
                self.run_reason.label()
            ));
            return;
        }

        if state == GeneratorState::Stopping {
            if self.current_time < self.post_cooldown_end_time {
                return;
            }
            self.logger.info("Post cool-down delay complete");
            self.state = GeneratorState::Stopped;
        } else {
            // No cool-down configured or armed: stop directly
            self.state = GeneratorState::Stopped;
            self.update_remote_switch();
            self.logger.info(&format!(
                "Stopping generator that was running by {} condition",
                self.run_reason.label()
            ));
        }

        // Book the remainder of the run before clearing it
        if self.start_time > 0.0 {
            self.runtime_secs = (self.current_time - self.start_time) as i64;
        }
        self.run_reason = RunReason::Stopped;
        self.update_accumulated_time();
        self.start_time = 0.0;
        self.runtime_secs = 0;
        self.manual_start_timer = 0;
        self.manual_timer_mark = None;
        self.runtime.reset();
    }

    /// Shed or restore load for the generator's AC input. Writes only on
    /// change; the assignment itself may move between inputs at runtime.
    pub(crate) fn ignore_ac(&mut self, ignore: bool) {
        let state1 = ignore && self.generator_ac_input == 1;
        let state2 = ignore && self.generator_ac_input == 2;

        if state1 != self.ac1_is_ignored {
            if state1 {
                self.logger.info("Shedding load - AC input 1");
            } else {
                self.logger.info("Restoring load - AC input 1");
            }
            self.set_ignore_ac(1, state1);
            self.ac1_is_ignored = state1;
        }

        if state2 != self.ac2_is_ignored {
            if state2 {
                self.logger.info("Shedding load - AC input 2");
            } else {
                self.logger.info("Restoring load - AC input 2");
            }
            self.set_ignore_ac(2, state2);
            self.ac2_is_ignored = state2;
        }
    }

    /// Tell the Multi/Quattro to disregard an AC input so the generator can
    /// spin up or coast down unloaded
    pub(crate) fn set_ignore_ac(&self, input: u8, ignore: bool) {
        if let Some(vebus) = &self.vebus_service {
            let path = if input == 1 {
                "/Ac/Control/IgnoreAcIn1"
            } else {
                "/Ac/Control/IgnoreAcIn2"
            };
            self.telemetry
                .write_async(vebus, path, i64::from(ignore) as f64);
        }
    }

    /// Check whether the active AC source is recognized as the generator and
    /// feed the no-generator-detected alarm
    pub(crate) fn detect_generator_at_acinput(&mut self) {
        self.ac_in_is_generator = false;

        let feature_enabled = self.settings.get_int("nogeneratoratacinalarm") == 1;

        if self.state == GeneratorState::Stopped {
            self.alarms
                .update_generator_detection(feature_enabled, GeneratorDetection::Stopped);
            return;
        }

        let vebus = self.vebus_service.clone().unwrap_or_default();
        let Some(active_in) = self.telemetry.read(&vebus, "/Ac/ActiveIn/Connected") else {
            // Path not supported by this firmware, skip evaluation
            self.alarms
                .update_generator_detection(feature_enabled, GeneratorDetection::Unsupported);
            return;
        };

        // Sources: 0 = not available, 1 = grid, 2 = generator, 3 = shore
        let generator_source =
            self.telemetry.read(SYSTEM_SERVICE, "/Ac/ActiveIn/Source") == Some(2.0);
        let connected = active_in == 1.0;

        if generator_source && connected {
            self.ac_in_is_generator = true;
            self.alarms
                .update_generator_detection(feature_enabled, GeneratorDetection::Detected);
        } else {
            self.alarms
                .update_generator_detection(feature_enabled, GeneratorDetection::NotDetected);
        }
    }
}

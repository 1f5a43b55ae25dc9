use super::types::StatusSnapshot;

impl super::GensetDriver {
    /// Snapshot of the published status surface
    pub fn build_status_snapshot(&self) -> StatusSnapshot {
        StatusSnapshot {
            state: self.state,
            run_reason: self.run_reason,
            error: self.device_error,
            runtime: self.runtime_secs,
            today_runtime: self.today_runtime,
            accumulated_runtime: self.accumulated_total,
            test_run_interval_runtime: self.interval_runtime,
            next_test_run: self.next_test_run,
            skip_test_run: self.skip_test_run,
            manual_start: self.manual_start,
            manual_start_timer: self.manual_start_timer,
            quiet_hours: self.quiet_hours,
            auto_start_enabled: self.settings.get_int("autostart") == 1,
            service_counter: self.service_counter,
            alarm_no_generator_at_ac_in: self.alarms.no_generator_at_ac_in,
            alarm_service_interval_exceeded: self.alarms.service_interval_exceeded,
            alarm_auto_start_disabled: self.alarms.auto_start_disabled,
        }
    }

    /// Map a snapshot to D-Bus path/value pairs
    pub(crate) fn status_paths(snap: &StatusSnapshot) -> Vec<(String, serde_json::Value)> {
        let mut updates: Vec<(String, serde_json::Value)> = vec![
            ("/State".to_string(), serde_json::json!(snap.state.code())),
            (
                "/RunningByCondition".to_string(),
                serde_json::json!(snap.run_reason.label()),
            ),
            (
                "/RunningByConditionCode".to_string(),
                serde_json::json!(snap.run_reason.code()),
            ),
            ("/Error".to_string(), serde_json::json!(snap.error.code())),
            ("/Runtime".to_string(), serde_json::json!(snap.runtime)),
            (
                "/TodayRuntime".to_string(),
                serde_json::json!(snap.today_runtime),
            ),
            (
                "/AccumulatedRuntime".to_string(),
                serde_json::json!(snap.accumulated_runtime),
            ),
            (
                "/TestRunIntervalRuntime".to_string(),
                serde_json::json!(snap.test_run_interval_runtime),
            ),
            (
                "/ManualStart".to_string(),
                serde_json::json!(u8::from(snap.manual_start)),
            ),
            (
                "/ManualStartTimer".to_string(),
                serde_json::json!(snap.manual_start_timer),
            ),
            (
                "/QuietHours".to_string(),
                serde_json::json!(u8::from(snap.quiet_hours)),
            ),
            (
                "/AutoStartEnabled".to_string(),
                serde_json::json!(u8::from(snap.auto_start_enabled)),
            ),
            (
                "/Alarms/NoGeneratorAtAcIn".to_string(),
                serde_json::json!(snap.alarm_no_generator_at_ac_in.code()),
            ),
            (
                "/Alarms/ServiceIntervalExceeded".to_string(),
                serde_json::json!(snap.alarm_service_interval_exceeded.code()),
            ),
            (
                "/Alarms/AutoStartDisabled".to_string(),
                serde_json::json!(snap.alarm_auto_start_disabled.code()),
            ),
        ];

        updates.push((
            "/NextTestRun".to_string(),
            snap.next_test_run
                .map_or(serde_json::Value::Null, |ts| serde_json::json!(ts)),
        ));
        updates.push((
            "/SkipTestRun".to_string(),
            snap.skip_test_run
                .map_or(serde_json::Value::Null, |skip| serde_json::json!(u8::from(skip))),
        ));
        updates.push((
            "/ServiceCounter".to_string(),
            snap.service_counter
                .map_or(serde_json::Value::Null, |c| serde_json::json!(c)),
        ));
        // The reset flag is momentary: any accepted write is pushed back to 0
        updates.push(("/ServiceCounterReset".to_string(), serde_json::json!(0)));

        updates
    }
}

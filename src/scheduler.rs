//! Periodic test-run scheduling and quiet hours
//!
//! Calendar arithmetic for the generator self-test: runs happen every N days
//! from a configured start date inside a daily window that may straddle
//! midnight. All date work is anchored on the configured local timezone,
//! unlike the dwell timers which run on the monotonic clock.

use crate::conditions::RETRY_LIMIT;
use crate::logging::get_logger;
use chrono::{DateTime, Days, NaiveDate, TimeZone, Utc};
use chrono_tz::Tz;

/// Settings-derived inputs for one scheduling decision
#[derive(Debug, Clone)]
pub struct TestRunInputs {
    pub enabled: bool,
    /// Epoch seconds of the configured first-run date
    pub start_date: i64,
    /// Window start, seconds after local midnight
    pub start_time: i64,
    /// Days between runs
    pub interval_days: i64,
    /// Window length in seconds
    pub duration: i64,
    /// Skip the run when the interval runtime already exceeds this
    /// (0 = never skip)
    pub skip_runtime: i64,
    /// Keep running past the window until the battery reports 100% SOC
    pub run_till_battery_full: bool,
    /// Battery state of charge, when readable
    pub soc: Option<f64>,
    /// Accumulated runtime over the test-run interval
    pub interval_runtime: i64,
    /// Whether the generator is currently running because of a test run
    pub running_by_test_run: bool,
}

/// Outcome of one scheduling decision
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct TestRunDecision {
    /// The test run should be active right now
    pub start: bool,
    /// Whether the upcoming run will be skipped; `None` while disabled or
    /// before the start date
    pub skip: Option<bool>,
    /// Epoch seconds of the next scheduled run
    pub next_run: Option<i64>,
}

impl TestRunDecision {
    fn idle() -> Self {
        Self {
            start: false,
            skip: None,
            next_run: None,
        }
    }
}

/// Computes whether the periodic self-test should be active
pub struct TestRunScheduler {
    tz: Tz,
    soc_retries: u32,
    logger: crate::logging::StructuredLogger,
}

impl TestRunScheduler {
    pub fn new(tz: Tz) -> Self {
        Self {
            tz,
            soc_retries: 0,
            logger: get_logger("testrun"),
        }
    }

    /// Evaluate the schedule for the current wall-clock instant
    pub fn evaluate(&mut self, now: DateTime<Utc>, inputs: &TestRunInputs) -> TestRunDecision {
        if !inputs.enabled {
            return TestRunDecision::idle();
        }

        let now_ts = now.timestamp();
        let local_today = now.with_timezone(&self.tz).date_naive();
        let Some(yesterday) = local_today.checked_sub_days(Days::new(1)) else {
            return TestRunDecision::idle();
        };

        let run_till_battery_full = inputs.run_till_battery_full;
        let battery_is_full = run_till_battery_full && inputs.soc == Some(100.0);
        let duration = if run_till_battery_full {
            60
        } else {
            inputs.duration
        };

        let Some(start_date) = DateTime::from_timestamp(inputs.start_date, 0)
            .map(|d| d.with_timezone(&self.tz).date_naive())
        else {
            self.logger.debug("Invalid start date, skipping test run");
            return TestRunDecision::idle();
        };

        // The run window of "today" may have opened yesterday evening: when
        // `now` still falls inside yesterday's window, the run day is
        // yesterday even though the calendar already turned.
        let yesterday_start = self.local_midnight_ts(yesterday) + inputs.start_time;
        let (today, start_time) = if yesterday_start <= now_ts && now_ts <= yesterday_start + duration
        {
            (yesterday, yesterday_start)
        } else {
            (
                local_today,
                self.local_midnight_ts(local_today) + inputs.start_time,
            )
        };

        // Start date in the future: publish it and stop evaluating
        if start_date > today {
            return TestRunDecision {
                start: false,
                skip: None,
                next_run: Some(self.local_midnight_ts(start_date)),
            };
        }

        // Skip the run when enough runtime accumulated over the interval
        let needed =
            inputs.skip_runtime > inputs.interval_runtime || inputs.skip_runtime == 0;

        let interval = inputs.interval_days.max(1);
        let stop_time = start_time + duration;
        let elapsed_days = (today - start_date).num_days();
        let cycle_offset = elapsed_days % interval;

        let mut start = cycle_offset == 0 && start_time <= now_ts && now_ts <= stop_time;

        if run_till_battery_full {
            if inputs.soc.is_some() {
                self.soc_retries = 0;
                start = (start || inputs.running_by_test_run) && !battery_is_full;
            } else if inputs.running_by_test_run {
                if self.soc_retries < RETRY_LIMIT {
                    self.soc_retries += 1;
                    start = true;
                    if self.soc_retries % 10 == 0 {
                        self.logger.info(&format!(
                            "Test run failed to get SOC value, retrying(#{})",
                            self.soc_retries
                        ));
                    }
                } else {
                    self.logger.info(&format!(
                        "Failed to get SOC after {} retries, terminating test run condition",
                        self.soc_retries
                    ));
                    start = false;
                }
            } else {
                start = false;
            }
        }

        let next_run = if cycle_offset == 0 && now_ts <= stop_time {
            start_time
        } else {
            let days_ahead = interval - cycle_offset;
            let next_day = today
                .checked_add_days(Days::new(days_ahead as u64))
                .unwrap_or(today);
            self.local_midnight_ts(next_day) + inputs.start_time
        };

        TestRunDecision {
            start: start && needed,
            skip: Some(!needed),
            next_run: Some(next_run),
        }
    }

    /// Epoch seconds of local midnight on `date`. Across a DST gap the
    /// earliest valid interpretation is used, so the run window shifts with
    /// the clock rather than disappearing.
    fn local_midnight_ts(&self, date: NaiveDate) -> i64 {
        let midnight = date.and_hms_opt(0, 0, 0).unwrap_or_default();
        self.tz
            .from_local_datetime(&midnight)
            .earliest()
            .map(|t| t.timestamp())
            .unwrap_or_else(|| Utc.from_utc_datetime(&midnight).timestamp())
    }
}

/// Whether quiet hours are active for a given local time of day.
///
/// `start >= end` describes a window that wraps midnight (e.g. 21:00-08:00);
/// the time is then active whenever it is not inside the complementary
/// daytime gap.
pub fn quiet_hours_active(seconds_since_midnight: i64, start: i64, end: i64) -> bool {
    let t = seconds_since_midnight;
    if start < end {
        start <= t && t < end
    } else {
        !(end < t && t < start)
    }
}

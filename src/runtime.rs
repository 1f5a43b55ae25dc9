//! Runtime accounting and service-interval tracking
//!
//! Accumulates generator running seconds into a lifetime total and a bounded
//! per-day history, both persisted through the settings store. The daily
//! history feeds the test-run skip check; the lifetime total drives the
//! service-interval countdown.

use crate::logging::get_logger;
use crate::settings::SettingsStore;
use std::collections::BTreeMap;

/// Maximum number of daily history entries kept; oldest evicted first
pub const HISTORY_DAYS: usize = 30;

/// Seconds in one day, used to step through history keys
const DAY_SECS: i64 = 86400;

/// Derived totals published after every accounting pass
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RuntimeTotals {
    /// Seconds run today
    pub today_runtime: i64,
    /// Seconds run over the test-run interval lookback
    pub test_run_interval_runtime: i64,
    /// Lifetime running seconds
    pub accumulated_total: i64,
    /// Countdown to the next service, `None` when no interval is configured
    pub service_counter: Option<i64>,
    /// The service interval has been used up
    pub service_interval_exceeded: bool,
}

/// Books running seconds into the persisted counters
pub struct RuntimeAccountant {
    /// Seconds of the current run already booked into the totals
    last_runtime_update: i64,
    logger: crate::logging::StructuredLogger,
}

impl RuntimeAccountant {
    pub fn new() -> Self {
        Self {
            last_runtime_update: 0,
            logger: get_logger("runtime"),
        }
    }

    /// Seconds of the current run already accounted for
    pub fn last_update(&self) -> i64 {
        self.last_runtime_update
    }

    /// Forget the current run (called once the generator reaches Stopped)
    pub fn reset(&mut self) {
        self.last_runtime_update = 0;
    }

    /// Book the yet-unbooked part of the current run into the lifetime total
    /// and today's history bucket, evict history beyond [`HISTORY_DAYS`], and
    /// recompute the derived totals.
    ///
    /// `runtime_secs` is the current run's length; `today` is the UTC-midnight
    /// timestamp keying today's bucket.
    pub fn update(
        &mut self,
        runtime_secs: i64,
        today: i64,
        settings: &mut SettingsStore,
    ) -> RuntimeTotals {
        let accumulated = runtime_secs - self.last_runtime_update;
        let total = settings.get_int("accumulatedtotal") + accumulated;
        settings.set_int("accumulatedtotal", total);

        let mut days = self.load_history(settings, today);
        *days.entry(today).or_insert(0) += accumulated;
        self.last_runtime_update = runtime_secs;

        while days.len() > HISTORY_DAYS {
            days.pop_first();
        }

        settings.set_string("accumulateddaily", &Self::serialize_history(&days));

        let interval_days = settings.get_int("testruninterval");
        let service_interval = settings.get_int("serviceinterval");
        let last_service_reset = settings.get_int("lastservicereset");

        let (service_counter, service_interval_exceeded) = if service_interval > 0 {
            let countdown = (last_service_reset + service_interval) - total;
            (Some(countdown), countdown <= 0)
        } else {
            (None, false)
        };

        RuntimeTotals {
            today_runtime: Self::interval_runtime(&days, today, 0),
            test_run_interval_runtime: Self::interval_runtime(&days, today, interval_days),
            accumulated_total: total,
            service_counter,
            service_interval_exceeded,
        }
    }

    /// Sum of the history buckets for today and the `days_back` days before it
    pub fn interval_runtime(days: &BTreeMap<i64, i64>, today: i64, days_back: i64) -> i64 {
        (0..=days_back.max(0))
            .filter_map(|i| today.checked_sub(i * DAY_SECS))
            .filter_map(|day| days.get(&day))
            .fold(0i64, |acc, secs| acc.saturating_add(*secs))
    }

    /// Load the persisted day map, replacing a malformed document with a
    /// fresh one so a corrupt setting never stops accounting.
    fn load_history(&self, settings: &SettingsStore, today: i64) -> BTreeMap<i64, i64> {
        let raw = settings.get_string("accumulateddaily");
        match parse_daily_history(&raw) {
            Some(days) => days,
            None => {
                if !raw.is_empty() {
                    self.logger
                        .warn("Daily runtime history unreadable, starting a new one");
                }
                BTreeMap::from([(today, 0)])
            }
        }
    }

    fn serialize_history(days: &BTreeMap<i64, i64>) -> String {
        let map: serde_json::Map<String, serde_json::Value> = days
            .iter()
            .map(|(day, secs)| (day.to_string(), serde_json::json!(secs)))
            .collect();
        serde_json::Value::Object(map).to_string()
    }
}

impl Default for RuntimeAccountant {
    fn default() -> Self {
        Self::new()
    }
}

/// Decode a persisted day→seconds map. Returns `None` when the document is
/// not a JSON object; unparseable entries inside a valid object are dropped.
pub fn parse_daily_history(raw: &str) -> Option<BTreeMap<i64, i64>> {
    let map = serde_json::from_str::<serde_json::Map<String, serde_json::Value>>(raw).ok()?;
    let mut days = BTreeMap::new();
    for (key, value) in map {
        if let (Ok(day), Some(secs)) = (key.parse::<i64>(), value.as_i64()) {
            days.insert(day, secs);
        }
    }
    Some(days)
}

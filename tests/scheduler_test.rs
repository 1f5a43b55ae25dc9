use chrono::{DateTime, TimeZone, Utc};
use talos::scheduler::{TestRunInputs, TestRunScheduler, quiet_hours_active};

fn utc(y: i32, m: u32, d: u32, h: u32, min: u32, s: u32) -> DateTime<Utc> {
    Utc.with_ymd_and_hms(y, m, d, h, min, s).unwrap()
}

fn base_inputs(start_date: DateTime<Utc>) -> TestRunInputs {
    TestRunInputs {
        enabled: true,
        start_date: start_date.timestamp(),
        start_time: 54000, // 15:00
        interval_days: 30,
        duration: 7200,
        skip_runtime: 0,
        run_till_battery_full: false,
        soc: None,
        interval_runtime: 0,
        running_by_test_run: false,
    }
}

#[test]
fn quiet_hours_plain_window() {
    // 09:00 - 17:00
    assert!(!quiet_hours_active(3600, 32400, 61200));
    assert!(quiet_hours_active(43200, 32400, 61200));
    assert!(!quiet_hours_active(61200, 32400, 61200));
}

#[test]
fn quiet_hours_window_wrapping_midnight() {
    // 21:00 - 08:00
    assert!(quiet_hours_active(3600, 75600, 28800));
    assert!(!quiet_hours_active(43200, 75600, 28800));
    assert!(quiet_hours_active(79200, 75600, 28800));
}

#[test]
fn disabled_scheduler_is_idle() {
    let mut scheduler = TestRunScheduler::new(chrono_tz::UTC);
    let mut inputs = base_inputs(utc(2026, 1, 1, 0, 0, 0));
    inputs.enabled = false;

    let decision = scheduler.evaluate(utc(2026, 1, 31, 15, 30, 0), &inputs);
    assert!(!decision.start);
    assert_eq!(decision.skip, None);
    assert_eq!(decision.next_run, None);
}

#[test]
fn run_starts_on_interval_day_inside_window() {
    let mut scheduler = TestRunScheduler::new(chrono_tz::UTC);
    let inputs = base_inputs(utc(2026, 1, 1, 0, 0, 0));

    // 30 days after the start date, 15:30 local: inside the window
    let decision = scheduler.evaluate(utc(2026, 1, 31, 15, 30, 0), &inputs);
    assert!(decision.start);
    assert_eq!(decision.skip, Some(false));
    assert_eq!(
        decision.next_run,
        Some(utc(2026, 1, 31, 15, 0, 0).timestamp())
    );
}

#[test]
fn no_run_outside_window_or_off_cycle() {
    let mut scheduler = TestRunScheduler::new(chrono_tz::UTC);
    let inputs = base_inputs(utc(2026, 1, 1, 0, 0, 0));

    // Right day, but after the window closed
    let decision = scheduler.evaluate(utc(2026, 1, 31, 18, 0, 0), &inputs);
    assert!(!decision.start);

    // Wrong day entirely
    let decision = scheduler.evaluate(utc(2026, 1, 30, 15, 30, 0), &inputs);
    assert!(!decision.start);
    // Next run lands on the upcoming cycle day
    assert_eq!(
        decision.next_run,
        Some(utc(2026, 1, 31, 15, 0, 0).timestamp())
    );
}

#[test]
fn window_straddling_midnight_rolls_back_to_yesterday() {
    let mut scheduler = TestRunScheduler::new(chrono_tz::UTC);
    let mut inputs = base_inputs(utc(2026, 1, 1, 0, 0, 0));
    inputs.start_time = 23 * 3600; // 23:00, two-hour window ends 01:00

    // Shortly after midnight on the day after a cycle day: still inside
    // yesterday's window
    let decision = scheduler.evaluate(utc(2026, 2, 1, 0, 30, 0), &inputs);
    assert!(decision.start);
}

#[test]
fn accumulated_runtime_skips_the_run() {
    let mut scheduler = TestRunScheduler::new(chrono_tz::UTC);
    let mut inputs = base_inputs(utc(2026, 1, 1, 0, 0, 0));
    inputs.skip_runtime = 100;
    inputs.interval_runtime = 200;

    let decision = scheduler.evaluate(utc(2026, 1, 31, 15, 30, 0), &inputs);
    assert!(!decision.start);
    assert_eq!(decision.skip, Some(true));
}

#[test]
fn zero_skip_threshold_never_skips() {
    let mut scheduler = TestRunScheduler::new(chrono_tz::UTC);
    let mut inputs = base_inputs(utc(2026, 1, 1, 0, 0, 0));
    inputs.skip_runtime = 0;
    inputs.interval_runtime = 1000000;

    let decision = scheduler.evaluate(utc(2026, 1, 31, 15, 30, 0), &inputs);
    assert!(decision.start);
    assert_eq!(decision.skip, Some(false));
}

#[test]
fn future_start_date_publishes_next_run_only() {
    let mut scheduler = TestRunScheduler::new(chrono_tz::UTC);
    let start_date = utc(2026, 6, 1, 0, 0, 0);
    let inputs = base_inputs(start_date);

    let decision = scheduler.evaluate(utc(2026, 3, 10, 15, 30, 0), &inputs);
    assert!(!decision.start);
    assert_eq!(decision.skip, None);
    assert_eq!(decision.next_run, Some(start_date.timestamp()));
}

#[test]
fn run_till_battery_full_stops_at_full_charge() {
    let mut scheduler = TestRunScheduler::new(chrono_tz::UTC);
    let mut inputs = base_inputs(utc(2026, 1, 1, 0, 0, 0));
    inputs.run_till_battery_full = true;
    inputs.running_by_test_run = true;

    // Past the nominal 60 s window but the battery is not full yet
    inputs.soc = Some(90.0);
    let decision = scheduler.evaluate(utc(2026, 1, 31, 16, 0, 0), &inputs);
    assert!(decision.start);

    inputs.soc = Some(100.0);
    let decision = scheduler.evaluate(utc(2026, 1, 31, 16, 0, 1), &inputs);
    assert!(!decision.start);
}

#[test]
fn run_till_battery_full_retries_missing_soc() {
    let mut scheduler = TestRunScheduler::new(chrono_tz::UTC);
    let mut inputs = base_inputs(utc(2026, 1, 1, 0, 0, 0));
    inputs.run_till_battery_full = true;
    inputs.running_by_test_run = true;
    inputs.soc = None;

    // An active test run keeps going while SOC cannot be read
    let decision = scheduler.evaluate(utc(2026, 1, 31, 16, 0, 0), &inputs);
    assert!(decision.start);

    // But a run never starts on a missing SOC alone
    inputs.running_by_test_run = false;
    let decision = scheduler.evaluate(utc(2026, 1, 31, 15, 30, 0), &inputs);
    assert!(!decision.start);
}

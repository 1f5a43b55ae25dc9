use talos::runtime::{HISTORY_DAYS, RuntimeAccountant, parse_daily_history};
use talos::settings::SettingsStore;

const DAY: i64 = 86400;
const BASE_DAY: i64 = 1767225600; // 2026-01-01 UTC midnight

fn store() -> (SettingsStore, tempfile::TempDir) {
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("settings.json");
    (
        SettingsStore::new(&path.to_string_lossy()),
        dir,
    )
}

#[test]
fn booking_accumulates_total_and_today() {
    let (mut settings, _dir) = store();
    let mut accountant = RuntimeAccountant::new();

    let totals = accountant.update(120, BASE_DAY, &mut settings);
    assert_eq!(totals.accumulated_total, 120);
    assert_eq!(totals.today_runtime, 120);

    // Booking is incremental: only the delta since the last pass counts
    let totals = accountant.update(180, BASE_DAY, &mut settings);
    assert_eq!(totals.accumulated_total, 180);
    assert_eq!(totals.today_runtime, 180);
    assert_eq!(settings.get_int("accumulatedtotal"), 180);
}

#[test]
fn history_is_bounded_to_thirty_days() {
    let (mut settings, _dir) = store();
    let mut accountant = RuntimeAccountant::new();

    for i in 0..35 {
        accountant.reset();
        accountant.update(100, BASE_DAY + i * DAY, &mut settings);
    }

    let history = parse_daily_history(&settings.get_string("accumulateddaily")).unwrap();
    assert_eq!(history.len(), HISTORY_DAYS);
    // The five oldest days were evicted
    assert!(!history.contains_key(&BASE_DAY));
    assert!(!history.contains_key(&(BASE_DAY + 4 * DAY)));
    assert!(history.contains_key(&(BASE_DAY + 5 * DAY)));
    assert!(history.contains_key(&(BASE_DAY + 34 * DAY)));
}

#[test]
fn evicted_days_leave_the_interval_sum() {
    let (mut settings, _dir) = store();
    let mut accountant = RuntimeAccountant::new();

    for i in 0..35 {
        accountant.reset();
        accountant.update(100, BASE_DAY + i * DAY, &mut settings);
    }

    let history = parse_daily_history(&settings.get_string("accumulateddaily")).unwrap();
    let today = BASE_DAY + 34 * DAY;
    // A wide lookback only sees the retained 30 buckets
    assert_eq!(
        RuntimeAccountant::interval_runtime(&history, today, 60),
        30 * 100
    );
    assert_eq!(
        RuntimeAccountant::interval_runtime(&history, today, 0),
        100
    );
    assert_eq!(
        RuntimeAccountant::interval_runtime(&history, today, 2),
        300
    );
}

#[test]
fn service_counter_crosses_zero() {
    let (mut settings, _dir) = store();
    settings.set_int("serviceinterval", 1000);
    settings.set_int("lastservicereset", 0);
    let mut accountant = RuntimeAccountant::new();

    let totals = accountant.update(900, BASE_DAY, &mut settings);
    assert_eq!(totals.service_counter, Some(100));
    assert!(!totals.service_interval_exceeded);

    let totals = accountant.update(1100, BASE_DAY, &mut settings);
    assert_eq!(totals.service_counter, Some(-100));
    assert!(totals.service_interval_exceeded);

    // A service reset rewinds the countdown
    settings.set_int("lastservicereset", 1100);
    accountant.reset();
    let totals = accountant.update(0, BASE_DAY, &mut settings);
    assert_eq!(totals.service_counter, Some(1000));
    assert!(!totals.service_interval_exceeded);
}

#[test]
fn no_service_interval_means_no_counter() {
    let (mut settings, _dir) = store();
    let mut accountant = RuntimeAccountant::new();
    let totals = accountant.update(500, BASE_DAY, &mut settings);
    assert_eq!(totals.service_counter, None);
    assert!(!totals.service_interval_exceeded);
}

#[test]
fn malformed_history_restarts_clean() {
    let (mut settings, _dir) = store();
    settings.set_string("accumulateddaily", "{not json");
    let mut accountant = RuntimeAccountant::new();

    let totals = accountant.update(60, BASE_DAY, &mut settings);
    assert_eq!(totals.today_runtime, 60);

    let history = parse_daily_history(&settings.get_string("accumulateddaily")).unwrap();
    assert_eq!(history.get(&BASE_DAY), Some(&60));
}

#[test]
fn parse_daily_history_drops_bad_entries() {
    assert!(parse_daily_history("[1,2,3]").is_none());
    assert!(parse_daily_history("").is_none());

    let map = parse_daily_history(r#"{"1767225600": 42, "oops": 1, "1767312000": "x"}"#).unwrap();
    assert_eq!(map.len(), 1);
    assert_eq!(map.get(&1767225600), Some(&42));
}

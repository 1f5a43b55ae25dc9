use talos::conditions::{Condition, ConditionKind, EvalParams, RETRY_LIMIT};

fn analog(start: f64, stop: f64) -> EvalParams {
    EvalParams {
        enabled: true,
        start_value: start,
        stop_value: stop,
        start_timer: 0.0,
        stop_timer: 0.0,
        monitor_available: true,
    }
}

#[test]
fn hysteresis_start_high_stop_low() {
    let mut c = Condition::new(ConditionKind::AcLoad);
    let params = analog(80.0, 60.0);

    assert!(c.evaluate(Some(85.0), &params, 0.0));
    // Between the thresholds the decision stays latched
    assert!(c.evaluate(Some(65.0), &params, 1.0));
    // Only crossing the stop threshold clears it
    assert!(!c.evaluate(Some(55.0), &params, 2.0));
}

#[test]
fn hysteresis_start_low_stop_high() {
    // SOC-style: start when low, stop when recharged
    let mut c = Condition::new(ConditionKind::Soc);
    let params = analog(80.0, 90.0);

    assert!(!c.evaluate(Some(85.0), &params, 0.0));
    assert!(c.evaluate(Some(75.0), &params, 1.0));
    assert!(c.evaluate(Some(85.0), &params, 2.0));
    assert!(!c.evaluate(Some(95.0), &params, 3.0));
}

#[test]
fn timed_condition_confirms_after_dwell() {
    let mut c = Condition::new(ConditionKind::AcLoad);
    let params = EvalParams {
        start_timer: 5.0,
        ..analog(1600.0, 800.0)
    };

    // Continuously above the start threshold: confirmed only after 5 s
    assert!(!c.evaluate(Some(2000.0), &params, 0.0));
    assert!(!c.evaluate(Some(2000.0), &params, 4.0));
    assert!(c.evaluate(Some(2000.0), &params, 5.0));
}

#[test]
fn timed_condition_interruption_resets_dwell() {
    let mut c = Condition::new(ConditionKind::AcLoad);
    let params = EvalParams {
        start_timer: 5.0,
        ..analog(1600.0, 800.0)
    };

    assert!(!c.evaluate(Some(2000.0), &params, 0.0));
    assert!(!c.evaluate(Some(2000.0), &params, 3.0));
    // Dip below the start threshold before confirmation
    assert!(!c.evaluate(Some(1000.0), &params, 4.0));
    // The accumulator restarted: another full dwell is needed
    assert!(!c.evaluate(Some(2000.0), &params, 6.0));
    assert!(!c.evaluate(Some(2000.0), &params, 10.0));
    assert!(c.evaluate(Some(2000.0), &params, 11.0));
}

#[test]
fn timed_stop_needs_its_own_dwell() {
    let mut c = Condition::new(ConditionKind::BatteryVoltage);
    // Start when voltage sags, stop when recovered
    let params = EvalParams {
        start_timer: 2.0,
        stop_timer: 4.0,
        ..analog(11.5, 12.4)
    };

    assert!(!c.evaluate(Some(11.0), &params, 0.0));
    assert!(c.evaluate(Some(11.0), &params, 2.0));

    // Recovered, but the stop dwell has not elapsed yet
    assert!(c.evaluate(Some(12.8), &params, 3.0));
    assert!(c.evaluate(Some(12.8), &params, 6.0));
    assert!(!c.evaluate(Some(12.8), &params, 7.0));
}

#[test]
fn retry_limit_invalidates_condition() {
    let mut c = Condition::new(ConditionKind::Soc);
    let params = analog(80.0, 90.0);

    assert!(c.evaluate(Some(70.0), &params, 0.0));

    // Reading goes missing: the latched decision survives while retrying
    for i in 0..RETRY_LIMIT - 1 {
        assert!(c.evaluate(None, &params, f64::from(i)), "retry #{}", i + 1);
    }
    assert!(c.valid);

    // The RETRY_LIMIT-th consecutive miss invalidates and forces false
    assert!(!c.evaluate(None, &params, 1000.0));
    assert!(!c.valid);
    assert!(!c.reached);

    // Still invalid on further misses, no retry growth
    assert!(!c.evaluate(None, &params, 1001.0));
    assert_eq!(c.retries, RETRY_LIMIT);
}

#[test]
fn valid_reading_resets_retries() {
    let mut c = Condition::new(ConditionKind::Soc);
    let params = analog(80.0, 90.0);

    for i in 0..10 {
        c.evaluate(None, &params, f64::from(i));
    }
    assert_eq!(c.retries, 10);

    assert!(c.evaluate(Some(70.0), &params, 11.0));
    assert_eq!(c.retries, 0);
    assert!(c.valid);
}

#[test]
fn recovery_after_invalidation() {
    let mut c = Condition::new(ConditionKind::Soc);
    let params = analog(80.0, 90.0);

    for i in 0..=RETRY_LIMIT {
        c.evaluate(None, &params, f64::from(i));
    }
    assert!(!c.valid);

    // The next present reading resumes evaluation immediately
    assert!(c.evaluate(Some(70.0), &params, 1000.0));
    assert!(c.valid);
    assert_eq!(c.retries, 0);
}

#[test]
fn unlatched_condition_returns_false_while_retrying() {
    let mut c = Condition::new(ConditionKind::Soc);
    let params = analog(80.0, 90.0);

    assert!(!c.evaluate(Some(95.0), &params, 0.0));
    for i in 0..5 {
        assert!(!c.evaluate(None, &params, f64::from(i)));
    }
}

#![no_main]

use libfuzzer_sys::fuzz_target;
use talos::runtime::{RuntimeAccountant, parse_daily_history};

fuzz_target!(|data: &[u8]| {
    if let Ok(raw) = std::str::from_utf8(data) {
        // Persisted history may be arbitrarily corrupt; parsing must never
        // panic, and whatever survives must be summable.
        if let Some(days) = parse_daily_history(raw) {
            let today = days.keys().next_back().copied().unwrap_or(0);
            let _ = RuntimeAccountant::interval_runtime(&days, today, 30);
            let _ = RuntimeAccountant::interval_runtime(&days, today, 0);
        }
    }
});

/// Human-readable text for a published value, specialized per path the way
/// the GUI expects: runtimes as h/m/s, the state by name, timestamps as
/// dates.
pub(crate) fn text_for_path(path: &str, val: &serde_json::Value) -> String {
    match path {
        "/Runtime" | "/TodayRuntime" | "/AccumulatedRuntime" | "/TestRunIntervalRuntime"
        | "/ServiceCounter" => val
            .as_i64()
            .map(seconds_to_text)
            .unwrap_or_else(|| format_text_value(val)),
        "/State" => val
            .as_u64()
            .map(|code| state_text(code as u32).to_string())
            .unwrap_or_else(|| format_text_value(val)),
        "/Error" => val
            .as_u64()
            .map(|code| error_text(code as u32).to_string())
            .unwrap_or_else(|| format_text_value(val)),
        "/NextTestRun" => val
            .as_i64()
            .and_then(|ts| chrono::DateTime::from_timestamp(ts, 0))
            .map(|t| t.format("%Y-%m-%d %H:%M:%S").to_string())
            .unwrap_or_else(|| format_text_value(val)),
        _ => format_text_value(val),
    }
}

pub(crate) fn seconds_to_text(value: i64) -> String {
    let (m, s) = (value / 60, value % 60);
    let (h, m) = (m / 60, m % 60);
    format!("{}h, {}m, {}s", h, m, s)
}

fn state_text(code: u32) -> &'static str {
    match code {
        0 => "Stopped",
        1 => "Running",
        2 => "Warm-up",
        3 => "Cool-down",
        4 => "Stopping",
        10 => "Error",
        _ => "Unknown",
    }
}

fn error_text(code: u32) -> &'static str {
    match code {
        0 => "No error",
        1 => "Remote control disabled",
        2 => "Remote in fault condition",
        _ => "Unknown",
    }
}

pub(crate) fn format_text_value(val: &serde_json::Value) -> String {
    match val {
        serde_json::Value::Number(n) => {
            if let Some(f) = n.as_f64() {
                if f.fract() == 0.0 {
                    format!("{}", f as i64)
                } else {
                    format!("{:.2}", f)
                }
            } else {
                n.to_string()
            }
        }
        serde_json::Value::String(s) => s.clone(),
        serde_json::Value::Bool(b) => b.to_string(),
        _ => val.to_string(),
    }
}

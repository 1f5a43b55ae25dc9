//! Settings store for Talos
//!
//! Runtime-tunable settings (condition thresholds, timers, schedules and
//! runtime counters) with declared defaults and numeric ranges, persisted as
//! a JSON document across restarts. The GUI normally edits these values live,
//! so every key supports an individual read and write.

use crate::error::Result;
use crate::logging::get_logger;
use serde_json::Value;
use std::collections::HashMap;
use std::path::Path;

/// A single typed setting value
#[derive(Debug, Clone, PartialEq)]
pub enum SettingValue {
    Int(i64),
    Float(f64),
    Text(String),
}

impl SettingValue {
    fn to_json(&self) -> Value {
        match self {
            SettingValue::Int(i) => serde_json::json!(i),
            SettingValue::Float(f) => serde_json::json!(f),
            SettingValue::Text(s) => serde_json::json!(s),
        }
    }

    fn from_json(template: &SettingValue, value: &Value) -> Option<SettingValue> {
        match template {
            SettingValue::Int(_) => value
                .as_i64()
                .or_else(|| value.as_f64().map(|f| f as i64))
                .map(SettingValue::Int),
            SettingValue::Float(_) => value.as_f64().map(SettingValue::Float),
            SettingValue::Text(_) => value.as_str().map(|s| SettingValue::Text(s.to_string())),
        }
    }
}

/// Declared default and allowed range for one settings key
pub struct SettingSpec {
    pub key: &'static str,
    pub default: SettingValue,
    pub min: f64,
    pub max: f64,
}

const fn int_spec(key: &'static str, default: i64, min: f64, max: f64) -> SettingSpec {
    SettingSpec {
        key,
        default: SettingValue::Int(default),
        min,
        max,
    }
}

const fn float_spec(key: &'static str, default: f64, min: f64, max: f64) -> SettingSpec {
    SettingSpec {
        key,
        default: SettingValue::Float(default),
        min,
        max,
    }
}

/// Declared numeric settings, mirroring the Venus OS generator settings tree.
/// Condition keys follow the `<name>start`/`<name>stop`/`<name>starttimer`/
/// `<name>stoptimer`/`<name>enabled` pattern with `qh_` quiet-hours variants.
/// Text keys (`batterymeasurement`, `accumulateddaily`) are declared in
/// `declared_defaults` since they carry no range.
static SETTING_SPECS: &[SettingSpec] = &[
    int_spec("autostart", 0, 0.0, 1.0),
    int_spec("autostartdisabledalarm", 0, 0.0, 1.0),
    int_spec("accumulatedtotal", 0, 0.0, 0.0),
    // Minutes of mandatory runtime before a stop decision is honored
    int_spec("minimumruntime", 0, 0.0, 86400.0),
    int_spec("stoponac1enabled", 0, 0.0, 1.0),
    int_spec("stoponac2enabled", 0, 0.0, 1.0),
    // On permanent loss of communication: 0 = Stop, 1 = Start, 2 = keep running
    int_spec("onlosscommunication", 0, 0.0, 2.0),
    // Quiet hours
    int_spec("quiethoursenabled", 0, 0.0, 1.0),
    int_spec("quiethoursstarttime", 75600, 0.0, 86400.0),
    int_spec("quiethoursendtime", 21600, 0.0, 86400.0),
    // SOC
    int_spec("socenabled", 0, 0.0, 1.0),
    float_spec("socstart", 80.0, 0.0, 100.0),
    float_spec("socstop", 90.0, 0.0, 100.0),
    float_spec("qh_socstart", 90.0, 0.0, 100.0),
    float_spec("qh_socstop", 90.0, 0.0, 100.0),
    // Battery voltage
    int_spec("batteryvoltageenabled", 0, 0.0, 1.0),
    float_spec("batteryvoltagestart", 11.5, 0.0, 150.0),
    float_spec("batteryvoltagestop", 12.4, 0.0, 150.0),
    int_spec("batteryvoltagestarttimer", 20, 0.0, 10000.0),
    int_spec("batteryvoltagestoptimer", 20, 0.0, 10000.0),
    float_spec("qh_batteryvoltagestart", 11.9, 0.0, 100.0),
    float_spec("qh_batteryvoltagestop", 12.4, 0.0, 100.0),
    // Battery current
    int_spec("batterycurrentenabled", 0, 0.0, 1.0),
    float_spec("batterycurrentstart", 10.5, 0.5, 10000.0),
    float_spec("batterycurrentstop", 5.5, 0.0, 10000.0),
    int_spec("batterycurrentstarttimer", 20, 0.0, 10000.0),
    int_spec("batterycurrentstoptimer", 20, 0.0, 10000.0),
    float_spec("qh_batterycurrentstart", 20.5, 0.0, 10000.0),
    float_spec("qh_batterycurrentstop", 15.5, 0.0, 10000.0),
    // AC load: 0 = total consumption, 1 = AC on inverter output, 2 = highest phase
    int_spec("acloadenabled", 0, 0.0, 1.0),
    int_spec("acloadmeasurement", 0, 0.0, 2.0),
    float_spec("acloadstart", 1600.0, 5.0, 1000000.0),
    float_spec("acloadstop", 800.0, 0.0, 1000000.0),
    int_spec("acloadstarttimer", 20, 0.0, 10000.0),
    int_spec("acloadstoptimer", 20, 0.0, 10000.0),
    float_spec("qh_acloadstart", 1900.0, 0.0, 1000000.0),
    float_spec("qh_acloadstop", 1200.0, 0.0, 1000000.0),
    // VE.Bus high temperature
    int_spec("inverterhightempenabled", 0, 0.0, 1.0),
    int_spec("inverterhightempstarttimer", 20, 0.0, 10000.0),
    int_spec("inverterhightempstoptimer", 20, 0.0, 10000.0),
    // VE.Bus overload
    int_spec("inverteroverloadenabled", 0, 0.0, 1.0),
    int_spec("inverteroverloadstarttimer", 20, 0.0, 10000.0),
    int_spec("inverteroverloadstoptimer", 20, 0.0, 10000.0),
    // Test run
    int_spec("testrunenabled", 0, 0.0, 1.0),
    int_spec("testrunstartdate", 1483228800, 0.0, 10000000000.0),
    int_spec("testrunstarttimer", 54000, 0.0, 86400.0),
    int_spec("testruninterval", 28, 1.0, 365.0),
    int_spec("testrunruntime", 7200, 1.0, 86400.0),
    int_spec("testrunskipruntime", 0, 0.0, 100000.0),
    int_spec("testruntillbatteryfull", 0, 0.0, 1.0),
    // Alarms
    int_spec("nogeneratoratacinalarm", 0, 0.0, 1.0),
    // Warm-up and Cool-down
    int_spec("warmuptime", 0, 0.0, 600.0),
    int_spec("cooldowntime", 0, 0.0, 600.0),
    // Maintenance
    int_spec("serviceinterval", 0, 0.0, 0.0),
    int_spec("lastservicereset", 0, 0.0, 0.0),
];

fn declared_defaults() -> HashMap<String, SettingValue> {
    let mut map = HashMap::with_capacity(SETTING_SPECS.len() + 2);
    for spec in SETTING_SPECS {
        map.insert(spec.key.to_string(), spec.default.clone());
    }
    map.insert(
        "batterymeasurement".to_string(),
        SettingValue::Text("default".to_string()),
    );
    map.insert(
        "accumulateddaily".to_string(),
        SettingValue::Text(String::new()),
    );
    map
}

fn spec_for(key: &str) -> Option<&'static SettingSpec> {
    SETTING_SPECS.iter().find(|s| s.key == key)
}

/// Settings store backed by a JSON file
pub struct SettingsStore {
    file_path: String,
    values: HashMap<String, SettingValue>,
    logger: crate::logging::StructuredLogger,
}

impl SettingsStore {
    /// Create a store populated with declared defaults
    pub fn new(file_path: &str) -> Self {
        let logger = get_logger("settings");
        Self {
            file_path: file_path.to_string(),
            values: declared_defaults(),
            logger,
        }
    }

    /// Load persisted values from disk, keeping defaults for missing or
    /// mistyped keys. A malformed file degrades to defaults.
    pub fn load(&mut self) -> Result<()> {
        let path = Path::new(&self.file_path);

        if !path.exists() {
            self.logger.info("No settings file found, using defaults");
            return Ok(());
        }

        let contents = std::fs::read_to_string(path)?;
        let parsed: Value = match serde_json::from_str(&contents) {
            Ok(v) => v,
            Err(e) => {
                self.logger
                    .warn(&format!("Settings file unreadable ({}), using defaults", e));
                return Ok(());
            }
        };

        if let Some(obj) = parsed.as_object() {
            for (key, raw) in obj {
                let Some(template) = self.values.get(key).cloned() else {
                    continue;
                };
                if let Some(value) = SettingValue::from_json(&template, raw) {
                    self.values.insert(key.clone(), value);
                }
            }
        }

        self.logger.info("Loaded settings from disk");
        Ok(())
    }

    /// Save all values to disk
    pub fn save(&self) -> Result<()> {
        let mut obj = serde_json::Map::new();
        for (key, value) in &self.values {
            obj.insert(key.clone(), value.to_json());
        }
        let contents = serde_json::to_string_pretty(&Value::Object(obj))?;
        std::fs::write(&self.file_path, contents)?;
        self.logger.debug("Saved settings to disk");
        Ok(())
    }

    /// Integer value of a key; floats are truncated, unknown keys read 0
    pub fn get_int(&self, key: &str) -> i64 {
        match self.values.get(key) {
            Some(SettingValue::Int(i)) => *i,
            Some(SettingValue::Float(f)) => *f as i64,
            Some(SettingValue::Text(_)) | None => {
                self.log_unknown(key);
                0
            }
        }
    }

    /// Floating point value of a key; unknown keys read 0.0
    pub fn get_float(&self, key: &str) -> f64 {
        match self.values.get(key) {
            Some(SettingValue::Float(f)) => *f,
            Some(SettingValue::Int(i)) => *i as f64,
            Some(SettingValue::Text(_)) | None => {
                self.log_unknown(key);
                0.0
            }
        }
    }

    /// String value of a key; unknown keys read ""
    pub fn get_string(&self, key: &str) -> String {
        match self.values.get(key) {
            Some(SettingValue::Text(s)) => s.clone(),
            _ => {
                self.log_unknown(key);
                String::new()
            }
        }
    }

    /// Set an integer key, clamped to its declared range, and persist
    pub fn set_int(&mut self, key: &str, value: i64) {
        let clamped = match spec_for(key) {
            Some(spec) if spec.max > spec.min => {
                value.clamp(spec.min as i64, spec.max as i64)
            }
            _ => value,
        };
        self.values
            .insert(key.to_string(), SettingValue::Int(clamped));
        self.persist();
    }

    /// Set a float key, clamped to its declared range, and persist
    pub fn set_float(&mut self, key: &str, value: f64) {
        let clamped = match spec_for(key) {
            Some(spec) if spec.max > spec.min => value.clamp(spec.min, spec.max),
            _ => value,
        };
        self.values
            .insert(key.to_string(), SettingValue::Float(clamped));
        self.persist();
    }

    /// Set a string key and persist
    pub fn set_string(&mut self, key: &str, value: &str) {
        self.values
            .insert(key.to_string(), SettingValue::Text(value.to_string()));
        self.persist();
    }

    fn persist(&self) {
        if let Err(e) = self.save() {
            self.logger.warn(&format!("Failed to persist settings: {}", e));
        }
    }

    fn log_unknown(&self, key: &str) {
        self.logger
            .warn(&format!("Read of undeclared settings key '{}'", key));
    }
}

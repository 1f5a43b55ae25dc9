//! Telemetry access for Talos
//!
//! The decision engine consumes live values (battery, inverter, AC input
//! state) through the [`TelemetrySource`] trait. Reads are non-blocking
//! lookups against a cache maintained by the D-Bus monitor; absence of a
//! value is explicit and distinguishable from zero. Writes are
//! fire-and-forget. A scripted implementation backs the tests.

use std::sync::Arc;

/// Victron system calculation service
pub const SYSTEM_SERVICE: &str = "com.victronenergy.system";

/// Victron settings service
pub const SETTINGS_SERVICE: &str = "com.victronenergy.settings";

/// Battery value prefix used by the system service
pub const BATTERY_PREFIX: &str = "/Dc/Battery";

/// A discovered D-Bus service
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ServiceInfo {
    pub name: String,
    pub device_instance: Option<u32>,
}

/// Non-blocking read/write access to named telemetry paths
pub trait TelemetrySource: Send + Sync {
    /// Numeric value at `service`/`path`, `None` when absent or invalid
    fn read(&self, service: &str, path: &str) -> Option<f64>;

    /// Text value at `service`/`path`, `None` when absent or non-textual
    fn read_text(&self, service: &str, path: &str) -> Option<String>;

    /// Fire-and-forget write; repeating the same write must be safe
    fn write_async(&self, service: &str, path: &str, value: f64);

    /// Currently known services
    fn list_services(&self) -> Vec<ServiceInfo>;
}

/// View over a battery service, hiding the prefix differences between a
/// direct battery monitor and the system service aggregate.
pub struct Battery {
    source: Arc<dyn TelemetrySource>,
    service: String,
    prefix: String,
}

impl Battery {
    pub fn new(source: Arc<dyn TelemetrySource>, service: &str, prefix: &str) -> Self {
        Self {
            source,
            service: service.to_string(),
            prefix: prefix.to_string(),
        }
    }

    pub fn voltage(&self) -> Option<f64> {
        self.source
            .read(&self.service, &format!("{}/Voltage", self.prefix))
    }

    pub fn current(&self) -> Option<f64> {
        self.source
            .read(&self.service, &format!("{}/Current", self.prefix))
    }

    pub fn soc(&self) -> Option<f64> {
        // SOC on a battery device lives at the service root; only the system
        // service keeps it under the battery prefix.
        let prefix = if self.prefix == BATTERY_PREFIX {
            BATTERY_PREFIX
        } else {
            ""
        };
        self.source.read(&self.service, &format!("{}/Soc", prefix))
    }
}

/// Largest of the values that are present, `None` when all are absent
pub fn safe_max(values: &[Option<f64>]) -> Option<f64> {
    values
        .iter()
        .flatten()
        .copied()
        .fold(None, |acc: Option<f64>, v| {
            Some(acc.map_or(v, |a| a.max(v)))
        })
}

/// Sum of the values that are present
pub fn present_sum(values: &[Option<f64>]) -> f64 {
    values.iter().flatten().sum()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn safe_max_ignores_absent_values() {
        assert_eq!(safe_max(&[None, Some(3.0), Some(7.0)]), Some(7.0));
        assert_eq!(safe_max(&[None, None]), None);
    }

    #[test]
    fn present_sum_ignores_absent_values() {
        assert!((present_sum(&[Some(1.0), None, Some(2.5)]) - 3.5).abs() < f64::EPSILON);
        assert_eq!(present_sum(&[None, None]), 0.0);
    }
}

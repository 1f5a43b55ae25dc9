//! Remote switch control
//!
//! The driver controls the generator through a logical on/off switch. The
//! production implementation drives the Venus OS system relay over D-Bus;
//! the tests substitute a recording switch. Both reads and writes are
//! non-blocking: reads come from the telemetry cache, writes are
//! fire-and-forget and idempotent.

use crate::driver::DeviceError;
use crate::logging::get_logger;
use crate::telemetry::{SETTINGS_SERVICE, TelemetrySource};
use std::sync::Arc;

/// Control point for the generator start relay
pub trait RemoteSwitch: Send {
    /// Last known relay state
    fn switch_state(&self) -> bool;

    /// Command the relay; repeating the same command must be safe
    fn set_switch_state(&mut self, on: bool);

    /// Fault reported by the controlled device, if any
    fn fault(&self) -> DeviceError {
        DeviceError::None
    }
}

/// The built-in Venus OS relay, driven through the system service.
/// Honors the configured relay polarity.
pub struct SystemRelay {
    telemetry: Arc<dyn TelemetrySource>,
    service: String,
    path: String,
    logger: crate::logging::StructuredLogger,
}

impl SystemRelay {
    pub fn new(telemetry: Arc<dyn TelemetrySource>, service: &str, path: &str) -> Self {
        Self {
            telemetry,
            service: service.to_string(),
            path: path.to_string(),
            logger: get_logger("relay"),
        }
    }

    fn inverted(&self) -> bool {
        self.telemetry
            .read(SETTINGS_SERVICE, "/Settings/Relay/Polarity")
            .map(|v| v > 0.0)
            .unwrap_or(false)
    }
}

impl RemoteSwitch for SystemRelay {
    fn switch_state(&self) -> bool {
        let raw = self
            .telemetry
            .read(&self.service, &self.path)
            .map(|v| v > 0.0)
            .unwrap_or(false);
        raw != self.inverted()
    }

    fn set_switch_state(&mut self, on: bool) {
        let level = (on != self.inverted()) as i64 as f64;
        self.logger
            .debug(&format!("Setting relay {} to {}", self.path, level));
        self.telemetry.write_async(&self.service, &self.path, level);
    }
}

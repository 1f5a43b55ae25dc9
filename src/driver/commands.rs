use super::{DriverCommand, GensetDriver};

impl GensetDriver {
    /// Handle a command dispatched from a writable D-Bus path
    pub fn handle_command(&mut self, cmd: DriverCommand) {
        match cmd {
            DriverCommand::SetManualStart(on) => {
                self.logger.info(&format!(
                    "Manual start {}",
                    if on { "requested" } else { "released" }
                ));
                self.manual_start = on;
            }
            DriverCommand::SetManualStartTimer(secs) => {
                self.manual_start_timer = secs.max(0);
                self.manual_timer_mark = None;
            }
            DriverCommand::SetAutoStart(enabled) => {
                self.settings.set_int("autostart", i64::from(enabled));
                self.logger.info(&format!(
                    "Autostart function {}",
                    if enabled { "enabled" } else { "disabled" }
                ));
            }
            DriverCommand::ResetServiceCounter => {
                if self.accumulated_total > 0 {
                    self.settings
                        .set_int("lastservicereset", self.accumulated_total);
                    self.update_accumulated_time();
                    self.logger.info("Service counter reset triggered");
                }
            }
        }
    }
}

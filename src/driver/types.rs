use crate::alarms::AlarmState;
use crate::conditions::ConditionKind;

/// Generator state, published at `/State` with Venus OS numeric codes
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum GeneratorState {
    Stopped,
    Running,
    Warmup,
    Cooldown,
    Stopping,
    Error,
}

impl GeneratorState {
    pub fn code(self) -> u32 {
        match self {
            GeneratorState::Stopped => 0,
            GeneratorState::Running => 1,
            GeneratorState::Warmup => 2,
            GeneratorState::Cooldown => 3,
            GeneratorState::Stopping => 4,
            GeneratorState::Error => 10,
        }
    }

    pub fn description(self) -> &'static str {
        match self {
            GeneratorState::Stopped => "Stopped",
            GeneratorState::Running => "Running",
            GeneratorState::Warmup => "Warm-up",
            GeneratorState::Cooldown => "Cool-down",
            GeneratorState::Stopping => "Stopping",
            GeneratorState::Error => "Error",
        }
    }

    /// States in which a run cycle is in progress (engine turning or
    /// winding down)
    pub fn in_run_cycle(self) -> bool {
        matches!(
            self,
            GeneratorState::Running
                | GeneratorState::Warmup
                | GeneratorState::Cooldown
                | GeneratorState::Stopping
        )
    }

    /// States during which the generator's AC input must be unloaded
    pub fn sheds_ac_load(self) -> bool {
        matches!(
            self,
            GeneratorState::Warmup | GeneratorState::Cooldown | GeneratorState::Stopping
        )
    }
}

/// Why the generator is (or would be) running, published at
/// `/RunningByCondition` (name) and `/RunningByConditionCode` (number)
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RunReason {
    Stopped,
    Manual,
    TestRun,
    LossOfCommunication,
    Soc,
    AcLoad,
    BatteryCurrent,
    BatteryVoltage,
    InverterHighTemp,
    InverterOverload,
    StopOnAc1,
    StopOnAc2,
}

impl RunReason {
    pub fn code(self) -> u32 {
        match self {
            RunReason::Stopped => 0,
            RunReason::Manual => 1,
            RunReason::TestRun => 2,
            RunReason::LossOfCommunication => 3,
            RunReason::Soc => 4,
            RunReason::AcLoad => 5,
            RunReason::BatteryCurrent => 6,
            RunReason::BatteryVoltage => 7,
            RunReason::InverterHighTemp => 8,
            RunReason::InverterOverload => 9,
            RunReason::StopOnAc1 => 10,
            RunReason::StopOnAc2 => 11,
        }
    }

    /// Name published while running; empty while stopped
    pub fn label(self) -> &'static str {
        match self {
            RunReason::Stopped => "",
            RunReason::Manual => "manual",
            RunReason::TestRun => "testrun",
            RunReason::LossOfCommunication => "lossofcommunication",
            RunReason::Soc => "soc",
            RunReason::AcLoad => "acload",
            RunReason::BatteryCurrent => "batterycurrent",
            RunReason::BatteryVoltage => "batteryvoltage",
            RunReason::InverterHighTemp => "inverterhightemp",
            RunReason::InverterOverload => "inverteroverload",
            RunReason::StopOnAc1 => "stoponac1",
            RunReason::StopOnAc2 => "stoponac2",
        }
    }

    pub fn is_override(self) -> bool {
        matches!(self, RunReason::Manual | RunReason::TestRun)
    }
}

impl From<ConditionKind> for RunReason {
    fn from(kind: ConditionKind) -> Self {
        match kind {
            ConditionKind::Soc => RunReason::Soc,
            ConditionKind::AcLoad => RunReason::AcLoad,
            ConditionKind::BatteryCurrent => RunReason::BatteryCurrent,
            ConditionKind::BatteryVoltage => RunReason::BatteryVoltage,
            ConditionKind::InverterHighTemp => RunReason::InverterHighTemp,
            ConditionKind::InverterOverload => RunReason::InverterOverload,
            ConditionKind::StopOnAc1 => RunReason::StopOnAc1,
            ConditionKind::StopOnAc2 => RunReason::StopOnAc2,
        }
    }
}

/// Fault reported by the controlled relay or genset, published at `/Error`
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum DeviceError {
    #[default]
    None,
    RemoteDisabled,
    RemoteInFault,
}

impl DeviceError {
    pub fn code(self) -> u32 {
        match self {
            DeviceError::None => 0,
            DeviceError::RemoteDisabled => 1,
            DeviceError::RemoteInFault => 2,
        }
    }

    pub fn description(self) -> &'static str {
        match self {
            DeviceError::None => "No error",
            DeviceError::RemoteDisabled => "Remote control disabled",
            DeviceError::RemoteInFault => "Remote in fault condition",
        }
    }
}

/// Commands accepted by the driver from external components (D-Bus writes)
#[derive(Debug, Clone)]
pub enum DriverCommand {
    SetManualStart(bool),
    SetManualStartTimer(i64),
    SetAutoStart(bool),
    ResetServiceCounter,
}

/// Published status surface, mirrored to D-Bus once per tick
#[derive(Debug, Clone, PartialEq)]
pub struct StatusSnapshot {
    pub state: GeneratorState,
    pub run_reason: RunReason,
    pub error: DeviceError,
    pub runtime: i64,
    pub today_runtime: i64,
    pub accumulated_runtime: i64,
    pub test_run_interval_runtime: i64,
    pub next_test_run: Option<i64>,
    pub skip_test_run: Option<bool>,
    pub manual_start: bool,
    pub manual_start_timer: i64,
    pub quiet_hours: bool,
    pub auto_start_enabled: bool,
    pub service_counter: Option<i64>,
    pub alarm_no_generator_at_ac_in: AlarmState,
    pub alarm_service_interval_exceeded: AlarmState,
    pub alarm_auto_start_disabled: AlarmState,
}

//! # Talos - Generator auto start/stop driver for Victron Venus OS
//!
//! A Rust implementation of the generator start/stop service: once per
//! second it decides whether an auxiliary generator should run, drives the
//! remote start relay, and sheds load from the generator's AC input during
//! warm-up and cool-down so the engine is never loaded while spinning up or
//! coasting down.
//!
//! ## Features
//!
//! - **Condition engine**: SOC, AC load, battery current/voltage and
//!   inverter alarm conditions with hysteresis, dwell timers and
//!   missing-value retry/backoff
//! - **Stop on AC**: immediate stop override when incoming AC power returns
//! - **Test runs**: periodic self-test scheduling with skip-on-runtime and
//!   run-till-battery-full modes
//! - **Quiet hours**: alternate thresholds inside a configurable daily window
//! - **Maintenance**: lifetime and daily runtime accounting with a
//!   service-interval countdown and alarm
//! - **D-Bus Integration**: full Venus OS compatibility
//!
//! ## Architecture
//!
//! The application follows a modular architecture with clear separation of
//! concerns:
//!
//! - `config`: Configuration management and validation
//! - `logging`: Structured logging and tracing
//! - `settings`: Persisted runtime-tunable settings with declared defaults
//! - `telemetry`: Non-blocking access to monitored values
//! - `clock`: Monotonic and wall-clock abstractions
//! - `conditions`: Start/stop condition framework
//! - `scheduler`: Test-run scheduling and quiet hours
//! - `runtime`: Runtime accounting and service intervals
//! - `alarms`: Sticky alarm tracking
//! - `relay`: Remote switch control
//! - `driver`: Core state machine and tick orchestration
//! - `dbus`: D-Bus integration for Venus OS

pub mod alarms;
pub mod clock;
pub mod conditions;
pub mod config;
pub mod dbus;
pub mod driver;
pub mod error;
pub mod logging;
pub mod relay;
pub mod runtime;
pub mod scheduler;
pub mod settings;
pub mod telemetry;

// Re-export commonly used types
pub use config::Config;
pub use driver::GensetDriver;
pub use error::{Result, TalosError};

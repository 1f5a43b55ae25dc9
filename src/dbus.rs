//! D-Bus integration for Venus OS compatibility
//!
//! Two halves: a published service exposing the generator start/stop status
//! surface as `com.victronenergy.BusItem` objects, and a polling monitor
//! that caches values from the battery, vebus, settings and system services
//! so that tick-side telemetry reads never block.

pub mod items;
pub mod monitor;
pub mod service;
pub mod shared;
pub mod tree;
pub mod util;

pub use monitor::{DbusMonitor, monitored_tree};
pub use service::DbusService;
pub use tree::RootBus;

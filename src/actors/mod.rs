//! Actor-based device supervision
//!
//! Each actor runs as an independent async task controlled through an mpsc
//! command channel.
//!
//! ## Architecture Overview
//!
//! ```text
//!                   +---------------------+
//!                   |     Coordinator     |
//!                   +----------+----------+
//!                              | spawns
//!          +-------------------+-------------------+
//!          |                   |                   |
//!  +-------v-------+   +-------v-------+   +-------v-------+
//!  | DeviceMonitor |   | DeviceMonitor |   | HistoryPruner |
//!  |   (device 1)  |   |   (device N)  |   |               |
//!  +-------+-------+   +-------+-------+   +-------+-------+
//!          |                   |                   |
//!          +---------+---------+                   |
//!                    | MonitorListener             |
//!            +-------v--------+                    |
//!            | MonitorRecorder+---> Notifier       |
//!            +-------+--------+                    |
//!                    |                             |
//!            +-------v-----------------------------v--+
//!            |             MetricsStore               |
//!            +----------------------------------------+
//! ```
//!
//! ## Actor Types
//!
//! - **DeviceMonitorActor**: probes liveness and samples load of one device
//! - **HistoryPruner**: deletes history outside the retention window
//!
//! A panic inside one actor ends only that actor's task.

pub mod coordinator;
pub mod device_monitor;
pub mod messages;
pub mod pruner;
pub mod recorder;

pub use coordinator::Coordinator;
pub use device_monitor::{MonitorHandle, MonitorListener};
pub use messages::SampleOutcome;

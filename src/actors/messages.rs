//! Message types for actor communication
//!
//! Commands go to one actor over its mpsc channel; replies come back on a
//! oneshot channel carried inside the command.

use tokio::sync::oneshot;

use crate::monitors::liveness::Observation;
use crate::{Liveness, LoadStatus};

/// Commands that can be sent to a DeviceMonitorActor
#[derive(Debug)]
pub enum MonitorCommand {
    /// Probe liveness now, outside the timer
    CheckAlive {
        respond_to: oneshot::Sender<Observation>,
    },

    /// Take a load sample now, outside the timer
    SampleLoad {
        respond_to: oneshot::Sender<SampleOutcome>,
    },

    /// Current liveness state
    GetLiveness {
        respond_to: oneshot::Sender<Liveness>,
    },

    /// Stop after the current cycle
    Shutdown,
}

/// Result of one load sampling tick
#[derive(Debug, Clone, PartialEq)]
pub enum SampleOutcome {
    /// The device is not known to be alive; nothing was fetched
    Skipped,

    Sampled(LoadStatus),

    /// Fetch or parse failed; logged and dropped
    Failed(String),
}

/// Commands that can be sent to the HistoryPruner
#[derive(Debug)]
pub enum PrunerCommand {
    /// Run one pruning pass now and report how many entries went
    PruneNow {
        respond_to: oneshot::Sender<anyhow::Result<usize>>,
    },

    Shutdown,
}

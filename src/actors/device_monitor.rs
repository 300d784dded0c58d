//! DeviceMonitorActor - Watches liveness and load of one transcoder
//!
//! ## Message Flow
//!
//! ```text
//! alive tick → is_alive probe → LivenessTracker → on_wakeup_state / on_state_changed
//! load tick  → (alive only) load status fetch   → on_load_status
//!     ↑
//!     └─── Commands (CheckAlive, SampleLoad, GetLiveness, Shutdown)
//! ```
//!
//! Both ticks run inside one task, so a device is never probed twice at
//! the same time. A Shutdown arriving mid-probe is handled once that
//! probe finishes.

use std::sync::Arc;
use std::time::Duration;

use anyhow::{Context, Result};
use async_trait::async_trait;
use tokio::sync::{mpsc, oneshot};
use tokio::task::JoinHandle;
use tokio::time::{Instant, MissedTickBehavior, interval, interval_at};
use tracing::{debug, info, instrument, trace, warn};

use super::messages::{MonitorCommand, SampleOutcome};
use crate::config::MonitorSettings;
use crate::monitors::liveness::{LivenessTracker, Observation};
use crate::protocol::DeviceProbe;
use crate::{DeviceId, Liveness, LoadStatus, state_label};

/// Receiver of everything a monitor observes
///
/// Implementations must not fail; errors are theirs to log.
#[async_trait]
pub trait MonitorListener: Send + Sync {
    async fn on_wakeup_state(&self, device_id: DeviceId, alive: bool);

    async fn on_state_changed(&self, device_id: DeviceId, alive: bool);

    async fn on_load_status(&self, device_id: DeviceId, status: LoadStatus);
}

/// Actor that monitors a single device
pub struct DeviceMonitorActor {
    device_id: DeviceId,

    /// Display name for logging
    name: String,

    probe: Arc<dyn DeviceProbe>,
    listener: Arc<dyn MonitorListener>,
    tracker: LivenessTracker,

    command_rx: mpsc::Receiver<MonitorCommand>,

    alive_period: Duration,
    load_period: Duration,
}

impl DeviceMonitorActor {
    pub fn new(
        device_id: DeviceId,
        name: String,
        probe: Arc<dyn DeviceProbe>,
        listener: Arc<dyn MonitorListener>,
        settings: &MonitorSettings,
        command_rx: mpsc::Receiver<MonitorCommand>,
    ) -> Self {
        Self {
            device_id,
            name,
            probe,
            listener,
            tracker: LivenessTracker::new(settings.stability_threshold),
            command_rx,
            alive_period: settings.alive_period(),
            load_period: settings.load_period(),
        }
    }

    /// Run until a Shutdown command arrives or every handle is dropped
    #[instrument(skip(self), fields(device_id = self.device_id, device = %self.name))]
    pub async fn run(mut self) {
        debug!("starting device monitor");

        let mut alive_ticker = interval(self.alive_period);
        alive_ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);

        // first load sample one period in, after the first liveness probe
        let mut load_ticker = interval_at(Instant::now() + self.load_period, self.load_period);
        load_ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);

        loop {
            tokio::select! {
                _ = alive_ticker.tick() => {
                    self.check_alive().await;
                }

                _ = load_ticker.tick() => {
                    self.sample_load().await;
                }

                cmd = self.command_rx.recv() => {
                    // tickers keep the select alive, so a closed channel must end the loop here
                    let Some(cmd) = cmd else {
                        warn!("command channel closed, shutting down");
                        break;
                    };
                    match cmd {
                        MonitorCommand::CheckAlive { respond_to } => {
                            let _ = respond_to.send(self.check_alive().await);
                        }
                        MonitorCommand::SampleLoad { respond_to } => {
                            let _ = respond_to.send(self.sample_load().await);
                        }
                        MonitorCommand::GetLiveness { respond_to } => {
                            let _ = respond_to.send(self.tracker.state());
                        }
                        MonitorCommand::Shutdown => {
                            debug!("received shutdown command");
                            break;
                        }
                    }
                }
            }
        }

        debug!("device monitor stopped");
    }

    async fn check_alive(&mut self) -> Observation {
        let alive = self.probe.is_alive().await;
        let observation = self.tracker.observe(alive);

        match observation {
            Observation::Wakeup(alive) => {
                info!("monitoring started, device is {}", state_label(alive));
                self.listener.on_wakeup_state(self.device_id, alive).await;
            }
            Observation::Changed(alive) => {
                if alive {
                    info!("device is {}", state_label(alive));
                } else {
                    warn!("device is {}", state_label(alive));
                }
                self.listener.on_state_changed(self.device_id, alive).await;
            }
            Observation::Pending { remaining } => {
                debug!("probe reported {}, {remaining} more to confirm", state_label(alive));
            }
            Observation::Steady => trace!("device still {}", state_label(alive)),
        }

        observation
    }

    async fn sample_load(&mut self) -> SampleOutcome {
        if self.tracker.state() != Liveness::Alive {
            trace!("skipping load sample, device state is {:?}", self.tracker.state());
            return SampleOutcome::Skipped;
        }

        match self.probe.load_status().await {
            Ok(status) => {
                trace!("cpu {:.1}%, {} temperature readings", status.cpu, status.temperatures.len());
                self.listener.on_load_status(self.device_id, status.clone()).await;
                SampleOutcome::Sampled(status)
            }
            Err(e) => {
                warn!("failed to sample load: {e}");
                SampleOutcome::Failed(e.to_string())
            }
        }
    }
}

/// Handle for controlling a DeviceMonitorActor
///
/// Cloning the handle does not clone the actor.
#[derive(Clone)]
pub struct MonitorHandle {
    sender: mpsc::Sender<MonitorCommand>,

    pub device_id: DeviceId,
}

impl MonitorHandle {
    /// Spawn the actor and return its handle plus the task to join on shutdown
    pub fn spawn(
        device_id: DeviceId,
        name: String,
        probe: Arc<dyn DeviceProbe>,
        listener: Arc<dyn MonitorListener>,
        settings: &MonitorSettings,
    ) -> (Self, JoinHandle<()>) {
        let (cmd_tx, cmd_rx) = mpsc::channel(32);

        let actor = DeviceMonitorActor::new(device_id, name, probe, listener, settings, cmd_rx);
        let task = tokio::spawn(actor.run());

        (
            Self {
                sender: cmd_tx,
                device_id,
            },
            task,
        )
    }

    /// Probe liveness immediately
    pub async fn check_now(&self) -> Result<Observation> {
        let (tx, rx) = oneshot::channel();
        self.sender
            .send(MonitorCommand::CheckAlive { respond_to: tx })
            .await
            .context("failed to send CheckAlive command")?;

        rx.await.context("failed to receive response")
    }

    /// Take a load sample immediately
    pub async fn sample_now(&self) -> Result<SampleOutcome> {
        let (tx, rx) = oneshot::channel();
        self.sender
            .send(MonitorCommand::SampleLoad { respond_to: tx })
            .await
            .context("failed to send SampleLoad command")?;

        rx.await.context("failed to receive response")
    }

    pub async fn liveness(&self) -> Result<Liveness> {
        let (tx, rx) = oneshot::channel();
        self.sender
            .send(MonitorCommand::GetLiveness { respond_to: tx })
            .await
            .context("failed to send GetLiveness command")?;

        rx.await.context("failed to receive response")
    }

    /// Ask the actor to stop after its current cycle
    pub async fn shutdown(&self) -> Result<()> {
        self.sender
            .send(MonitorCommand::Shutdown)
            .await
            .context("failed to send Shutdown command")?;
        Ok(())
    }

    /// Whether the actor task is still receiving commands
    pub fn is_running(&self) -> bool {
        !self.sender.is_closed()
    }
}

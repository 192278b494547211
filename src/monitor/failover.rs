//! Health-check/failover state machine

use crate::common::{Error, FailoverEvent, MonitorConfig, Result};
use crate::dispatch::DispatchClient;
use crate::storage::StorageClient;
use tokio::sync::broadcast;
use tokio::task::JoinHandle;
use tokio::time::timeout;

/// What the monitor probes: a storage engine or a dispatcher.
///
/// Probes use the component's dedicated liveness operation, never the
/// transactional path, so a healthy probe says "the loop is serving", not
/// "the data is consistent".
#[derive(Debug, Clone)]
pub enum ProbeTarget {
    Storage(StorageClient),
    Dispatcher(DispatchClient),
}

impl ProbeTarget {
    async fn probe(&self) -> Result<()> {
        match self {
            ProbeTarget::Storage(client) => {
                let health = client.health_check().await?;
                if health.is_ok() {
                    Ok(())
                } else {
                    Err(Error::Transport(format!(
                        "unhealthy status: {}",
                        health.status
                    )))
                }
            }
            ProbeTarget::Dispatcher(client) => {
                let status = client.probe().await?;
                if status.is_ok() {
                    Ok(())
                } else {
                    Err(Error::Transport(format!(
                        "unhealthy status: {}",
                        status.status
                    )))
                }
            }
        }
    }
}

/// A named probe target (the name travels in the failover notification)
#[derive(Debug, Clone)]
pub struct Endpoint {
    pub name: String,
    pub target: ProbeTarget,
}

impl Endpoint {
    pub fn new(name: impl Into<String>, target: ProbeTarget) -> Self {
        Self {
            name: name.into(),
            target,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum MonitorState {
    PrimaryActive,
    /// Terminal: no automatic failback even if the primary recovers
    ReplicaActive,
}

pub struct FailoverMonitor {
    primary: Endpoint,
    replica: Endpoint,
    state: MonitorState,
    failures: u32,
    config: MonitorConfig,
    notify: broadcast::Sender<FailoverEvent>,
}

impl FailoverMonitor {
    pub fn new(
        config: MonitorConfig,
        primary: Endpoint,
        replica: Endpoint,
        notify: broadcast::Sender<FailoverEvent>,
    ) -> Self {
        Self {
            primary,
            replica,
            state: MonitorState::PrimaryActive,
            failures: 0,
            config,
            notify,
        }
    }

    pub fn state(&self) -> MonitorState {
        self.state
    }

    pub fn consecutive_failures(&self) -> u32 {
        self.failures
    }

    pub fn active_endpoint(&self) -> &Endpoint {
        match self.state {
            MonitorState::PrimaryActive => &self.primary,
            MonitorState::ReplicaActive => &self.replica,
        }
    }

    /// One probe cycle. Returns the failover event when this cycle caused
    /// the transition (the event has also been broadcast by then).
    pub async fn tick(&mut self) -> Option<FailoverEvent> {
        let healthy = {
            let endpoint = self.active_endpoint();
            matches!(
                timeout(self.config.probe_timeout(), endpoint.target.probe()).await,
                Ok(Ok(()))
            )
        };

        if healthy {
            tracing::debug!("{} responding", self.active_endpoint().name);
            self.failures = 0;
            return None;
        }

        self.failures += 1;
        tracing::warn!(
            "{} not responding ({}/{})",
            self.active_endpoint().name,
            self.failures,
            self.config.failure_threshold
        );
        if self.failures < self.config.failure_threshold {
            return None;
        }
        self.failures = 0;

        match self.state {
            MonitorState::PrimaryActive => {
                self.state = MonitorState::ReplicaActive;
                let event = FailoverEvent::new(self.replica.name.clone());
                tracing::error!(
                    "Primary endpoint failed, activating replica: {}",
                    self.replica.name
                );
                if self.notify.send(event.clone()).is_err() {
                    tracing::warn!("No failover subscribers, notification lost");
                }
                Some(event)
            }
            MonitorState::ReplicaActive => {
                tracing::error!("Replica endpoint also failing; no failover target remains");
                None
            }
        }
    }

    /// Run the monitor loop on its fixed interval
    pub fn spawn(mut self) -> JoinHandle<()> {
        tokio::spawn(async move {
            tracing::info!(
                "Failover monitor started (primary: {}, replica: {})",
                self.primary.name,
                self.replica.name
            );
            let mut interval = tokio::time::interval(self.config.probe_interval());
            interval.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Delay);
            loop {
                interval.tick().await;
                self.tick().await;
            }
        })
    }
}

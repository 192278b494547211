//! Failover monitor
//!
//! Periodically probes the active endpoint's liveness with a bounded
//! timeout. Three consecutive failures while the primary is active switch
//! traffic to the replica endpoint and broadcast a failover notification;
//! once on the replica there is no automatic failback.

pub mod failover;

pub use failover::{Endpoint, FailoverMonitor, MonitorState, ProbeTarget};

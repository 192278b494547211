//! Site wiring
//!
//! A site bundles one storage engine, its service loop, a replica store with
//! its receiver, the dispatcher, the loan worker, and one worker per async
//! topic. [`start_pair`] cross-wires two sites so each engine replicates
//! into the other site's replica receiver.

use crate::actors::{LoanWorker, Worker};
use crate::common::{Config, FailoverEvent, MutationEvent, Result, SiteId, Topic};
use crate::dispatch::{self, DispatchClient, Dispatcher, TopicChannels};
use crate::monitor::{Endpoint, FailoverMonitor, ProbeTarget};
use crate::storage::{self, ReplicaReceiver, ReplicaStore, StorageClient, StorageEngine};
use std::sync::Arc;
use tokio::sync::{broadcast, mpsc};
use tokio::task::JoinHandle;

/// Handles to one running site
pub struct SiteHandle {
    pub site_id: SiteId,
    pub dispatch: DispatchClient,
    pub storage: StorageClient,
    pub engine: Arc<StorageEngine>,
    pub replica: Arc<ReplicaStore>,
    tasks: Vec<JoinHandle<()>>,
}

impl SiteHandle {
    /// Stop all of the site's loops. Safe at any point: every storage
    /// mutation is atomic at the transaction boundary.
    pub fn shutdown(&self) {
        for task in &self.tasks {
            task.abort();
        }
    }
}

/// Start one site.
///
/// `replication_tx` carries this site's mutation events to the paired site;
/// `replica_rx` receives the paired site's events into the local replica.
pub fn start_site(
    site_id: SiteId,
    config: &Config,
    replication_tx: Option<mpsc::Sender<MutationEvent>>,
    replica_rx: mpsc::Receiver<MutationEvent>,
) -> Result<SiteHandle> {
    let data_dir = &config.storage.data_dir;
    std::fs::create_dir_all(data_dir)?;

    // Primary store
    let engine = Arc::new(StorageEngine::open(
        site_id,
        data_dir.join(format!("site{site_id}.db")),
        replication_tx,
    )?);
    engine.seed(
        config.storage.catalog_size,
        config.storage.initial_loans(site_id),
    )?;

    // Replica store + receiver
    let replica = Arc::new(ReplicaStore::open(
        data_dir.join(format!("site{site_id}_replica.db")),
    )?);
    let mut tasks = vec![ReplicaReceiver::spawn(replica.clone(), replica_rx)];

    // Storage service loop
    let (storage_tx, storage_job_rx) = mpsc::channel(config.storage.request_buffer);
    let storage_client = StorageClient::new(storage_tx);
    tasks.push(storage::service::spawn(engine.clone(), storage_job_rx));

    // Dispatcher, loan worker, topic workers
    let topics = TopicChannels::new(config.dispatch.topic_buffer);
    let (loan_tx, loan_rx) = mpsc::channel(config.dispatch.loan_buffer);
    let (dispatch_tx, dispatch_rx) = mpsc::channel(config.dispatch.request_buffer);

    tasks.push(LoanWorker::new(storage_client.clone()).spawn(loan_rx));
    tasks.push(
        Worker::new(Topic::Return, storage_client.clone()).spawn(topics.subscribe(Topic::Return)),
    );
    tasks.push(
        Worker::new(Topic::Renew, storage_client.clone()).spawn(topics.subscribe(Topic::Renew)),
    );
    tasks.push(dispatch::spawn(
        Dispatcher::new(loan_tx, topics),
        dispatch_rx,
    ));

    tracing::info!("Site {} started", site_id);

    Ok(SiteHandle {
        site_id,
        dispatch: DispatchClient::new(dispatch_tx),
        storage: storage_client,
        engine,
        replica,
        tasks,
    })
}

/// Start both sites, cross-wired: site 1 replicates into site 2's replica
/// receiver and vice versa. Each replica's catalog is synced wholesale from
/// the paired primary before traffic starts.
pub fn start_pair(config: &Config) -> Result<(SiteHandle, SiteHandle)> {
    let (to_site2, from_site1) = mpsc::channel(config.storage.replication_buffer);
    let (to_site1, from_site2) = mpsc::channel(config.storage.replication_buffer);

    let site1 = start_site(1, config, Some(to_site2), from_site2)?;
    let site2 = start_site(2, config, Some(to_site1), from_site1)?;

    site1.replica.sync_catalog_from(&site2.engine)?;
    site2.replica.sync_catalog_from(&site1.engine)?;

    Ok((site1, site2))
}

/// Start the failover monitors for a site pair: per site, one monitor
/// probes the local storage and one probes the local dispatcher, each with
/// the paired site's counterpart as the failover target.
pub fn start_monitors(
    config: &Config,
    site1: &SiteHandle,
    site2: &SiteHandle,
    notify: broadcast::Sender<FailoverEvent>,
) -> Vec<JoinHandle<()>> {
    let storage1 = Endpoint::new("site1-storage", ProbeTarget::Storage(site1.storage.clone()));
    let storage2 = Endpoint::new("site2-storage", ProbeTarget::Storage(site2.storage.clone()));
    let dispatch1 = Endpoint::new(
        "site1-dispatch",
        ProbeTarget::Dispatcher(site1.dispatch.clone()),
    );
    let dispatch2 = Endpoint::new(
        "site2-dispatch",
        ProbeTarget::Dispatcher(site2.dispatch.clone()),
    );

    let monitors = [
        FailoverMonitor::new(
            config.monitor.clone(),
            storage1.clone(),
            storage2.clone(),
            notify.clone(),
        ),
        FailoverMonitor::new(config.monitor.clone(), storage2, storage1, notify.clone()),
        FailoverMonitor::new(
            config.monitor.clone(),
            dispatch1.clone(),
            dispatch2.clone(),
            notify.clone(),
        ),
        FailoverMonitor::new(config.monitor.clone(), dispatch2, dispatch1, notify),
    ];
    monitors.into_iter().map(FailoverMonitor::spawn).collect()
}

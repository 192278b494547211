//! Channel front for the storage engine
//!
//! Models the storage request/reply loop: a closed request enum over a
//! bounded mpsc channel, one reply per request over a oneshot. The loan
//! worker, the topic workers, and the failover monitor all reach storage
//! through a [`StorageClient`] handle.

use crate::common::{ClientResponse, Error, HealthStatus, Result};
use crate::storage::engine::{Availability, CommitReceipt, StorageEngine};
use std::sync::Arc;
use tokio::sync::{mpsc, oneshot};
use tokio::task::JoinHandle;

/// Closed set of storage operations
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum StorageRequest {
    CheckAvailability { code: String },
    CommitLoan { code: String, borrower: String },
    CommitReturn { code: String, borrower: String },
    CommitRenew { code: String, borrower: String },
    HealthCheck,
}

/// Reply to a storage request
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum StorageReply {
    Availability(Availability),
    Outcome(ClientResponse),
    Health(HealthStatus),
}

/// One queued request plus its reply slot
#[derive(Debug)]
pub struct StorageJob {
    pub request: StorageRequest,
    pub reply: oneshot::Sender<StorageReply>,
}

/// Cloneable handle to the storage service loop
#[derive(Debug, Clone)]
pub struct StorageClient {
    tx: mpsc::Sender<StorageJob>,
}

impl StorageClient {
    pub fn new(tx: mpsc::Sender<StorageJob>) -> Self {
        Self { tx }
    }

    async fn request(&self, request: StorageRequest) -> Result<StorageReply> {
        let (reply_tx, reply_rx) = oneshot::channel();
        self.tx
            .send(StorageJob {
                request,
                reply: reply_tx,
            })
            .await
            .map_err(|_| Error::Transport("storage service unavailable".into()))?;
        reply_rx
            .await
            .map_err(|_| Error::Transport("storage service dropped request".into()))
    }

    pub async fn check_availability(&self, code: &str) -> Result<Availability> {
        match self
            .request(StorageRequest::CheckAvailability {
                code: code.to_string(),
            })
            .await?
        {
            StorageReply::Availability(avail) => Ok(avail),
            other => Err(Error::Internal(format!("unexpected reply: {other:?}"))),
        }
    }

    pub async fn commit_loan(&self, code: &str, borrower: &str) -> Result<ClientResponse> {
        self.commit(StorageRequest::CommitLoan {
            code: code.to_string(),
            borrower: borrower.to_string(),
        })
        .await
    }

    pub async fn commit_return(&self, code: &str, borrower: &str) -> Result<ClientResponse> {
        self.commit(StorageRequest::CommitReturn {
            code: code.to_string(),
            borrower: borrower.to_string(),
        })
        .await
    }

    pub async fn commit_renew(&self, code: &str, borrower: &str) -> Result<ClientResponse> {
        self.commit(StorageRequest::CommitRenew {
            code: code.to_string(),
            borrower: borrower.to_string(),
        })
        .await
    }

    pub async fn health_check(&self) -> Result<HealthStatus> {
        match self.request(StorageRequest::HealthCheck).await? {
            StorageReply::Health(health) => Ok(health),
            other => Err(Error::Internal(format!("unexpected reply: {other:?}"))),
        }
    }

    async fn commit(&self, request: StorageRequest) -> Result<ClientResponse> {
        match self.request(request).await? {
            StorageReply::Outcome(resp) => Ok(resp),
            other => Err(Error::Internal(format!("unexpected reply: {other:?}"))),
        }
    }
}

/// Spawn the storage service loop. One request is handled at a time; the
/// engine's own mutex is the serialization point for mutations.
pub fn spawn(engine: Arc<StorageEngine>, mut rx: mpsc::Receiver<StorageJob>) -> JoinHandle<()> {
    tokio::spawn(async move {
        while let Some(job) = rx.recv().await {
            let reply = handle(&engine, &job.request);
            if job.reply.send(reply).is_err() {
                tracing::warn!("Storage caller went away before reply");
            }
        }
        tracing::info!("Storage service loop stopped (site {})", engine.site_id());
    })
}

fn handle(engine: &StorageEngine, request: &StorageRequest) -> StorageReply {
    match request {
        StorageRequest::HealthCheck => StorageReply::Health(engine.health_check()),
        StorageRequest::CheckAvailability { code } => match engine.check_availability(code) {
            Ok(avail) => StorageReply::Availability(avail),
            Err(e) => {
                tracing::error!("Availability check failed: {}", e);
                StorageReply::Availability(Availability {
                    available: false,
                    message: "availability check failed".to_string(),
                })
            }
        },
        StorageRequest::CommitLoan { code, borrower } => {
            outcome(engine.commit_loan(code, borrower))
        }
        StorageRequest::CommitReturn { code, borrower } => {
            outcome(engine.commit_return(code, borrower))
        }
        StorageRequest::CommitRenew { code, borrower } => {
            outcome(engine.commit_renew(code, borrower))
        }
    }
}

/// Fold a commit result into the structured response shape
fn outcome(result: Result<CommitReceipt>) -> StorageReply {
    StorageReply::Outcome(match result {
        Ok(receipt) => {
            let mut resp = ClientResponse::ok(receipt.message);
            resp.due_date = receipt.due_date;
            resp.renewals = receipt.renewals;
            resp
        }
        Err(e) => {
            if !e.is_domain() {
                tracing::error!("Commit failed: {}", e);
            }
            ClientResponse::from_error(&e)
        }
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::storage::engine::CatalogItem;

    fn start() -> (StorageClient, Arc<StorageEngine>) {
        let engine = Arc::new(StorageEngine::open_in_memory(1, None).unwrap());
        engine
            .put_item(&CatalogItem {
                code: "ISBN0001".into(),
                title: "Book 1".into(),
                author: "Author 1".into(),
                total_copies: 2,
                available_copies: 2,
            })
            .unwrap();
        let (tx, rx) = mpsc::channel(8);
        spawn(engine.clone(), rx);
        (StorageClient::new(tx), engine)
    }

    #[tokio::test]
    async fn test_loan_through_client() {
        let (client, engine) = start();
        let resp = client.commit_loan("ISBN0001", "user1").await.unwrap();
        assert!(resp.success);
        assert!(resp.due_date.is_some());
        assert_eq!(engine.item("ISBN0001").unwrap().unwrap().available_copies, 1);
    }

    #[tokio::test]
    async fn test_domain_failure_becomes_failure_response() {
        let (client, _engine) = start();
        let resp = client.commit_return("ISBN0001", "nobody").await.unwrap();
        assert!(!resp.success);
        assert!(resp.message.contains("no active loan"));
    }

    #[tokio::test]
    async fn test_health_through_client() {
        let (client, _engine) = start();
        let health = client.health_check().await.unwrap();
        assert!(health.is_ok());
        assert_eq!(health.site_id, 1);
    }

    #[tokio::test]
    async fn test_closed_channel_is_transport_error() {
        let (tx, rx) = mpsc::channel(1);
        drop(rx);
        let client = StorageClient::new(tx);
        let err = client.health_check().await.unwrap_err();
        assert!(matches!(err, Error::Transport(_)));
    }
}

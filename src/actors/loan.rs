//! Synchronous loan worker
//!
//! Consumes the dispatcher's loan channel one request at a time and runs the
//! two-step protocol against storage: advisory availability check, then the
//! commit. The window between the two steps can race with concurrent loans;
//! correctness comes from `commit_loan` re-validating availability inside
//! its own transaction.

use crate::common::{ClientRequest, ClientResponse};
use crate::dispatch::LoanJob;
use crate::storage::StorageClient;
use tokio::sync::mpsc;
use tokio::task::JoinHandle;

pub struct LoanWorker {
    storage: StorageClient,
}

impl LoanWorker {
    pub fn new(storage: StorageClient) -> Self {
        Self { storage }
    }

    pub fn spawn(self, mut rx: mpsc::Receiver<LoanJob>) -> JoinHandle<()> {
        tokio::spawn(async move {
            while let Some(job) = rx.recv().await {
                tracing::info!(
                    "Loan request: borrower={} item={}",
                    job.request.borrower,
                    job.request.item
                );
                let response = self.process(&job.request).await;
                if response.success {
                    tracing::info!("{}", response.message);
                } else {
                    tracing::warn!("{}", response.message);
                }
                let _ = job.reply.send(response);
            }
            tracing::info!("Loan worker stopped");
        })
    }

    async fn process(&self, request: &ClientRequest) -> ClientResponse {
        // Step 1: advisory check, short-circuits the common failure cases
        let availability = match self.storage.check_availability(&request.item).await {
            Ok(availability) => availability,
            Err(e) => {
                tracing::error!("Availability check failed: {}", e);
                return ClientResponse::failure("loan could not be processed");
            }
        };
        if !availability.available {
            return ClientResponse::failure(availability.message);
        }

        // Step 2: the commit re-validates under its own transaction
        match self.storage.commit_loan(&request.item, &request.borrower).await {
            Ok(response) => response,
            Err(e) => {
                tracing::error!("Loan commit failed: {}", e);
                ClientResponse::failure("loan could not be processed")
            }
        }
    }
}

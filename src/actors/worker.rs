//! Asynchronous topic worker
//!
//! Subscribes to exactly one broadcast topic. Each received event is parsed
//! at the boundary, committed against storage, and the outcome logged. No
//! retry and no reply: the client was already acknowledged by the
//! dispatcher, so a failed commit can only be surfaced in logs.

use crate::common::{Topic, TopicEvent};
use crate::storage::StorageClient;
use tokio::sync::broadcast;
use tokio::task::JoinHandle;

pub struct Worker {
    topic: Topic,
    storage: StorageClient,
}

impl Worker {
    pub fn new(topic: Topic, storage: StorageClient) -> Self {
        Self { topic, storage }
    }

    pub fn spawn(self, mut rx: broadcast::Receiver<String>) -> JoinHandle<()> {
        tokio::spawn(async move {
            tracing::info!("Worker subscribed to '{}'", self.topic);
            loop {
                match rx.recv().await {
                    Ok(line) => self.handle(&line).await,
                    Err(broadcast::error::RecvError::Lagged(n)) => {
                        tracing::warn!("Worker '{}' lagged, {} events missed", self.topic, n);
                    }
                    Err(broadcast::error::RecvError::Closed) => break,
                }
            }
            tracing::info!("Worker '{}' stopped", self.topic);
        })
    }

    async fn handle(&self, line: &str) {
        let event = match TopicEvent::parse_wire(line) {
            Ok(event) => event,
            Err(e) => {
                tracing::warn!("Worker '{}' dropped malformed event {:?}: {}", self.topic, line, e);
                return;
            }
        };
        if event.topic != self.topic {
            return;
        }

        tracing::info!(
            "{} | borrower={} item={}",
            self.topic.as_str().to_uppercase(),
            event.borrower,
            event.item
        );

        let result = match self.topic {
            Topic::Return => self.storage.commit_return(&event.item, &event.borrower).await,
            Topic::Renew => self.storage.commit_renew(&event.item, &event.borrower).await,
        };

        // The event is discarded either way
        match result {
            Ok(response) if response.success => tracing::info!("{}", response.message),
            Ok(response) => tracing::warn!("{}", response.message),
            Err(e) => tracing::error!("Worker '{}' commit failed: {}", self.topic, e),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::storage::engine::CatalogItem;
    use crate::storage::{self, StorageEngine};
    use std::sync::Arc;
    use tokio::sync::mpsc;
    use tokio::time::{sleep, Duration};

    fn start_storage() -> (StorageClient, Arc<StorageEngine>) {
        let engine = Arc::new(StorageEngine::open_in_memory(1, None).unwrap());
        engine
            .put_item(&CatalogItem {
                code: "ISBN0001".into(),
                title: "Book 1".into(),
                author: "Author 1".into(),
                total_copies: 5,
                available_copies: 5,
            })
            .unwrap();
        let (tx, rx) = mpsc::channel(8);
        storage::service::spawn(engine.clone(), rx);
        (StorageClient::new(tx), engine)
    }

    #[tokio::test]
    async fn test_return_event_commits_against_storage() {
        let (storage, engine) = start_storage();
        engine.commit_loan("ISBN0001", "user7").unwrap();
        assert_eq!(engine.item("ISBN0001").unwrap().unwrap().available_copies, 4);

        let (topic_tx, topic_rx) = broadcast::channel(8);
        Worker::new(Topic::Return, storage).spawn(topic_rx);

        topic_tx.send("return user7,ISBN0001".to_string()).unwrap();

        // The worker never replies; poll the store for the effect
        for _ in 0..50 {
            if engine.loans_for("ISBN0001", "user7").unwrap().is_empty() {
                break;
            }
            sleep(Duration::from_millis(10)).await;
        }
        assert!(engine.loans_for("ISBN0001", "user7").unwrap().is_empty());
        assert_eq!(engine.item("ISBN0001").unwrap().unwrap().available_copies, 5);
    }

    #[tokio::test]
    async fn test_failed_commit_is_logged_and_discarded() {
        let (storage, engine) = start_storage();
        let (topic_tx, topic_rx) = broadcast::channel(8);
        let handle = Worker::new(Topic::Renew, storage).spawn(topic_rx);

        // No such loan; the worker logs and moves on
        topic_tx.send("renew nobody,ISBN0001".to_string()).unwrap();
        drop(topic_tx);
        handle.await.unwrap();

        assert!(engine.loans_for("ISBN0001", "nobody").unwrap().is_empty());
    }

    #[tokio::test]
    async fn test_malformed_event_is_dropped() {
        let (storage, _engine) = start_storage();
        let (topic_tx, topic_rx) = broadcast::channel(8);
        let handle = Worker::new(Topic::Return, storage).spawn(topic_rx);

        topic_tx.send("not-a-topic-event".to_string()).unwrap();
        drop(topic_tx);
        handle.await.unwrap();
    }
}

//! Request routing: synchronous loans, optimistic returns/renewals

use crate::common::{
    ClientRequest, ClientResponse, Error, ProbeStatus, RequestKind, Result, Topic, TopicEvent,
};
use tokio::sync::{broadcast, mpsc, oneshot};
use tokio::task::JoinHandle;

/// One loan request forwarded to the loan worker, reply relayed verbatim
#[derive(Debug)]
pub struct LoanJob {
    pub request: ClientRequest,
    pub reply: oneshot::Sender<ClientResponse>,
}

/// The two broadcast topics the dispatcher publishes on.
///
/// Events travel in wire form (`"<topic> <borrower>,<item>"`); workers parse
/// them back at their boundary.
#[derive(Debug, Clone)]
pub struct TopicChannels {
    pub return_topic: broadcast::Sender<String>,
    pub renew_topic: broadcast::Sender<String>,
}

impl TopicChannels {
    pub fn new(capacity: usize) -> Self {
        Self {
            return_topic: broadcast::channel(capacity).0,
            renew_topic: broadcast::channel(capacity).0,
        }
    }

    pub fn sender(&self, topic: Topic) -> &broadcast::Sender<String> {
        match topic {
            Topic::Return => &self.return_topic,
            Topic::Renew => &self.renew_topic,
        }
    }

    pub fn subscribe(&self, topic: Topic) -> broadcast::Receiver<String> {
        self.sender(topic).subscribe()
    }
}

/// Requests the dispatcher serves: client traffic plus the monitor's probe
#[derive(Debug)]
pub enum DispatchRequest {
    Client {
        line: String,
        reply: oneshot::Sender<ClientResponse>,
    },
    Probe {
        reply: oneshot::Sender<ProbeStatus>,
    },
}

/// Cloneable handle to the dispatcher loop
#[derive(Debug, Clone)]
pub struct DispatchClient {
    tx: mpsc::Sender<DispatchRequest>,
}

impl DispatchClient {
    pub fn new(tx: mpsc::Sender<DispatchRequest>) -> Self {
        Self { tx }
    }

    /// Submit one client request in wire form and wait for the response
    pub async fn submit(&self, line: &str) -> Result<ClientResponse> {
        let (reply_tx, reply_rx) = oneshot::channel();
        self.tx
            .send(DispatchRequest::Client {
                line: line.to_string(),
                reply: reply_tx,
            })
            .await
            .map_err(|_| Error::Transport("dispatcher unavailable".into()))?;
        reply_rx
            .await
            .map_err(|_| Error::Transport("dispatcher dropped request".into()))
    }

    /// Liveness probe, used only by the failover monitor
    pub async fn probe(&self) -> Result<ProbeStatus> {
        let (reply_tx, reply_rx) = oneshot::channel();
        self.tx
            .send(DispatchRequest::Probe { reply: reply_tx })
            .await
            .map_err(|_| Error::Transport("dispatcher unavailable".into()))?;
        reply_rx
            .await
            .map_err(|_| Error::Transport("dispatcher dropped probe".into()))
    }
}

pub struct Dispatcher {
    loan_tx: mpsc::Sender<LoanJob>,
    topics: TopicChannels,
}

impl Dispatcher {
    pub fn new(loan_tx: mpsc::Sender<LoanJob>, topics: TopicChannels) -> Self {
        Self { loan_tx, topics }
    }

    async fn handle_client(&self, line: &str) -> ClientResponse {
        let request = match ClientRequest::parse_wire(line) {
            Ok(request) => request,
            Err(e) => {
                tracing::warn!("Rejected malformed request {:?}: {}", line, e);
                return ClientResponse::from_error(&e);
            }
        };

        match request.kind {
            // The client blocks until the commit actually happened
            RequestKind::Loan => self.forward_loan(request).await,
            // Optimistic ack; the eventual commit outcome goes to logs only
            RequestKind::Return => self.publish(Topic::Return, request),
            RequestKind::Renew => self.publish(Topic::Renew, request),
        }
    }

    async fn forward_loan(&self, request: ClientRequest) -> ClientResponse {
        let (reply_tx, reply_rx) = oneshot::channel();
        let job = LoanJob {
            request,
            reply: reply_tx,
        };
        if self.loan_tx.send(job).await.is_err() {
            tracing::error!("Loan worker unavailable");
            return ClientResponse::failure("loan could not be processed");
        }
        match reply_rx.await {
            Ok(response) => response,
            Err(_) => {
                tracing::error!("Loan worker dropped request");
                ClientResponse::failure("loan could not be processed")
            }
        }
    }

    fn publish(&self, topic: Topic, request: ClientRequest) -> ClientResponse {
        let event = TopicEvent {
            topic,
            borrower: request.borrower,
            item: request.item,
        };
        match self.topics.sender(topic).send(event.to_wire()) {
            Ok(_) => tracing::info!("Published on '{}': {},{}", topic, event.borrower, event.item),
            Err(_) => tracing::warn!("No subscribers on '{}', event lost", topic),
        }
        ClientResponse::ok("request received")
    }
}

/// Spawn the dispatcher loop over its inbound request channel
pub fn spawn(dispatcher: Dispatcher, mut rx: mpsc::Receiver<DispatchRequest>) -> JoinHandle<()> {
    tokio::spawn(async move {
        while let Some(request) = rx.recv().await {
            match request {
                DispatchRequest::Client { line, reply } => {
                    let response = dispatcher.handle_client(&line).await;
                    let _ = reply.send(response);
                }
                DispatchRequest::Probe { reply } => {
                    let _ = reply.send(ProbeStatus::ok());
                }
            }
        }
        tracing::info!("Dispatcher loop stopped");
    })
}

//! Wire-adjacent request, response, and event types
//!
//! Clients speak a comma-joined text form (`"loan,user7,ISBN0001"`), topics a
//! space-separated form (`"return user7,ISBN0001"`). Both are validated into
//! closed enums at the boundary so dispatch logic never branches on raw
//! strings.

use crate::common::{Error, Result, SiteId};
use chrono::NaiveDate;
use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

/// Kind of a client request
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum RequestKind {
    Loan,
    Return,
    Renew,
}

impl RequestKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            RequestKind::Loan => "loan",
            RequestKind::Return => "return",
            RequestKind::Renew => "renew",
        }
    }
}

impl fmt::Display for RequestKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for RequestKind {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self> {
        match s.trim().to_ascii_lowercase().as_str() {
            "loan" => Ok(RequestKind::Loan),
            "return" => Ok(RequestKind::Return),
            "renew" => Ok(RequestKind::Renew),
            other => Err(Error::Validation(format!("unknown request kind: {other}"))),
        }
    }
}

/// A parsed client request: `(kind, borrower, item)`
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ClientRequest {
    pub kind: RequestKind,
    pub borrower: String,
    pub item: String,
}

impl ClientRequest {
    pub fn new(kind: RequestKind, borrower: impl Into<String>, item: impl Into<String>) -> Self {
        Self {
            kind,
            borrower: borrower.into(),
            item: item.into(),
        }
    }

    /// Parse the client wire form `"<kind>,<borrower>,<item>"`.
    ///
    /// Anything but exactly three non-empty fields is a validation error and
    /// must be rejected before any dispatch happens.
    pub fn parse_wire(line: &str) -> Result<Self> {
        let fields: Vec<&str> = line.split(',').map(str::trim).collect();
        if fields.len() != 3 {
            return Err(Error::Validation(format!(
                "expected 3 comma-separated fields, got {}",
                fields.len()
            )));
        }
        if fields.iter().any(|f| f.is_empty()) {
            return Err(Error::Validation("empty field in request".into()));
        }
        Ok(Self {
            kind: fields[0].parse()?,
            borrower: fields[1].to_string(),
            item: fields[2].to_string(),
        })
    }

    pub fn to_wire(&self) -> String {
        format!("{},{},{}", self.kind, self.borrower, self.item)
    }
}

/// Structured response returned to clients
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ClientResponse {
    pub success: bool,
    pub message: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub due_date: Option<NaiveDate>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub renewals: Option<u32>,
}

impl ClientResponse {
    pub fn ok(message: impl Into<String>) -> Self {
        Self {
            success: true,
            message: message.into(),
            due_date: None,
            renewals: None,
        }
    }

    pub fn failure(message: impl Into<String>) -> Self {
        Self {
            success: false,
            message: message.into(),
            due_date: None,
            renewals: None,
        }
    }

    pub fn with_due_date(mut self, due: NaiveDate) -> Self {
        self.due_date = Some(due);
        self
    }

    pub fn with_renewals(mut self, count: u32) -> Self {
        self.renewals = Some(count);
        self
    }

    /// Failure response for an error on a synchronous path.
    ///
    /// Domain errors keep their human-readable reason; infrastructure faults
    /// collapse into a generic message so internals never leak to clients.
    pub fn from_error(err: &Error) -> Self {
        if err.is_domain() {
            Self::failure(err.to_string())
        } else {
            Self::failure("request could not be processed")
        }
    }
}

/// Async processing topics
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Topic {
    Return,
    Renew,
}

impl Topic {
    pub fn as_str(&self) -> &'static str {
        match self {
            Topic::Return => "return",
            Topic::Renew => "renew",
        }
    }
}

impl fmt::Display for Topic {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for Topic {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self> {
        match s {
            "return" => Ok(Topic::Return),
            "renew" => Ok(Topic::Renew),
            other => Err(Error::Validation(format!("unknown topic: {other}"))),
        }
    }
}

/// Event published on a broadcast topic, wire form `"<topic> <borrower>,<item>"`
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TopicEvent {
    pub topic: Topic,
    pub borrower: String,
    pub item: String,
}

impl TopicEvent {
    pub fn parse_wire(line: &str) -> Result<Self> {
        let (topic, rest) = line
            .split_once(' ')
            .ok_or_else(|| Error::Validation(format!("malformed topic event: {line}")))?;
        let (borrower, item) = rest
            .split_once(',')
            .ok_or_else(|| Error::Validation(format!("malformed topic event: {line}")))?;
        if borrower.trim().is_empty() || item.trim().is_empty() {
            return Err(Error::Validation("empty field in topic event".into()));
        }
        Ok(Self {
            topic: topic.parse()?,
            borrower: borrower.trim().to_string(),
            item: item.trim().to_string(),
        })
    }

    pub fn to_wire(&self) -> String {
        format!("{} {},{}", self.topic, self.borrower, self.item)
    }
}

/// Replication payload describing one committed mutation.
///
/// Produced after a successful commit, consumed once by the paired site's
/// replica receiver. Never persisted or replayed.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "lowercase")]
pub enum MutationEvent {
    Loan {
        item_code: String,
        borrower: String,
        loan_date: NaiveDate,
        due_date: NaiveDate,
    },
    Return {
        item_code: String,
        borrower: String,
    },
    Renew {
        item_code: String,
        borrower: String,
        due_date: NaiveDate,
        renewals: u32,
    },
}

impl MutationEvent {
    pub fn item_code(&self) -> &str {
        match self {
            MutationEvent::Loan { item_code, .. }
            | MutationEvent::Return { item_code, .. }
            | MutationEvent::Renew { item_code, .. } => item_code,
        }
    }

    pub fn kind(&self) -> &'static str {
        match self {
            MutationEvent::Loan { .. } => "loan",
            MutationEvent::Return { .. } => "return",
            MutationEvent::Renew { .. } => "renew",
        }
    }
}

/// Liveness probe response from the storage engine
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct HealthStatus {
    pub status: String,
    pub site_id: SiteId,
}

impl HealthStatus {
    pub fn ok(site_id: SiteId) -> Self {
        Self {
            status: "ok".to_string(),
            site_id,
        }
    }

    pub fn is_ok(&self) -> bool {
        self.status == "ok"
    }
}

/// Liveness probe response from the dispatcher
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ProbeStatus {
    pub status: String,
}

impl ProbeStatus {
    pub fn ok() -> Self {
        Self {
            status: "ok".to_string(),
        }
    }

    pub fn is_ok(&self) -> bool {
        self.status == "ok"
    }
}

/// Failover notification broadcast to all components
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct FailoverEvent {
    pub event: String,
    pub new_endpoint: String,
}

impl FailoverEvent {
    pub fn new(new_endpoint: impl Into<String>) -> Self {
        Self {
            event: "failover".to_string(),
            new_endpoint: new_endpoint.into(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_client_request() {
        let req = ClientRequest::parse_wire("loan,user7,ISBN0001").unwrap();
        assert_eq!(req.kind, RequestKind::Loan);
        assert_eq!(req.borrower, "user7");
        assert_eq!(req.item, "ISBN0001");
    }

    #[test]
    fn test_parse_client_request_trims_and_lowercases_kind() {
        let req = ClientRequest::parse_wire(" Return , user1 , ISBN0002 ").unwrap();
        assert_eq!(req.kind, RequestKind::Return);
        assert_eq!(req.borrower, "user1");
    }

    #[test]
    fn test_parse_client_request_wrong_field_count() {
        let err = ClientRequest::parse_wire("loan,user1").unwrap_err();
        assert!(err.is_validation());

        let err = ClientRequest::parse_wire("loan,user1,ISBN0001,extra").unwrap_err();
        assert!(err.is_validation());
    }

    #[test]
    fn test_parse_client_request_unknown_kind() {
        let err = ClientRequest::parse_wire("purchase,user1,ISBN0001").unwrap_err();
        assert!(err.is_validation());
    }

    #[test]
    fn test_topic_event_round_trip() {
        let ev = TopicEvent {
            topic: Topic::Renew,
            borrower: "user9".into(),
            item: "ISBN0042".into(),
        };
        let parsed = TopicEvent::parse_wire(&ev.to_wire()).unwrap();
        assert_eq!(parsed, ev);
    }

    #[test]
    fn test_topic_event_malformed() {
        assert!(TopicEvent::parse_wire("return").is_err());
        assert!(TopicEvent::parse_wire("return user1").is_err());
        assert!(TopicEvent::parse_wire("purchase user1,ISBN0001").is_err());
    }

    #[test]
    fn test_mutation_event_json_tag() {
        let ev = MutationEvent::Return {
            item_code: "ISBN0001".into(),
            borrower: "user7".into(),
        };
        let json = serde_json::to_string(&ev).unwrap();
        assert!(json.contains("\"kind\":\"return\""));
        let back: MutationEvent = serde_json::from_str(&json).unwrap();
        assert_eq!(back, ev);
    }

    #[test]
    fn test_error_response_hides_internal_faults() {
        let resp = ClientResponse::from_error(&Error::Transport("channel closed".into()));
        assert!(!resp.success);
        assert!(!resp.message.contains("channel"));

        let resp = ClientResponse::from_error(&Error::Capacity("no copies available".into()));
        assert_eq!(resp.message, "no copies available");
    }
}

//! Common utilities and types shared across minilend

pub mod config;
pub mod error;
pub mod protocol;
pub mod utils;

pub use config::{Config, DispatchConfig, MonitorConfig, StorageConfig};
pub use error::{Error, Result};
pub use protocol::{
    ClientRequest, ClientResponse, FailoverEvent, HealthStatus, MutationEvent, ProbeStatus,
    RequestKind, Topic, TopicEvent,
};
pub use utils::{
    due_date_for_loan, renewed_due_date, today, SiteId, LOAN_PERIOD_DAYS,
    MAX_RENEWALS, RENEWAL_EXTENSION_DAYS,
};

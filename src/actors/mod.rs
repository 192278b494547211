//! Worker actors
//!
//! - [`loan::LoanWorker`]: synchronous actor behind the dispatcher's blocking
//!   loan channel; runs the check-then-commit loan protocol
//! - [`worker::Worker`]: asynchronous actor subscribed to one broadcast
//!   topic; commits and logs, never replies

pub mod loan;
pub mod worker;

pub use loan::LoanWorker;
pub use worker::Worker;

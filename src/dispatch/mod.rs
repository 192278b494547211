//! Coordinator (load dispatcher)
//!
//! Entry point for client traffic. Validates the wire shape, then routes:
//! loans synchronously through the loan worker (the client blocks for the
//! real outcome), returns and renewals optimistically (immediate ack, then a
//! broadcast publish for asynchronous processing).

pub mod dispatcher;

pub use dispatcher::{
    spawn, DispatchClient, DispatchRequest, Dispatcher, LoanJob, TopicChannels,
};

//! # minilend
//!
//! A two-site distributed library lending system with:
//! - A transactional SQLite catalog/loan store per site
//! - Best-effort, at-most-once cross-site replication
//! - Synchronous loan dispatch, asynchronous return/renewal topics
//! - Health-check driven failover from primary to replica
//!
//! ## Architecture
//!
//! ```text
//!              ┌────────────────────────────┐
//!              │        Coordinator         │
//!              │      (load dispatcher)     │
//!              └─────┬───────────────┬──────┘
//!          loan (sync)         return/renew (topics)
//!              │                       │
//!        ┌─────▼───────┐     ┌─────────▼─────────┐
//!        │ Loan Worker │     │   Topic Workers   │
//!        └─────┬───────┘     └─────────┬─────────┘
//!              │                       │
//!              └───────────┬───────────┘
//!                    ┌─────▼──────┐   best-effort   ┌──────────────────┐
//!                    │  Storage   │ ──────────────▶ │ Replica Receiver │
//!                    │  Engine    │   (try_send)    │   (other site)   │
//!                    └─────▲──────┘                 └──────────────────┘
//!                          │ health probes
//!                    ┌─────┴──────┐
//!                    │  Failover  │──▶ failover broadcast
//!                    │  Monitor   │
//!                    └────────────┘
//! ```
//!
//! ## Usage
//!
//! ```bash
//! # Run both sites in one process, with a demo request file
//! minilend-site --data-dir ./data --requests ./requests.txt
//! ```

pub mod actors;
pub mod common;
pub mod dispatch;
pub mod monitor;
pub mod site;
pub mod storage;

// Re-export commonly used types
pub use common::{Config, Error, Result};
pub use site::{start_pair, SiteHandle};
pub use storage::StorageEngine;

/// Current version
pub const VERSION: &str = env!("CARGO_PKG_VERSION");

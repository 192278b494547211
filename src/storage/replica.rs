//! Replica store and receiver
//!
//! The replica store holds a best-effort secondary copy of the *other*
//! site's data, with the same schema as the primary. It is written only by
//! the replica receiver, which drains the inbound replication channel and
//! applies each mutation event under the same transactional discipline as
//! the engine. Delivery is at-most-once with no ordering guarantee, so a
//! duplicated or reordered event can diverge the replica from the primary;
//! that is accepted under the eventual-consistency contract.

use crate::common::{Error, MutationEvent, Result};
use crate::storage::engine::{item_query, loans_query, CatalogItem, Loan, StorageEngine};
use crate::storage::schema;
use rusqlite::{params, Connection};
use std::path::Path;
use std::sync::{Arc, Mutex};
use tokio::sync::mpsc;
use tokio::task::JoinHandle;

pub struct ReplicaStore {
    conn: Mutex<Connection>,
}

impl ReplicaStore {
    /// Open (or create) the replica store. Never seeded; it fills up from
    /// the catalog sync and incoming mutation events.
    pub fn open(path: impl AsRef<Path>) -> Result<Self> {
        let conn = Connection::open(path)?;
        schema::init(&conn)?;
        Ok(Self {
            conn: Mutex::new(conn),
        })
    }

    /// In-memory replica, for tests
    pub fn open_in_memory() -> Result<Self> {
        let conn = Connection::open_in_memory()?;
        schema::init(&conn)?;
        Ok(Self {
            conn: Mutex::new(conn),
        })
    }

    /// One-shot wholesale copy of the paired primary's catalog into this
    /// replica, run before traffic starts. Replaces any existing rows.
    pub fn sync_catalog_from(&self, primary: &StorageEngine) -> Result<usize> {
        let items = primary.catalog_items()?;
        let mut conn = self.conn.lock().unwrap();
        let tx = conn.transaction()?;
        tx.execute("DELETE FROM catalog", [])?;
        for item in &items {
            tx.execute(
                "INSERT INTO catalog (code, title, author, total_copies, available_copies)
                 VALUES (?1, ?2, ?3, ?4, ?5)",
                params![
                    item.code,
                    item.title,
                    item.author,
                    item.total_copies,
                    item.available_copies
                ],
            )?;
        }
        tx.commit()?;
        tracing::info!("Replica catalog synced: {} items", items.len());
        Ok(items.len())
    }

    /// Apply one mutation event transactionally
    pub fn apply(&self, event: &MutationEvent) -> Result<()> {
        let mut conn = self.conn.lock().unwrap();
        let tx = conn.transaction()?;

        match event {
            MutationEvent::Loan {
                item_code,
                borrower,
                loan_date,
                due_date,
            } => {
                tx.execute(
                    "INSERT INTO loans (code, borrower, loan_date, due_date, renewals)
                     VALUES (?1, ?2, ?3, ?4, 0)",
                    params![item_code, borrower, loan_date, due_date],
                )?;
                // Clamped: a duplicated loan event must not drive the count
                // negative and break every later read of the row
                tx.execute(
                    "UPDATE catalog SET available_copies = MAX(available_copies - 1, 0)
                     WHERE code = ?1",
                    [item_code],
                )?;
            }
            MutationEvent::Return {
                item_code,
                borrower,
            } => {
                let deleted = tx.execute(
                    "DELETE FROM loans WHERE id = (
                        SELECT id FROM loans WHERE code = ?1 AND borrower = ?2
                        ORDER BY loan_date ASC, id ASC LIMIT 1
                    )",
                    params![item_code, borrower],
                )?;
                if deleted == 0 {
                    return Err(Error::NotFound(format!(
                        "no replica loan of {item_code} for {borrower}"
                    )));
                }
                tx.execute(
                    "UPDATE catalog SET available_copies = available_copies + 1 WHERE code = ?1",
                    [item_code],
                )?;
            }
            MutationEvent::Renew {
                item_code,
                borrower,
                due_date,
                renewals,
            } => {
                let updated = tx.execute(
                    "UPDATE loans SET due_date = ?1, renewals = ?2 WHERE id = (
                        SELECT id FROM loans WHERE code = ?3 AND borrower = ?4
                        ORDER BY loan_date ASC, id ASC LIMIT 1
                    )",
                    params![due_date, renewals, item_code, borrower],
                )?;
                if updated == 0 {
                    return Err(Error::NotFound(format!(
                        "no replica loan of {item_code} for {borrower}"
                    )));
                }
            }
        }

        tx.commit()?;
        Ok(())
    }

    // === Read helpers (tests, failover visibility) ===

    pub fn item(&self, code: &str) -> Result<Option<CatalogItem>> {
        let conn = self.conn.lock().unwrap();
        item_query(&conn, code)
    }

    pub fn loans_for(&self, code: &str, borrower: &str) -> Result<Vec<Loan>> {
        let conn = self.conn.lock().unwrap();
        loans_query(&conn, code, borrower)
    }
}

/// Passive sink draining the inbound replication channel.
///
/// Apply failures are logged and the event discarded; the primary has
/// already committed and nothing can be corrected after the fact.
pub struct ReplicaReceiver;

impl ReplicaReceiver {
    pub fn spawn(
        store: Arc<ReplicaStore>,
        mut rx: mpsc::Receiver<MutationEvent>,
    ) -> JoinHandle<()> {
        tokio::spawn(async move {
            while let Some(event) = rx.recv().await {
                match store.apply(&event) {
                    Ok(()) => tracing::debug!(
                        "Replicated {} event for {}",
                        event.kind(),
                        event.item_code()
                    ),
                    Err(e) => tracing::warn!(
                        "Failed to apply {} event for {}: {}",
                        event.kind(),
                        event.item_code(),
                        e
                    ),
                }
            }
            tracing::info!("Replica receiver stopped");
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::common::{due_date_for_loan, today};

    fn loan_event(code: &str, borrower: &str) -> MutationEvent {
        MutationEvent::Loan {
            item_code: code.to_string(),
            borrower: borrower.to_string(),
            loan_date: today(),
            due_date: due_date_for_loan(today()),
        }
    }

    fn replica_with_item(code: &str, total: u32, available: u32) -> ReplicaStore {
        let replica = ReplicaStore::open_in_memory().unwrap();
        {
            let conn = replica.conn.lock().unwrap();
            conn.execute(
                "INSERT INTO catalog (code, title, author, total_copies, available_copies)
                 VALUES (?1, 'Book', 'Author', ?2, ?3)",
                params![code, total, available],
            )
            .unwrap();
        }
        replica
    }

    #[test]
    fn test_apply_loan_then_return_round_trip() {
        let replica = replica_with_item("ISBN0001", 5, 3);

        replica.apply(&loan_event("ISBN0001", "user7")).unwrap();
        assert_eq!(replica.item("ISBN0001").unwrap().unwrap().available_copies, 2);
        assert_eq!(replica.loans_for("ISBN0001", "user7").unwrap().len(), 1);

        replica
            .apply(&MutationEvent::Return {
                item_code: "ISBN0001".into(),
                borrower: "user7".into(),
            })
            .unwrap();
        assert_eq!(replica.item("ISBN0001").unwrap().unwrap().available_copies, 3);
        assert!(replica.loans_for("ISBN0001", "user7").unwrap().is_empty());
    }

    #[test]
    fn test_renew_before_loan_is_rejected_and_logged_only() {
        let replica = replica_with_item("ISBN0002", 1, 1);

        // Out-of-order delivery: the renew arrives before its loan
        let err = replica
            .apply(&MutationEvent::Renew {
                item_code: "ISBN0002".into(),
                borrower: "user1".into(),
                due_date: today(),
                renewals: 1,
            })
            .unwrap_err();
        assert!(err.is_not_found());

        // The loan still applies afterwards, but the renewal is lost forever:
        // the replica now disagrees with what the primary computed
        replica.apply(&loan_event("ISBN0002", "user1")).unwrap();
        assert_eq!(replica.loans_for("ISBN0002", "user1").unwrap()[0].renewals, 0);
    }

    #[test]
    fn test_duplicate_loan_event_diverges_replica() {
        let replica = replica_with_item("ISBN0003", 2, 2);

        let ev = loan_event("ISBN0003", "user1");
        replica.apply(&ev).unwrap();
        replica.apply(&ev).unwrap();

        // Best effort, no idempotence: two rows and a double decrement
        assert_eq!(replica.loans_for("ISBN0003", "user1").unwrap().len(), 2);
        assert_eq!(replica.item("ISBN0003").unwrap().unwrap().available_copies, 0);
    }

    #[test]
    fn test_duplicate_loan_never_drives_availability_negative() {
        let replica = replica_with_item("ISBN0006", 1, 1);

        let ev = loan_event("ISBN0006", "user1");
        replica.apply(&ev).unwrap();
        replica.apply(&ev).unwrap();

        // Both rows land, but the count floors at zero and the row stays
        // readable on the diverged replica
        assert_eq!(replica.loans_for("ISBN0006", "user1").unwrap().len(), 2);
        assert_eq!(replica.item("ISBN0006").unwrap().unwrap().available_copies, 0);
    }

    #[tokio::test]
    async fn test_receiver_drains_channel() {
        let replica = Arc::new(replica_with_item("ISBN0004", 3, 3));
        let (tx, rx) = mpsc::channel(8);
        let handle = ReplicaReceiver::spawn(replica.clone(), rx);

        tx.send(loan_event("ISBN0004", "user2")).await.unwrap();
        drop(tx);
        handle.await.unwrap();

        assert_eq!(replica.item("ISBN0004").unwrap().unwrap().available_copies, 2);
    }
}

//! Authoritative transactional storage engine for one site
//!
//! All four commit operations run under a single site-wide mutex wrapping a
//! SQLite transaction, so concurrent callers within one site observe a
//! serial history. After each successful commit the engine attempts a
//! zero-wait replication send to the paired site; a full or closed channel
//! drops the event with a warning and never delays or fails the commit.

use crate::common::{
    due_date_for_loan, renewed_due_date, today, Error, MutationEvent, Result, SiteId,
    HealthStatus, MAX_RENEWALS,
};
use crate::storage::schema;
use chrono::NaiveDate;
use rusqlite::{params, Connection, OptionalExtension};
use std::path::Path;
use std::sync::Mutex;
use tokio::sync::mpsc;

/// One catalog row
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CatalogItem {
    pub code: String,
    pub title: String,
    pub author: String,
    pub total_copies: u32,
    pub available_copies: u32,
}

/// One active loan row
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Loan {
    pub id: i64,
    pub code: String,
    pub borrower: String,
    pub loan_date: NaiveDate,
    pub due_date: NaiveDate,
    pub renewals: u32,
}

/// Result of an availability check (advisory only; commits re-validate)
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Availability {
    pub available: bool,
    pub message: String,
}

/// Result of a successful commit operation
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CommitReceipt {
    pub message: String,
    pub due_date: Option<NaiveDate>,
    pub renewals: Option<u32>,
}

pub struct StorageEngine {
    site_id: SiteId,
    conn: Mutex<Connection>,
    replication: Option<mpsc::Sender<MutationEvent>>,
}

impl StorageEngine {
    /// Open (or create) the site's primary store.
    ///
    /// `replication` is the bounded channel towards the paired site's replica
    /// receiver; `None` disables replication entirely.
    pub fn open(
        site_id: SiteId,
        path: impl AsRef<Path>,
        replication: Option<mpsc::Sender<MutationEvent>>,
    ) -> Result<Self> {
        let conn = Connection::open(path)?;
        schema::init(&conn)?;
        Ok(Self {
            site_id,
            conn: Mutex::new(conn),
            replication,
        })
    }

    /// In-memory store, for tests and ephemeral runs
    pub fn open_in_memory(
        site_id: SiteId,
        replication: Option<mpsc::Sender<MutationEvent>>,
    ) -> Result<Self> {
        let conn = Connection::open_in_memory()?;
        schema::init(&conn)?;
        Ok(Self {
            site_id,
            conn: Mutex::new(conn),
            replication,
        })
    }

    pub fn site_id(&self) -> SiteId {
        self.site_id
    }

    /// Seed the synthetic catalog; a no-op if already seeded
    pub fn seed(&self, catalog_size: usize, initial_loans: usize) -> Result<usize> {
        let mut conn = self.conn.lock().unwrap();
        schema::seed(&mut conn, catalog_size, initial_loans)
    }

    /// Insert or replace a single catalog item (seeding and fixtures)
    pub fn put_item(&self, item: &CatalogItem) -> Result<()> {
        let conn = self.conn.lock().unwrap();
        conn.execute(
            "INSERT OR REPLACE INTO catalog (code, title, author, total_copies, available_copies)
             VALUES (?1, ?2, ?3, ?4, ?5)",
            params![
                item.code,
                item.title,
                item.author,
                item.total_copies,
                item.available_copies
            ],
        )?;
        Ok(())
    }

    /// Liveness check; never touches the transactional path
    pub fn health_check(&self) -> HealthStatus {
        HealthStatus::ok(self.site_id)
    }

    /// Read-only availability check. Never mutates; the answer is advisory
    /// because another loan can commit between this check and `commit_loan`.
    pub fn check_availability(&self, code: &str) -> Result<Availability> {
        let conn = self.conn.lock().unwrap();
        let row: Option<(String, u32)> = conn
            .query_row(
                "SELECT title, available_copies FROM catalog WHERE code = ?1",
                [code],
                |row| Ok((row.get(0)?, row.get(1)?)),
            )
            .optional()?;

        Ok(match row {
            None => Availability {
                available: false,
                message: format!("item {code} does not exist in the catalog"),
            },
            Some((title, 0)) => Availability {
                available: false,
                message: format!("no copies of '{title}' available"),
            },
            Some((title, n)) => Availability {
                available: true,
                message: format!("{n} cop{} of '{title}' available", if n == 1 { "y" } else { "ies" }),
            },
        })
    }

    /// Commit a loan: re-verify availability, decrement, insert the loan row.
    /// Fails with `NotFound` for an unknown item and `Capacity` when no copy
    /// is available, with no mutation in either case.
    pub fn commit_loan(&self, code: &str, borrower: &str) -> Result<CommitReceipt> {
        let mut conn = self.conn.lock().unwrap();
        let tx = conn.transaction()?;

        let row: Option<(String, u32)> = tx
            .query_row(
                "SELECT title, available_copies FROM catalog WHERE code = ?1",
                [code],
                |row| Ok((row.get(0)?, row.get(1)?)),
            )
            .optional()?;

        let title = match row {
            None => {
                return Err(Error::NotFound(format!(
                    "item {code} does not exist in the catalog"
                )))
            }
            Some((title, 0)) => {
                return Err(Error::Capacity(format!("no copies of '{title}' available")))
            }
            Some((title, _)) => title,
        };

        let loan_date = today();
        let due_date = due_date_for_loan(loan_date);

        tx.execute(
            "UPDATE catalog SET available_copies = available_copies - 1 WHERE code = ?1",
            [code],
        )?;
        tx.execute(
            "INSERT INTO loans (code, borrower, loan_date, due_date, renewals)
             VALUES (?1, ?2, ?3, ?4, 0)",
            params![code, borrower, loan_date, due_date],
        )?;
        tx.commit()?;
        drop(conn);

        self.replicate(MutationEvent::Loan {
            item_code: code.to_string(),
            borrower: borrower.to_string(),
            loan_date,
            due_date,
        });

        Ok(CommitReceipt {
            message: format!("loan of '{title}' granted"),
            due_date: Some(due_date),
            renewals: Some(0),
        })
    }

    /// Commit a return: delete the matching loan and increment availability.
    ///
    /// When the borrower holds several loans of the same item, the earliest
    /// loan date wins, then the lowest rowid.
    pub fn commit_return(&self, code: &str, borrower: &str) -> Result<CommitReceipt> {
        let mut conn = self.conn.lock().unwrap();
        let tx = conn.transaction()?;

        let loan_id: Option<i64> = tx
            .query_row(
                "SELECT id FROM loans WHERE code = ?1 AND borrower = ?2
                 ORDER BY loan_date ASC, id ASC LIMIT 1",
                params![code, borrower],
                |row| row.get(0),
            )
            .optional()?;

        let loan_id = loan_id.ok_or_else(|| {
            Error::NotFound(format!("no active loan of {code} for {borrower}"))
        })?;

        tx.execute("DELETE FROM loans WHERE id = ?1", [loan_id])?;
        tx.execute(
            "UPDATE catalog SET available_copies = available_copies + 1 WHERE code = ?1",
            [code],
        )?;
        let (title, available): (String, u32) = tx.query_row(
            "SELECT title, available_copies FROM catalog WHERE code = ?1",
            [code],
            |row| Ok((row.get(0)?, row.get(1)?)),
        )?;
        tx.commit()?;
        drop(conn);

        self.replicate(MutationEvent::Return {
            item_code: code.to_string(),
            borrower: borrower.to_string(),
        });

        Ok(CommitReceipt {
            message: format!("return of '{title}' recorded, {available} available"),
            due_date: None,
            renewals: None,
        })
    }

    /// Commit a renewal: extend the due date by one week, up to two renewals
    pub fn commit_renew(&self, code: &str, borrower: &str) -> Result<CommitReceipt> {
        let mut conn = self.conn.lock().unwrap();
        let tx = conn.transaction()?;

        let loan: Option<(i64, NaiveDate, u32)> = tx
            .query_row(
                "SELECT id, due_date, renewals FROM loans WHERE code = ?1 AND borrower = ?2
                 ORDER BY loan_date ASC, id ASC LIMIT 1",
                params![code, borrower],
                |row| Ok((row.get(0)?, row.get(1)?, row.get(2)?)),
            )
            .optional()?;

        let (loan_id, due_date, renewals) = loan.ok_or_else(|| {
            Error::NotFound(format!("no active loan of {code} for {borrower}"))
        })?;

        if renewals >= MAX_RENEWALS {
            return Err(Error::Capacity(format!(
                "maximum renewals reached ({MAX_RENEWALS}/{MAX_RENEWALS})"
            )));
        }

        let new_due = renewed_due_date(due_date);
        let new_count = renewals + 1;
        tx.execute(
            "UPDATE loans SET due_date = ?1, renewals = ?2 WHERE id = ?3",
            params![new_due, new_count, loan_id],
        )?;
        let title: String = tx.query_row(
            "SELECT title FROM catalog WHERE code = ?1",
            [code],
            |row| row.get(0),
        )?;
        tx.commit()?;
        drop(conn);

        self.replicate(MutationEvent::Renew {
            item_code: code.to_string(),
            borrower: borrower.to_string(),
            due_date: new_due,
            renewals: new_count,
        });

        Ok(CommitReceipt {
            message: format!("renewal {new_count}/{MAX_RENEWALS} of '{title}' recorded"),
            due_date: Some(new_due),
            renewals: Some(new_count),
        })
    }

    /// Zero-wait replication send. Drops the event on back-pressure or a
    /// closed channel; the commit has already succeeded either way.
    fn replicate(&self, event: MutationEvent) {
        let Some(tx) = &self.replication else {
            return;
        };
        match tx.try_send(event) {
            Ok(()) => tracing::trace!("Mutation event replicated"),
            Err(mpsc::error::TrySendError::Full(ev)) => {
                tracing::warn!("Replica busy, {} event for {} dropped", ev.kind(), ev.item_code());
            }
            Err(mpsc::error::TrySendError::Closed(ev)) => {
                tracing::warn!(
                    "Replication channel closed, {} event for {} dropped",
                    ev.kind(),
                    ev.item_code()
                );
            }
        }
    }

    // === Read helpers (fixtures, ops visibility, tests) ===

    /// Fetch one catalog item
    pub fn item(&self, code: &str) -> Result<Option<CatalogItem>> {
        let conn = self.conn.lock().unwrap();
        item_query(&conn, code)
    }

    /// Active loans for `(code, borrower)`, in the deterministic match order
    pub fn loans_for(&self, code: &str, borrower: &str) -> Result<Vec<Loan>> {
        let conn = self.conn.lock().unwrap();
        loans_query(&conn, code, borrower)
    }

    /// All catalog items, in code order (replica catalog sync)
    pub fn catalog_items(&self) -> Result<Vec<CatalogItem>> {
        let conn = self.conn.lock().unwrap();
        let mut stmt = conn.prepare(
            "SELECT code, title, author, total_copies, available_copies
             FROM catalog ORDER BY code",
        )?;
        let rows = stmt.query_map([], |row| {
            Ok(CatalogItem {
                code: row.get(0)?,
                title: row.get(1)?,
                author: row.get(2)?,
                total_copies: row.get(3)?,
                available_copies: row.get(4)?,
            })
        })?;
        let mut items = Vec::new();
        for item in rows {
            items.push(item?);
        }
        Ok(items)
    }
}

pub(crate) fn item_query(conn: &Connection, code: &str) -> Result<Option<CatalogItem>> {
    let item = conn
        .query_row(
            "SELECT code, title, author, total_copies, available_copies
             FROM catalog WHERE code = ?1",
            [code],
            |row| {
                Ok(CatalogItem {
                    code: row.get(0)?,
                    title: row.get(1)?,
                    author: row.get(2)?,
                    total_copies: row.get(3)?,
                    available_copies: row.get(4)?,
                })
            },
        )
        .optional()?;
    Ok(item)
}

pub(crate) fn loans_query(conn: &Connection, code: &str, borrower: &str) -> Result<Vec<Loan>> {
    let mut stmt = conn.prepare(
        "SELECT id, code, borrower, loan_date, due_date, renewals
         FROM loans WHERE code = ?1 AND borrower = ?2
         ORDER BY loan_date ASC, id ASC",
    )?;
    let rows = stmt.query_map(params![code, borrower], |row| {
        Ok(Loan {
            id: row.get(0)?,
            code: row.get(1)?,
            borrower: row.get(2)?,
            loan_date: row.get(3)?,
            due_date: row.get(4)?,
            renewals: row.get(5)?,
        })
    })?;
    let mut loans = Vec::new();
    for loan in rows {
        loans.push(loan?);
    }
    Ok(loans)
}

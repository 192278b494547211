//! Catalog/loan schema and synthetic seed data
//!
//! Both the primary store and the replica store use this schema; only the
//! primary is ever seeded.

use crate::common::{due_date_for_loan, today, Result};
use rusqlite::{params, Connection};

/// Create the catalog and loans tables if they do not exist
pub fn init(conn: &Connection) -> Result<()> {
    conn.execute_batch(
        "CREATE TABLE IF NOT EXISTS catalog (
            code             TEXT PRIMARY KEY,
            title            TEXT NOT NULL,
            author           TEXT NOT NULL,
            total_copies     INTEGER NOT NULL,
            available_copies INTEGER NOT NULL
        );
        CREATE TABLE IF NOT EXISTS loans (
            id        INTEGER PRIMARY KEY AUTOINCREMENT,
            code      TEXT NOT NULL REFERENCES catalog(code),
            borrower  TEXT NOT NULL,
            loan_date TEXT NOT NULL,
            due_date  TEXT NOT NULL,
            renewals  INTEGER NOT NULL DEFAULT 0
        );",
    )?;
    Ok(())
}

/// Seed the store with the fixed synthetic catalog plus a block of initial
/// loans. A no-op when the catalog already has rows.
///
/// Item `i` (1-based) gets code `ISBN{i:04}` and `1` total copy when `i` is a
/// multiple of 10, otherwise `i % 5 + 1`.
pub fn seed(conn: &mut Connection, catalog_size: usize, initial_loans: usize) -> Result<usize> {
    let existing: usize = conn.query_row("SELECT COUNT(*) FROM catalog", [], |row| row.get(0))?;
    if existing > 0 {
        tracing::info!("Store already seeded: {} catalog items", existing);
        return Ok(existing);
    }

    let loan_date = today();
    let due_date = due_date_for_loan(loan_date);

    let tx = conn.transaction()?;
    for i in 1..=catalog_size {
        let total = if i % 10 == 0 { 1 } else { i % 5 + 1 };
        tx.execute(
            "INSERT INTO catalog (code, title, author, total_copies, available_copies)
             VALUES (?1, ?2, ?3, ?4, ?4)",
            params![
                format!("ISBN{i:04}"),
                format!("Book {i}"),
                format!("Author {}", i % 100),
                total as i64,
            ],
        )?;
    }

    // Initial loans borrow item i for user i, decrementing availability
    for i in 1..=initial_loans.min(catalog_size) {
        tx.execute(
            "INSERT INTO loans (code, borrower, loan_date, due_date, renewals)
             VALUES (?1, ?2, ?3, ?4, 0)",
            params![format!("ISBN{i:04}"), format!("user{i}"), loan_date, due_date],
        )?;
        tx.execute(
            "UPDATE catalog SET available_copies = available_copies - 1 WHERE code = ?1",
            params![format!("ISBN{i:04}")],
        )?;
    }
    tx.commit()?;

    tracing::info!(
        "Store seeded: {} catalog items, {} initial loans",
        catalog_size,
        initial_loans
    );
    Ok(catalog_size)
}

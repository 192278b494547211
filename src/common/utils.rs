//! Utility functions for minilend

use chrono::{Days, Local, NaiveDate};

/// Site identifier (1 or 2 in a standard deployment)
pub type SiteId = u8;

/// Loan period granted on a new loan
pub const LOAN_PERIOD_DAYS: u64 = 14;

/// Extension granted per renewal
pub const RENEWAL_EXTENSION_DAYS: u64 = 7;

/// Maximum renewals per loan
pub const MAX_RENEWALS: u32 = 2;

/// Today's date in local time
pub fn today() -> NaiveDate {
    Local::now().date_naive()
}

/// Due date for a loan taken out on `loan_date`
pub fn due_date_for_loan(loan_date: NaiveDate) -> NaiveDate {
    loan_date + Days::new(LOAN_PERIOD_DAYS)
}

/// New due date after renewing a loan currently due on `due_date`
pub fn renewed_due_date(due_date: NaiveDate) -> NaiveDate {
    due_date + Days::new(RENEWAL_EXTENSION_DAYS)
}

//! Reporting records derived from the loan ledger

use serde::{Deserialize, Serialize};
use sqlx::FromRow;
use utoipa::ToSchema;

use super::TitleId;

/// Dashboard counters. Overdue loans are a subset of active loans.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize, ToSchema)]
pub struct LoanSummary {
    pub active_count: u64,
    pub overdue_count: u64,
    /// Every loan ever issued, returned ones included
    pub total_loans: u64,
    pub total_books: u64,
    pub total_members: u64,
}

/// Number of loans issued in one calendar month
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, ToSchema)]
pub struct MonthlyActivity {
    /// `YYYY-MM`
    pub month: String,
    pub count: u64,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, FromRow, ToSchema)]
pub struct TitleLoanCount {
    pub title_id: TitleId,
    pub title: String,
    pub times_borrowed: i64,
}

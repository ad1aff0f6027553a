//! Loan (borrow) model and related types

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use sqlx::FromRow;
use utoipa::ToSchema;

use super::{CopyId, LoanId, MemberId};

/// Loan row from the ledger. `return_date` is `None` while the loan is open.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, FromRow, ToSchema)]
pub struct Loan {
    pub loan_id: LoanId,
    pub copy_id: CopyId,
    pub member_id: MemberId,
    pub loan_date: DateTime<Utc>,
    pub due_date: DateTime<Utc>,
    pub return_date: Option<DateTime<Utc>>,
}

impl Loan {
    pub fn is_open(&self) -> bool {
        self.return_date.is_none()
    }
}

/// Loan to be opened by the ledger
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct NewLoan {
    pub copy_id: CopyId,
    pub member_id: MemberId,
    pub loan_date: DateTime<Utc>,
    pub due_date: DateTime<Utc>,
}

/// Open loan joined with the ISBN of its title
#[derive(Debug, Clone, PartialEq, Eq, FromRow)]
pub struct OpenLoan {
    #[sqlx(flatten)]
    pub loan: Loan,
    pub isbn: String,
}

/// Derived loan status, never stored
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, ToSchema)]
pub enum LoanStatus {
    Active,
    Overdue,
    Returned,
}

/// Open loan as listed at the loan desk
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, ToSchema)]
pub struct ActiveLoan {
    pub loan_id: LoanId,
    pub copy_id: CopyId,
    pub isbn: String,
    pub member_id: MemberId,
    pub loan_date: DateTime<Utc>,
    pub due_date: DateTime<Utc>,
    pub status: LoanStatus,
}

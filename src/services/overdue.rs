//! Overdue evaluation over ledger snapshots
//!
//! Pure functions: callers pass the loans and the current time.

use std::collections::BTreeMap;

use chrono::{DateTime, Utc};

use crate::models::{ActiveLoan, Loan, LoanStatus, LoanSummary, MonthlyActivity, OpenLoan};

pub fn loan_status(loan: &Loan, now: DateTime<Utc>) -> LoanStatus {
    match loan.return_date {
        Some(_) => LoanStatus::Returned,
        None if loan.due_date < now => LoanStatus::Overdue,
        None => LoanStatus::Active,
    }
}

/// Open loans with their derived status, in ledger order
pub fn active_loans(open: &[OpenLoan], now: DateTime<Utc>) -> Vec<ActiveLoan> {
    open.iter()
        .filter(|entry| entry.loan.is_open())
        .map(|OpenLoan { loan, isbn }| ActiveLoan {
            loan_id: loan.loan_id,
            copy_id: loan.copy_id,
            isbn: isbn.clone(),
            member_id: loan.member_id,
            loan_date: loan.loan_date,
            due_date: loan.due_date,
            status: loan_status(loan, now),
        })
        .collect()
}

/// Active and overdue counts over open loans. The totals are left at zero
/// for the caller, which gets them from the store.
pub fn summarize<'a>(open: impl IntoIterator<Item = &'a Loan>, now: DateTime<Utc>) -> LoanSummary {
    open.into_iter().fold(LoanSummary::default(), |mut summary, loan| {
        match loan_status(loan, now) {
            LoanStatus::Active => summary.active_count += 1,
            LoanStatus::Overdue => {
                summary.active_count += 1;
                summary.overdue_count += 1;
            }
            LoanStatus::Returned => {}
        }
        summary
    })
}

/// Loans issued per calendar month (UTC), oldest month first
pub fn activity_by_month<'a>(loans: impl IntoIterator<Item = &'a Loan>) -> Vec<MonthlyActivity> {
    let mut buckets: BTreeMap<String, u64> = BTreeMap::new();
    for loan in loans {
        *buckets
            .entry(loan.loan_date.format("%Y-%m").to_string())
            .or_default() += 1;
    }
    buckets
        .into_iter()
        .map(|(month, count)| MonthlyActivity { month, count })
        .collect()
}

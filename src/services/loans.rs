//! Loan desk service

use std::sync::Arc;

use chrono::{DateTime, Utc};

use crate::{
    error::AppResult,
    models::{ActiveLoan, Loan, LoanId, MemberId, TitleAvailability, TitleRef},
    repository::Repository,
    services::{allocation::AllocationEngine, clock::Clock, overdue},
};

#[derive(Clone)]
pub struct LoansService {
    repository: Repository,
    engine: AllocationEngine,
    clock: Arc<dyn Clock>,
}

impl LoansService {
    pub fn new(repository: Repository, engine: AllocationEngine, clock: Arc<dyn Clock>) -> Self {
        Self {
            repository,
            engine,
            clock,
        }
    }

    /// Create a new loan (borrow a copy of a title)
    pub async fn issue_loan(
        &self,
        title: &TitleRef,
        member_id: MemberId,
        loan_date: DateTime<Utc>,
        due_date: DateTime<Utc>,
    ) -> AppResult<LoanId> {
        self.engine
            .issue_loan(title, member_id, loan_date, due_date)
            .await
    }

    /// Return a borrowed copy
    pub async fn return_loan(&self, loan_id: LoanId) -> AppResult<Loan> {
        self.engine.return_loan(loan_id).await
    }

    pub async fn get_loan(&self, loan_id: LoanId) -> AppResult<Loan> {
        self.repository.loans.get_loan(loan_id).await
    }

    /// Open loans with their Active/Overdue status as of now
    pub async fn list_active_loans(&self) -> AppResult<Vec<ActiveLoan>> {
        let open = self.repository.loans.list_open_loans().await?;
        Ok(overdue::active_loans(&open, self.clock.now()))
    }

    /// Copy counts for a title
    pub async fn availability(&self, title: &TitleRef) -> AppResult<TitleAvailability> {
        let title_id = self.repository.catalog.resolve_title(title).await?;
        let copies = self.repository.catalog.copies_of_title(title_id).await?;
        Ok(TitleAvailability::from_copies(title_id, &copies))
    }
}

//! Dashboard reporting over the loan ledger

use std::sync::Arc;

use crate::{
    error::AppResult,
    models::{LoanSummary, MonthlyActivity, TitleLoanCount},
    repository::Repository,
    services::{clock::Clock, overdue},
};

#[derive(Clone)]
pub struct ReportsService {
    repository: Repository,
    clock: Arc<dyn Clock>,
}

impl ReportsService {
    pub fn new(repository: Repository, clock: Arc<dyn Clock>) -> Self {
        Self { repository, clock }
    }

    /// Active and overdue counts over open loans, plus ledger, catalog and
    /// member totals
    pub async fn summary(&self) -> AppResult<LoanSummary> {
        let open = self.repository.loans.list_open_loans().await?;
        let counts = overdue::summarize(open.iter().map(|o| &o.loan), self.clock.now());

        Ok(LoanSummary {
            total_loans: self.repository.loans.count_loans().await?,
            total_books: self.repository.catalog.count_titles().await?,
            total_members: self.repository.members.count_members().await?,
            ..counts
        })
    }

    /// Loans issued per month, returned loans included
    pub async fn loan_activity_by_month(&self) -> AppResult<Vec<MonthlyActivity>> {
        self.repository.loans.loans_per_month().await
    }

    /// Most borrowed titles
    pub async fn top_titles(&self, limit: u32) -> AppResult<Vec<TitleLoanCount>> {
        self.repository.loans.loan_counts_by_title(limit).await
    }
}

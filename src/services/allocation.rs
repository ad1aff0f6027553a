//! Allocation engine: couples copy inventory and loan ledger changes
//!
//! Issuing selects, marks and records inside one allocation unit; returning
//! closes the loan and frees its copy inside one unit. Each unit is bounded
//! by the configured lock timeout. When it expires the unit future is
//! dropped, which rolls it back and releases the copy lock.

use std::future::Future;
use std::sync::Arc;
use std::time::Duration;

use chrono::{DateTime, Utc};

use crate::{
    config::LoansConfig,
    error::{AppError, AppResult, Resource},
    models::{Loan, LoanId, MemberId, NewLoan, TitleRef},
    repository::Repository,
    services::clock::Clock,
};

#[derive(Clone)]
pub struct AllocationEngine {
    repository: Repository,
    clock: Arc<dyn Clock>,
    lock_timeout: Duration,
}

impl AllocationEngine {
    pub fn new(repository: Repository, clock: Arc<dyn Clock>, config: &LoansConfig) -> Self {
        Self {
            repository,
            clock,
            lock_timeout: config.lock_timeout(),
        }
    }

    /// Lend the lowest-numbered available copy of `title` to `member_id`
    #[tracing::instrument(skip(self))]
    pub async fn issue_loan(
        &self,
        title: &TitleRef,
        member_id: MemberId,
        loan_date: DateTime<Utc>,
        due_date: DateTime<Utc>,
    ) -> AppResult<LoanId> {
        if due_date < loan_date {
            return Err(AppError::Validation(
                "due date must not be before loan date".to_string(),
            ));
        }

        let title_id = self.repository.catalog.resolve_title(title).await?;
        if !self.repository.members.member_exists(member_id).await? {
            return Err(AppError::NotFound(Resource::Member(member_id)));
        }

        self.bounded(async {
            let mut unit = self.repository.loans.begin().await?;

            let copy_id = unit
                .find_available_copy(title_id)
                .await?
                .ok_or(AppError::NoCopyAvailable(title_id))?;
            unit.mark_loaned(copy_id).await?;
            let loan_id = unit
                .open_loan(NewLoan {
                    copy_id,
                    member_id,
                    loan_date,
                    due_date,
                })
                .await?;
            unit.commit().await?;

            tracing::info!(%loan_id, %copy_id, %title_id, "Loan issued");
            Ok(loan_id)
        })
        .await
    }

    /// Close an open loan and make its copy available again
    #[tracing::instrument(skip(self))]
    pub async fn return_loan(&self, loan_id: LoanId) -> AppResult<Loan> {
        self.bounded(async {
            let mut unit = self.repository.loans.begin().await?;

            let loan = unit.lock_loan(loan_id).await?;
            // Never record a return before the loan started
            let returned_at = self.clock.now().max(loan.loan_date);
            let closed = unit.close_loan(loan_id, returned_at).await?;
            unit.mark_available(closed.copy_id).await?;
            unit.commit().await?;

            tracing::info!(%loan_id, copy_id = %closed.copy_id, "Loan returned");
            Ok(closed)
        })
        .await
    }

    async fn bounded<T>(&self, unit: impl Future<Output = AppResult<T>>) -> AppResult<T> {
        match tokio::time::timeout(self.lock_timeout, unit).await {
            Ok(result) => result,
            Err(_) => {
                tracing::warn!(
                    timeout_ms = self.lock_timeout.as_millis() as u64,
                    "Allocation unit timed out"
                );
                Err(AppError::Transient(format!(
                    "allocation did not complete within {} ms",
                    self.lock_timeout.as_millis()
                )))
            }
        }
    }
}

//! Loans repository for database operations
//!
//! An allocation unit is one database transaction. Copy rows are locked
//! with `FOR UPDATE`, so two units touching the same copy are serialized by
//! PostgreSQL while units on different copies proceed in parallel. Available
//! copies are locked lowest id first, one at a time. A locked copy is waited
//! for (bounded by the transaction's `lock_timeout`), re-checked, and
//! skipped if it is no longer `Available`.

use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use sqlx::{Pool, Postgres, Row, Transaction};

use crate::{
    error::{AppError, AppResult, Resource},
    models::{
        CopyId, CopyStatus, Loan, LoanId, MonthlyActivity, NewLoan, OpenLoan, TitleId,
        TitleLoanCount,
    },
};

use super::{schema::Tables, AllocationUnit, CopyInventory, LoanLedger, LoanStore};

const LOAN_COLUMNS: &str = "loan_id::bigint AS loan_id, copy_id::bigint AS copy_id, \
     member_id::bigint AS member_id, loan_date, due_date, return_date";

#[derive(Clone)]
pub struct PgLoanStore {
    pool: Pool<Postgres>,
    tables: Arc<Tables>,
    lock_timeout: Duration,
}

impl PgLoanStore {
    pub fn new(pool: Pool<Postgres>, tables: Arc<Tables>, lock_timeout: Duration) -> Self {
        Self {
            pool,
            tables,
            lock_timeout,
        }
    }
}

#[async_trait]
impl LoanStore for PgLoanStore {
    async fn begin(&self) -> AppResult<Box<dyn AllocationUnit>> {
        let mut tx = self.pool.begin().await?;
        set_lock_timeout(&mut tx, self.lock_timeout).await?;
        Ok(Box::new(PgAllocationUnit {
            tx,
            tables: self.tables.clone(),
        }))
    }

    async fn get_loan(&self, loan_id: LoanId) -> AppResult<Loan> {
        sqlx::query_as::<_, Loan>(&format!(
            "SELECT {} FROM {} WHERE loan_id = $1",
            LOAN_COLUMNS, self.tables.loans
        ))
        .bind(loan_id.0)
        .fetch_optional(&self.pool)
        .await?
        .ok_or(AppError::NotFound(Resource::Loan(loan_id)))
    }

    async fn list_open_loans(&self) -> AppResult<Vec<OpenLoan>> {
        let loans = sqlx::query_as::<_, OpenLoan>(&format!(
            r#"
            SELECT l.loan_id::bigint AS loan_id,
                   l.copy_id::bigint AS copy_id,
                   l.member_id::bigint AS member_id,
                   l.loan_date, l.due_date, l.return_date,
                   COALESCE(b.isbn, '') AS isbn
            FROM {} l
            JOIN {} bc ON bc.copy_id = l.copy_id
            JOIN {} b ON b.book_id = bc.book_id
            WHERE l.return_date IS NULL
            ORDER BY l.loan_id
            "#,
            self.tables.loans, self.tables.copies, self.tables.books
        ))
        .fetch_all(&self.pool)
        .await?;
        Ok(loans)
    }

    async fn count_loans(&self) -> AppResult<u64> {
        let count: i64 = sqlx::query_scalar(&format!("SELECT COUNT(*) FROM {}", self.tables.loans))
            .fetch_one(&self.pool)
            .await?;
        Ok(count as u64)
    }

    async fn loans_per_month(&self) -> AppResult<Vec<MonthlyActivity>> {
        let rows = sqlx::query(&format!(
            r#"
            SELECT to_char(date_trunc('month', loan_date AT TIME ZONE 'UTC'), 'YYYY-MM') AS month,
                   COUNT(*) AS count
            FROM {}
            GROUP BY 1
            ORDER BY 1
            "#,
            self.tables.loans
        ))
        .fetch_all(&self.pool)
        .await?;

        Ok(rows
            .into_iter()
            .map(|row| MonthlyActivity {
                month: row.get("month"),
                count: row.get::<i64, _>("count") as u64,
            })
            .collect())
    }

    async fn loan_counts_by_title(&self, limit: u32) -> AppResult<Vec<TitleLoanCount>> {
        let counts = sqlx::query_as::<_, TitleLoanCount>(&format!(
            r#"
            SELECT b.book_id::bigint AS title_id,
                   b.title AS title,
                   COUNT(l.loan_id) AS times_borrowed
            FROM {} b
            JOIN {} bc ON bc.book_id = b.book_id
            JOIN {} l ON l.copy_id = bc.copy_id
            GROUP BY b.book_id, b.title
            ORDER BY times_borrowed DESC, b.book_id
            LIMIT $1
            "#,
            self.tables.books, self.tables.copies, self.tables.loans
        ))
        .bind(i64::from(limit))
        .fetch_all(&self.pool)
        .await?;
        Ok(counts)
    }

    async fn ping(&self) -> AppResult<()> {
        sqlx::query("SELECT 1").execute(&self.pool).await?;
        Ok(())
    }
}

/// One open transaction
pub struct PgAllocationUnit {
    tx: Transaction<'static, Postgres>,
    tables: Arc<Tables>,
}

impl PgAllocationUnit {
    async fn loan_for_update(&mut self, loan_id: LoanId) -> AppResult<Option<Loan>> {
        let loan = sqlx::query_as::<_, Loan>(&format!(
            "SELECT {} FROM {} WHERE loan_id = $1 FOR UPDATE",
            LOAN_COLUMNS, self.tables.loans
        ))
        .bind(loan_id.0)
        .fetch_optional(&mut *self.tx)
        .await?;
        Ok(loan)
    }
}

#[async_trait]
impl CopyInventory for PgAllocationUnit {
    async fn find_available_copy(&mut self, title_id: TitleId) -> AppResult<Option<CopyId>> {
        let candidates = sqlx::query_scalar::<_, i64>(&format!(
            r#"
            SELECT copy_id::bigint
            FROM {}
            WHERE book_id = $1 AND status = $2
            ORDER BY copy_id
            "#,
            self.tables.copies
        ))
        .bind(title_id.0)
        .bind(CopyStatus::Available.as_str())
        .fetch_all(&mut *self.tx)
        .await?;

        // LIMIT 1 FOR UPDATE yields no row when the waited-for copy changed,
        // so candidates are locked one at a time.
        for copy_id in candidates {
            let locked = sqlx::query_scalar::<_, i64>(&format!(
                "SELECT copy_id::bigint FROM {} WHERE copy_id = $1 AND status = $2 FOR UPDATE",
                self.tables.copies
            ))
            .bind(copy_id)
            .bind(CopyStatus::Available.as_str())
            .fetch_optional(&mut *self.tx)
            .await?;

            if let Some(copy_id) = locked {
                return Ok(Some(CopyId(copy_id)));
            }
        }

        Ok(None)
    }

    async fn mark_loaned(&mut self, copy_id: CopyId) -> AppResult<()> {
        let result = sqlx::query(&format!(
            "UPDATE {} SET status = $1 WHERE copy_id = $2 AND status = $3",
            self.tables.copies
        ))
        .bind(CopyStatus::Loaned.as_str())
        .bind(copy_id.0)
        .bind(CopyStatus::Available.as_str())
        .execute(&mut *self.tx)
        .await?;

        if result.rows_affected() == 0 {
            return Err(AppError::Internal(format!("copy {} is not available", copy_id)));
        }
        Ok(())
    }

    async fn mark_available(&mut self, copy_id: CopyId) -> AppResult<()> {
        let result = sqlx::query(&format!(
            "UPDATE {} SET status = $1 WHERE copy_id = $2",
            self.tables.copies
        ))
        .bind(CopyStatus::Available.as_str())
        .bind(copy_id.0)
        .execute(&mut *self.tx)
        .await?;

        if result.rows_affected() == 0 {
            return Err(AppError::NotFound(Resource::Copy(copy_id)));
        }
        Ok(())
    }
}

#[async_trait]
impl LoanLedger for PgAllocationUnit {
    async fn lock_loan(&mut self, loan_id: LoanId) -> AppResult<Loan> {
        let loan = self
            .loan_for_update(loan_id)
            .await?
            .ok_or(AppError::NotFound(Resource::Loan(loan_id)))?;

        // Loan row first, then its copy: issuance never holds a loan row
        // lock, so this order cannot deadlock against it.
        sqlx::query(&format!(
            "SELECT 1 FROM {} WHERE copy_id = $1 FOR UPDATE",
            self.tables.copies
        ))
        .bind(loan.copy_id.0)
        .fetch_optional(&mut *self.tx)
        .await?
        .ok_or(AppError::NotFound(Resource::Copy(loan.copy_id)))?;

        Ok(loan)
    }

    async fn open_loan(&mut self, loan: NewLoan) -> AppResult<LoanId> {
        let loan_id = sqlx::query_scalar::<_, i64>(&format!(
            r#"
            INSERT INTO {} (copy_id, member_id, loan_date, due_date)
            VALUES ($1, $2, $3, $4)
            RETURNING loan_id::bigint
            "#,
            self.tables.loans
        ))
        .bind(loan.copy_id.0)
        .bind(loan.member_id.0)
        .bind(loan.loan_date)
        .bind(loan.due_date)
        .fetch_one(&mut *self.tx)
        .await?;

        Ok(LoanId(loan_id))
    }

    async fn close_loan(&mut self, loan_id: LoanId, return_date: DateTime<Utc>) -> AppResult<Loan> {
        let closed = sqlx::query_as::<_, Loan>(&format!(
            r#"
            UPDATE {} SET return_date = $2
            WHERE loan_id = $1 AND return_date IS NULL
            RETURNING {}
            "#,
            self.tables.loans, LOAN_COLUMNS
        ))
        .bind(loan_id.0)
        .bind(return_date)
        .fetch_optional(&mut *self.tx)
        .await?;

        match closed {
            Some(loan) => Ok(loan),
            None => match self.loan_for_update(loan_id).await? {
                Some(_) => Err(AppError::AlreadyReturned(loan_id)),
                None => Err(AppError::NotFound(Resource::Loan(loan_id))),
            },
        }
    }
}

#[async_trait]
impl AllocationUnit for PgAllocationUnit {
    async fn commit(self: Box<Self>) -> AppResult<()> {
        self.tx.commit().await?;
        Ok(())
    }
}

/// Bound row lock waits on the server side for the rest of the transaction
async fn set_lock_timeout(
    tx: &mut Transaction<'static, Postgres>,
    timeout: Duration,
) -> AppResult<()> {
    sqlx::query("SELECT set_config('lock_timeout', $1, true)")
        .bind(format!("{}ms", timeout.as_millis()))
        .execute(&mut **tx)
        .await?;
    Ok(())
}

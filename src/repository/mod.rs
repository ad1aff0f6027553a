//! Repository layer: catalog lookups, copy inventory and loan ledger
//!
//! Writes to copies and loans only happen through an [`AllocationUnit`],
//! which holds the lock on exactly one copy from the moment it is selected
//! (or reached through its loan) until the unit is committed or dropped.
//! Dropping a unit without committing discards its writes and releases the
//! lock, so cancellation and early returns never leave a copy half-updated.

pub mod catalog;
pub mod loans;
pub mod memory;
pub mod schema;

use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use sqlx::{Pool, Postgres};

use crate::{
    error::AppResult,
    models::{
        BookCopy, CopyId, Loan, LoanId, MemberId, MonthlyActivity, NewLoan, OpenLoan, TitleId,
        TitleLoanCount, TitleRef,
    },
};

pub use memory::MemoryStore;
pub use schema::SchemaName;

/// Catalog collaborator: titles and the copies that belong to them
#[cfg_attr(test, mockall::automock)]
#[async_trait]
pub trait Catalog: Send + Sync {
    async fn resolve_title(&self, title: &TitleRef) -> AppResult<TitleId>;

    /// Copies of a title, ordered by copy id
    async fn copies_of_title(&self, title_id: TitleId) -> AppResult<Vec<BookCopy>>;

    async fn count_titles(&self) -> AppResult<u64>;
}

/// Member collaborator
#[cfg_attr(test, mockall::automock)]
#[async_trait]
pub trait Members: Send + Sync {
    async fn member_exists(&self, member_id: MemberId) -> AppResult<bool>;

    async fn count_members(&self) -> AppResult<u64>;
}

/// Copy state changes inside an allocation unit
#[async_trait]
pub trait CopyInventory: Send {
    /// Lock and return the lowest-numbered available copy of the title
    async fn find_available_copy(&mut self, title_id: TitleId) -> AppResult<Option<CopyId>>;

    async fn mark_loaned(&mut self, copy_id: CopyId) -> AppResult<()>;

    async fn mark_available(&mut self, copy_id: CopyId) -> AppResult<()>;
}

/// Ledger writes inside an allocation unit
#[async_trait]
pub trait LoanLedger: Send {
    /// Lock a loan together with its copy
    async fn lock_loan(&mut self, loan_id: LoanId) -> AppResult<Loan>;

    async fn open_loan(&mut self, loan: NewLoan) -> AppResult<LoanId>;

    /// Set the return date. Fails with `AlreadyReturned` or `NotFound`.
    async fn close_loan(&mut self, loan_id: LoanId, return_date: DateTime<Utc>) -> AppResult<Loan>;
}

/// One atomic issue or return, scoped to a single copy
#[async_trait]
pub trait AllocationUnit: CopyInventory + LoanLedger {
    async fn commit(self: Box<Self>) -> AppResult<()>;
}

/// Loan storage: allocation units plus read-only ledger queries
#[async_trait]
pub trait LoanStore: Send + Sync {
    async fn begin(&self) -> AppResult<Box<dyn AllocationUnit>>;

    async fn get_loan(&self, loan_id: LoanId) -> AppResult<Loan>;

    /// Loans without a return date with their title's ISBN, ordered by loan id
    async fn list_open_loans(&self) -> AppResult<Vec<OpenLoan>>;

    /// Number of loans ever issued
    async fn count_loans(&self) -> AppResult<u64>;

    /// Loans issued per calendar month (UTC), oldest first
    async fn loans_per_month(&self) -> AppResult<Vec<MonthlyActivity>>;

    /// Most borrowed titles, highest count first
    async fn loan_counts_by_title(&self, limit: u32) -> AppResult<Vec<TitleLoanCount>>;

    async fn ping(&self) -> AppResult<()>;
}

/// Main repository struct holding the storage backends
#[derive(Clone)]
pub struct Repository {
    pub catalog: Arc<dyn Catalog>,
    pub members: Arc<dyn Members>,
    pub loans: Arc<dyn LoanStore>,
}

impl Repository {
    /// Repository backed by the `lms_*` tables of `schema`
    pub fn postgres(pool: Pool<Postgres>, schema: &SchemaName, lock_timeout: Duration) -> Self {
        let tables = Arc::new(schema.tables());
        let catalog = Arc::new(catalog::PgCatalog::new(pool.clone(), tables.clone()));
        Self {
            catalog: catalog.clone(),
            members: catalog,
            loans: Arc::new(loans::PgLoanStore::new(pool, tables, lock_timeout)),
        }
    }

    /// Repository backed by a process-local store
    pub fn in_memory(store: MemoryStore) -> Self {
        let store = Arc::new(store);
        Self {
            catalog: store.clone(),
            members: store.clone(),
            loans: store,
        }
    }
}

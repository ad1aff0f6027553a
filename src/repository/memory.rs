//! Process-local store implementing the catalog, member and loan seams
//!
//! Every copy owns its own `tokio::sync::Mutex`; there is no store-wide
//! lock on the write path. Writes made through an allocation unit are
//! buffered and applied on commit while the copy lock is still held.
//! Readers never take a copy lock: they see the last committed status.

use std::collections::{BTreeMap, BTreeSet, HashMap};
use std::sync::atomic::{AtomicI64, Ordering};
use std::sync::{Arc, RwLock, RwLockReadGuard, RwLockWriteGuard};

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use tokio::sync::{Mutex, OwnedMutexGuard};

use crate::{
    error::{AppError, AppResult, Resource},
    models::{
        BookCopy, CopyId, CopyStatus, Loan, LoanId, MemberId, MonthlyActivity, NewLoan, OpenLoan,
        TitleId, TitleLoanCount, TitleRef,
    },
    services::overdue,
};

use super::{AllocationUnit, Catalog, CopyInventory, LoanLedger, LoanStore, Members};

struct TitleRecord {
    isbn: String,
    title: String,
}

struct CopyEntry {
    title_id: TitleId,
    /// Held by an allocation unit for its whole issue or return
    status: Arc<Mutex<CopyStatus>>,
    committed: RwLock<CopyStatus>,
}

#[derive(Default)]
struct State {
    titles: RwLock<BTreeMap<TitleId, TitleRecord>>,
    copies: RwLock<BTreeMap<CopyId, CopyEntry>>,
    loans: RwLock<BTreeMap<LoanId, Loan>>,
    members: RwLock<BTreeSet<MemberId>>,
    last_title_id: AtomicI64,
    last_copy_id: AtomicI64,
    last_loan_id: AtomicI64,
}

fn read<T>(lock: &RwLock<T>) -> AppResult<RwLockReadGuard<'_, T>> {
    lock.read()
        .map_err(|_| AppError::Internal("memory store lock poisoned".to_string()))
}

fn write<T>(lock: &RwLock<T>) -> AppResult<RwLockWriteGuard<'_, T>> {
    lock.write()
        .map_err(|_| AppError::Internal("memory store lock poisoned".to_string()))
}

/// In-memory loan desk storage.
///
/// Titles, copies and members are created out-of-band with the `add_*`
/// methods; copies start `Available` and are never removed.
#[derive(Clone, Default)]
pub struct MemoryStore {
    state: Arc<State>,
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn add_title(&self, isbn: &str, title: &str) -> AppResult<TitleId> {
        let id = TitleId(self.state.last_title_id.fetch_add(1, Ordering::SeqCst) + 1);
        write(&self.state.titles)?.insert(
            id,
            TitleRecord {
                isbn: isbn.to_string(),
                title: title.to_string(),
            },
        );
        Ok(id)
    }

    pub fn add_copy(&self, title_id: TitleId) -> AppResult<CopyId> {
        if !read(&self.state.titles)?.contains_key(&title_id) {
            return Err(AppError::NotFound(Resource::Title(title_id.to_string())));
        }
        let id = CopyId(self.state.last_copy_id.fetch_add(1, Ordering::SeqCst) + 1);
        write(&self.state.copies)?.insert(
            id,
            CopyEntry {
                title_id,
                status: Arc::new(Mutex::new(CopyStatus::Available)),
                committed: RwLock::new(CopyStatus::Available),
            },
        );
        Ok(id)
    }

    pub fn add_member(&self, member_id: MemberId) -> AppResult<()> {
        write(&self.state.members)?.insert(member_id);
        Ok(())
    }
}

#[async_trait]
impl Catalog for MemoryStore {
    async fn resolve_title(&self, title: &TitleRef) -> AppResult<TitleId> {
        let titles = read(&self.state.titles)?;
        let found = match title {
            TitleRef::Id(id) => titles.contains_key(id).then_some(*id),
            TitleRef::Isbn(isbn) => titles
                .iter()
                .find(|(_, record)| &record.isbn == isbn)
                .map(|(id, _)| *id),
        };
        found.ok_or_else(|| AppError::NotFound(Resource::Title(title.to_string())))
    }

    async fn copies_of_title(&self, title_id: TitleId) -> AppResult<Vec<BookCopy>> {
        read(&self.state.copies)?
            .iter()
            .filter(|(_, entry)| entry.title_id == title_id)
            .map(|(id, entry)| -> AppResult<BookCopy> {
                Ok(BookCopy {
                    copy_id: *id,
                    title_id,
                    status: *read(&entry.committed)?,
                })
            })
            .collect()
    }

    async fn count_titles(&self) -> AppResult<u64> {
        Ok(read(&self.state.titles)?.len() as u64)
    }
}

#[async_trait]
impl Members for MemoryStore {
    async fn member_exists(&self, member_id: MemberId) -> AppResult<bool> {
        Ok(read(&self.state.members)?.contains(&member_id))
    }

    async fn count_members(&self) -> AppResult<u64> {
        Ok(read(&self.state.members)?.len() as u64)
    }
}

#[async_trait]
impl LoanStore for MemoryStore {
    async fn begin(&self) -> AppResult<Box<dyn AllocationUnit>> {
        Ok(Box::new(MemoryUnit {
            state: self.state.clone(),
            held: None,
            pending_status: None,
            pending_loans: Vec::new(),
        }))
    }

    async fn get_loan(&self, loan_id: LoanId) -> AppResult<Loan> {
        read(&self.state.loans)?
            .get(&loan_id)
            .cloned()
            .ok_or(AppError::NotFound(Resource::Loan(loan_id)))
    }

    async fn list_open_loans(&self) -> AppResult<Vec<OpenLoan>> {
        let loans = read(&self.state.loans)?;
        let copies = read(&self.state.copies)?;
        let titles = read(&self.state.titles)?;
        Ok(loans
            .values()
            .filter(|loan| loan.is_open())
            .map(|loan| OpenLoan {
                isbn: copies
                    .get(&loan.copy_id)
                    .and_then(|entry| titles.get(&entry.title_id))
                    .map(|t| t.isbn.clone())
                    .unwrap_or_default(),
                loan: loan.clone(),
            })
            .collect())
    }

    async fn count_loans(&self) -> AppResult<u64> {
        Ok(read(&self.state.loans)?.len() as u64)
    }

    async fn loans_per_month(&self) -> AppResult<Vec<MonthlyActivity>> {
        Ok(overdue::activity_by_month(read(&self.state.loans)?.values()))
    }

    async fn loan_counts_by_title(&self, limit: u32) -> AppResult<Vec<TitleLoanCount>> {
        let mut counts: HashMap<TitleId, i64> = HashMap::new();
        {
            let loans = read(&self.state.loans)?;
            let copies = read(&self.state.copies)?;
            for loan in loans.values() {
                if let Some(entry) = copies.get(&loan.copy_id) {
                    *counts.entry(entry.title_id).or_default() += 1;
                }
            }
        }

        let titles = read(&self.state.titles)?;
        let mut result: Vec<TitleLoanCount> = counts
            .into_iter()
            .map(|(title_id, times_borrowed)| TitleLoanCount {
                title_id,
                title: titles
                    .get(&title_id)
                    .map(|t| t.title.clone())
                    .unwrap_or_default(),
                times_borrowed,
            })
            .collect();
        result.sort_by(|a, b| {
            b.times_borrowed
                .cmp(&a.times_borrowed)
                .then(a.title_id.cmp(&b.title_id))
        });
        result.truncate(limit as usize);
        Ok(result)
    }

    async fn ping(&self) -> AppResult<()> {
        Ok(())
    }
}

/// Allocation unit holding at most one copy lock
pub struct MemoryUnit {
    state: Arc<State>,
    held: Option<(CopyId, OwnedMutexGuard<CopyStatus>)>,
    pending_status: Option<CopyStatus>,
    pending_loans: Vec<Loan>,
}

impl MemoryUnit {
    fn ensure_free(&self) -> AppResult<()> {
        match &self.held {
            Some((copy_id, _)) => Err(AppError::Internal(format!(
                "allocation unit already holds copy {}",
                copy_id
            ))),
            None => Ok(()),
        }
    }

    fn ensure_held(&self, copy_id: CopyId) -> AppResult<CopyStatus> {
        match &self.held {
            Some((held, guard)) if *held == copy_id => {
                Ok(self.pending_status.unwrap_or(**guard))
            }
            _ => Err(AppError::Internal(format!(
                "copy {} is not locked by this unit",
                copy_id
            ))),
        }
    }

    fn slot(&self, copy_id: CopyId) -> AppResult<Arc<Mutex<CopyStatus>>> {
        read(&self.state.copies)?
            .get(&copy_id)
            .map(|entry| entry.status.clone())
            .ok_or(AppError::NotFound(Resource::Copy(copy_id)))
    }

    /// Latest view of a loan, including writes buffered in this unit
    fn current_loan(&self, loan_id: LoanId) -> AppResult<Loan> {
        if let Some(loan) = self.pending_loans.iter().rev().find(|l| l.loan_id == loan_id) {
            return Ok(loan.clone());
        }
        read(&self.state.loans)?
            .get(&loan_id)
            .cloned()
            .ok_or(AppError::NotFound(Resource::Loan(loan_id)))
    }
}

#[async_trait]
impl CopyInventory for MemoryUnit {
    async fn find_available_copy(&mut self, title_id: TitleId) -> AppResult<Option<CopyId>> {
        self.ensure_free()?;

        let candidates: Vec<(CopyId, Arc<Mutex<CopyStatus>>)> = {
            let copies = read(&self.state.copies)?;
            copies
                .iter()
                .filter(|(_, entry)| entry.title_id == title_id)
                .map(|(id, entry)| (*id, entry.status.clone()))
                .collect()
        };

        // One copy lock at a time, lowest id first
        for (copy_id, slot) in candidates {
            let guard = slot.lock_owned().await;
            if *guard == CopyStatus::Available {
                self.held = Some((copy_id, guard));
                return Ok(Some(copy_id));
            }
        }
        Ok(None)
    }

    async fn mark_loaned(&mut self, copy_id: CopyId) -> AppResult<()> {
        if self.ensure_held(copy_id)? != CopyStatus::Available {
            return Err(AppError::Internal(format!("copy {} is not available", copy_id)));
        }
        self.pending_status = Some(CopyStatus::Loaned);
        Ok(())
    }

    async fn mark_available(&mut self, copy_id: CopyId) -> AppResult<()> {
        self.ensure_held(copy_id)?;
        self.pending_status = Some(CopyStatus::Available);
        Ok(())
    }
}

#[async_trait]
impl LoanLedger for MemoryUnit {
    async fn lock_loan(&mut self, loan_id: LoanId) -> AppResult<Loan> {
        self.ensure_free()?;

        let copy_id = self.current_loan(loan_id)?.copy_id;
        let guard = self.slot(copy_id)?.lock_owned().await;
        self.held = Some((copy_id, guard));

        // Re-read under the lock; a concurrent return may have closed it
        self.current_loan(loan_id)
    }

    async fn open_loan(&mut self, loan: NewLoan) -> AppResult<LoanId> {
        self.ensure_held(loan.copy_id)?;

        let loan_id = LoanId(self.state.last_loan_id.fetch_add(1, Ordering::SeqCst) + 1);
        self.pending_loans.push(Loan {
            loan_id,
            copy_id: loan.copy_id,
            member_id: loan.member_id,
            loan_date: loan.loan_date,
            due_date: loan.due_date,
            return_date: None,
        });
        Ok(loan_id)
    }

    async fn close_loan(&mut self, loan_id: LoanId, return_date: DateTime<Utc>) -> AppResult<Loan> {
        let loan = self.current_loan(loan_id)?;
        if loan.return_date.is_some() {
            return Err(AppError::AlreadyReturned(loan_id));
        }
        self.ensure_held(loan.copy_id)?;

        let closed = Loan {
            return_date: Some(return_date),
            ..loan
        };
        self.pending_loans.push(closed.clone());
        Ok(closed)
    }
}

#[async_trait]
impl AllocationUnit for MemoryUnit {
    async fn commit(self: Box<Self>) -> AppResult<()> {
        let MemoryUnit {
            state,
            held,
            pending_status,
            pending_loans,
        } = *self;

        let Some((copy_id, mut guard)) = held else {
            return Ok(());
        };

        {
            let mut loans = write(&state.loans)?;
            for loan in pending_loans {
                loans.insert(loan.loan_id, loan);
            }
        }
        if let Some(status) = pending_status {
            *guard = status;
            if let Some(entry) = read(&state.copies)?.get(&copy_id) {
                *write(&entry.committed)? = status;
            }
        }
        Ok(())
    }
}

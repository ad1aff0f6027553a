//! Business logic services

pub mod allocation;
pub mod clock;
pub mod loans;
pub mod overdue;
pub mod reports;

use std::sync::Arc;

use crate::{config::LoansConfig, repository::Repository};

pub use clock::{Clock, ManualClock, SystemClock};

/// Container for all services
#[derive(Clone)]
pub struct Services {
    pub loans: loans::LoansService,
    pub reports: reports::ReportsService,
    pub repository: Repository,
}

impl Services {
    /// Create all services with the given repository
    pub fn new(repository: Repository, loans_config: &LoansConfig, clock: Arc<dyn Clock>) -> Self {
        let engine = allocation::AllocationEngine::new(repository.clone(), clock.clone(), loans_config);
        Self {
            loans: loans::LoansService::new(repository.clone(), engine, clock.clone()),
            reports: reports::ReportsService::new(repository.clone(), clock),
            repository,
        }
    }
}

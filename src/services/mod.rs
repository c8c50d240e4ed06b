//! Business logic services

pub mod approvals;
pub mod clock;
pub mod direct;
pub mod fines;
mod parties;
pub mod queries;
pub mod reconciliation;
pub mod requests;
pub mod returns;

use std::sync::Arc;

use chrono::Duration;

use crate::{config::BorrowingConfig, repository::Repository};

/// Container for all services
#[derive(Clone)]
pub struct Services {
    pub requests: requests::RequestService,
    pub approvals: approvals::ApprovalService,
    pub direct: direct::DirectBorrowService,
    pub returns: returns::ReturnService,
    pub reconciliation: reconciliation::ReconciliationService,
    pub queries: queries::QueryService,
    pub repository: Repository,
}

impl Services {
    /// Create all services over one repository and one clock
    pub fn new(repository: Repository, clock: Arc<dyn clock::Clock>, config: &BorrowingConfig) -> Self {
        let policy = fines::FinePolicy::from(config);
        Self {
            requests: requests::RequestService::new(
                repository.clone(),
                clock.clone(),
                policy,
                Duration::hours(config.rejection_cooldown_hours),
            ),
            approvals: approvals::ApprovalService::new(
                repository.clone(),
                clock.clone(),
                config.default_rejection_reason.clone(),
            ),
            direct: direct::DirectBorrowService::new(repository.clone(), clock.clone()),
            returns: returns::ReturnService::new(repository.clone(), clock.clone(), policy),
            reconciliation: reconciliation::ReconciliationService::new(repository.clone()),
            queries: queries::QueryService::new(repository.clone(), clock, config),
            repository,
        }
    }
}

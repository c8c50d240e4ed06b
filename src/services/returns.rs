//! Book returns and fine settlement

use std::sync::Arc;

use serde::Serialize;
use utoipa::ToSchema;
use uuid::Uuid;

use super::{clock::Clock, fines::FinePolicy};
use crate::{
    error::{AppError, AppResult},
    models::borrow::{BorrowRecord, BorrowStatus, BorrowTransition},
    repository::Repository,
};

/// Outcome of a return, handed to the payment flow
#[derive(Debug, Clone, Serialize, ToSchema)]
#[serde(rename_all = "camelCase")]
pub struct ReturnReceipt {
    pub fine: i64,
    pub days_late: i64,
    pub grace_period: i64,
    pub record: BorrowRecord,
}

#[derive(Clone)]
pub struct ReturnService {
    repository: Repository,
    clock: Arc<dyn Clock>,
    policy: FinePolicy,
}

impl ReturnService {
    pub fn new(repository: Repository, clock: Arc<dyn Clock>, policy: FinePolicy) -> Self {
        Self {
            repository,
            clock,
            policy,
        }
    }

    /// Close the user's borrow of `book_id`, finalize its fine and release the copy
    #[tracing::instrument(skip(self))]
    pub async fn return_book(&self, user_id: i32, book_id: i32) -> AppResult<ReturnReceipt> {
        let record = self
            .repository
            .records
            .find_active_for_user(user_id)
            .await?
            .filter(|r| r.book_id == book_id && r.status == BorrowStatus::Borrowed)
            .ok_or(AppError::NoActiveBorrow { user_id, book_id })?;

        let now = self.clock.now();
        let assessment = self.policy.assess(record.due_date, now, record.user_type);

        let (returned, copies) = self
            .repository
            .records
            .transition_releasing(
                record.id,
                BorrowStatus::Borrowed,
                &BorrowTransition::give_back(now, assessment.fine),
            )
            .await?
            .ok_or(AppError::NoActiveBorrow { user_id, book_id })?;

        tracing::info!(
            record_id = %returned.id,
            fine = assessment.fine,
            days_late = assessment.days_late,
            copies,
            "Book returned"
        );

        Ok(ReturnReceipt {
            fine: assessment.fine,
            days_late: assessment.days_late,
            grace_period: assessment.grace_period,
            record: returned,
        })
    }

    /// Zero the fine of a returned record after payment has been settled
    #[tracing::instrument(skip(self))]
    pub async fn settle_fine(&self, record_id: Uuid) -> AppResult<BorrowRecord> {
        let record = self
            .repository
            .records
            .get(record_id)
            .await?
            .ok_or_else(|| AppError::NotFound(format!("Borrow record {} not found", record_id)))?;

        if record.status != BorrowStatus::Returned {
            return Err(AppError::Validation(format!(
                "Only returned records carry a payable fine (current status: {})",
                record.status
            )));
        }

        let settled = self
            .repository
            .records
            .transition(record_id, BorrowStatus::Returned, &BorrowTransition::settle())
            .await?
            .ok_or_else(|| AppError::NotFound(format!("Borrow record {} not found", record_id)))?;

        tracing::info!(record_id = %settled.id, settled = record.fine, "Fine settled");
        Ok(settled)
    }
}

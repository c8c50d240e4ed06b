//! Librarian decisions on pending requests

use std::sync::Arc;

use uuid::Uuid;

use super::{clock::Clock, parties};
use crate::{
    error::{AppError, AppResult},
    models::borrow::{BorrowRecord, BorrowStatus, BorrowTransition, DecisionAction},
    repository::Repository,
};

#[derive(Clone)]
pub struct ApprovalService {
    repository: Repository,
    clock: Arc<dyn Clock>,
    default_rejection_reason: String,
}

impl ApprovalService {
    pub fn new(repository: Repository, clock: Arc<dyn Clock>, default_rejection_reason: String) -> Self {
        Self {
            repository,
            clock,
            default_rejection_reason,
        }
    }

    pub async fn decide(
        &self,
        borrow_id: Uuid,
        action: DecisionAction,
        reason: Option<String>,
        approver_id: i32,
    ) -> AppResult<BorrowRecord> {
        match action {
            DecisionAction::Approve => self.approve(borrow_id, approver_id).await,
            DecisionAction::Reject => self.reject(borrow_id, reason, approver_id).await,
        }
    }

    /// Approve a pending request: take one copy and move it to borrowed.
    ///
    /// The copy is taken before the status transition; if the transition
    /// loses the race (or fails) the copy is given back before returning.
    #[tracing::instrument(skip(self))]
    pub async fn approve(&self, borrow_id: Uuid, approver_id: i32) -> AppResult<BorrowRecord> {
        let record = self.load_pending(borrow_id).await?;

        if let Some(active) = self
            .repository
            .records
            .find_active_for_user(record.user_id)
            .await?
        {
            if active.id != record.id && active.status == BorrowStatus::Borrowed {
                return Err(AppError::UserAlreadyBorrowing);
            }
        }

        let copies_left = self.repository.ledger.try_decrement(record.book_id).await?;

        let change = BorrowTransition::approve(approver_id, self.clock.now());
        match self
            .repository
            .records
            .transition(record.id, BorrowStatus::Pending, &change)
            .await
        {
            Ok(Some(updated)) => {
                tracing::info!(
                    record_id = %updated.id,
                    user_id = updated.user_id,
                    book_id = updated.book_id,
                    copies_left,
                    "Borrow request approved"
                );
                Ok(updated)
            }
            Ok(None) => {
                tracing::warn!(record_id = %record.id, "Request was decided concurrently");
                parties::release_copy(&self.repository, record.book_id).await;
                Err(self.not_pending(record.id).await)
            }
            Err(e) => {
                parties::release_copy(&self.repository, record.book_id).await;
                Err(e)
            }
        }
    }

    #[tracing::instrument(skip(self, reason))]
    pub async fn reject(
        &self,
        borrow_id: Uuid,
        reason: Option<String>,
        approver_id: i32,
    ) -> AppResult<BorrowRecord> {
        let record = self.load_pending(borrow_id).await?;

        let reason = reason
            .map(|r| r.trim().to_string())
            .filter(|r| !r.is_empty())
            .unwrap_or_else(|| self.default_rejection_reason.clone());
        let change = BorrowTransition::reject(approver_id, self.clock.now(), reason);

        match self
            .repository
            .records
            .transition(record.id, BorrowStatus::Pending, &change)
            .await?
        {
            Some(updated) => {
                tracing::info!(record_id = %updated.id, user_id = updated.user_id, "Borrow request rejected");
                Ok(updated)
            }
            None => Err(self.not_pending(record.id).await),
        }
    }

    async fn load_pending(&self, borrow_id: Uuid) -> AppResult<BorrowRecord> {
        let record = self
            .repository
            .records
            .get(borrow_id)
            .await?
            .ok_or_else(|| AppError::NotFound(format!("Borrow record {} not found", borrow_id)))?;

        if record.status != BorrowStatus::Pending {
            return Err(AppError::RecordNotPending {
                status: record.status,
            });
        }
        Ok(record)
    }

    /// Error for a lost transition guard, reporting the status that won
    async fn not_pending(&self, borrow_id: Uuid) -> AppError {
        match self.repository.records.get(borrow_id).await {
            Ok(Some(current)) => AppError::RecordNotPending {
                status: current.status,
            },
            Ok(None) => AppError::NotFound(format!("Borrow record {} not found", borrow_id)),
            Err(e) => e,
        }
    }
}

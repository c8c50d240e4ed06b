//! Borrow request creation

use std::sync::Arc;

use chrono::{DateTime, Duration, Utc};
use serde::Serialize;
use utoipa::ToSchema;
use uuid::Uuid;

use super::{
    clock::Clock,
    fines::{FinePolicy, FinePolicyInfo},
    parties,
};
use crate::{
    error::{AppError, AppResult},
    models::borrow::{BorrowRecord, BorrowRequest, BorrowStatus},
    repository::Repository,
};

/// A freshly created pending request plus context for the borrower
#[derive(Debug, Clone, Serialize, ToSchema)]
#[serde(rename_all = "camelCase")]
pub struct CreatedRequest {
    pub record: BorrowRecord,
    pub book_available: bool,
    pub available_copies: i32,
    /// Pending requests queued for the same book, this one included
    pub pending_requests: usize,
    pub fine_policy: FinePolicyInfo,
}

#[derive(Clone)]
pub struct RequestService {
    repository: Repository,
    clock: Arc<dyn Clock>,
    policy: FinePolicy,
    cooldown: Duration,
}

impl RequestService {
    pub fn new(
        repository: Repository,
        clock: Arc<dyn Clock>,
        policy: FinePolicy,
        cooldown: Duration,
    ) -> Self {
        Self {
            repository,
            clock,
            policy,
            cooldown,
        }
    }

    /// Create a pending borrow request. No copy is reserved until approval.
    #[tracing::instrument(skip(self, request), fields(user_id = request.user_id, book_id = request.book_id))]
    pub async fn create_request(&self, request: BorrowRequest) -> AppResult<CreatedRequest> {
        let now = self.clock.now();

        let (user, book) = parties::resolve(&self.repository, &request).await?;
        parties::ensure_due_date(request.due_date, now)?;
        parties::ensure_no_active_borrow(&self.repository, user.id).await?;
        self.ensure_cooldown_elapsed(user.id, book.id, now).await?;

        let record = BorrowRecord {
            id: Uuid::new_v4(),
            user_id: user.id,
            username: user.username.clone(),
            user_type: user.role,
            book_id: book.id,
            book_name: book.name.clone(),
            book_title: book.title.clone(),
            requested_at: Some(now),
            borrowed_at: None,
            due_date: request.due_date,
            returned_at: None,
            status: BorrowStatus::Pending,
            fine: 0,
            approved_by: None,
            approved_at: None,
            rejection_reason: None,
            created_at: now,
        };
        self.repository.records.insert(&record).await?;

        let pending_requests = self
            .repository
            .records
            .find_active_for_book(book.id)
            .await?
            .iter()
            .filter(|r| r.status == BorrowStatus::Pending)
            .count();

        tracing::info!(record_id = %record.id, "Borrow request created");

        Ok(CreatedRequest {
            record,
            book_available: book.copies > 0,
            available_copies: book.copies,
            pending_requests,
            fine_policy: self.policy.describe(user.role),
        })
    }

    async fn ensure_cooldown_elapsed(
        &self,
        user_id: i32,
        book_id: i32,
        now: DateTime<Utc>,
    ) -> AppResult<()> {
        let Some(rejection) = self
            .repository
            .records
            .find_most_recent_rejection(user_id, book_id)
            .await?
        else {
            return Ok(());
        };

        let retry_after = rejection.decided_at() + self.cooldown;
        if now < retry_after {
            let remaining = retry_after - now;
            return Err(AppError::CooldownActive {
                remaining_seconds: remaining.num_seconds().max(1),
                retry_after,
            });
        }
        Ok(())
    }
}

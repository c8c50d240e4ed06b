//! Librarian-initiated borrows that skip the approval queue

use std::sync::Arc;

use uuid::Uuid;

use super::{clock::Clock, parties};
use crate::{
    error::AppResult,
    models::borrow::{BorrowRecord, BorrowRequest, BorrowStatus},
    repository::Repository,
};

#[derive(Clone)]
pub struct DirectBorrowService {
    repository: Repository,
    clock: Arc<dyn Clock>,
}

impl DirectBorrowService {
    pub fn new(repository: Repository, clock: Arc<dyn Clock>) -> Self {
        Self { repository, clock }
    }

    #[tracing::instrument(skip(self, request), fields(user_id = request.user_id, book_id = request.book_id))]
    pub async fn direct_borrow(
        &self,
        request: BorrowRequest,
        approver_id: i32,
    ) -> AppResult<BorrowRecord> {
        let now = self.clock.now();

        let (user, book) = parties::resolve(&self.repository, &request).await?;
        parties::ensure_due_date(request.due_date, now)?;
        parties::ensure_no_active_borrow(&self.repository, user.id).await?;

        let copies_left = self.repository.ledger.try_decrement(book.id).await?;

        let record = BorrowRecord {
            id: Uuid::new_v4(),
            user_id: user.id,
            username: user.username,
            user_type: user.role,
            book_id: book.id,
            book_name: book.name,
            book_title: book.title,
            requested_at: None,
            borrowed_at: Some(now),
            due_date: request.due_date,
            returned_at: None,
            status: BorrowStatus::Borrowed,
            fine: 0,
            approved_by: Some(approver_id),
            approved_at: Some(now),
            rejection_reason: None,
            created_at: now,
        };

        if let Err(e) = self.repository.records.insert(&record).await {
            parties::release_copy(&self.repository, record.book_id).await;
            return Err(e);
        }

        tracing::info!(record_id = %record.id, copies_left, "Book lent directly");
        Ok(record)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::{
        error::AppError,
        models::{BookInfo, UserInfo, UserRole},
        repository::memory::MemoryStore,
        services::clock::ManualClock,
    };
    use chrono::{DateTime, Duration, TimeZone, Utc};

    fn start() -> DateTime<Utc> {
        Utc.with_ymd_and_hms(2024, 11, 4, 10, 0, 0).unwrap()
    }

    async fn setup(copies: i32) -> (Arc<MemoryStore>, DirectBorrowService) {
        let store = Arc::new(MemoryStore::new());
        store
            .add_user(UserInfo { id: 4, username: "prof.ito".into(), role: UserRole::Teacher })
            .await;
        store
            .add_user(UserInfo { id: 5, username: "sam".into(), role: UserRole::Student })
            .await;
        store
            .add_book(BookInfo { id: 30, name: "taocp".into(), title: Some("TAOCP Vol. 1".into()), copies })
            .await;
        let service = DirectBorrowService::new(
            Repository::in_memory(store.clone()),
            Arc::new(ManualClock::new(start())),
        );
        (store, service)
    }

    fn request(user_id: i32, username: &str) -> BorrowRequest {
        BorrowRequest {
            user_id,
            username: username.into(),
            book_id: 30,
            book_name: "taocp".into(),
            due_date: start() + Duration::days(14),
            user_type: None,
        }
    }

    #[tokio::test]
    async fn test_direct_borrow_creates_borrowed_record() {
        let (store, service) = setup(1).await;

        let record = service.direct_borrow(request(4, "prof.ito"), 100).await.unwrap();
        assert_eq!(record.status, BorrowStatus::Borrowed);
        assert_eq!(record.requested_at, None);
        assert_eq!(record.borrowed_at, Some(start()));
        assert_eq!(record.approved_by, Some(100));
        assert_eq!(record.user_type, UserRole::Teacher);
        assert_eq!(store.copies(30).await, Some(0));
    }

    #[tokio::test]
    async fn test_direct_borrow_needs_a_copy() {
        let (store, service) = setup(1).await;
        service.direct_borrow(request(4, "prof.ito"), 100).await.unwrap();

        let err = service.direct_borrow(request(5, "sam"), 100).await.unwrap_err();
        assert!(matches!(err, AppError::NoCopiesAvailable { .. }));
        assert!(store.records_for_user(5).await.is_empty());
    }

    #[tokio::test]
    async fn test_direct_borrow_respects_active_borrow() {
        let (store, service) = setup(3).await;
        service.direct_borrow(request(4, "prof.ito"), 100).await.unwrap();

        let err = service.direct_borrow(request(4, "prof.ito"), 100).await.unwrap_err();
        assert!(matches!(err, AppError::ActiveBorrowExists { status: BorrowStatus::Borrowed }));
        assert_eq!(store.copies(30).await, Some(2));
    }

    #[tokio::test(flavor = "multi_thread", worker_threads = 4)]
    async fn test_racing_direct_borrows_for_one_user_release_the_loser_copy() {
        let (store, service) = setup(5).await;

        let handles: Vec<_> = (0..6)
            .map(|_| {
                let service = service.clone();
                tokio::spawn(async move { service.direct_borrow(request(5, "sam"), 100).await })
            })
            .collect();

        let mut lent = 0;
        for handle in handles {
            if handle.await.unwrap().is_ok() {
                lent += 1;
            }
        }

        assert_eq!(lent, 1);
        assert_eq!(store.records_for_user(5).await.len(), 1);
        assert_eq!(store.copies(30).await, Some(4));
    }
}

//! Administrative removal of borrow records

use serde::Serialize;
use utoipa::ToSchema;
use uuid::Uuid;

use crate::{
    error::{AppError, AppResult},
    models::BorrowStatus,
    repository::Repository,
};

#[derive(Debug, Clone, Serialize, ToSchema)]
#[serde(rename_all = "camelCase")]
pub struct DeletionOutcome {
    /// Whether a lent-out copy went back on the shelf
    pub returned_copy: bool,
    pub status: BorrowStatus,
}

#[derive(Clone)]
pub struct ReconciliationService {
    repository: Repository,
}

impl ReconciliationService {
    pub fn new(repository: Repository) -> Self {
        Self { repository }
    }

    /// Delete a record. A still-borrowed record releases its copy in the same
    /// write, once, and only for the caller whose delete removed the row.
    #[tracing::instrument(skip(self))]
    pub async fn delete_record(&self, record_id: Uuid) -> AppResult<DeletionOutcome> {
        let not_found = || AppError::NotFound(format!("Borrow record {} not found", record_id));

        let (status, copies) = self
            .repository
            .records
            .delete_releasing(record_id)
            .await?
            .ok_or_else(not_found)?;

        let returned_copy = copies.is_some();
        if let Some(copies) = copies {
            tracing::info!(record_id = %record_id, copies, "Released copy of deleted record");
        }

        tracing::info!(record_id = %record_id, %status, returned_copy, "Borrow record deleted");
        Ok(DeletionOutcome {
            returned_copy,
            status,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::{
        models::{BookInfo, BorrowRecord, BorrowTransition, UserInfo, UserRole},
        repository::{memory::MemoryStore, BorrowRecordStore, InventoryLedger},
    };
    use chrono::{Duration, TimeZone, Utc};
    use std::sync::Arc;

    fn record(status: BorrowStatus) -> BorrowRecord {
        let at = Utc.with_ymd_and_hms(2024, 2, 12, 8, 30, 0).unwrap();
        BorrowRecord {
            id: Uuid::new_v4(),
            user_id: 8,
            username: "rui".into(),
            user_type: UserRole::Student,
            book_id: 70,
            book_name: "crafting-interpreters".into(),
            book_title: None,
            requested_at: None,
            borrowed_at: Some(at),
            due_date: at + Duration::days(10),
            returned_at: None,
            status,
            fine: 0,
            approved_by: Some(1),
            approved_at: Some(at),
            rejection_reason: None,
            created_at: at,
        }
    }

    async fn setup() -> (Arc<MemoryStore>, ReconciliationService) {
        let store = Arc::new(MemoryStore::new());
        store
            .add_user(UserInfo { id: 8, username: "rui".into(), role: UserRole::Student })
            .await;
        store
            .add_book(BookInfo { id: 70, name: "crafting-interpreters".into(), title: None, copies: 2 })
            .await;
        let service = ReconciliationService::new(Repository::in_memory(store.clone()));
        (store, service)
    }

    #[tokio::test]
    async fn test_deleting_borrowed_record_releases_one_copy() {
        let (store, service) = setup().await;
        let borrowed = record(BorrowStatus::Borrowed);
        store.try_decrement(70).await.unwrap();
        store.insert(&borrowed).await.unwrap();

        let outcome = service.delete_record(borrowed.id).await.unwrap();
        assert!(outcome.returned_copy);
        assert_eq!(outcome.status, BorrowStatus::Borrowed);
        assert_eq!(store.copies(70).await, Some(2));

        let err = service.delete_record(borrowed.id).await.unwrap_err();
        assert!(matches!(err, AppError::NotFound(_)));
        assert_eq!(store.copies(70).await, Some(2));
    }

    #[tokio::test]
    async fn test_deleting_returned_record_keeps_copies() {
        let (store, service) = setup().await;
        let mut returned = record(BorrowStatus::Borrowed);
        store.insert(&returned).await.unwrap();
        returned = store
            .transition(
                returned.id,
                BorrowStatus::Borrowed,
                &BorrowTransition::give_back(returned.due_date, 0),
            )
            .await
            .unwrap()
            .unwrap();

        let outcome = service.delete_record(returned.id).await.unwrap();
        assert!(!outcome.returned_copy);
        assert_eq!(outcome.status, BorrowStatus::Returned);
        assert_eq!(store.copies(70).await, Some(2));
    }

    #[tokio::test]
    async fn test_deleting_pending_record_keeps_copies() {
        let (store, service) = setup().await;
        let pending = BorrowRecord {
            status: BorrowStatus::Pending,
            borrowed_at: None,
            ..record(BorrowStatus::Pending)
        };
        store.insert(&pending).await.unwrap();

        let outcome = service.delete_record(pending.id).await.unwrap();
        assert!(!outcome.returned_copy);
        assert_eq!(store.copies(70).await, Some(2));
        assert!(store.records_for_user(8).await.is_empty());
    }

    #[tokio::test(flavor = "multi_thread", worker_threads = 4)]
    async fn test_concurrent_deletes_release_once() {
        let (store, service) = setup().await;
        let borrowed = record(BorrowStatus::Borrowed);
        store.try_decrement(70).await.unwrap();
        store.insert(&borrowed).await.unwrap();
        let id = borrowed.id;

        let handles: Vec<_> = (0..5)
            .map(|_| {
                let service = service.clone();
                tokio::spawn(async move { service.delete_record(id).await })
            })
            .collect();
        let mut released = 0;
        for handle in handles {
            if let Ok(outcome) = handle.await.unwrap() {
                assert!(outcome.returned_copy);
                released += 1;
            }
        }

        assert_eq!(released, 1);
        assert_eq!(store.copies(70).await, Some(2));
    }

    #[tokio::test]
    async fn test_failed_release_keeps_record() {
        let (store, service) = setup().await;
        let orphan = BorrowRecord {
            book_id: 999,
            ..record(BorrowStatus::Borrowed)
        };
        store.insert(&orphan).await.unwrap();

        let err = service.delete_record(orphan.id).await.unwrap_err();
        assert!(matches!(err, AppError::NotFound(_)));
        let kept = store.get(orphan.id).await.unwrap().unwrap();
        assert_eq!(kept.status, BorrowStatus::Borrowed);
        assert_eq!(store.copies(70).await, Some(2));
    }
}

//! In-memory backend implementing every storage seam.
//!
//! All state lives behind one `RwLock`. Every mutating primitive holds the
//! write lock for its whole check-and-mutate step, matching the single
//! conditional statement its SQL counterpart runs.

use std::collections::HashMap;

use async_trait::async_trait;
use tokio::sync::RwLock;
use uuid::Uuid;

use super::{BookCatalog, BorrowRecordStore, InventoryLedger, UserDirectory};
use crate::{
    error::{AppError, AppResult},
    models::{
        borrow::{BorrowFilter, BorrowRecord, BorrowSort, BorrowStatus, BorrowTransition},
        BookInfo, UserInfo,
    },
};

#[derive(Default)]
struct State {
    users: HashMap<i32, UserInfo>,
    books: HashMap<i32, BookInfo>,
    records: HashMap<Uuid, BorrowRecord>,
}

#[derive(Default)]
pub struct MemoryStore {
    state: RwLock<State>,
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub async fn add_user(&self, user: UserInfo) {
        self.state.write().await.users.insert(user.id, user);
    }

    pub async fn add_book(&self, book: BookInfo) {
        self.state.write().await.books.insert(book.id, book);
    }

    /// Current available copies, `None` for unknown books
    pub async fn copies(&self, book_id: i32) -> Option<i32> {
        self.state.read().await.books.get(&book_id).map(|b| b.copies)
    }

    pub async fn records_for_user(&self, user_id: i32) -> Vec<BorrowRecord> {
        self.state
            .read()
            .await
            .records
            .values()
            .filter(|r| r.user_id == user_id)
            .cloned()
            .collect()
    }
}

#[async_trait]
impl BorrowRecordStore for MemoryStore {
    async fn get(&self, id: Uuid) -> AppResult<Option<BorrowRecord>> {
        Ok(self.state.read().await.records.get(&id).cloned())
    }

    async fn find_active_for_user(&self, user_id: i32) -> AppResult<Option<BorrowRecord>> {
        let state = self.state.read().await;
        Ok(state
            .records
            .values()
            .filter(|r| r.user_id == user_id && r.status.is_active())
            .max_by_key(|r| r.created_at)
            .cloned())
    }

    async fn find_active_for_book(&self, book_id: i32) -> AppResult<Vec<BorrowRecord>> {
        let state = self.state.read().await;
        let mut active: Vec<BorrowRecord> = state
            .records
            .values()
            .filter(|r| r.book_id == book_id && r.status.is_active())
            .cloned()
            .collect();
        active.sort_by_key(|r| r.created_at);
        Ok(active)
    }

    async fn find_most_recent_rejection(
        &self,
        user_id: i32,
        book_id: i32,
    ) -> AppResult<Option<BorrowRecord>> {
        let state = self.state.read().await;
        Ok(state
            .records
            .values()
            .filter(|r| {
                r.user_id == user_id && r.book_id == book_id && r.status == BorrowStatus::Rejected
            })
            .max_by_key(|r| r.decided_at())
            .cloned())
    }

    async fn insert(&self, record: &BorrowRecord) -> AppResult<()> {
        let mut state = self.state.write().await;

        if record.status.is_active() {
            if let Some(existing) = state
                .records
                .values()
                .find(|r| r.user_id == record.user_id && r.status.is_active())
            {
                return Err(AppError::ActiveBorrowExists {
                    status: existing.status,
                });
            }
        }
        if state.records.contains_key(&record.id) {
            return Err(AppError::Internal(format!(
                "Duplicate borrow record id {}",
                record.id
            )));
        }

        state.records.insert(record.id, record.clone());
        Ok(())
    }

    async fn transition(
        &self,
        id: Uuid,
        expected: BorrowStatus,
        change: &BorrowTransition,
    ) -> AppResult<Option<BorrowRecord>> {
        let mut state = self.state.write().await;
        match state.records.get_mut(&id) {
            Some(record) if record.status == expected => {
                record.apply(change);
                Ok(Some(record.clone()))
            }
            _ => Ok(None),
        }
    }

    async fn transition_releasing(
        &self,
        id: Uuid,
        expected: BorrowStatus,
        change: &BorrowTransition,
    ) -> AppResult<Option<(BorrowRecord, i32)>> {
        let mut guard = self.state.write().await;
        let state = &mut *guard;

        let Some(record) = state.records.get_mut(&id) else {
            return Ok(None);
        };
        if record.status != expected {
            return Ok(None);
        }
        // Both halves are checked before either is written
        let book = state.books.get_mut(&record.book_id).ok_or_else(|| {
            AppError::NotFound(format!("Book with id {} not found", record.book_id))
        })?;

        record.apply(change);
        book.copies += 1;
        Ok(Some((record.clone(), book.copies)))
    }

    async fn delete_releasing(&self, id: Uuid) -> AppResult<Option<(BorrowStatus, Option<i32>)>> {
        let mut guard = self.state.write().await;
        let state = &mut *guard;

        let Some(record) = state.records.get(&id) else {
            return Ok(None);
        };
        let status = record.status;

        let copies = if status == BorrowStatus::Borrowed {
            let book = state.books.get_mut(&record.book_id).ok_or_else(|| {
                AppError::NotFound(format!("Book with id {} not found", record.book_id))
            })?;
            book.copies += 1;
            Some(book.copies)
        } else {
            None
        };

        state.records.remove(&id);
        Ok(Some((status, copies)))
    }

    async fn list_filtered(
        &self,
        filter: &BorrowFilter,
        page: i64,
        limit: i64,
    ) -> AppResult<(Vec<BorrowRecord>, i64)> {
        let state = self.state.read().await;
        let mut matching: Vec<&BorrowRecord> =
            state.records.values().filter(|r| filter.matches(r)).collect();

        match filter.sort {
            BorrowSort::Recent => matching.sort_by(|a, b| b.activity_at().cmp(&a.activity_at())),
            BorrowSort::Oldest => matching.sort_by_key(|r| r.activity_at()),
            BorrowSort::DueDate => matching.sort_by_key(|r| r.due_date),
        }

        let total = matching.len() as i64;
        let offset = (page - 1).saturating_mul(limit).max(0) as usize;
        let items = matching
            .into_iter()
            .skip(offset)
            .take(limit.max(0) as usize)
            .cloned()
            .collect();

        Ok((items, total))
    }

    async fn ping(&self) -> AppResult<()> {
        Ok(())
    }
}

#[async_trait]
impl InventoryLedger for MemoryStore {
    async fn try_decrement(&self, book_id: i32) -> AppResult<i32> {
        let mut state = self.state.write().await;
        let book = state
            .books
            .get_mut(&book_id)
            .ok_or_else(|| AppError::NotFound(format!("Book with id {} not found", book_id)))?;

        if book.copies <= 0 {
            return Err(AppError::NoCopiesAvailable { book_id });
        }
        book.copies -= 1;
        Ok(book.copies)
    }

    async fn increment(&self, book_id: i32) -> AppResult<i32> {
        let mut state = self.state.write().await;
        let book = state
            .books
            .get_mut(&book_id)
            .ok_or_else(|| AppError::NotFound(format!("Book with id {} not found", book_id)))?;

        book.copies += 1;
        Ok(book.copies)
    }
}

#[async_trait]
impl UserDirectory for MemoryStore {
    async fn find_user(&self, user_id: i32) -> AppResult<Option<UserInfo>> {
        Ok(self.state.read().await.users.get(&user_id).cloned())
    }
}

#[async_trait]
impl BookCatalog for MemoryStore {
    async fn find_book(&self, book_id: i32) -> AppResult<Option<BookInfo>> {
        Ok(self.state.read().await.books.get(&book_id).cloned())
    }
}

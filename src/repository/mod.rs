//! Repository layer: storage seams and their implementations
//!
//! Every mutation of shared state (a book's `copies` counter, a record's
//! `status`) goes through one of the primitives below, and each primitive is a
//! single atomic operation against its backend.

pub mod books;
pub mod borrows;
pub mod memory;
pub mod users;

use std::sync::Arc;

use async_trait::async_trait;
use sqlx::{Pool, Postgres};
use uuid::Uuid;

use crate::{
    error::AppResult,
    models::{
        borrow::{BorrowFilter, BorrowRecord, BorrowStatus, BorrowTransition},
        BookInfo, UserInfo,
    },
};

/// Persisted borrow records
#[async_trait]
pub trait BorrowRecordStore: Send + Sync {
    async fn get(&self, id: Uuid) -> AppResult<Option<BorrowRecord>>;

    /// The user's pending or borrowed record, if any
    async fn find_active_for_user(&self, user_id: i32) -> AppResult<Option<BorrowRecord>>;

    /// Pending and borrowed records for a book
    async fn find_active_for_book(&self, book_id: i32) -> AppResult<Vec<BorrowRecord>>;

    /// Latest rejected record for the pair, by decision time
    async fn find_most_recent_rejection(
        &self,
        user_id: i32,
        book_id: i32,
    ) -> AppResult<Option<BorrowRecord>>;

    /// Insert a new record. Fails with `ActiveBorrowExists` when the record is
    /// active and the user already holds an active record.
    async fn insert(&self, record: &BorrowRecord) -> AppResult<()>;

    /// Apply `change` only if the record is currently in `expected` status.
    /// Returns `None` (and writes nothing) when the guard does not hold or the
    /// record does not exist.
    async fn transition(
        &self,
        id: Uuid,
        expected: BorrowStatus,
        change: &BorrowTransition,
    ) -> AppResult<Option<BorrowRecord>>;

    /// Like `transition`, and in the same atomic step give the record's copy
    /// back to the ledger. Nothing is written if either half fails. Returns
    /// the updated record and the book's new copy count.
    async fn transition_releasing(
        &self,
        id: Uuid,
        expected: BorrowStatus,
        change: &BorrowTransition,
    ) -> AppResult<Option<(BorrowRecord, i32)>>;

    /// Remove a record, returning the status it had at deletion time. A
    /// `borrowed` record gives its copy back in the same atomic step, and the
    /// new copy count is returned alongside; if that increment fails the
    /// record is kept.
    async fn delete_releasing(&self, id: Uuid) -> AppResult<Option<(BorrowStatus, Option<i32>)>>;

    async fn list_filtered(
        &self,
        filter: &BorrowFilter,
        page: i64,
        limit: i64,
    ) -> AppResult<(Vec<BorrowRecord>, i64)>;

    /// Connectivity check behind `/ready`
    async fn ping(&self) -> AppResult<()>;
}

/// Available-copies counters, shared with the catalog
#[async_trait]
pub trait InventoryLedger: Send + Sync {
    /// Decrement only if `copies > 0`; returns the new count or
    /// `NoCopiesAvailable`.
    async fn try_decrement(&self, book_id: i32) -> AppResult<i32>;

    /// Unconditional increment; returns the new count
    async fn increment(&self, book_id: i32) -> AppResult<i32>;
}

/// User directory collaborator
#[cfg_attr(test, mockall::automock)]
#[async_trait]
pub trait UserDirectory: Send + Sync {
    async fn find_user(&self, user_id: i32) -> AppResult<Option<UserInfo>>;
}

/// Book catalog collaborator
#[cfg_attr(test, mockall::automock)]
#[async_trait]
pub trait BookCatalog: Send + Sync {
    async fn find_book(&self, book_id: i32) -> AppResult<Option<BookInfo>>;
}

/// Main repository struct holding the storage backends
#[derive(Clone)]
pub struct Repository {
    pub records: Arc<dyn BorrowRecordStore>,
    pub ledger: Arc<dyn InventoryLedger>,
    pub users: Arc<dyn UserDirectory>,
    pub books: Arc<dyn BookCatalog>,
}

impl Repository {
    /// Create a PostgreSQL-backed repository with the given database pool
    pub fn new(pool: Pool<Postgres>) -> Self {
        let books = Arc::new(books::PgBookStore::new(pool.clone()));
        Self {
            records: Arc::new(borrows::PgBorrowRecordStore::new(pool.clone())),
            ledger: books.clone(),
            users: Arc::new(users::PgUserDirectory::new(pool)),
            books,
        }
    }

    /// Create a repository where every seam is served by one in-memory store
    pub fn in_memory(store: Arc<memory::MemoryStore>) -> Self {
        Self {
            records: store.clone(),
            ledger: store.clone(),
            users: store.clone(),
            books: store,
        }
    }
}

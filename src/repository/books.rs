//! Books repository: catalog lookups and the available-copies ledger

use async_trait::async_trait;
use sqlx::{Executor, Pool, Postgres};

use super::{BookCatalog, InventoryLedger};
use crate::{
    error::{AppError, AppResult},
    models::BookInfo,
};

#[derive(Clone)]
pub struct PgBookStore {
    pool: Pool<Postgres>,
}

impl PgBookStore {
    pub fn new(pool: Pool<Postgres>) -> Self {
        Self { pool }
    }

    async fn exists(&self, book_id: i32) -> AppResult<bool> {
        let exists: bool = sqlx::query_scalar("SELECT EXISTS(SELECT 1 FROM books WHERE id = $1)")
            .bind(book_id)
            .fetch_one(&self.pool)
            .await?;
        Ok(exists)
    }
}

#[async_trait]
impl BookCatalog for PgBookStore {
    async fn find_book(&self, book_id: i32) -> AppResult<Option<BookInfo>> {
        let book = sqlx::query_as::<_, BookInfo>(
            "SELECT id, name, title, copies FROM books WHERE id = $1",
        )
        .bind(book_id)
        .fetch_optional(&self.pool)
        .await?;

        Ok(book)
    }
}

#[async_trait]
impl InventoryLedger for PgBookStore {
    async fn try_decrement(&self, book_id: i32) -> AppResult<i32> {
        let copies: Option<i32> = sqlx::query_scalar(
            "UPDATE books SET copies = copies - 1 WHERE id = $1 AND copies > 0 RETURNING copies",
        )
        .bind(book_id)
        .fetch_optional(&self.pool)
        .await?;

        match copies {
            Some(left) => Ok(left),
            None if self.exists(book_id).await? => Err(AppError::NoCopiesAvailable { book_id }),
            None => Err(AppError::NotFound(format!("Book with id {} not found", book_id))),
        }
    }

    async fn increment(&self, book_id: i32) -> AppResult<i32> {
        increment_copies(&self.pool, book_id).await
    }
}

/// Unconditional increment, usable inside a record transaction
pub(super) async fn increment_copies<'e, E>(executor: E, book_id: i32) -> AppResult<i32>
where
    E: Executor<'e, Database = Postgres>,
{
    sqlx::query_scalar::<_, i32>("UPDATE books SET copies = copies + 1 WHERE id = $1 RETURNING copies")
        .bind(book_id)
        .fetch_optional(executor)
        .await?
        .ok_or_else(|| AppError::NotFound(format!("Book with id {} not found", book_id)))
}

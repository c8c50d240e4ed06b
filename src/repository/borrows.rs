//! Borrow records repository for database operations

use async_trait::async_trait;
use sqlx::{Executor, Pool, Postgres, QueryBuilder};
use uuid::Uuid;

use super::{books::increment_copies, BorrowRecordStore};
use crate::{
    error::{AppError, AppResult},
    models::borrow::{
        BorrowFilter, BorrowRecord, BorrowRecordRow, BorrowSort, BorrowStatus, BorrowTransition,
    },
};

const COLUMNS: &str = r#"
    id, user_id, username, user_type, book_id, book_name, book_title,
    requested_at, borrowed_at, due_date, returned_at, status, fine,
    approved_by, approved_at, rejection_reason, created_at
"#;

/// Name of the partial unique index enforcing one active record per user
const ONE_ACTIVE_INDEX: &str = "borrow_records_one_active_per_user";

#[derive(Clone)]
pub struct PgBorrowRecordStore {
    pool: Pool<Postgres>,
}

impl PgBorrowRecordStore {
    pub fn new(pool: Pool<Postgres>) -> Self {
        Self { pool }
    }

    async fn fetch_one_where(
        &self,
        clause: &str,
        user_id: i32,
        book_id: Option<i32>,
    ) -> AppResult<Option<BorrowRecord>> {
        let sql = format!("SELECT {} FROM borrow_records WHERE {}", COLUMNS, clause);
        let mut query = sqlx::query_as::<_, BorrowRecordRow>(&sql).bind(user_id);
        if let Some(book_id) = book_id {
            query = query.bind(book_id);
        }
        query
            .fetch_optional(&self.pool)
            .await?
            .map(BorrowRecord::try_from)
            .transpose()
    }
}

fn push_filters(builder: &mut QueryBuilder<'_, Postgres>, filter: &BorrowFilter) {
    builder.push(" WHERE 1 = 1");

    if let Some(status) = filter.status {
        builder.push(" AND status = ").push_bind(status.as_str());
    }
    if let Some(user_type) = filter.user_type {
        builder.push(" AND user_type = ").push_bind(user_type.as_str());
    }
    if let Some(user_id) = filter.user_id {
        builder.push(" AND user_id = ").push_bind(user_id);
    }
    if let Some(ref search) = filter.search {
        let pattern = format!("%{}%", search.to_lowercase());
        builder
            .push(" AND (LOWER(username) LIKE ")
            .push_bind(pattern.clone())
            .push(" OR LOWER(book_name) LIKE ")
            .push_bind(pattern.clone())
            .push(" OR LOWER(COALESCE(book_title, '')) LIKE ")
            .push_bind(pattern)
            .push(")");
    }
}

fn order_clause(sort: BorrowSort) -> &'static str {
    match sort {
        BorrowSort::Recent => " ORDER BY COALESCE(requested_at, borrowed_at, created_at) DESC",
        BorrowSort::Oldest => " ORDER BY COALESCE(requested_at, borrowed_at, created_at) ASC",
        BorrowSort::DueDate => " ORDER BY due_date ASC",
    }
}

/// Guarded status update shared by the plain and the releasing transition
async fn apply_transition<'e, E>(
    executor: E,
    id: Uuid,
    expected: BorrowStatus,
    change: &BorrowTransition,
) -> AppResult<Option<BorrowRecord>>
where
    E: Executor<'e, Database = Postgres>,
{
    let sql = format!(
        r#"
        UPDATE borrow_records SET
            status = $3,
            borrowed_at = COALESCE($4, borrowed_at),
            returned_at = COALESCE($5, returned_at),
            approved_by = COALESCE($6, approved_by),
            approved_at = COALESCE($7, approved_at),
            rejection_reason = COALESCE($8, rejection_reason),
            fine = COALESCE($9, fine)
        WHERE id = $1 AND status = $2
        RETURNING {}
        "#,
        COLUMNS
    );

    sqlx::query_as::<_, BorrowRecordRow>(&sql)
        .bind(id)
        .bind(expected.as_str())
        .bind(change.status.as_str())
        .bind(change.borrowed_at)
        .bind(change.returned_at)
        .bind(change.approved_by)
        .bind(change.approved_at)
        .bind(&change.rejection_reason)
        .bind(change.fine)
        .fetch_optional(executor)
        .await?
        .map(BorrowRecord::try_from)
        .transpose()
}

fn is_one_active_violation(err: &sqlx::Error) -> bool {
    match err {
        sqlx::Error::Database(db) => {
            db.code().as_deref() == Some("23505") && db.constraint() == Some(ONE_ACTIVE_INDEX)
        }
        _ => false,
    }
}

#[async_trait]
impl BorrowRecordStore for PgBorrowRecordStore {
    async fn get(&self, id: Uuid) -> AppResult<Option<BorrowRecord>> {
        let sql = format!("SELECT {} FROM borrow_records WHERE id = $1", COLUMNS);
        sqlx::query_as::<_, BorrowRecordRow>(&sql)
            .bind(id)
            .fetch_optional(&self.pool)
            .await?
            .map(BorrowRecord::try_from)
            .transpose()
    }

    async fn find_active_for_user(&self, user_id: i32) -> AppResult<Option<BorrowRecord>> {
        self.fetch_one_where(
            "user_id = $1 AND status IN ('pending', 'borrowed') ORDER BY created_at DESC LIMIT 1",
            user_id,
            None,
        )
        .await
    }

    async fn find_active_for_book(&self, book_id: i32) -> AppResult<Vec<BorrowRecord>> {
        let sql = format!(
            "SELECT {} FROM borrow_records WHERE book_id = $1 AND status IN ('pending', 'borrowed') ORDER BY created_at",
            COLUMNS
        );
        let rows = sqlx::query_as::<_, BorrowRecordRow>(&sql)
            .bind(book_id)
            .fetch_all(&self.pool)
            .await?;

        rows.into_iter().map(BorrowRecord::try_from).collect()
    }

    async fn find_most_recent_rejection(
        &self,
        user_id: i32,
        book_id: i32,
    ) -> AppResult<Option<BorrowRecord>> {
        self.fetch_one_where(
            r#"user_id = $1 AND book_id = $2 AND status = 'rejected'
               ORDER BY COALESCE(approved_at, requested_at, created_at) DESC LIMIT 1"#,
            user_id,
            Some(book_id),
        )
        .await
    }

    async fn insert(&self, record: &BorrowRecord) -> AppResult<()> {
        let result = sqlx::query(
            r#"
            INSERT INTO borrow_records (
                id, user_id, username, user_type, book_id, book_name, book_title,
                requested_at, borrowed_at, due_date, returned_at, status, fine,
                approved_by, approved_at, rejection_reason, created_at
            ) VALUES (
                $1, $2, $3, $4, $5, $6, $7, $8, $9, $10, $11, $12, $13, $14, $15, $16, $17
            )
            "#,
        )
        .bind(record.id)
        .bind(record.user_id)
        .bind(&record.username)
        .bind(record.user_type.as_str())
        .bind(record.book_id)
        .bind(&record.book_name)
        .bind(&record.book_title)
        .bind(record.requested_at)
        .bind(record.borrowed_at)
        .bind(record.due_date)
        .bind(record.returned_at)
        .bind(record.status.as_str())
        .bind(record.fine)
        .bind(record.approved_by)
        .bind(record.approved_at)
        .bind(&record.rejection_reason)
        .bind(record.created_at)
        .execute(&self.pool)
        .await;

        match result {
            Ok(_) => Ok(()),
            Err(e) if is_one_active_violation(&e) => {
                // Lost a race against another insert for the same user
                let status = self
                    .find_active_for_user(record.user_id)
                    .await?
                    .map(|r| r.status)
                    .unwrap_or(BorrowStatus::Pending);
                Err(AppError::ActiveBorrowExists { status })
            }
            Err(e) => Err(e.into()),
        }
    }

    async fn transition(
        &self,
        id: Uuid,
        expected: BorrowStatus,
        change: &BorrowTransition,
    ) -> AppResult<Option<BorrowRecord>> {
        apply_transition(&self.pool, id, expected, change).await
    }

    async fn transition_releasing(
        &self,
        id: Uuid,
        expected: BorrowStatus,
        change: &BorrowTransition,
    ) -> AppResult<Option<(BorrowRecord, i32)>> {
        let mut tx = self.pool.begin().await?;

        let Some(record) = apply_transition(&mut *tx, id, expected, change).await? else {
            return Ok(None);
        };
        // Dropping the transaction on error rolls the transition back
        let copies = increment_copies(&mut *tx, record.book_id).await?;

        tx.commit().await?;
        Ok(Some((record, copies)))
    }

    async fn delete_releasing(&self, id: Uuid) -> AppResult<Option<(BorrowStatus, Option<i32>)>> {
        let mut tx = self.pool.begin().await?;

        let row: Option<(String, i32)> =
            sqlx::query_as("SELECT status, book_id FROM borrow_records WHERE id = $1 FOR UPDATE")
                .bind(id)
                .fetch_optional(&mut *tx)
                .await?;
        let Some((status, book_id)) = row else {
            return Ok(None);
        };
        let status: BorrowStatus = status.parse().map_err(AppError::Internal)?;

        let copies = if status == BorrowStatus::Borrowed {
            Some(increment_copies(&mut *tx, book_id).await?)
        } else {
            None
        };

        sqlx::query("DELETE FROM borrow_records WHERE id = $1")
            .bind(id)
            .execute(&mut *tx)
            .await?;

        tx.commit().await?;
        Ok(Some((status, copies)))
    }

    async fn list_filtered(
        &self,
        filter: &BorrowFilter,
        page: i64,
        limit: i64,
    ) -> AppResult<(Vec<BorrowRecord>, i64)> {
        let offset = (page - 1).saturating_mul(limit);

        let mut count_builder = QueryBuilder::<Postgres>::new("SELECT COUNT(*) FROM borrow_records");
        push_filters(&mut count_builder, filter);
        let total = count_builder
            .build_query_scalar::<i64>()
            .fetch_one(&self.pool)
            .await?;

        let mut select_builder =
            QueryBuilder::<Postgres>::new(format!("SELECT {} FROM borrow_records", COLUMNS));
        push_filters(&mut select_builder, filter);
        select_builder.push(order_clause(filter.sort));
        select_builder
            .push(" LIMIT ")
            .push_bind(limit)
            .push(" OFFSET ")
            .push_bind(offset);

        let rows = select_builder
            .build_query_as::<BorrowRecordRow>()
            .fetch_all(&self.pool)
            .await?;

        let records = rows
            .into_iter()
            .map(BorrowRecord::try_from)
            .collect::<AppResult<Vec<_>>>()?;

        Ok((records, total))
    }

    async fn ping(&self) -> AppResult<()> {
        sqlx::query("SELECT 1").execute(&self.pool).await?;
        Ok(())
    }
}

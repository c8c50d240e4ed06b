//! Users repository: read-only view of the user directory

use async_trait::async_trait;
use sqlx::{FromRow, Pool, Postgres};

use super::UserDirectory;
use crate::{
    error::{AppError, AppResult},
    models::UserInfo,
};

#[derive(Debug, FromRow)]
struct UserRow {
    id: i32,
    username: String,
    role: String,
}

#[derive(Clone)]
pub struct PgUserDirectory {
    pool: Pool<Postgres>,
}

impl PgUserDirectory {
    pub fn new(pool: Pool<Postgres>) -> Self {
        Self { pool }
    }
}

#[async_trait]
impl UserDirectory for PgUserDirectory {
    async fn find_user(&self, user_id: i32) -> AppResult<Option<UserInfo>> {
        let row = sqlx::query_as::<_, UserRow>("SELECT id, username, role FROM users WHERE id = $1")
            .bind(user_id)
            .fetch_optional(&self.pool)
            .await?;

        row.map(|r| {
            Ok(UserInfo {
                id: r.id,
                username: r.username,
                role: r.role.parse().map_err(AppError::Internal)?,
            })
        })
        .transpose()
    }
}

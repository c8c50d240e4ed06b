//! Book as seen by the borrowing subsystem

use serde::{Deserialize, Serialize};
use sqlx::FromRow;
use utoipa::ToSchema;

/// Catalog entry. `copies` counts units currently available to lend.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, FromRow, ToSchema)]
#[serde(rename_all = "camelCase")]
pub struct BookInfo {
    pub id: i32,
    pub name: String,
    pub title: Option<String>,
    pub copies: i32,
}

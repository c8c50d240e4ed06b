//! Borrow record model and related types

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use sqlx::FromRow;
use utoipa::{IntoParams, ToSchema};
use uuid::Uuid;

use super::user::UserRole;
use crate::error::AppError;

/// Lifecycle state of a borrow record.
///
/// `overdue` is never stored: it is derived from `due_date` for borrowed
/// records when they are read.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, ToSchema)]
#[serde(rename_all = "lowercase")]
pub enum BorrowStatus {
    Pending,
    Borrowed,
    Returned,
    Rejected,
}

impl BorrowStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            BorrowStatus::Pending => "pending",
            BorrowStatus::Borrowed => "borrowed",
            BorrowStatus::Returned => "returned",
            BorrowStatus::Rejected => "rejected",
        }
    }

    /// Pending and borrowed records count against the one-per-user limit
    pub fn is_active(&self) -> bool {
        matches!(self, BorrowStatus::Pending | BorrowStatus::Borrowed)
    }
}

impl std::fmt::Display for BorrowStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

impl std::str::FromStr for BorrowStatus {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_lowercase().as_str() {
            "pending" => Ok(BorrowStatus::Pending),
            "borrowed" => Ok(BorrowStatus::Borrowed),
            "returned" => Ok(BorrowStatus::Returned),
            "rejected" => Ok(BorrowStatus::Rejected),
            _ => Err(format!("Invalid borrow status: {}", s)),
        }
    }
}

/// One lending transaction, with user and book snapshotted at creation
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, ToSchema)]
#[serde(rename_all = "camelCase")]
pub struct BorrowRecord {
    pub id: Uuid,
    pub user_id: i32,
    pub username: String,
    pub user_type: UserRole,
    pub book_id: i32,
    pub book_name: String,
    pub book_title: Option<String>,
    pub requested_at: Option<DateTime<Utc>>,
    pub borrowed_at: Option<DateTime<Utc>>,
    pub due_date: DateTime<Utc>,
    pub returned_at: Option<DateTime<Utc>>,
    pub status: BorrowStatus,
    pub fine: i64,
    pub approved_by: Option<i32>,
    pub approved_at: Option<DateTime<Utc>>,
    pub rejection_reason: Option<String>,
    pub created_at: DateTime<Utc>,
}

impl BorrowRecord {
    /// Timestamp used to order records by request/borrow recency
    pub fn activity_at(&self) -> DateTime<Utc> {
        self.requested_at
            .or(self.borrowed_at)
            .unwrap_or(self.created_at)
    }

    /// When the librarian decided on this record (falls back to creation)
    pub fn decided_at(&self) -> DateTime<Utc> {
        self.approved_at
            .or(self.requested_at)
            .unwrap_or(self.created_at)
    }

    /// Apply a transition in place. Only stores call this, under their own
    /// atomicity guarantee.
    pub(crate) fn apply(&mut self, change: &BorrowTransition) {
        self.status = change.status;
        if let Some(at) = change.borrowed_at {
            self.borrowed_at = Some(at);
        }
        if let Some(at) = change.returned_at {
            self.returned_at = Some(at);
        }
        if let Some(by) = change.approved_by {
            self.approved_by = Some(by);
        }
        if let Some(at) = change.approved_at {
            self.approved_at = Some(at);
        }
        if let Some(ref reason) = change.rejection_reason {
            self.rejection_reason = Some(reason.clone());
        }
        if let Some(fine) = change.fine {
            self.fine = fine;
        }
    }
}

/// Internal row structure for database queries
#[derive(Debug, Clone, FromRow)]
pub struct BorrowRecordRow {
    id: Uuid,
    user_id: i32,
    username: String,
    user_type: String,
    book_id: i32,
    book_name: String,
    book_title: Option<String>,
    requested_at: Option<DateTime<Utc>>,
    borrowed_at: Option<DateTime<Utc>>,
    due_date: DateTime<Utc>,
    returned_at: Option<DateTime<Utc>>,
    status: String,
    fine: i64,
    approved_by: Option<i32>,
    approved_at: Option<DateTime<Utc>>,
    rejection_reason: Option<String>,
    created_at: DateTime<Utc>,
}

impl TryFrom<BorrowRecordRow> for BorrowRecord {
    type Error = AppError;

    fn try_from(row: BorrowRecordRow) -> Result<Self, Self::Error> {
        Ok(BorrowRecord {
            id: row.id,
            user_id: row.user_id,
            username: row.username,
            user_type: row.user_type.parse().map_err(AppError::Internal)?,
            book_id: row.book_id,
            book_name: row.book_name,
            book_title: row.book_title,
            requested_at: row.requested_at,
            borrowed_at: row.borrowed_at,
            due_date: row.due_date,
            returned_at: row.returned_at,
            status: row.status.parse().map_err(AppError::Internal)?,
            fine: row.fine,
            approved_by: row.approved_by,
            approved_at: row.approved_at,
            rejection_reason: row.rejection_reason,
            created_at: row.created_at,
        })
    }
}

/// Fields written by a guarded status transition. `None` leaves a column as is.
#[derive(Debug, Clone, PartialEq)]
pub struct BorrowTransition {
    pub status: BorrowStatus,
    pub borrowed_at: Option<DateTime<Utc>>,
    pub returned_at: Option<DateTime<Utc>>,
    pub approved_by: Option<i32>,
    pub approved_at: Option<DateTime<Utc>>,
    pub rejection_reason: Option<String>,
    pub fine: Option<i64>,
}

impl BorrowTransition {
    fn to(status: BorrowStatus) -> Self {
        Self {
            status,
            borrowed_at: None,
            returned_at: None,
            approved_by: None,
            approved_at: None,
            rejection_reason: None,
            fine: None,
        }
    }

    pub fn approve(approver_id: i32, now: DateTime<Utc>) -> Self {
        Self {
            borrowed_at: Some(now),
            approved_by: Some(approver_id),
            approved_at: Some(now),
            ..Self::to(BorrowStatus::Borrowed)
        }
    }

    pub fn reject(approver_id: i32, now: DateTime<Utc>, reason: String) -> Self {
        Self {
            approved_by: Some(approver_id),
            approved_at: Some(now),
            rejection_reason: Some(reason),
            ..Self::to(BorrowStatus::Rejected)
        }
    }

    pub fn give_back(now: DateTime<Utc>, fine: i64) -> Self {
        Self {
            returned_at: Some(now),
            fine: Some(fine),
            ..Self::to(BorrowStatus::Returned)
        }
    }

    /// Zero the fine of a returned record once payment is settled
    pub fn settle() -> Self {
        Self {
            fine: Some(0),
            ..Self::to(BorrowStatus::Returned)
        }
    }
}

/// Borrow request as submitted by a borrower (or by staff on their behalf)
#[derive(Debug, Clone)]
pub struct BorrowRequest {
    pub user_id: i32,
    pub username: String,
    pub book_id: i32,
    pub book_name: String,
    pub due_date: DateTime<Utc>,
    pub user_type: Option<UserRole>,
}

/// Librarian decision on a pending request
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, ToSchema)]
#[serde(rename_all = "lowercase")]
pub enum DecisionAction {
    Approve,
    Reject,
}

/// Sort order for borrow listings
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize, ToSchema)]
#[serde(rename_all = "snake_case")]
pub enum BorrowSort {
    /// Most recently requested/borrowed first
    #[default]
    Recent,
    Oldest,
    DueDate,
}

/// Borrow listing query parameters
#[derive(Debug, Clone, Default, Deserialize, IntoParams, ToSchema)]
#[serde(rename_all = "camelCase")]
#[into_params(parameter_in = Query)]
pub struct BorrowQuery {
    /// Case-insensitive match on username, book name or book title
    pub search: Option<String>,
    pub status: Option<BorrowStatus>,
    pub user_type: Option<UserRole>,
    pub sort: Option<BorrowSort>,
    pub page: Option<i64>,
    pub limit: Option<i64>,
}

/// Filter resolved from a query, with pagination already clamped
#[derive(Debug, Clone, Default, PartialEq)]
pub struct BorrowFilter {
    pub search: Option<String>,
    pub status: Option<BorrowStatus>,
    pub user_type: Option<UserRole>,
    pub user_id: Option<i32>,
    pub sort: BorrowSort,
}

impl BorrowFilter {
    pub fn matches(&self, record: &BorrowRecord) -> bool {
        if let Some(status) = self.status {
            if record.status != status {
                return false;
            }
        }
        if let Some(user_type) = self.user_type {
            if record.user_type != user_type {
                return false;
            }
        }
        if let Some(user_id) = self.user_id {
            if record.user_id != user_id {
                return false;
            }
        }
        if let Some(ref search) = self.search {
            let needle = search.to_lowercase();
            let title_hit = record
                .book_title
                .as_deref()
                .map(|t| t.to_lowercase().contains(&needle))
                .unwrap_or(false);
            if !(record.username.to_lowercase().contains(&needle)
                || record.book_name.to_lowercase().contains(&needle)
                || title_hit)
            {
                return false;
            }
        }
        true
    }
}

/// Borrow record decorated with values computed at read time
#[derive(Debug, Clone, Serialize, ToSchema)]
#[serde(rename_all = "camelCase")]
pub struct BorrowView {
    pub record: BorrowRecord,
    /// Fine as of now for borrowed records, persisted fine otherwise
    pub live_fine: i64,
    pub days_late: i64,
    pub is_overdue: bool,
}

/// Page of borrow views
#[derive(Debug, Serialize, ToSchema)]
#[serde(rename_all = "camelCase")]
pub struct BorrowPage {
    pub items: Vec<BorrowView>,
    pub total: i64,
    pub page: i64,
    pub limit: i64,
}

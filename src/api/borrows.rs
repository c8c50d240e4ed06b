//! Borrowing lifecycle endpoints

use axum::{
    extract::{Path, Query, State},
    http::StatusCode,
    Json,
};
use axum_extra::extract::WithRejection;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use utoipa::{IntoParams, ToSchema};
use uuid::Uuid;
use validator::Validate;

use crate::{
    error::{AppError, AppResult},
    models::{
        borrow::{BorrowPage, BorrowQuery, BorrowRequest, BorrowView, DecisionAction},
        BorrowRecord, BorrowStatus, UserRole,
    },
    services::{
        fines::FinePolicyInfo, reconciliation::DeletionOutcome, requests::CreatedRequest,
        returns::ReturnReceipt,
    },
    AppState,
};

use super::AuthenticatedUser;

/// Borrow request body, shared by self-service requests and direct lending
#[derive(Debug, Deserialize, Validate, ToSchema)]
#[serde(rename_all = "camelCase")]
pub struct BorrowRequestBody {
    #[validate(range(min = 1, message = "userId must be positive"))]
    pub user_id: i32,
    #[validate(length(min = 1, message = "username is required"))]
    pub username: String,
    #[validate(range(min = 1, message = "bookId must be positive"))]
    pub book_id: i32,
    #[validate(length(min = 1, message = "bookName is required"))]
    pub book_name: String,
    /// Due date (ISO 8601)
    pub due_date: DateTime<Utc>,
    pub user_type: Option<UserRole>,
}

impl From<BorrowRequestBody> for BorrowRequest {
    fn from(body: BorrowRequestBody) -> Self {
        BorrowRequest {
            user_id: body.user_id,
            username: body.username,
            book_id: body.book_id,
            book_name: body.book_name,
            due_date: body.due_date,
            user_type: body.user_type,
        }
    }
}

/// Librarian decision body
#[derive(Debug, Deserialize, Validate, ToSchema)]
#[serde(rename_all = "camelCase")]
pub struct DecisionBody {
    pub borrow_id: Uuid,
    pub action: DecisionAction,
    /// Shown to the borrower on rejection
    #[validate(length(max = 500, message = "reason must be at most 500 characters"))]
    pub reason: Option<String>,
}

#[derive(Debug, Serialize, ToSchema)]
#[serde(rename_all = "camelCase")]
pub struct DecisionResponse {
    pub status: BorrowStatus,
    pub record: BorrowRecord,
}

#[derive(Debug, Deserialize, Validate, ToSchema)]
#[serde(rename_all = "camelCase")]
pub struct ReturnBody {
    #[validate(range(min = 1, message = "userId must be positive"))]
    pub user_id: i32,
    #[validate(range(min = 1, message = "bookId must be positive"))]
    pub book_id: i32,
}

#[derive(Debug, Deserialize, ToSchema)]
#[serde(rename_all = "camelCase")]
pub struct SettleFineBody {
    pub record_id: Uuid,
}

#[derive(Debug, Deserialize, IntoParams)]
#[serde(rename_all = "camelCase")]
#[into_params(parameter_in = Query)]
pub struct PageQuery {
    pub page: Option<i64>,
    pub limit: Option<i64>,
}

#[derive(Debug, Deserialize, IntoParams)]
#[serde(rename_all = "camelCase")]
#[into_params(parameter_in = Query)]
pub struct FinePolicyQuery {
    /// Staff only; borrowers always see their own policy
    pub user_type: Option<UserRole>,
}

/// Request to borrow a book
#[utoipa::path(
    post,
    path = "/borrows/request",
    tag = "borrows",
    security(("bearer_auth" = [])),
    request_body = BorrowRequestBody,
    responses(
        (status = 201, description = "Request created", body = CreatedRequest),
        (status = 400, description = "Invalid request", body = crate::error::ErrorResponse),
        (status = 404, description = "User or book not found", body = crate::error::ErrorResponse),
        (status = 409, description = "Active borrow exists or cooldown active", body = crate::error::ErrorResponse)
    )
)]
pub async fn create_request(
    State(state): State<AppState>,
    AuthenticatedUser(claims): AuthenticatedUser,
    WithRejection(Json(body), _): WithRejection<Json<BorrowRequestBody>, AppError>,
) -> AppResult<(StatusCode, Json<CreatedRequest>)> {
    body.validate()?;
    claims.require_self_or_staff(body.user_id)?;

    let created = state.services.requests.create_request(body.into()).await?;
    Ok((StatusCode::CREATED, Json(created)))
}

/// Approve or reject a pending request
#[utoipa::path(
    post,
    path = "/borrows/approve",
    tag = "borrows",
    security(("bearer_auth" = [])),
    request_body = DecisionBody,
    responses(
        (status = 200, description = "Request decided", body = DecisionResponse),
        (status = 404, description = "Record not found", body = crate::error::ErrorResponse),
        (status = 409, description = "Already decided or no copies left", body = crate::error::ErrorResponse)
    )
)]
pub async fn decide(
    State(state): State<AppState>,
    AuthenticatedUser(claims): AuthenticatedUser,
    WithRejection(Json(body), _): WithRejection<Json<DecisionBody>, AppError>,
) -> AppResult<Json<DecisionResponse>> {
    body.validate()?;
    claims.require_staff()?;

    let record = state
        .services
        .approvals
        .decide(body.borrow_id, body.action, body.reason, claims.user_id)
        .await?;

    Ok(Json(DecisionResponse {
        status: record.status,
        record,
    }))
}

/// Lend a book immediately, skipping the request queue
#[utoipa::path(
    post,
    path = "/borrows/librarian-borrow",
    tag = "borrows",
    security(("bearer_auth" = [])),
    request_body = BorrowRequestBody,
    responses(
        (status = 201, description = "Book lent", body = BorrowRecord),
        (status = 400, description = "Invalid request", body = crate::error::ErrorResponse),
        (status = 404, description = "User or book not found", body = crate::error::ErrorResponse),
        (status = 409, description = "Active borrow exists or no copies left", body = crate::error::ErrorResponse)
    )
)]
pub async fn direct_borrow(
    State(state): State<AppState>,
    AuthenticatedUser(claims): AuthenticatedUser,
    WithRejection(Json(body), _): WithRejection<Json<BorrowRequestBody>, AppError>,
) -> AppResult<(StatusCode, Json<BorrowRecord>)> {
    body.validate()?;
    claims.require_staff()?;

    let record = state
        .services
        .direct
        .direct_borrow(body.into(), claims.user_id)
        .await?;
    Ok((StatusCode::CREATED, Json(record)))
}

/// Return a borrowed book
#[utoipa::path(
    post,
    path = "/borrows/return",
    tag = "borrows",
    security(("bearer_auth" = [])),
    request_body = ReturnBody,
    responses(
        (status = 200, description = "Book returned", body = ReturnReceipt),
        (status = 409, description = "No active borrow", body = crate::error::ErrorResponse)
    )
)]
pub async fn return_book(
    State(state): State<AppState>,
    AuthenticatedUser(claims): AuthenticatedUser,
    WithRejection(Json(body), _): WithRejection<Json<ReturnBody>, AppError>,
) -> AppResult<Json<ReturnReceipt>> {
    body.validate()?;
    claims.require_staff()?;

    let receipt = state
        .services
        .returns
        .return_book(body.user_id, body.book_id)
        .await?;
    Ok(Json(receipt))
}

/// Zero the fine of a returned record once payment is settled
#[utoipa::path(
    post,
    path = "/borrows/settle-fine",
    tag = "borrows",
    security(("bearer_auth" = [])),
    request_body = SettleFineBody,
    responses(
        (status = 200, description = "Fine settled", body = BorrowRecord),
        (status = 400, description = "Record is not returned", body = crate::error::ErrorResponse),
        (status = 404, description = "Record not found", body = crate::error::ErrorResponse)
    )
)]
pub async fn settle_fine(
    State(state): State<AppState>,
    AuthenticatedUser(claims): AuthenticatedUser,
    WithRejection(Json(body), _): WithRejection<Json<SettleFineBody>, AppError>,
) -> AppResult<Json<BorrowRecord>> {
    claims.require_staff()?;

    let record = state.services.returns.settle_fine(body.record_id).await?;
    Ok(Json(record))
}

/// Delete a borrow record
#[utoipa::path(
    delete,
    path = "/borrows/{id}",
    tag = "borrows",
    security(("bearer_auth" = [])),
    params(
        ("id" = Uuid, Path, description = "Borrow record ID")
    ),
    responses(
        (status = 200, description = "Record deleted", body = DeletionOutcome),
        (status = 404, description = "Record not found", body = crate::error::ErrorResponse)
    )
)]
pub async fn delete_record(
    State(state): State<AppState>,
    AuthenticatedUser(claims): AuthenticatedUser,
    WithRejection(Path(id), _): WithRejection<Path<Uuid>, AppError>,
) -> AppResult<Json<DeletionOutcome>> {
    claims.require_admin()?;

    let outcome = state.services.reconciliation.delete_record(id).await?;
    Ok(Json(outcome))
}

/// List borrow records
#[utoipa::path(
    get,
    path = "/borrows",
    tag = "borrows",
    security(("bearer_auth" = [])),
    params(BorrowQuery),
    responses(
        (status = 200, description = "Page of borrow records", body = BorrowPage)
    )
)]
pub async fn list_borrows(
    State(state): State<AppState>,
    AuthenticatedUser(claims): AuthenticatedUser,
    WithRejection(Query(query), _): WithRejection<Query<BorrowQuery>, AppError>,
) -> AppResult<Json<BorrowPage>> {
    claims.require_staff()?;

    let page = state.services.queries.list(&query).await?;
    Ok(Json(page))
}

/// Current user's active record
#[utoipa::path(
    get,
    path = "/borrows/my-borrow",
    tag = "borrows",
    security(("bearer_auth" = [])),
    responses(
        (status = 200, description = "Active record, or null when none", body = BorrowView)
    )
)]
pub async fn my_borrow(
    State(state): State<AppState>,
    AuthenticatedUser(claims): AuthenticatedUser,
) -> AppResult<Json<Option<BorrowView>>> {
    let view = state.services.queries.my_borrow(claims.user_id).await?;
    Ok(Json(view))
}

/// Current user's borrow history
#[utoipa::path(
    get,
    path = "/borrows/my-requests",
    tag = "borrows",
    security(("bearer_auth" = [])),
    params(PageQuery),
    responses(
        (status = 200, description = "Page of the user's records", body = BorrowPage)
    )
)]
pub async fn my_requests(
    State(state): State<AppState>,
    AuthenticatedUser(claims): AuthenticatedUser,
    WithRejection(Query(query), _): WithRejection<Query<PageQuery>, AppError>,
) -> AppResult<Json<BorrowPage>> {
    let page = state
        .services
        .queries
        .my_requests(claims.user_id, query.page, query.limit)
        .await?;
    Ok(Json(page))
}

/// Fine policy for the current user's role
#[utoipa::path(
    get,
    path = "/borrows/fine-policy",
    tag = "borrows",
    security(("bearer_auth" = [])),
    params(FinePolicyQuery),
    responses(
        (status = 200, description = "Grace period and daily rate", body = FinePolicyInfo)
    )
)]
pub async fn fine_policy(
    State(state): State<AppState>,
    AuthenticatedUser(claims): AuthenticatedUser,
    WithRejection(Query(query), _): WithRejection<Query<FinePolicyQuery>, AppError>,
) -> AppResult<Json<FinePolicyInfo>> {
    let role = match query.user_type {
        Some(role) if claims.is_staff() => role,
        _ => claims.role,
    };
    Ok(Json(state.services.queries.fine_policy(role)))
}

//! Checks shared by the request and direct-borrow paths

use chrono::{DateTime, Utc};

use crate::{
    error::{AppError, AppResult},
    models::{borrow::BorrowRequest, BookInfo, UserInfo},
    repository::Repository,
};

/// Look up the borrower and the book and make sure they match what the
/// caller believes about them.
pub(crate) async fn resolve(
    repository: &Repository,
    request: &BorrowRequest,
) -> AppResult<(UserInfo, BookInfo)> {
    let user = repository
        .users
        .find_user(request.user_id)
        .await?
        .ok_or_else(|| AppError::NotFound(format!("User with id {} not found", request.user_id)))?;

    if user.username != request.username {
        return Err(AppError::Validation(format!(
            "Username '{}' does not match user {}",
            request.username, request.user_id
        )));
    }
    if let Some(claimed) = request.user_type {
        if claimed != user.role {
            return Err(AppError::Validation(format!(
                "User type '{}' does not match user {}",
                claimed, request.user_id
            )));
        }
    }

    let book = repository
        .books
        .find_book(request.book_id)
        .await?
        .ok_or_else(|| AppError::NotFound(format!("Book with id {} not found", request.book_id)))?;

    if book.name != request.book_name {
        return Err(AppError::Validation(format!(
            "Book name '{}' does not match book {}",
            request.book_name, request.book_id
        )));
    }

    Ok((user, book))
}

pub(crate) fn ensure_due_date(due_date: DateTime<Utc>, now: DateTime<Utc>) -> AppResult<()> {
    if due_date < now {
        return Err(AppError::Validation(
            "Due date cannot be in the past".to_string(),
        ));
    }
    Ok(())
}

pub(crate) async fn ensure_no_active_borrow(repository: &Repository, user_id: i32) -> AppResult<()> {
    match repository.records.find_active_for_user(user_id).await? {
        Some(active) => Err(AppError::ActiveBorrowExists {
            status: active.status,
        }),
        None => Ok(()),
    }
}

/// Give back a copy taken by a decrement whose paired record write failed
pub(crate) async fn release_copy(repository: &Repository, book_id: i32) {
    match repository.ledger.increment(book_id).await {
        Ok(copies) => tracing::warn!(book_id, copies, "Compensated inventory after failed record write"),
        Err(e) => tracing::error!(book_id, error = %e, "Compensating increment failed, inventory needs reconciliation"),
    }
}

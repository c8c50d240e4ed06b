//! BorrowDesk library borrowing server
//!
//! REST JSON API covering the lending lifecycle of a university library:
//! borrow requests, librarian decisions, returns with overdue fines, and
//! administrative reconciliation of records.

use std::sync::Arc;

pub mod api;
pub mod config;
pub mod error;
pub mod models;
pub mod repository;
pub mod services;

pub use config::AppConfig;
pub use error::{AppError, AppResult};

/// Application state shared across all handlers
#[derive(Clone)]
pub struct AppState {
    pub config: Arc<AppConfig>,
    pub services: Arc<services::Services>,
}

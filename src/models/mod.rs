//! Data models for Borrowdesk

pub mod book;
pub mod borrow;
pub mod user;

// Re-export commonly used types
pub use book::BookInfo;
pub use borrow::{BorrowRecord, BorrowStatus, BorrowTransition};
pub use user::{UserInfo, UserRole};

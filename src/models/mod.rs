//! Data models for Bookshelf

pub mod book;
pub mod borrow;
pub mod user;

// Re-export commonly used types
pub use book::{Book, BookQuery, CreateBook, UpdateBook, UpdateQuantity};
pub use borrow::{BorrowRecord, BorrowStats, BorrowStatus, BorrowedBookDetails};
pub use user::{Role, User, UserClaims, UserShort};

use validator::ValidationError;

/// Reject strings that are empty once surrounding whitespace is removed
pub(crate) fn validate_not_blank(value: &str) -> Result<(), ValidationError> {
    if value.trim().is_empty() {
        Err(ValidationError::new("blank"))
    } else {
        Ok(())
    }
}

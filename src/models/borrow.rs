//! Borrow record model and related types

use chrono::{DateTime, Duration, Utc};
use serde::{Deserialize, Serialize};
use sqlx::FromRow;
use utoipa::{IntoParams, ToSchema};
use uuid::Uuid;

use super::book::Book;
use super::user::UserShort;

/// Borrow record from database. Open while `return_date` is NULL.
#[derive(Debug, Clone, Serialize, Deserialize, FromRow, ToSchema)]
pub struct BorrowRecord {
    pub id: Uuid,
    pub book_id: Uuid,
    pub user_id: Uuid,
    pub borrow_date: DateTime<Utc>,
    pub due_date: DateTime<Utc>,
    pub return_date: Option<DateTime<Utc>>,
    /// Set by the overdue sweep the first time the record is seen past due
    pub overdue_since: Option<DateTime<Utc>>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, ToSchema)]
#[serde(rename_all = "lowercase")]
pub enum BorrowStatus {
    Active,
    Overdue,
    Returned,
}

impl BorrowStatus {
    pub fn as_str(self) -> &'static str {
        match self {
            BorrowStatus::Active => "active",
            BorrowStatus::Overdue => "overdue",
            BorrowStatus::Returned => "returned",
        }
    }
}

impl BorrowRecord {
    pub fn is_open(&self) -> bool {
        self.return_date.is_none()
    }

    pub fn status(&self, now: DateTime<Utc>) -> BorrowStatus {
        if self.return_date.is_some() {
            BorrowStatus::Returned
        } else if self.due_date < now {
            BorrowStatus::Overdue
        } else {
            BorrowStatus::Active
        }
    }

    /// Whole days until due, rounded up. Negative once overdue, `None` when returned.
    pub fn days_remaining(&self, now: DateTime<Utc>) -> Option<i64> {
        if !self.is_open() {
            return None;
        }
        let remaining = self.due_date - now;
        let day = Duration::days(1).num_milliseconds();
        let ms = remaining.num_milliseconds();
        // ceil for positive, toward zero for negative
        Some(if ms > 0 { (ms + day - 1) / day } else { ms / day })
    }
}

/// Borrow record joined with its book and borrower, as shown in the admin history
#[derive(Debug, Clone, Serialize, Deserialize, ToSchema)]
pub struct BorrowedBookDetails {
    #[serde(flatten)]
    pub record: BorrowRecord,
    pub status: BorrowStatus,
    pub days_remaining: Option<i64>,
    pub book: Book,
    pub user: UserShort,
}

impl BorrowedBookDetails {
    pub fn new(record: BorrowRecord, book: Book, user: UserShort, now: DateTime<Utc>) -> Self {
        Self {
            status: record.status(now),
            days_remaining: record.days_remaining(now),
            record,
            book,
            user,
        }
    }
}

/// Borrow history filter
#[derive(Debug, Default, Deserialize, IntoParams, ToSchema)]
#[into_params(parameter_in = Query)]
pub struct BorrowQuery {
    pub status: Option<BorrowStatus>,
}

/// Counters for the admin dashboard
#[derive(Debug, Clone, Serialize, Deserialize, FromRow, ToSchema)]
pub struct BorrowStats {
    pub total_books: i64,
    pub total_copies: i64,
    pub available_copies: i64,
    pub active_borrows: i64,
    pub overdue_borrows: i64,
    pub completed_borrows: i64,
}

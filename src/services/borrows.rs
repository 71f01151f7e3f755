//! Borrow and return service

use std::future::Future;

use chrono::{Duration, Utc};
use uuid::Uuid;

use crate::{
    config::LoansConfig,
    error::{AppError, AppResult},
    models::borrow::{BorrowQuery, BorrowRecord, BorrowStats, BorrowStatus, BorrowedBookDetails},
    repository::Repository,
};

#[derive(Clone)]
pub struct BorrowsService {
    repository: Repository,
    config: LoansConfig,
}

impl BorrowsService {
    pub fn new(repository: Repository, config: LoansConfig) -> Self {
        Self { repository, config }
    }

    /// Borrow one copy of a book for `user_id`.
    ///
    /// The book is re-read on every attempt; a lost race against another writer
    /// is retried up to `max_conflict_retries` times before being reported.
    pub async fn borrow_book(&self, book_id: Uuid, user_id: Uuid) -> AppResult<BorrowRecord> {
        // Surfaces NotFound for unknown borrowers before touching the book
        self.repository.users.get_by_id(user_id).await?;

        let record = retry_on_conflict(self.config.max_conflict_retries, move || async move {
            let book = self.repository.books.get_by_id(book_id).await?;
            // Holding the last copy yourself is a duplicate, not a shortage
            if self.repository.borrows.has_open(book_id, user_id).await? {
                return Err(AppError::Conflict("You already have this book borrowed".to_string()));
            }
            if book.available_quantity <= 0 {
                return Err(AppError::BookNotAvailable(format!(
                    "No copies of \"{}\" are available",
                    book.title
                )));
            }

            let now = Utc::now();
            let due_date = now + Duration::days(self.config.duration_days);
            self.repository
                .borrows
                .borrow(book_id, user_id, book.version, now, due_date)
                .await
        })
        .await?;

        tracing::info!(
            book_id = %book_id,
            user_id = %user_id,
            due_date = %record.due_date,
            "Book borrowed"
        );
        Ok(record)
    }

    /// Return the copy `user_id` holds
    pub async fn return_book(&self, book_id: Uuid, user_id: Uuid) -> AppResult<BorrowRecord> {
        let record = self
            .repository
            .borrows
            .return_open(book_id, user_id, Utc::now())
            .await?;

        tracing::info!(book_id = %book_id, user_id = %user_id, "Book returned");
        Ok(record)
    }

    /// Close a borrow record by ID on the borrower's behalf
    pub async fn return_borrow(&self, record_id: Uuid) -> AppResult<BorrowRecord> {
        let record = self
            .repository
            .borrows
            .return_by_id(record_id, Utc::now())
            .await?;

        tracing::info!(
            record_id = %record_id,
            book_id = %record.book_id,
            user_id = %record.user_id,
            "Borrow closed"
        );
        Ok(record)
    }

    /// Open borrows of a user, soonest due first
    pub async fn get_borrowed_books(&self, user_id: Uuid) -> AppResult<Vec<BorrowedBookDetails>> {
        self.repository
            .borrows
            .get_details(Some(user_id), None, true, Utc::now())
            .await
    }

    /// Every borrow of a user, open or closed, newest first
    pub async fn get_user_history(&self, user_id: Uuid) -> AppResult<Vec<BorrowedBookDetails>> {
        self.repository
            .borrows
            .get_details(Some(user_id), None, false, Utc::now())
            .await
    }

    pub async fn get_all_borrowed_books(&self, query: &BorrowQuery) -> AppResult<Vec<BorrowedBookDetails>> {
        self.repository
            .borrows
            .get_details(None, query.status, false, Utc::now())
            .await
    }

    pub async fn get_overdue(&self) -> AppResult<Vec<BorrowedBookDetails>> {
        self.repository
            .borrows
            .get_details(None, Some(BorrowStatus::Overdue), false, Utc::now())
            .await
    }

    pub async fn stats(&self) -> AppResult<BorrowStats> {
        self.repository.borrows.stats(Utc::now()).await
    }
}

/// Run `op`, re-running it while it fails with `ConcurrentModification`.
///
/// `retries` counts attempts after the first. Any other outcome is returned as is.
pub async fn retry_on_conflict<T, F, Fut>(retries: u32, mut op: F) -> AppResult<T>
where
    F: FnMut() -> Fut,
    Fut: Future<Output = AppResult<T>>,
{
    let mut attempt = 0;
    loop {
        match op().await {
            Err(AppError::ConcurrentModification(msg)) if attempt < retries => {
                attempt += 1;
                tracing::debug!(attempt, "Retrying after concurrent modification: {}", msg);
            }
            other => return other,
        }
    }
}

//! Borrow records repository for database operations
//!
//! Every transition that touches a book's counters runs in a single transaction
//! together with the borrow record it creates or closes, so that
//! `available_quantity = quantity - open records` holds after each commit.

use chrono::{DateTime, Utc};
use sqlx::{postgres::PgRow, Pool, Postgres, Row, Transaction};
use uuid::Uuid;

use crate::{
    error::{is_check_violation, is_lock_conflict, is_unique_violation, AppError, AppResult},
    models::{
        book::Book,
        borrow::{BorrowRecord, BorrowStats, BorrowStatus, BorrowedBookDetails},
        user::UserShort,
    },
};

const DETAILS_SELECT: &str = r#"
    SELECT br.id, br.book_id, br.user_id, br.borrow_date, br.due_date,
           br.return_date, br.overdue_since,
           b.title, b.author, b.isbn, b.image_url, b.description,
           b.quantity, b.available_quantity, b.available, b.version,
           b.created_at AS book_created_at, b.updated_at AS book_updated_at,
           u.email AS user_email, u.name AS user_name
    FROM borrow_records br
    JOIN books b ON b.id = br.book_id
    JOIN users u ON u.id = br.user_id
"#;

#[derive(Clone)]
pub struct BorrowsRepository {
    pool: Pool<Postgres>,
}

impl BorrowsRepository {
    pub fn new(pool: Pool<Postgres>) -> Self {
        Self { pool }
    }

    /// Take one copy of a book that was last read at `seen_version`.
    ///
    /// Fails with `ConcurrentModification` when the book changed since it was read,
    /// and with `Conflict` when the user already holds an open borrow for it.
    pub async fn borrow(
        &self,
        book_id: Uuid,
        user_id: Uuid,
        seen_version: i64,
        borrow_date: DateTime<Utc>,
        due_date: DateTime<Utc>,
    ) -> AppResult<BorrowRecord> {
        let mut tx = self.pool.begin().await?;

        let taken = sqlx::query(
            r#"
            UPDATE books SET
                available_quantity = available_quantity - 1,
                version            = version + 1,
                updated_at         = NOW()
            WHERE id = $1 AND version = $2 AND available_quantity > 0
            "#,
        )
        .bind(book_id)
        .bind(seen_version)
        .execute(&mut *tx)
        .await
        .map_err(lock_conflict)?
        .rows_affected();

        if taken == 0 {
            return Err(AppError::ConcurrentModification(format!(
                "Book {} changed while borrowing",
                book_id
            )));
        }

        let record = sqlx::query_as::<_, BorrowRecord>(
            r#"
            INSERT INTO borrow_records (id, book_id, user_id, borrow_date, due_date)
            VALUES ($1, $2, $3, $4, $5)
            RETURNING *
            "#,
        )
        .bind(Uuid::new_v4())
        .bind(book_id)
        .bind(user_id)
        .bind(borrow_date)
        .bind(due_date)
        .fetch_one(&mut *tx)
        .await
        .map_err(|e| {
            if is_unique_violation(&e) {
                AppError::Conflict("You already have this book borrowed".to_string())
            } else {
                lock_conflict(e)
            }
        })?;

        tx.commit().await?;
        Ok(record)
    }

    /// True when the user holds an open borrow of the book
    pub async fn has_open(&self, book_id: Uuid, user_id: Uuid) -> AppResult<bool> {
        let open: bool = sqlx::query_scalar(
            r#"
            SELECT EXISTS (
                SELECT 1 FROM borrow_records
                WHERE book_id = $1 AND user_id = $2 AND return_date IS NULL
            )
            "#,
        )
        .bind(book_id)
        .bind(user_id)
        .fetch_one(&self.pool)
        .await?;

        Ok(open)
    }

    /// Close the open borrow a user holds on a book and put the copy back
    pub async fn return_open(
        &self,
        book_id: Uuid,
        user_id: Uuid,
        now: DateTime<Utc>,
    ) -> AppResult<BorrowRecord> {
        let mut tx = self.pool.begin().await?;

        lock_book(&mut tx, book_id).await?;

        let record = sqlx::query_as::<_, BorrowRecord>(
            r#"
            UPDATE borrow_records SET return_date = $3
            WHERE book_id = $1 AND user_id = $2 AND return_date IS NULL
            RETURNING *
            "#,
        )
        .bind(book_id)
        .bind(user_id)
        .bind(now)
        .fetch_optional(&mut *tx)
        .await
        .map_err(lock_conflict)?
        .ok_or_else(|| {
            AppError::NotFound(format!("No open borrow of book {} for this user", book_id))
        })?;

        release_copy(&mut tx, book_id).await?;

        tx.commit().await?;
        Ok(record)
    }

    /// Close a borrow record by its ID
    pub async fn return_by_id(&self, record_id: Uuid, now: DateTime<Utc>) -> AppResult<BorrowRecord> {
        let mut tx = self.pool.begin().await?;

        // book_id never changes, so it is safe to read before taking any lock
        let book_id: Uuid = sqlx::query_scalar("SELECT book_id FROM borrow_records WHERE id = $1")
            .bind(record_id)
            .fetch_optional(&mut *tx)
            .await?
            .ok_or_else(|| AppError::NotFound(format!("Borrow record {} not found", record_id)))?;

        lock_book(&mut tx, book_id).await?;

        let existing = sqlx::query_as::<_, BorrowRecord>(
            "SELECT * FROM borrow_records WHERE id = $1 FOR UPDATE",
        )
        .bind(record_id)
        .fetch_optional(&mut *tx)
        .await
        .map_err(lock_conflict)?
        .ok_or_else(|| AppError::NotFound(format!("Borrow record {} not found", record_id)))?;

        if !existing.is_open() {
            return Err(AppError::Conflict("Book already returned".to_string()));
        }

        let record = sqlx::query_as::<_, BorrowRecord>(
            "UPDATE borrow_records SET return_date = $2 WHERE id = $1 RETURNING *",
        )
        .bind(record_id)
        .bind(now)
        .fetch_one(&mut *tx)
        .await?;

        release_copy(&mut tx, book_id).await?;

        tx.commit().await?;
        Ok(record)
    }

    /// Borrows joined with books and borrowers, newest borrow first.
    ///
    /// `user_id` restricts to one borrower. `open_only` keeps unreturned records
    /// and orders them by due date instead.
    pub async fn get_details(
        &self,
        user_id: Option<Uuid>,
        status: Option<BorrowStatus>,
        open_only: bool,
        now: DateTime<Utc>,
    ) -> AppResult<Vec<BorrowedBookDetails>> {
        let sql = format!(
            r#"
            {}
            WHERE ($2::uuid IS NULL OR br.user_id = $2)
              AND ($3::bool IS NOT TRUE OR br.return_date IS NULL)
              AND ($4::text IS NULL
                   OR ($4 = 'returned' AND br.return_date IS NOT NULL)
                   OR ($4 = 'active' AND br.return_date IS NULL AND br.due_date >= $1)
                   OR ($4 = 'overdue' AND br.return_date IS NULL AND br.due_date < $1))
            ORDER BY CASE WHEN $3 THEN br.due_date END, br.borrow_date DESC, br.id
            "#,
            DETAILS_SELECT
        );

        let rows = sqlx::query(&sql)
            .bind(now)
            .bind(user_id)
            .bind(open_only)
            .bind(status.map(BorrowStatus::as_str))
            .fetch_all(&self.pool)
            .await?;

        rows.iter().map(|row| details_from_row(row, now)).collect()
    }

    /// Flag open borrows that went past due. Returns how many were newly flagged.
    pub async fn mark_overdue(&self, now: DateTime<Utc>) -> AppResult<u64> {
        let flagged = sqlx::query(
            r#"
            UPDATE borrow_records SET overdue_since = $1
            WHERE return_date IS NULL AND due_date < $1 AND overdue_since IS NULL
            "#,
        )
        .bind(now)
        .execute(&self.pool)
        .await?
        .rows_affected();

        Ok(flagged)
    }

    pub async fn stats(&self, now: DateTime<Utc>) -> AppResult<BorrowStats> {
        let stats = sqlx::query_as::<_, BorrowStats>(
            r#"
            SELECT
                (SELECT COUNT(*) FROM books) AS total_books,
                (SELECT COALESCE(SUM(quantity), 0)::bigint FROM books) AS total_copies,
                (SELECT COALESCE(SUM(available_quantity), 0)::bigint FROM books) AS available_copies,
                (SELECT COUNT(*) FROM borrow_records WHERE return_date IS NULL) AS active_borrows,
                (SELECT COUNT(*) FROM borrow_records
                    WHERE return_date IS NULL AND due_date < $1) AS overdue_borrows,
                (SELECT COUNT(*) FROM borrow_records WHERE return_date IS NOT NULL) AS completed_borrows
            "#,
        )
        .bind(now)
        .fetch_one(&self.pool)
        .await?;

        Ok(stats)
    }
}

/// Lock a book row. Every transition locks the book before any borrow record.
async fn lock_book(tx: &mut Transaction<'_, Postgres>, book_id: Uuid) -> AppResult<()> {
    sqlx::query_scalar::<_, Uuid>("SELECT id FROM books WHERE id = $1 FOR UPDATE")
        .bind(book_id)
        .fetch_optional(&mut **tx)
        .await
        .map_err(lock_conflict)?
        .ok_or_else(|| AppError::NotFound(format!("Book with id {} not found", book_id)))?;

    Ok(())
}

fn lock_conflict(e: sqlx::Error) -> AppError {
    if is_lock_conflict(&e) {
        AppError::ConcurrentModification(format!("Transaction aborted: {}", e))
    } else {
        e.into()
    }
}

/// Put one copy back on the shelf. Caller holds the book lock in `tx`.
async fn release_copy(tx: &mut Transaction<'_, Postgres>, book_id: Uuid) -> AppResult<()> {
    sqlx::query(
        r#"
        UPDATE books SET
            available_quantity = available_quantity + 1,
            version            = version + 1,
            updated_at         = NOW()
        WHERE id = $1
        "#,
    )
    .bind(book_id)
    .execute(&mut **tx)
    .await
    .map_err(|e| {
        if is_check_violation(&e) {
            AppError::Internal(format!("Book {} counters out of range on return", book_id))
        } else {
            e.into()
        }
    })?;

    Ok(())
}

fn details_from_row(row: &PgRow, now: DateTime<Utc>) -> AppResult<BorrowedBookDetails> {
    let record = BorrowRecord {
        id: row.try_get("id")?,
        book_id: row.try_get("book_id")?,
        user_id: row.try_get("user_id")?,
        borrow_date: row.try_get("borrow_date")?,
        due_date: row.try_get("due_date")?,
        return_date: row.try_get("return_date")?,
        overdue_since: row.try_get("overdue_since")?,
    };

    let book = Book {
        id: record.book_id,
        title: row.try_get("title")?,
        author: row.try_get("author")?,
        isbn: row.try_get("isbn")?,
        image_url: row.try_get("image_url")?,
        description: row.try_get("description")?,
        quantity: row.try_get("quantity")?,
        available_quantity: row.try_get("available_quantity")?,
        available: row.try_get("available")?,
        version: row.try_get("version")?,
        created_at: row.try_get("book_created_at")?,
        updated_at: row.try_get("book_updated_at")?,
    };

    let user = UserShort {
        id: record.user_id,
        email: row.try_get("user_email")?,
        name: row.try_get("user_name")?,
    };

    Ok(BorrowedBookDetails::new(record, book, user, now))
}

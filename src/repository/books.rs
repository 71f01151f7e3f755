//! Books repository for database operations

use sqlx::{Pool, Postgres};
use uuid::Uuid;

use crate::{
    error::{AppError, AppResult},
    models::book::{Book, BookQuery, CreateBook, UpdateBook},
};

use super::contains_pattern;

#[derive(Clone)]
pub struct BooksRepository {
    pool: Pool<Postgres>,
}

impl BooksRepository {
    pub fn new(pool: Pool<Postgres>) -> Self {
        Self { pool }
    }

    /// Get book by ID
    pub async fn get_by_id(&self, id: Uuid) -> AppResult<Book> {
        sqlx::query_as::<_, Book>("SELECT * FROM books WHERE id = $1")
            .bind(id)
            .fetch_optional(&self.pool)
            .await?
            .ok_or_else(|| AppError::NotFound(format!("Book with id {} not found", id)))
    }

    /// List books ordered by title
    pub async fn list(&self, query: &BookQuery) -> AppResult<Vec<Book>> {
        let pattern = query
            .search
            .as_deref()
            .map(str::trim)
            .filter(|s| !s.is_empty())
            .map(contains_pattern);

        let books = sqlx::query_as::<_, Book>(
            r#"
            SELECT * FROM books
            WHERE ($1::text IS NULL
                   OR title ILIKE $1 OR author ILIKE $1 OR isbn ILIKE $1)
              AND ($2::bool IS NOT TRUE OR available_quantity > 0)
            ORDER BY LOWER(title), id
            "#,
        )
        .bind(pattern)
        .bind(query.available_only)
        .fetch_all(&self.pool)
        .await?;

        Ok(books)
    }

    /// Insert a new book with every copy on the shelf
    pub async fn create(&self, book: &CreateBook) -> AppResult<Book> {
        let quantity = book.quantity.unwrap_or(1);

        let created = sqlx::query_as::<_, Book>(
            r#"
            INSERT INTO books (id, title, author, isbn, image_url, description,
                               quantity, available_quantity, version)
            VALUES ($1, $2, $3, $4, $5, $6, $7, $7, 0)
            RETURNING *
            "#,
        )
        .bind(Uuid::new_v4())
        .bind(book.title.trim())
        .bind(book.author.trim())
        .bind(book.isbn.trim())
        .bind(&book.image_url)
        .bind(&book.description)
        .bind(quantity)
        .fetch_one(&self.pool)
        .await?;

        Ok(created)
    }

    /// Update descriptive fields; counters are left untouched
    pub async fn update(&self, id: Uuid, book: &UpdateBook) -> AppResult<Book> {
        sqlx::query_as::<_, Book>(
            r#"
            UPDATE books SET
                title       = COALESCE($2, title),
                author      = COALESCE($3, author),
                isbn        = COALESCE($4, isbn),
                image_url   = COALESCE($5, image_url),
                description = COALESCE($6, description),
                updated_at  = NOW()
            WHERE id = $1
            RETURNING *
            "#,
        )
        .bind(id)
        .bind(book.title.as_deref().map(str::trim))
        .bind(book.author.as_deref().map(str::trim))
        .bind(book.isbn.as_deref().map(str::trim))
        .bind(&book.image_url)
        .bind(&book.description)
        .fetch_optional(&self.pool)
        .await?
        .ok_or_else(|| AppError::NotFound(format!("Book with id {} not found", id)))
    }

    /// Set the total number of copies, recomputing availability from open borrows.
    ///
    /// The book row stays locked for the whole transaction so no borrow or return
    /// can interleave between the count and the write.
    pub async fn set_quantity(&self, id: Uuid, quantity: i32) -> AppResult<Book> {
        let mut tx = self.pool.begin().await?;

        let exists: Option<i32> =
            sqlx::query_scalar("SELECT quantity FROM books WHERE id = $1 FOR UPDATE")
                .bind(id)
                .fetch_optional(&mut *tx)
                .await?;
        if exists.is_none() {
            return Err(AppError::NotFound(format!("Book with id {} not found", id)));
        }

        let borrowed: i64 = sqlx::query_scalar(
            "SELECT COUNT(*) FROM borrow_records WHERE book_id = $1 AND return_date IS NULL",
        )
        .bind(id)
        .fetch_one(&mut *tx)
        .await?;

        if (quantity as i64) < borrowed {
            return Err(AppError::Validation(format!(
                "Quantity {} is below the {} copies currently borrowed",
                quantity, borrowed
            )));
        }

        let book = sqlx::query_as::<_, Book>(
            r#"
            UPDATE books SET
                quantity           = $2,
                available_quantity = $2 - $3,
                version            = version + 1,
                updated_at         = NOW()
            WHERE id = $1
            RETURNING *
            "#,
        )
        .bind(id)
        .bind(quantity)
        .bind(borrowed as i32)
        .fetch_one(&mut *tx)
        .await?;

        tx.commit().await?;
        Ok(book)
    }

    /// Delete a book and its closed history. Refused while copies are out.
    pub async fn delete(&self, id: Uuid) -> AppResult<()> {
        let mut tx = self.pool.begin().await?;

        let exists: Option<Uuid> = sqlx::query_scalar("SELECT id FROM books WHERE id = $1 FOR UPDATE")
            .bind(id)
            .fetch_optional(&mut *tx)
            .await?;
        if exists.is_none() {
            return Err(AppError::NotFound(format!("Book with id {} not found", id)));
        }

        let borrowed: i64 = sqlx::query_scalar(
            "SELECT COUNT(*) FROM borrow_records WHERE book_id = $1 AND return_date IS NULL",
        )
        .bind(id)
        .fetch_one(&mut *tx)
        .await?;

        if borrowed > 0 {
            return Err(AppError::BusinessRule(format!(
                "Book has {} copies currently borrowed",
                borrowed
            )));
        }

        sqlx::query("DELETE FROM books WHERE id = $1")
            .bind(id)
            .execute(&mut *tx)
            .await?;

        tx.commit().await?;
        Ok(())
    }
}

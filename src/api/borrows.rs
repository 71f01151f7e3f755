//! Borrow and return endpoints

use axum::{
    extract::{Path, Query, State},
    http::StatusCode,
    Json,
};
use serde::{Deserialize, Serialize};
use utoipa::{IntoParams, ToSchema};
use uuid::Uuid;

use crate::{
    error::AppResult,
    models::borrow::{BorrowQuery, BorrowRecord, BorrowStats, BorrowedBookDetails},
};

use super::AuthenticatedUser;

/// Borrow/return acknowledgement
#[derive(Serialize, ToSchema)]
pub struct BorrowResponse {
    pub record: BorrowRecord,
    pub message: String,
}

#[derive(Debug, Default, Deserialize, IntoParams, ToSchema)]
#[into_params(parameter_in = Query)]
pub struct MyBorrowsQuery {
    /// Include returned borrows
    pub history: Option<bool>,
}

/// Borrow a copy of a book
#[utoipa::path(
    post,
    path = "/books/{id}/borrow",
    tag = "borrows",
    security(("bearer_auth" = [])),
    params(
        ("id" = Uuid, Path, description = "Book ID")
    ),
    responses(
        (status = 201, description = "Book borrowed", body = BorrowResponse),
        (status = 404, description = "Book not found"),
        (status = 409, description = "No copies available, already borrowed, or concurrent update")
    )
)]
pub async fn borrow_book(
    State(state): State<crate::AppState>,
    AuthenticatedUser(claims): AuthenticatedUser,
    Path(book_id): Path<Uuid>,
) -> AppResult<(StatusCode, Json<BorrowResponse>)> {
    let record = state
        .services
        .borrows
        .borrow_book(book_id, claims.user_id)
        .await?;

    Ok((
        StatusCode::CREATED,
        Json(BorrowResponse {
            message: format!("Book borrowed, due {}", record.due_date.format("%Y-%m-%d")),
            record,
        }),
    ))
}

/// Return a borrowed book
#[utoipa::path(
    post,
    path = "/books/{id}/return",
    tag = "borrows",
    security(("bearer_auth" = [])),
    params(
        ("id" = Uuid, Path, description = "Book ID")
    ),
    responses(
        (status = 200, description = "Book returned", body = BorrowResponse),
        (status = 404, description = "No open borrow of this book")
    )
)]
pub async fn return_book(
    State(state): State<crate::AppState>,
    AuthenticatedUser(claims): AuthenticatedUser,
    Path(book_id): Path<Uuid>,
) -> AppResult<Json<BorrowResponse>> {
    let record = state
        .services
        .borrows
        .return_book(book_id, claims.user_id)
        .await?;

    Ok(Json(BorrowResponse {
        record,
        message: "Book returned".to_string(),
    }))
}

/// Borrows of the signed-in user
#[utoipa::path(
    get,
    path = "/me/borrows",
    tag = "borrows",
    security(("bearer_auth" = [])),
    params(MyBorrowsQuery),
    responses(
        (status = 200, description = "Open borrows, or full history", body = Vec<BorrowedBookDetails>)
    )
)]
pub async fn my_borrows(
    State(state): State<crate::AppState>,
    AuthenticatedUser(claims): AuthenticatedUser,
    Query(query): Query<MyBorrowsQuery>,
) -> AppResult<Json<Vec<BorrowedBookDetails>>> {
    let records = if query.history.unwrap_or(false) {
        state.services.borrows.get_user_history(claims.user_id).await?
    } else {
        state.services.borrows.get_borrowed_books(claims.user_id).await?
    };
    Ok(Json(records))
}

/// Complete borrow history
#[utoipa::path(
    get,
    path = "/borrows",
    tag = "borrows",
    security(("bearer_auth" = [])),
    params(BorrowQuery),
    responses(
        (status = 200, description = "Borrows, newest first", body = Vec<BorrowedBookDetails>),
        (status = 403, description = "Administrator privileges required")
    )
)]
pub async fn list_borrows(
    State(state): State<crate::AppState>,
    AuthenticatedUser(claims): AuthenticatedUser,
    Query(query): Query<BorrowQuery>,
) -> AppResult<Json<Vec<BorrowedBookDetails>>> {
    claims.require_admin()?;

    let borrows = state.services.borrows.get_all_borrowed_books(&query).await?;
    Ok(Json(borrows))
}

/// Open borrows past their due date
#[utoipa::path(
    get,
    path = "/borrows/overdue",
    tag = "borrows",
    security(("bearer_auth" = [])),
    responses(
        (status = 200, description = "Overdue borrows", body = Vec<BorrowedBookDetails>),
        (status = 403, description = "Administrator privileges required")
    )
)]
pub async fn list_overdue(
    State(state): State<crate::AppState>,
    AuthenticatedUser(claims): AuthenticatedUser,
) -> AppResult<Json<Vec<BorrowedBookDetails>>> {
    claims.require_admin()?;

    let borrows = state.services.borrows.get_overdue().await?;
    Ok(Json(borrows))
}

/// Close a borrow on the borrower's behalf
#[utoipa::path(
    post,
    path = "/borrows/{id}/return",
    tag = "borrows",
    security(("bearer_auth" = [])),
    params(
        ("id" = Uuid, Path, description = "Borrow record ID")
    ),
    responses(
        (status = 200, description = "Book returned", body = BorrowResponse),
        (status = 404, description = "Borrow record not found"),
        (status = 409, description = "Already returned")
    )
)]
pub async fn return_borrow(
    State(state): State<crate::AppState>,
    AuthenticatedUser(claims): AuthenticatedUser,
    Path(record_id): Path<Uuid>,
) -> AppResult<Json<BorrowResponse>> {
    claims.require_admin()?;

    let record = state.services.borrows.return_borrow(record_id).await?;
    Ok(Json(BorrowResponse {
        record,
        message: "Book returned".to_string(),
    }))
}

/// Dashboard counters
#[utoipa::path(
    get,
    path = "/stats",
    tag = "borrows",
    security(("bearer_auth" = [])),
    responses(
        (status = 200, description = "Catalog and borrow counters", body = BorrowStats),
        (status = 403, description = "Administrator privileges required")
    )
)]
pub async fn get_stats(
    State(state): State<crate::AppState>,
    AuthenticatedUser(claims): AuthenticatedUser,
) -> AppResult<Json<BorrowStats>> {
    claims.require_admin()?;

    let stats = state.services.borrows.stats().await?;
    Ok(Json(stats))
}

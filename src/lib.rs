//! Bookshelf library server
//!
//! REST JSON API for a book catalog, borrowing and returning copies, and an
//! administrator view over borrow history. Borrow and return transitions are
//! transactional, so a book's available count always equals its total copies
//! minus its open borrows.

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

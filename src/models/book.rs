//! Book (catalog entry) model and related types

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use sqlx::FromRow;
use utoipa::{IntoParams, ToSchema};
use uuid::Uuid;
use validator::{Validate, ValidateUrl, ValidationError};

use super::validate_not_blank;

/// Book row. `available` is a generated column (`available_quantity > 0`).
#[derive(Debug, Clone, Serialize, Deserialize, FromRow, ToSchema)]
pub struct Book {
    pub id: Uuid,
    pub title: String,
    pub author: String,
    pub isbn: String,
    pub image_url: String,
    pub description: String,
    /// Total copies owned
    pub quantity: i32,
    /// Copies not currently out on an open borrow
    pub available_quantity: i32,
    pub available: bool,
    /// Bumped on every change to the quantity counters
    pub version: i64,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl Book {
    /// Copies currently out on loan
    pub fn borrowed_count(&self) -> i32 {
        self.quantity - self.available_quantity
    }
}

/// Empty, or an absolute http(s) URL with a host
fn validate_image_url(url: &str) -> Result<(), ValidationError> {
    if url.is_empty() {
        return Ok(());
    }
    let web = url.starts_with("http://") || url.starts_with("https://");
    if web && url.validate_url() {
        Ok(())
    } else {
        Err(ValidationError::new("image_url_scheme"))
    }
}

/// Create book request
#[derive(Debug, Deserialize, Validate, ToSchema)]
pub struct CreateBook {
    #[validate(custom(function = "validate_not_blank", message = "Title is required"))]
    pub title: String,
    #[validate(custom(function = "validate_not_blank", message = "Author is required"))]
    pub author: String,
    #[validate(custom(function = "validate_not_blank", message = "ISBN is required"))]
    pub isbn: String,
    #[serde(default)]
    #[validate(custom(function = "validate_image_url", message = "Image URL must be http(s)"))]
    pub image_url: String,
    #[serde(default)]
    pub description: String,
    /// Initial number of copies (defaults to 1)
    #[validate(range(min = 0, message = "Quantity cannot be negative"))]
    pub quantity: Option<i32>,
}

/// Update descriptive fields of a book. Quantities go through `UpdateQuantity`.
#[derive(Debug, Deserialize, Validate, ToSchema)]
pub struct UpdateBook {
    #[validate(custom(function = "validate_not_blank", message = "Title cannot be empty"))]
    pub title: Option<String>,
    #[validate(custom(function = "validate_not_blank", message = "Author cannot be empty"))]
    pub author: Option<String>,
    #[validate(custom(function = "validate_not_blank", message = "ISBN cannot be empty"))]
    pub isbn: Option<String>,
    #[validate(custom(function = "validate_image_url", message = "Image URL must be http(s)"))]
    pub image_url: Option<String>,
    pub description: Option<String>,
}

#[derive(Debug, Deserialize, Validate, ToSchema)]
pub struct UpdateQuantity {
    #[validate(range(min = 0, message = "Quantity cannot be negative"))]
    pub quantity: i32,
}

/// Book list query parameters
#[derive(Debug, Default, Deserialize, IntoParams, ToSchema)]
#[into_params(parameter_in = Query)]
pub struct BookQuery {
    /// Case-insensitive match on title, author or ISBN
    pub search: Option<String>,
    /// Only books with at least one copy on the shelf
    pub available_only: Option<bool>,
}

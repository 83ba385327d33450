//! Application error types and result alias.

use thiserror::Error;

/// Application result type alias
pub type Result<T> = std::result::Result<T, AppError>;

/// Application error types
#[derive(Error, Debug)]
pub enum AppError {
    /// Malformed input: bad dates, out-of-range hours, non-positive amounts
    #[error("Validation error: {0}")]
    Validation(String),

    /// Illegal state transition, e.g. approving a non-pending SOW
    #[error("Invalid state: {0}")]
    InvalidState(String),

    /// Dependent entity not in the required state
    #[error("Precondition failed: {0}")]
    Precondition(String),

    /// RBAC denial
    #[error("Access denied: {0}")]
    Forbidden(String),

    /// Invoice generation found no billable timesheet entries
    #[error("Empty invoice: {0}")]
    EmptyInvoice(String),

    /// Optimistic-concurrency violation or uniqueness collision; retry the operation
    #[error("Conflict: {0}")]
    Conflict(String),

    /// Missing entity reference
    #[error("Resource not found: {0}")]
    NotFound(String),

    /// Configuration error
    #[error("Configuration error: {0}")]
    Config(String),

    /// Database error
    #[error("Database error: {0}")]
    Database(#[from] sqlx::Error),

    /// Migration error
    #[error("Migration error: {0}")]
    Migration(#[from] sqlx::migrate::MigrateError),

    /// JSON error
    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    /// Internal invariant violation (programming defect, not a user error)
    #[error("Internal error: {0}")]
    Internal(String),
}

impl AppError {
    /// Stable machine-readable code, useful for callers mapping errors onto
    /// their own transport.
    pub fn code(&self) -> &'static str {
        match self {
            AppError::Validation(_) => "VALIDATION_ERROR",
            AppError::InvalidState(_) => "INVALID_STATE",
            AppError::Precondition(_) => "PRECONDITION_FAILED",
            AppError::Forbidden(_) => "FORBIDDEN",
            AppError::EmptyInvoice(_) => "EMPTY_INVOICE",
            AppError::Conflict(_) => "CONFLICT",
            AppError::NotFound(_) => "NOT_FOUND",
            AppError::Config(_) => "CONFIG_ERROR",
            AppError::Database(_) => "DATABASE_ERROR",
            AppError::Migration(_) => "MIGRATION_ERROR",
            AppError::Json(_) => "JSON_ERROR",
            AppError::Internal(_) => "INTERNAL_ERROR",
        }
    }
}

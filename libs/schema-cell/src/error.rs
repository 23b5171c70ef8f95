use thiserror::Error;

use shared_models::error::AppError;

/// A row or patch rejected by a table's declared constraints.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum ValidationError {
    #[error("{table}: expected a JSON object")]
    NotAnObject { table: &'static str },

    #[error("{table}: unknown column '{column}'")]
    UnknownColumn { table: &'static str, column: String },

    #[error("{table}.{column} is assigned by the store and cannot be written")]
    ReadOnlyColumn { table: &'static str, column: String },

    #[error("{table}.{column} is required")]
    MissingField { table: &'static str, column: String },

    #[error("{table}.{column} cannot be null")]
    NullNotAllowed { table: &'static str, column: String },

    #[error("{table}.{column} must be {expected}")]
    TypeMismatch { table: &'static str, column: String, expected: &'static str },

    #[error("{table}.{column} exceeds {max} characters ({actual})")]
    TooLong { table: &'static str, column: String, max: usize, actual: usize },

    #[error("{table}.{column}: '{value}' is not one of [{allowed}]")]
    InvalidEnumValue { table: &'static str, column: String, value: String, allowed: String },

    #[error("{table}.{column}: '{value}' is not a YYYY-MM-DD date")]
    InvalidDate { table: &'static str, column: String, value: String },

    /// Rejected by the database itself (check constraint, bad input syntax).
    #[error("{table}: {message}")]
    Rejected { table: &'static str, message: String },
}

/// The failure categories callers branch on.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ErrorKind {
    Uniqueness,
    ReferentialIntegrity,
    Validation,
    NotFound,
    Backend,
}

#[derive(Error, Debug)]
pub enum StoreError {
    #[error("duplicate value for {table}.{column}: {value}")]
    UniqueViolation { table: &'static str, column: String, value: String },

    #[error("{table}.{column} references missing {referenced_table} row {value}")]
    ForeignKeyViolation {
        table: &'static str,
        column: String,
        referenced_table: String,
        value: String,
    },

    #[error("cannot delete {table} row: still referenced from {referenced_by}")]
    DeleteRestricted { table: &'static str, referenced_by: String },

    #[error("Validation error: {0}")]
    Validation(#[from] ValidationError),

    #[error("{table} row {id} not found")]
    NotFound { table: &'static str, id: i32 },

    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    #[error("Storage backend error: {0}")]
    Backend(String),
}

impl StoreError {
    pub fn kind(&self) -> ErrorKind {
        match self {
            StoreError::UniqueViolation { .. } => ErrorKind::Uniqueness,
            StoreError::ForeignKeyViolation { .. } | StoreError::DeleteRestricted { .. } => {
                ErrorKind::ReferentialIntegrity
            }
            StoreError::Validation(_) => ErrorKind::Validation,
            StoreError::NotFound { .. } => ErrorKind::NotFound,
            StoreError::Serialization(_) | StoreError::Backend(_) => ErrorKind::Backend,
        }
    }
}

pub type StoreResult<T> = Result<T, StoreError>;

impl From<StoreError> for AppError {
    fn from(err: StoreError) -> Self {
        let message = err.to_string();
        match err.kind() {
            ErrorKind::Uniqueness | ErrorKind::ReferentialIntegrity => AppError::Conflict(message),
            ErrorKind::Validation => AppError::ValidationError(message),
            ErrorKind::NotFound => AppError::NotFound(message),
            ErrorKind::Backend => AppError::Database(message),
        }
    }
}

//! Error taxonomy for the store.
//!
//! Every failure surfaced by the crate is one of these variants. Engine errors
//! from `rusqlite` are translated here and nowhere else, so callers never
//! match on raw engine error codes.

use std::fmt::Display;
use std::path::Path;

use rusqlite::ErrorCode;
use thiserror::Error;

/// Result type for store operations.
pub type Result<T> = std::result::Result<T, StoreError>;

#[derive(Debug, Error, Clone, PartialEq)]
pub enum StoreError {
    /// Invalid, duplicate or unknown table or column.
    #[error("schema error: {0}")]
    Schema(String),

    /// Constraint, default or nullability violation.
    #[error("constraint violation: {0}")]
    Constraint(String),

    /// Value incompatible with the declared column type.
    #[error("type mismatch: {0}")]
    TypeMismatch(String),

    /// Missing required condition or malformed argument shape.
    #[error("validation failed: {0}")]
    Validation(String),

    /// Table, backup or file absent.
    #[error("not found: {0}")]
    NotFound(String),

    /// Malformed CSV input.
    #[error("malformed csv: {0}")]
    Format(String),

    #[error("i/o failure on {path}: {message}")]
    Io { path: String, message: String },

    /// Backup target busy or snapshot inconsistent.
    #[error("backup error: {0}")]
    Backup(String),

    #[error("database handle is closed")]
    Closed,
}

impl StoreError {
    pub fn io(path: &Path, err: impl Display) -> Self {
        Self::Io {
            path: path.display().to_string(),
            message: err.to_string(),
        }
    }

    /// Prefixes the message with a location (`row 3`, `line 7`) while keeping
    /// the error class intact.
    pub fn located(self, location: impl Display) -> Self {
        match self {
            Self::Schema(m) => Self::Schema(format!("{location}: {m}")),
            Self::Constraint(m) => Self::Constraint(format!("{location}: {m}")),
            Self::TypeMismatch(m) => Self::TypeMismatch(format!("{location}: {m}")),
            Self::Validation(m) => Self::Validation(format!("{location}: {m}")),
            Self::NotFound(m) => Self::NotFound(format!("{location}: {m}")),
            Self::Format(m) => Self::Format(format!("{location}: {m}")),
            Self::Backup(m) => Self::Backup(format!("{location}: {m}")),
            Self::Io { path, message } => Self::Io {
                path,
                message: format!("{location}: {message}"),
            },
            Self::Closed => Self::Closed,
        }
    }
}

impl From<rusqlite::Error> for StoreError {
    fn from(err: rusqlite::Error) -> Self {
        match &err {
            rusqlite::Error::SqliteFailure(failure, detail) => {
                let message = detail.clone().unwrap_or_else(|| failure.to_string());
                match failure.code {
                    ErrorCode::ConstraintViolation => Self::Constraint(message),
                    ErrorCode::TypeMismatch => Self::TypeMismatch(message),
                    ErrorCode::DatabaseBusy
                    | ErrorCode::DatabaseLocked
                    | ErrorCode::SystemIoFailure
                    | ErrorCode::ReadOnly
                    | ErrorCode::CannotOpen
                    | ErrorCode::DiskFull
                    | ErrorCode::PermissionDenied => Self::Io {
                        path: "database file".to_string(),
                        message,
                    },
                    ErrorCode::DatabaseCorrupt | ErrorCode::NotADatabase => Self::Backup(message),
                    _ => classify_message(message),
                }
            }
            rusqlite::Error::MultipleStatement => {
                Self::Validation("only one statement can be executed per call".to_string())
            }
            rusqlite::Error::InvalidColumnType(..) | rusqlite::Error::IntegralValueOutOfRange(..) => {
                Self::TypeMismatch(err.to_string())
            }
            _ => classify_message(err.to_string()),
        }
    }
}

fn classify_message(message: String) -> StoreError {
    if message.starts_with("no such table") {
        StoreError::NotFound(message)
    } else if message.contains("no such column")
        || message.contains("has no column named")
        || message.contains("already exists")
    {
        StoreError::Schema(message)
    } else {
        StoreError::Validation(message)
    }
}

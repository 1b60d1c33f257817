//! Error types for schema and migration file handling.

use std::path::PathBuf;

use thiserror::Error;

/// Errors that can occur while reading or writing schema artifacts.
#[derive(Debug, Error)]
pub enum DatabaseError {
    /// File I/O failure.
    #[error("I/O error: {0}")]
    IoError(#[from] std::io::Error),

    /// Two migration files share the same numeric version.
    #[error("duplicate migration version {version}: '{first}' and '{second}'")]
    DuplicateVersion {
        /// The version both files claim.
        version: i64,
        /// File name encountered first.
        first: String,
        /// File name encountered second.
        second: String,
    },

    /// Migration name contains characters outside `[a-zA-Z0-9_-]`.
    #[error("invalid migration name '{0}': use only letters, digits, '-' and '_'")]
    InvalidName(String),

    /// The schema directory contains no `.sql` files.
    #[error("no .sql files found under '{}'", .0.display())]
    NoSchemaFiles(PathBuf),
}

/// Convenience alias for results with [`DatabaseError`].
pub type Result<T> = std::result::Result<T, DatabaseError>;

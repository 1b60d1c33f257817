//! Error types for schema planning and migration execution.

use thiserror::Error;

/// Errors that can occur while planning or applying migrations.
#[derive(Debug, Error)]
pub enum MigrateError {
    /// Underlying SQLite failure, propagated unchanged.
    #[error("database error: {0}")]
    Engine(#[from] rusqlite::Error),

    /// Schema DDL failed to load into the reference in-memory database.
    #[error("invalid schema: {0}")]
    SchemaInvalid(String),

    /// The planned transformation cannot preserve existing rows.
    #[error("infeasible migration: {0}")]
    PlanInfeasible(String),

    /// `PRAGMA foreign_key_check` reported violations after apply.
    #[error("foreign key violations in table(s): {}", .0.join(", "))]
    ForeignKeyViolation(Vec<String>),

    /// A migration script still contains transaction statements after the
    /// head/tail strip.
    #[error("transaction control is managed by the engine, remove it from the script: {0}")]
    StatementSplit(String),

    /// A quote, comment, or `BEGIN…END` block was never closed.
    #[error("unclosed {construct} starting at position {offset}")]
    UnclosedDelimiter {
        /// What was left open (`'…'` string, block comment, `BEGIN` block, …).
        construct: String,
        /// Character offset where the construct opened.
        offset: usize,
    },

    /// An applied migration's content hash no longer matches the file.
    #[error("migration {version} ({name}) has been modified")]
    MigrationTampered {
        /// Version recorded in the bookkeeping table.
        version: i64,
        /// Migration name.
        name: String,
    },

    /// Bookkeeping table name contains invalid characters.
    #[error("invalid migration table name '{0}': must contain only alphanumeric characters and underscores")]
    InvalidTableName(String),

    /// Error loading migration files from disk.
    #[error("loader error: {0}")]
    Loader(#[from] calljmp_db::DatabaseError),
}

/// Convenience alias for results with [`MigrateError`].
pub type Result<T> = std::result::Result<T, MigrateError>;

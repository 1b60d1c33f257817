//! Schema and migration files on disk for the calljmp CLI.
//!
//! This crate owns the filesystem side of database migrations: locating
//! `.sql` schema sources, reading versioned migration files, and stamping
//! new ones. The planner and runner in `calljmp-sqlite` consume what this
//! crate loads.
//!
//! # Quick start
//!
//! ```no_run
//! use calljmp_db::{load_migrations, load_schema_sql};
//!
//! // Target schema: every .sql file under the schema directory.
//! let target = load_schema_sql("project/schema/").unwrap();
//!
//! // Versioned migration files, ascending by numeric prefix.
//! let files = load_migrations("project/migrations/").unwrap();
//! for file in &files {
//!     println!("{:04} {}", file.version, file.name);
//! }
//! ```
//!
//! # File naming
//!
//! Migration files match `^(\d+)[-_]([a-zA-Z0-9_-]+)\.sql$`. The numeric
//! prefix is the version, the second capture the name. Anything else in
//! the directory is ignored. Newly generated files use either a
//! zero-padded sequential prefix (`0007-add-users.sql`) or a Unix-seconds
//! prefix; the reader accepts both.

mod error;
mod files;
mod schema_dir;

pub use error::{DatabaseError, Result};
pub use files::{
    MigrationFile, load_migrations, next_version, parse_file_name, sequential_file_name,
    sha256_hex, timestamp_file_name, write_migration,
};
pub use schema_dir::{list_schema_files, load_schema_sql};

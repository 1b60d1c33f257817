//! Declarative SQLite schema migration for the calljmp CLI.
//!
//! Given a target schema as SQL DDL and the current state of a live
//! database, this crate computes a minimal ordered statement sequence
//! that transforms one into the other — preserving every preservable
//! row, ordering work around foreign-key constraints, and preferring
//! cheap `ALTER TABLE ADD COLUMN` changes over table rewrites. Applied
//! migration files are hash-stamped into a bookkeeping table so each
//! runs exactly once and edits to history are detected.
//!
//! # Architecture
//!
//! - **`normalize`** — DDL text normalization for equality comparison
//! - **`introspect`** — `sqlite_master` and pragma reads into plain structs
//! - **`graph`** — foreign-key dependency graph and topological ordering
//! - **`planner`** — schema diffing into an ordered [`MigrationPlan`]
//! - **`plan`** — the step model and statement rendering
//! - **`splitter`** — context-aware statement splitting for migration files
//! - **`runner`** — plan application and hash-tracked migration runs
//!
//! # Quick start
//!
//! ```
//! use calljmp_sqlite::{plan, render_plan};
//!
//! let current = "CREATE TABLE users(id INTEGER PRIMARY KEY);";
//! let target = "CREATE TABLE users(id INTEGER PRIMARY KEY, email TEXT);";
//!
//! let plan = plan(current, target).unwrap();
//! for statement in render_plan(&plan, false) {
//!     println!("{statement}");
//! }
//! ```
//!
//! Planning is pure — it never touches the database being migrated.
//! Execution is explicit:
//!
//! ```no_run
//! use calljmp_sqlite::{apply, check_foreign_keys, plan_against};
//! use rusqlite::Connection;
//!
//! let mut conn = Connection::open("app.db").unwrap();
//! let plan = plan_against(&conn, "CREATE TABLE users(id INTEGER PRIMARY KEY);").unwrap();
//!
//! let tx = conn.transaction().unwrap();
//! apply(&tx, &plan).unwrap();
//! check_foreign_keys(&tx).unwrap();
//! tx.commit().unwrap();
//! ```

mod error;
mod graph;
mod introspect;
mod normalize;
mod plan;
mod planner;
mod runner;
mod splitter;

pub use error::{MigrateError, Result};
pub use graph::ForeignKeyGraph;
pub use introspect::{
    ColumnInfo, ForeignKey, ObjectKind, SchemaObject, columns, foreign_keys, list_objects,
    schema_sql,
};
pub use normalize::{normalize, normalized_eq};
pub use plan::{MigrationPlan, MigrationStep, render_plan};
pub use planner::{plan, plan_against};
pub use runner::{
    MIGRATIONS_TABLE, MigrationRunReport, applied_hashes, apply, check_foreign_keys,
    run_migrations,
};
pub use splitter::split_statements;

//! Migration execution and bookkeeping.
//!
//! Two entry points: [`apply`] executes a planned step list against a
//! live database, and [`run_migrations`] applies versioned migration
//! files exactly once each, keyed by content hash in the
//! `_calljmp_migrations` table.

use std::collections::HashMap;

use calljmp_db::{MigrationFile, sha256_hex};
use colored::Colorize;
use rusqlite::{Connection, params};
use tracing::{debug, error};

use crate::error::{MigrateError, Result};
use crate::plan::MigrationPlan;
use crate::splitter::split_statements;

/// Default bookkeeping table for applied migrations.
pub const MIGRATIONS_TABLE: &str = "_calljmp_migrations";

/// Applies a plan's steps to a database, in order.
///
/// When any step requires deferred foreign keys, the whole run is
/// bracketed in `PRAGMA defer_foreign_keys = ON/OFF`. The runner opens
/// no transaction of its own: callers that need all-or-nothing
/// semantics (and the deferred-FK bracketing only holds inside a
/// transaction) wrap the call themselves.
///
/// # Errors
///
/// Stops at the first engine error; earlier statements remain in
/// whatever state the engine committed.
pub fn apply(conn: &Connection, plan: &MigrationPlan) -> Result<()> {
    if plan.is_empty() {
        return Ok(());
    }
    let deferred = plan.any_deferred_fk();
    if deferred {
        conn.execute_batch("PRAGMA defer_foreign_keys = ON")?;
    }
    for step in &plan.steps {
        debug!(kind = step.kind.keyword(), target = %step.target_name, "executing step");
        for statement in &step.statements {
            conn.execute_batch(statement)?;
        }
    }
    if deferred {
        conn.execute_batch("PRAGMA defer_foreign_keys = OFF")?;
    }
    Ok(())
}

/// Runs `PRAGMA foreign_key_check` and reports the violating tables.
///
/// # Errors
///
/// Returns [`MigrateError::ForeignKeyViolation`] naming each table with
/// at least one dangling reference.
pub fn check_foreign_keys(conn: &Connection) -> Result<()> {
    let mut stmt = conn.prepare("PRAGMA foreign_key_check")?;
    let rows = stmt.query_map([], |row| row.get::<_, String>(0))?;

    let mut tables: Vec<String> = Vec::new();
    for row in rows {
        let table = row?;
        if !tables.contains(&table) {
            tables.push(table);
        }
    }
    if tables.is_empty() {
        Ok(())
    } else {
        Err(MigrateError::ForeignKeyViolation(tables))
    }
}

/// Outcome counts of a [`run_migrations`] pass.
#[derive(Debug, Clone, Default)]
pub struct MigrationRunReport {
    /// Files executed and recorded this run.
    pub applied: usize,
    /// Files already recorded with a matching hash.
    pub skipped: usize,
    /// Files whose recorded hash no longer matches their content.
    pub tampered: usize,
}

/// Applies pending migration files in ascending version order.
///
/// The bookkeeping table is created on first use. Each file's literal
/// content is hashed with SHA-256; a file already recorded under the
/// same name is skipped when the hash matches and reported as tampered
/// when it does not — tampering never rewrites history and does not
/// stop the run. A pending file's statements execute together with the
/// bookkeeping insert in one transaction.
///
/// Status is printed per file: `✓ version: name` in gray for skips and
/// green for fresh applies, `✗ version: name` in red before an
/// execution error is raised.
///
/// # Errors
///
/// Returns [`MigrateError::StatementSplit`] or
/// [`MigrateError::UnclosedDelimiter`] for a malformed file, and any
/// engine error from executing its statements.
pub fn run_migrations(
    conn: &mut Connection,
    files: &[MigrationFile],
    migration_table: &str,
) -> Result<MigrationRunReport> {
    validate_table_name(migration_table)?;
    ensure_migrations_table(conn, migration_table)?;

    let applied = applied_hashes(conn, migration_table)?;

    let mut files: Vec<&MigrationFile> = files.iter().collect();
    files.sort_by_key(|f| f.version);

    let mut report = MigrationRunReport::default();
    for file in files {
        let hash = sha256_hex(file.content.as_bytes());
        match applied.get(&file.name) {
            Some(recorded) if *recorded == hash => {
                println!("{}", format!("✓ {}: {}", file.version, file.name).dimmed());
                report.skipped += 1;
            }
            Some(_) => {
                let tampered = MigrateError::MigrationTampered {
                    version: file.version,
                    name: file.name.clone(),
                };
                error!(version = file.version, name = %file.name, "migration content changed after apply");
                eprintln!("{}", tampered.to_string().red());
                report.tampered += 1;
            }
            None => {
                let statements = split_statements(&file.content)?;
                match apply_file(conn, migration_table, file, &statements, &hash) {
                    Ok(()) => {
                        println!("{}", format!("✓ {}: {}", file.version, file.name).green());
                        report.applied += 1;
                    }
                    Err(err) => {
                        println!("{}", format!("✗ {}: {}", file.version, file.name).red());
                        return Err(err);
                    }
                }
            }
        }
    }
    Ok(report)
}

fn apply_file(
    conn: &mut Connection,
    migration_table: &str,
    file: &MigrationFile,
    statements: &[String],
    hash: &str,
) -> Result<()> {
    let tx = conn.transaction()?;
    for statement in statements {
        tx.execute_batch(statement)?;
    }
    tx.execute(
        &format!("INSERT INTO {migration_table} (name, version, hash) VALUES (?1, ?2, ?3)"),
        params![file.name, file.version, hash],
    )?;
    tx.commit()?;
    Ok(())
}

fn ensure_migrations_table(conn: &Connection, migration_table: &str) -> Result<()> {
    conn.execute_batch(&format!(
        "CREATE TABLE IF NOT EXISTS {migration_table} (
            id INTEGER PRIMARY KEY AUTOINCREMENT,
            name TEXT NOT NULL UNIQUE,
            version INTEGER NOT NULL,
            hash TEXT NOT NULL
        )"
    ))?;
    Ok(())
}

/// Reads the applied-migration hashes, keyed by name.
pub fn applied_hashes(conn: &Connection, migration_table: &str) -> Result<HashMap<String, String>> {
    validate_table_name(migration_table)?;
    // The table may not exist yet on a never-migrated database.
    let exists: i64 = conn.query_row(
        "SELECT COUNT(*) FROM sqlite_master WHERE type = 'table' AND name = ?1",
        [migration_table],
        |row| row.get(0),
    )?;
    if exists == 0 {
        return Ok(HashMap::new());
    }

    let mut stmt = conn.prepare(&format!("SELECT name, hash FROM {migration_table}"))?;
    let rows = stmt.query_map([], |row| {
        Ok((row.get::<_, String>(0)?, row.get::<_, String>(1)?))
    })?;
    let mut map = HashMap::new();
    for row in rows {
        let (name, hash) = row?;
        map.insert(name, hash);
    }
    Ok(map)
}

fn validate_table_name(name: &str) -> Result<()> {
    if name.is_empty() || !name.chars().all(|c| c.is_alphanumeric() || c == '_') {
        return Err(MigrateError::InvalidTableName(name.to_string()));
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::path::PathBuf;

    fn file(version: i64, name: &str, content: &str) -> MigrationFile {
        MigrationFile {
            version,
            name: name.to_string(),
            path: PathBuf::from(format!("{version:04}-{name}.sql")),
            content: content.to_string(),
        }
    }

    #[test]
    fn test_run_migrations_applies_and_records() {
        let mut conn = Connection::open_in_memory().unwrap();
        let files = vec![file(1, "init", "CREATE TABLE users(id INTEGER PRIMARY KEY);")];

        let report = run_migrations(&mut conn, &files, MIGRATIONS_TABLE).unwrap();
        assert_eq!(report.applied, 1);
        assert_eq!(report.skipped, 0);

        let hashes = applied_hashes(&conn, MIGRATIONS_TABLE).unwrap();
        assert_eq!(hashes.len(), 1);
        assert!(hashes.contains_key("init"));
    }

    #[test]
    fn test_run_migrations_is_idempotent() {
        let mut conn = Connection::open_in_memory().unwrap();
        let files = vec![file(1, "init", "CREATE TABLE users(id INTEGER PRIMARY KEY);")];

        run_migrations(&mut conn, &files, MIGRATIONS_TABLE).unwrap();
        let report = run_migrations(&mut conn, &files, MIGRATIONS_TABLE).unwrap();
        assert_eq!(report.applied, 0);
        assert_eq!(report.skipped, 1);
    }

    #[test]
    fn test_run_migrations_detects_tampering() {
        let mut conn = Connection::open_in_memory().unwrap();
        let original = vec![file(1, "init", "CREATE TABLE users(id INTEGER PRIMARY KEY);")];
        run_migrations(&mut conn, &original, MIGRATIONS_TABLE).unwrap();

        let edited = vec![file(1, "init", "CREATE TABLE users(id INTEGER PRIMARY KEY, x TEXT);")];
        let report = run_migrations(&mut conn, &edited, MIGRATIONS_TABLE).unwrap();
        assert_eq!(report.tampered, 1);
        assert_eq!(report.applied, 0);

        // History is untouched: the table still has its original shape.
        let cols = crate::introspect::columns(&conn, "users").unwrap();
        assert_eq!(cols.len(), 1);
    }

    #[test]
    fn test_run_migrations_tampered_file_does_not_block_later_files() {
        let mut conn = Connection::open_in_memory().unwrap();
        run_migrations(
            &mut conn,
            &[file(1, "init", "CREATE TABLE a(id INTEGER);")],
            MIGRATIONS_TABLE,
        )
        .unwrap();

        let next = vec![
            file(1, "init", "CREATE TABLE a(id INTEGER); -- edited"),
            file(2, "more", "CREATE TABLE b(id INTEGER);"),
        ];
        let report = run_migrations(&mut conn, &next, MIGRATIONS_TABLE).unwrap();
        assert_eq!(report.tampered, 1);
        assert_eq!(report.applied, 1);
    }

    #[test]
    fn test_run_migrations_failed_file_rolls_back() {
        let mut conn = Connection::open_in_memory().unwrap();
        let files = vec![file(
            1,
            "broken",
            "CREATE TABLE ok(id INTEGER); CREATE TABLE ok(id INTEGER);",
        )];
        assert!(run_migrations(&mut conn, &files, MIGRATIONS_TABLE).is_err());

        // Neither the half-applied DDL nor the bookkeeping row survive.
        let count: i64 = conn
            .query_row(
                "SELECT COUNT(*) FROM sqlite_master WHERE type = 'table' AND name = 'ok'",
                [],
                |row| row.get(0),
            )
            .unwrap();
        assert_eq!(count, 0);
        assert!(applied_hashes(&conn, MIGRATIONS_TABLE)
            .unwrap()
            .is_empty());
    }

    #[test]
    fn test_run_migrations_rejects_bad_table_name() {
        let mut conn = Connection::open_in_memory().unwrap();
        let err = run_migrations(&mut conn, &[], "drop;--").unwrap_err();
        assert!(matches!(err, MigrateError::InvalidTableName(_)));
    }

    #[test]
    fn test_check_foreign_keys_reports_violations() {
        let conn = Connection::open_in_memory().unwrap();
        conn.execute_batch(
            "CREATE TABLE p(id INTEGER PRIMARY KEY);
             CREATE TABLE c(id INTEGER PRIMARY KEY, p_id INTEGER REFERENCES p(id));
             INSERT INTO c(id, p_id) VALUES (1, 99);",
        )
        .unwrap();
        let err = check_foreign_keys(&conn).unwrap_err();
        match err {
            MigrateError::ForeignKeyViolation(tables) => assert_eq!(tables, vec!["c"]),
            other => panic!("unexpected error: {other}"),
        }
    }

    #[test]
    fn test_check_foreign_keys_clean() {
        let conn = Connection::open_in_memory().unwrap();
        conn.execute_batch("CREATE TABLE t(id INTEGER);").unwrap();
        assert!(check_foreign_keys(&conn).is_ok());
    }
}

//! Live-schema introspection over a SQLite connection.
//!
//! Reads `sqlite_master` and the `table_info` / `foreign_key_list`
//! pragmas into plain structs the planner can diff. Engine-internal
//! objects (`sqlite_*`, `_cf_*`) and this tool's own bookkeeping tables
//! (`*_calljmp_*`) are filtered out everywhere.

use rusqlite::Connection;

use crate::error::Result;

/// The four schema object kinds tracked by the planner.
///
/// A closed set: per-kind behavior (SQL type string, `DROP` keyword,
/// human plural) is a lookup on this enum.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ObjectKind {
    Table,
    Index,
    Trigger,
    View,
}

impl ObjectKind {
    /// All kinds, in diff-emission order.
    pub const ALL: [ObjectKind; 4] = [
        ObjectKind::Table,
        ObjectKind::Index,
        ObjectKind::Trigger,
        ObjectKind::View,
    ];

    /// The `sqlite_master.type` value for this kind.
    pub fn sql_type(self) -> &'static str {
        match self {
            ObjectKind::Table => "table",
            ObjectKind::Index => "index",
            ObjectKind::Trigger => "trigger",
            ObjectKind::View => "view",
        }
    }

    /// The DDL keyword, as used in `DROP <keyword> <name>`.
    pub fn keyword(self) -> &'static str {
        match self {
            ObjectKind::Table => "TABLE",
            ObjectKind::Index => "INDEX",
            ObjectKind::Trigger => "TRIGGER",
            ObjectKind::View => "VIEW",
        }
    }

    /// Human plural for status output.
    pub fn plural(self) -> &'static str {
        match self {
            ObjectKind::Table => "tables",
            ObjectKind::Index => "indexes",
            ObjectKind::Trigger => "triggers",
            ObjectKind::View => "views",
        }
    }
}

/// A named DDL object as stored by SQLite.
#[derive(Debug, Clone)]
pub struct SchemaObject {
    /// Lowercased name; identifiers compare case-insensitively.
    pub name: String,
    /// Object kind.
    pub kind: ObjectKind,
    /// The exact `CREATE …` text from `sqlite_master`.
    pub sql: String,
}

/// One column as reported by `PRAGMA table_info`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ColumnInfo {
    /// Column name, original case.
    pub name: String,
    /// Declared type text; empty for untyped columns.
    pub declared_type: String,
    /// Whether the column carries `NOT NULL`.
    pub not_null: bool,
    /// Literal text of the `DEFAULT` expression, if any.
    pub default_value: Option<String>,
    /// 1-based position in the primary key, 0 when not part of it.
    pub primary_key_rank: i64,
}

impl ColumnInfo {
    /// True when a row can exist without an explicit value for this
    /// column: it is nullable or has a default.
    pub fn is_optional(&self) -> bool {
        !self.not_null || self.default_value.is_some()
    }
}

/// One foreign-key constraint as reported by `PRAGMA foreign_key_list`,
/// with its column pairs grouped.
#[derive(Debug, Clone)]
pub struct ForeignKey {
    /// Lowercased name of the referenced (parent) table.
    pub referenced_table: String,
    /// `(from, to)` column pairs; `to` is `None` when the constraint
    /// references the parent's primary key implicitly.
    pub columns: Vec<(String, Option<String>)>,
    /// `ON DELETE` action text.
    pub on_delete: String,
    /// `ON UPDATE` action text.
    pub on_update: String,
}

/// Returns `true` for engine-internal and bookkeeping object names the
/// planner must never touch.
pub(crate) fn is_reserved(lower_name: &str) -> bool {
    lower_name.starts_with("sqlite_")
        || lower_name.starts_with("_cf_")
        || lower_name.contains("_calljmp_")
}

/// Lists the schema objects of one kind, in declaration order.
///
/// Queries `sqlite_master` for rows with non-NULL `sql`, skipping
/// reserved names. Names are lowercased for case-insensitive keying;
/// the `sql` text is returned verbatim.
///
/// # Errors
///
/// Any underlying database error is propagated unchanged.
pub fn list_objects(conn: &Connection, kind: ObjectKind) -> Result<Vec<SchemaObject>> {
    let mut stmt = conn.prepare(
        "SELECT name, sql FROM sqlite_master WHERE type = ?1 AND sql IS NOT NULL ORDER BY rowid",
    )?;
    let rows = stmt.query_map([kind.sql_type()], |row| {
        Ok((row.get::<_, String>(0)?, row.get::<_, String>(1)?))
    })?;

    let mut objects = Vec::new();
    for row in rows {
        let (name, sql) = row?;
        let name = name.to_lowercase();
        if is_reserved(&name) {
            continue;
        }
        objects.push(SchemaObject { name, kind, sql });
    }
    Ok(objects)
}

/// Returns the columns of `table` in declaration order.
///
/// # Errors
///
/// Any underlying database error is propagated unchanged.
pub fn columns(conn: &Connection, table: &str) -> Result<Vec<ColumnInfo>> {
    let mut stmt = conn.prepare(&format!("PRAGMA table_info({})", quote_ident(table)))?;
    let rows = stmt.query_map([], |row| {
        Ok(ColumnInfo {
            name: row.get(1)?,
            declared_type: row.get(2)?,
            not_null: row.get::<_, i64>(3)? != 0,
            default_value: row.get(4)?,
            primary_key_rank: row.get(5)?,
        })
    })?;
    rows.collect::<std::result::Result<Vec<_>, _>>()
        .map_err(Into::into)
}

/// Returns the foreign keys declared on `table`, grouped by constraint.
///
/// # Errors
///
/// Any underlying database error is propagated unchanged.
pub fn foreign_keys(conn: &Connection, table: &str) -> Result<Vec<ForeignKey>> {
    let mut stmt = conn.prepare(&format!("PRAGMA foreign_key_list({})", quote_ident(table)))?;
    let rows = stmt.query_map([], |row| {
        Ok((
            row.get::<_, i64>(0)?,           // constraint id
            row.get::<_, String>(2)?,        // referenced table
            row.get::<_, String>(3)?,        // from column
            row.get::<_, Option<String>>(4)?, // to column
            row.get::<_, String>(5)?,        // on_update
            row.get::<_, String>(6)?,        // on_delete
        ))
    })?;

    let mut keys: Vec<(i64, ForeignKey)> = Vec::new();
    for row in rows {
        let (id, referenced, from, to, on_update, on_delete) = row?;
        match keys.iter_mut().find(|(key_id, _)| *key_id == id) {
            Some((_, fk)) => fk.columns.push((from, to)),
            None => keys.push((
                id,
                ForeignKey {
                    referenced_table: referenced.to_lowercase(),
                    columns: vec![(from, to)],
                    on_delete,
                    on_update,
                },
            )),
        }
    }
    Ok(keys.into_iter().map(|(_, fk)| fk).collect())
}

/// Snapshots the full schema of a database as executable DDL text.
///
/// Tables come first so the result loads into a fresh database; other
/// objects follow in declaration order. Reserved objects are skipped.
///
/// # Errors
///
/// Any underlying database error is propagated unchanged.
pub fn schema_sql(conn: &Connection) -> Result<String> {
    let mut out = String::new();
    for kind in ObjectKind::ALL {
        for object in list_objects(conn, kind)? {
            out.push_str(&object.sql);
            out.push_str(";\n");
        }
    }
    Ok(out)
}

/// Double-quotes an identifier for safe interpolation into a pragma.
pub(crate) fn quote_ident(name: &str) -> String {
    format!("\"{}\"", name.replace('"', "\"\""))
}

#[cfg(test)]
mod tests {
    use super::*;

    fn test_db(schema: &str) -> Connection {
        let conn = Connection::open_in_memory().unwrap();
        conn.execute_batch("PRAGMA foreign_keys = ON;").unwrap();
        conn.execute_batch(schema).unwrap();
        conn
    }

    #[test]
    fn test_list_objects_filters_reserved_names() {
        let conn = test_db(
            "CREATE TABLE users(id INTEGER PRIMARY KEY);
             CREATE TABLE _cf_kv(k TEXT, v TEXT);
             CREATE TABLE _calljmp_migrations(id INTEGER PRIMARY KEY);",
        );
        let tables = list_objects(&conn, ObjectKind::Table).unwrap();
        let names: Vec<&str> = tables.iter().map(|t| t.name.as_str()).collect();
        assert_eq!(names, vec!["users"]);
    }

    #[test]
    fn test_list_objects_declaration_order_and_lowercase_keys() {
        let conn = test_db(
            "CREATE TABLE Zebra(id INTEGER);
             CREATE TABLE Apple(id INTEGER);",
        );
        let tables = list_objects(&conn, ObjectKind::Table).unwrap();
        let names: Vec<&str> = tables.iter().map(|t| t.name.as_str()).collect();
        assert_eq!(names, vec!["zebra", "apple"]);
        // Original case survives in the stored SQL.
        assert!(tables[0].sql.contains("Zebra"));
    }

    #[test]
    fn test_columns_metadata() {
        let conn = test_db(
            "CREATE TABLE t(
                id INTEGER PRIMARY KEY,
                email TEXT NOT NULL,
                nick TEXT DEFAULT 'anon',
                bio TEXT DEFAULT NULL
            );",
        );
        let cols = columns(&conn, "t").unwrap();
        assert_eq!(cols.len(), 4);

        assert_eq!(cols[0].name, "id");
        assert_eq!(cols[0].primary_key_rank, 1);

        assert!(cols[1].not_null);
        assert!(!cols[1].is_optional());

        assert_eq!(cols[2].default_value.as_deref(), Some("'anon'"));
        assert!(cols[2].is_optional());

        // Explicit DEFAULT NULL keeps its literal text.
        assert_eq!(cols[3].default_value.as_deref(), Some("NULL"));
    }

    #[test]
    fn test_foreign_keys_grouped() {
        let conn = test_db(
            "CREATE TABLE parents(id INTEGER PRIMARY KEY);
             CREATE TABLE children(
                id INTEGER PRIMARY KEY,
                parent_id INTEGER REFERENCES parents(id) ON DELETE CASCADE
             );",
        );
        let fks = foreign_keys(&conn, "children").unwrap();
        assert_eq!(fks.len(), 1);
        assert_eq!(fks[0].referenced_table, "parents");
        assert_eq!(fks[0].columns.len(), 1);
        assert_eq!(fks[0].columns[0].0, "parent_id");
        assert_eq!(fks[0].on_delete, "CASCADE");
    }

    #[test]
    fn test_schema_sql_round_trips() {
        let conn = test_db(
            "CREATE TABLE users(id INTEGER PRIMARY KEY, email TEXT);
             CREATE INDEX idx_email ON users(email);
             CREATE VIEW v_users AS SELECT email FROM users;",
        );
        let sql = schema_sql(&conn).unwrap();
        let reloaded = test_db(&sql);
        assert_eq!(list_objects(&reloaded, ObjectKind::Table).unwrap().len(), 1);
        assert_eq!(list_objects(&reloaded, ObjectKind::Index).unwrap().len(), 1);
        assert_eq!(list_objects(&reloaded, ObjectKind::View).unwrap().len(), 1);
    }
}

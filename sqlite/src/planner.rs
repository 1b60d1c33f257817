//! Declarative schema diffing and migration planning.
//!
//! [`plan`] loads the current and target schemas into scoped in-memory
//! databases, diffs them object by object, and emits an ordered
//! [`MigrationPlan`] that transforms current into target while
//! preserving every preservable row. Cheap changes stay in place
//! (`ALTER TABLE ADD COLUMN`); anything structural goes through the
//! rename/create/copy/drop rewrite, pulling foreign-key dependents
//! along via the recreation closure.
//!
//! Planning is pure: nothing here mutates the databases it reads, and
//! both reference handles are released before a plan is returned.

use std::collections::{BTreeSet, HashMap, HashSet};
use std::sync::LazyLock;

use regex::Regex;
use rusqlite::Connection;
use tracing::debug;

use crate::error::{MigrateError, Result};
use crate::graph::ForeignKeyGraph;
use crate::introspect::{self, ColumnInfo, ObjectKind, SchemaObject, quote_ident};
use crate::normalize::normalized_eq;
use crate::plan::{MigrationPlan, MigrationStep};

static INDEX_TABLE_RE: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r#"(?i)INDEX\s+(?:IF\s+NOT\s+EXISTS\s+)?\S+\s+ON\s+["'`\[]?([A-Za-z0-9_]+)"#)
        .expect("static regex must compile")
});

static TRIGGER_TABLE_RE: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r#"(?i)\bON\s+["'`\[]?([A-Za-z0-9_]+)"#).expect("static regex must compile")
});

static VIEW_TABLE_RE: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r#"(?i)\bFROM\s+["'`\[]?([A-Za-z0-9_]+)"#).expect("static regex must compile")
});

/// Extracts the lowercased owning-table name from an object's `CREATE`
/// text. Tables own themselves and return `None`.
fn owning_table(kind: ObjectKind, sql: &str) -> Option<String> {
    let re = match kind {
        ObjectKind::Table => return None,
        ObjectKind::Index => &INDEX_TABLE_RE,
        ObjectKind::Trigger => &TRIGGER_TABLE_RE,
        ObjectKind::View => &VIEW_TABLE_RE,
    };
    re.captures(sql).map(|caps| caps[1].to_lowercase())
}

/// Computes the migration plan between two schema texts.
///
/// Both sides are loaded into fresh in-memory databases, so this is a
/// pure function of the DDL. An already-migrated schema yields an empty
/// plan.
///
/// # Errors
///
/// Returns [`MigrateError::SchemaInvalid`] if either schema fails to
/// load, or [`MigrateError::PlanInfeasible`] if the transformation
/// would lose rows.
pub fn plan(current_sql: &str, target_sql: &str) -> Result<MigrationPlan> {
    let current = load_schema_db(current_sql)?;
    let target = load_schema_db(target_sql)?;
    plan_between(&current, &target)
}

/// Computes the migration plan from a live database to a target schema.
///
/// Unlike [`plan`], the current side is real: the feasibility check
/// sees actual row counts, so a structural change that cannot preserve
/// populated rows is rejected here rather than failing mid-apply.
///
/// # Errors
///
/// Same as [`plan`]; underlying engine errors propagate unchanged.
pub fn plan_against(conn: &Connection, target_sql: &str) -> Result<MigrationPlan> {
    let target = load_schema_db(target_sql)?;
    plan_between(conn, &target)
}

fn load_schema_db(sql: &str) -> Result<Connection> {
    let conn = Connection::open_in_memory()?;
    conn.execute_batch("PRAGMA foreign_keys = ON;")?;
    conn.execute_batch(sql)
        .map_err(|e| MigrateError::SchemaInvalid(e.to_string()))?;
    Ok(conn)
}

fn plan_between(current: &Connection, target: &Connection) -> Result<MigrationPlan> {
    let cur_tables = introspect::list_objects(current, ObjectKind::Table)?;
    let tgt_tables = introspect::list_objects(target, ObjectKind::Table)?;
    let cur_map: HashMap<&str, &SchemaObject> =
        cur_tables.iter().map(|t| (t.name.as_str(), t)).collect();
    let tgt_map: HashMap<&str, &SchemaObject> =
        tgt_tables.iter().map(|t| (t.name.as_str(), t)).collect();

    let dropped: BTreeSet<String> = cur_tables
        .iter()
        .filter(|t| !tgt_map.contains_key(t.name.as_str()))
        .map(|t| t.name.clone())
        .collect();
    let added: BTreeSet<String> = tgt_tables
        .iter()
        .filter(|t| !cur_map.contains_key(t.name.as_str()))
        .map(|t| t.name.clone())
        .collect();

    // Classify modified tables; iteration follows target declaration order.
    let mut add_only: Vec<(String, Vec<ColumnInfo>)> = Vec::new();
    let mut structural: BTreeSet<String> = BTreeSet::new();
    for table in &tgt_tables {
        let Some(existing) = cur_map.get(table.name.as_str()) else {
            continue;
        };
        if normalized_eq(&existing.sql, &table.sql) {
            continue;
        }
        let cur_cols = introspect::columns(current, &table.name)?;
        let tgt_cols = introspect::columns(target, &table.name)?;
        match classify_modification(&cur_cols, &tgt_cols) {
            Modification::AddOnly(cols) => add_only.push((table.name.clone(), cols)),
            Modification::Structural => {
                structural.insert(table.name.clone());
            }
        }
    }

    // Recreating a table invalidates its referents' FK bindings, so the
    // rewrite set closes over the reverse foreign-key walk.
    let target_graph = ForeignKeyGraph::from_db(target)?;
    let recreated: BTreeSet<String> = target_graph
        .dependents_closure(structural.iter().map(String::as_str))
        .into_iter()
        .filter(|t| cur_map.contains_key(t.as_str()) && tgt_map.contains_key(t.as_str()))
        .collect();

    // A closure member that was headed for in-place ALTERs is rebuilt
    // from the target DDL instead; its new columns come along for free.
    add_only.retain(|(name, _)| !recreated.contains(name));

    for table in &recreated {
        ensure_rows_mappable(current, target, table)?;
    }

    debug!(
        dropped = dropped.len(),
        added = added.len(),
        add_only = add_only.len(),
        recreated = recreated.len(),
        "table diff computed"
    );

    let mut steps: Vec<MigrationStep> = Vec::new();

    // Phase D: removed tables go first, children before parents. The
    // dropped set has no edges in the target graph, so the order comes
    // from the schema that still declares them.
    let current_graph = ForeignKeyGraph::from_db(current)?;
    for table in current_graph.topo_order(&dropped).iter().rev() {
        steps.push(MigrationStep::new(
            ObjectKind::Table,
            table.as_str(),
            vec![format!("DROP TABLE {table}")],
        ));
    }

    // Phase A: new tables, parents before children.
    for table in target_graph.topo_order(&added) {
        steps.push(MigrationStep::new(
            ObjectKind::Table,
            table.as_str(),
            vec![tgt_map[table.as_str()].sql.clone()],
        ));
    }

    // Phase M-add: in-place column additions, one step per table.
    for (table, cols) in &add_only {
        let statements = cols.iter().map(|c| add_column_sql(table, c)).collect();
        steps.push(MigrationStep::new(ObjectKind::Table, table.as_str(), statements));
    }

    // Phase R: the rewrite path. All renames, then all creates, then
    // the row copies, then the drops — a sequence that is only legal
    // with deferred foreign-key enforcement.
    let recreate_order = target_graph.topo_order(&recreated);
    for table in &recreate_order {
        steps.push(
            MigrationStep::new(
                ObjectKind::Table,
                table.as_str(),
                vec![format!("ALTER TABLE {table} RENAME TO {table}_old")],
            )
            .deferred(),
        );
    }
    for table in &recreate_order {
        steps.push(MigrationStep::new(
            ObjectKind::Table,
            table.as_str(),
            vec![tgt_map[table.as_str()].sql.clone()],
        ));
    }
    for table in &recreate_order {
        let common = common_columns(current, target, table)?;
        if !common.is_empty() {
            let cols = common.join(", ");
            steps.push(MigrationStep::new(
                ObjectKind::Table,
                table.as_str(),
                vec![format!(
                    "INSERT INTO {table} ({cols}) SELECT {cols} FROM {table}_old"
                )],
            ));
        }
    }
    for table in recreate_order.iter().rev() {
        steps.push(MigrationStep::new(
            ObjectKind::Table,
            table.as_str(),
            vec![format!("DROP TABLE {table}_old")],
        ));
    }

    // Indexes, triggers, and views.
    for kind in [ObjectKind::Index, ObjectKind::Trigger, ObjectKind::View] {
        diff_objects(current, target, kind, &dropped, &recreated, &mut steps)?;
    }

    Ok(MigrationPlan { steps })
}

fn diff_objects(
    current: &Connection,
    target: &Connection,
    kind: ObjectKind,
    dropped_tables: &BTreeSet<String>,
    recreated: &BTreeSet<String>,
    steps: &mut Vec<MigrationStep>,
) -> Result<()> {
    let cur_objs = introspect::list_objects(current, kind)?;
    let tgt_objs = introspect::list_objects(target, kind)?;
    let cur_map: HashMap<&str, &SchemaObject> =
        cur_objs.iter().map(|o| (o.name.as_str(), o)).collect();
    let tgt_map: HashMap<&str, &SchemaObject> =
        tgt_objs.iter().map(|o| (o.name.as_str(), o)).collect();

    // Dropped. An index or trigger whose table went away died with it;
    // views are independent objects and always get an explicit DROP.
    for obj in &cur_objs {
        if tgt_map.contains_key(obj.name.as_str()) {
            continue;
        }
        let owner_gone = owning_table(kind, &obj.sql)
            .is_some_and(|o| dropped_tables.contains(&o) || recreated.contains(&o));
        if kind != ObjectKind::View && owner_gone {
            continue;
        }
        steps.push(MigrationStep::new(
            kind,
            obj.name.as_str(),
            vec![format!("DROP {} {}", kind.keyword(), obj.name)],
        ));
    }

    // Added.
    for obj in &tgt_objs {
        if !cur_map.contains_key(obj.name.as_str()) {
            steps.push(MigrationStep::new(kind, obj.name.as_str(), vec![obj.sql.clone()]));
        }
    }

    // Modified, or owned by a recreated table. Indexes and triggers
    // were destroyed along with the old table, so only the CREATE is
    // needed; views survive a table rename-swap in surprising ways and
    // are always dropped first.
    for obj in &tgt_objs {
        let Some(existing) = cur_map.get(obj.name.as_str()) else {
            continue;
        };
        let owner_recreated =
            owning_table(kind, &obj.sql).is_some_and(|o| recreated.contains(&o));
        if normalized_eq(&existing.sql, &obj.sql) && !owner_recreated {
            continue;
        }
        let mut statements = Vec::new();
        if kind == ObjectKind::View || !owner_recreated {
            statements.push(format!("DROP {} {}", kind.keyword(), obj.name));
        }
        statements.push(obj.sql.clone());
        steps.push(MigrationStep::new(kind, obj.name.as_str(), statements));
    }

    Ok(())
}

enum Modification {
    /// Expressible as `ALTER TABLE ADD COLUMN` for these new columns.
    AddOnly(Vec<ColumnInfo>),
    /// Requires the rename/create/copy/drop rewrite.
    Structural,
}

fn classify_modification(cur_cols: &[ColumnInfo], tgt_cols: &[ColumnInfo]) -> Modification {
    let tgt_by_name: HashSet<String> =
        tgt_cols.iter().map(|c| c.name.to_lowercase()).collect();
    if cur_cols
        .iter()
        .any(|c| !tgt_by_name.contains(&c.name.to_lowercase()))
    {
        return Modification::Structural;
    }

    let cur_by_name: HashMap<String, &ColumnInfo> = cur_cols
        .iter()
        .map(|c| (c.name.to_lowercase(), c))
        .collect();

    let mut added = Vec::new();
    for col in tgt_cols {
        match cur_by_name.get(&col.name.to_lowercase()) {
            Some(existing) => {
                if !column_eq(existing, col) {
                    return Modification::Structural;
                }
            }
            None => added.push(col.clone()),
        }
    }

    // The definitions differ but no column does — an edited constraint,
    // say — which only a rewrite can express.
    if added.is_empty() {
        return Modification::Structural;
    }
    // ADD COLUMN cannot introduce primary-key columns, required columns
    // that existing rows would violate, or non-constant defaults.
    if added.iter().any(|c| {
        c.primary_key_rank > 0 || !c.is_optional() || !has_constant_default(c)
    }) {
        return Modification::Structural;
    }
    Modification::AddOnly(added)
}

/// `ALTER TABLE ADD COLUMN` rejects defaults the engine cannot evaluate
/// to a constant: expressions and the CURRENT_* keywords.
fn has_constant_default(col: &ColumnInfo) -> bool {
    match &col.default_value {
        None => true,
        Some(default) => {
            let upper = default.trim().to_uppercase();
            !upper.starts_with('(')
                && !matches!(
                    upper.as_str(),
                    "CURRENT_TIME" | "CURRENT_DATE" | "CURRENT_TIMESTAMP"
                )
        }
    }
}

fn column_eq(a: &ColumnInfo, b: &ColumnInfo) -> bool {
    a.name.eq_ignore_ascii_case(&b.name)
        && a.declared_type.eq_ignore_ascii_case(&b.declared_type)
        && a.not_null == b.not_null
        && a.default_value == b.default_value
        && a.primary_key_rank == b.primary_key_rank
}

fn add_column_sql(table: &str, col: &ColumnInfo) -> String {
    let mut sql = format!("ALTER TABLE {table} ADD COLUMN {}", col.name);
    if !col.declared_type.is_empty() {
        sql.push(' ');
        sql.push_str(&col.declared_type);
    }
    if col.not_null {
        sql.push_str(" NOT NULL");
    }
    if let Some(default) = &col.default_value {
        sql.push_str(" DEFAULT ");
        sql.push_str(default);
    }
    sql
}

/// Columns present on both sides, in target declaration order with
/// target casing. These are the columns the rewrite copies through.
fn common_columns(current: &Connection, target: &Connection, table: &str) -> Result<Vec<String>> {
    let cur_names: HashSet<String> = introspect::columns(current, table)?
        .into_iter()
        .map(|c| c.name.to_lowercase())
        .collect();
    Ok(introspect::columns(target, table)?
        .into_iter()
        .filter(|c| cur_names.contains(&c.name.to_lowercase()))
        .map(|c| c.name)
        .collect())
}

fn ensure_rows_mappable(current: &Connection, target: &Connection, table: &str) -> Result<()> {
    let cur_names: HashSet<String> = introspect::columns(current, table)?
        .into_iter()
        .map(|c| c.name.to_lowercase())
        .collect();
    let blocking = introspect::columns(target, table)?
        .into_iter()
        .find(|c| {
            !cur_names.contains(&c.name.to_lowercase())
                && c.not_null
                && c.default_value.is_none()
        });
    let Some(column) = blocking else {
        return Ok(());
    };

    let rows: i64 = current.query_row(
        &format!("SELECT COUNT(*) FROM {}", quote_ident(table)),
        [],
        |row| row.get(0),
    )?;
    if rows > 0 {
        return Err(MigrateError::PlanInfeasible(format!(
            "adding NOT NULL column '{}' without a default to table '{}' would orphan {} existing row(s)",
            column.name, table, rows
        )));
    }
    Ok(())
}

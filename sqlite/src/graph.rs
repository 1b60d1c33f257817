//! Foreign-key dependency graph over table names.
//!
//! An edge runs parent → child: the child table declares a foreign key
//! into the parent. Creates must order parents first, drops the reverse,
//! and recreating a parent pulls every transitive child along with it.

use std::collections::{BTreeMap, BTreeSet, HashMap};

use rusqlite::Connection;

use crate::error::Result;
use crate::introspect::{self, ObjectKind};

/// Directed foreign-key graph over lowercased table names.
#[derive(Debug, Default)]
pub struct ForeignKeyGraph {
    /// parent → tables whose rows reference it.
    children: BTreeMap<String, BTreeSet<String>>,
    /// child → tables it references.
    parents: BTreeMap<String, BTreeSet<String>>,
    tables: BTreeSet<String>,
}

impl ForeignKeyGraph {
    /// Builds the graph from a database's declared foreign keys.
    ///
    /// Self-references are ignored; a table is always ordered with
    /// itself.
    ///
    /// # Errors
    ///
    /// Any underlying database error is propagated unchanged.
    pub fn from_db(conn: &Connection) -> Result<Self> {
        let mut graph = Self::default();
        for table in introspect::list_objects(conn, ObjectKind::Table)? {
            graph.tables.insert(table.name.clone());
            for fk in introspect::foreign_keys(conn, &table.name)? {
                if fk.referenced_table != table.name {
                    graph.add_edge(&fk.referenced_table, &table.name);
                }
            }
        }
        Ok(graph)
    }

    fn add_edge(&mut self, parent: &str, child: &str) {
        self.children
            .entry(parent.to_string())
            .or_default()
            .insert(child.to_string());
        self.parents
            .entry(child.to_string())
            .or_default()
            .insert(parent.to_string());
        self.tables.insert(parent.to_string());
        self.tables.insert(child.to_string());
    }

    /// Returns `roots` plus every table that transitively references one
    /// of them. This is the recreation closure: rewriting a parent
    /// invalidates the foreign-key bindings of all its referents.
    pub fn dependents_closure<'a>(
        &self,
        roots: impl IntoIterator<Item = &'a str>,
    ) -> BTreeSet<String> {
        let mut closure: BTreeSet<String> = roots.into_iter().map(str::to_string).collect();
        let mut frontier: Vec<String> = closure.iter().cloned().collect();
        while let Some(table) = frontier.pop() {
            if let Some(children) = self.children.get(&table) {
                for child in children {
                    if closure.insert(child.clone()) {
                        frontier.push(child.clone());
                    }
                }
            }
        }
        closure
    }

    /// Orders `subset` so that every parent precedes its children.
    ///
    /// Kahn's algorithm with lexicographic tie-breaking. Cycles are
    /// tolerated: when no table in the remainder is free of in-subset
    /// parents, the lexicographically smallest remaining table is
    /// emitted, which linearizes each strongly connected component in
    /// name order.
    pub fn topo_order(&self, subset: &BTreeSet<String>) -> Vec<String> {
        let mut in_degree: HashMap<&str, usize> = HashMap::new();
        for table in subset {
            let degree = self
                .parents
                .get(table)
                .map(|parents| parents.iter().filter(|p| subset.contains(*p)).count())
                .unwrap_or(0);
            in_degree.insert(table.as_str(), degree);
        }

        // BTreeSet keeps the ready pool sorted, so ties resolve
        // lexicographically without a separate sort.
        let mut ready: BTreeSet<&str> = in_degree
            .iter()
            .filter(|(_, d)| **d == 0)
            .map(|(t, _)| *t)
            .collect();
        let mut remaining: BTreeSet<&str> = in_degree
            .iter()
            .filter(|(_, d)| **d > 0)
            .map(|(t, _)| *t)
            .collect();

        let mut order = Vec::with_capacity(subset.len());
        while order.len() < subset.len() {
            let next = match ready.iter().next().copied() {
                Some(table) => {
                    ready.remove(table);
                    table
                }
                // Cycle: force the smallest remaining table out.
                None => {
                    let table = *remaining.iter().next().expect("remaining is non-empty");
                    remaining.remove(table);
                    table
                }
            };
            order.push(next.to_string());

            if let Some(children) = self.children.get(next) {
                for child in children {
                    if let Some(degree) = in_degree.get_mut(child.as_str()) {
                        if *degree > 0 {
                            *degree -= 1;
                            if *degree == 0 && remaining.remove(child.as_str()) {
                                ready.insert(child.as_str());
                            }
                        }
                    }
                }
            }
        }
        order
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn graph_of(edges: &[(&str, &str)]) -> ForeignKeyGraph {
        let mut graph = ForeignKeyGraph::default();
        for (parent, child) in edges {
            graph.add_edge(parent, child);
        }
        graph
    }

    fn set(names: &[&str]) -> BTreeSet<String> {
        names.iter().map(|n| n.to_string()).collect()
    }

    #[test]
    fn test_dependents_closure_transitive() {
        let graph = graph_of(&[("grandparent", "parent"), ("parent", "child")]);
        let closure = graph.dependents_closure(["grandparent"]);
        assert_eq!(closure, set(&["grandparent", "parent", "child"]));

        let closure = graph.dependents_closure(["parent"]);
        assert_eq!(closure, set(&["parent", "child"]));
    }

    #[test]
    fn test_topo_order_parents_first() {
        let graph = graph_of(&[("grandparent", "parent"), ("parent", "child")]);
        let order = graph.topo_order(&set(&["child", "grandparent", "parent"]));
        assert_eq!(order, vec!["grandparent", "parent", "child"]);
    }

    #[test]
    fn test_topo_order_lexicographic_ties() {
        let graph = graph_of(&[("root", "b"), ("root", "a")]);
        let order = graph.topo_order(&set(&["a", "b", "root"]));
        assert_eq!(order, vec!["root", "a", "b"]);
    }

    #[test]
    fn test_topo_order_unrelated_tables_sorted() {
        let graph = ForeignKeyGraph::default();
        let order = graph.topo_order(&set(&["zebra", "apple", "mango"]));
        assert_eq!(order, vec!["apple", "mango", "zebra"]);
    }

    #[test]
    fn test_topo_order_tolerates_cycles() {
        let graph = graph_of(&[("a", "b"), ("b", "a"), ("a", "c")]);
        let order = graph.topo_order(&set(&["a", "b", "c"]));
        // The a↔b component linearizes in name order; c still follows a.
        assert_eq!(order, vec!["a", "b", "c"]);
    }

    #[test]
    fn test_from_db_reads_declared_fks() {
        let conn = Connection::open_in_memory().unwrap();
        conn.execute_batch(
            "CREATE TABLE p(id INTEGER PRIMARY KEY);
             CREATE TABLE c(id INTEGER PRIMARY KEY, p_id INTEGER REFERENCES p(id));
             CREATE TABLE loner(id INTEGER PRIMARY KEY);",
        )
        .unwrap();
        let graph = ForeignKeyGraph::from_db(&conn).unwrap();
        assert_eq!(graph.dependents_closure(["p"]), set(&["p", "c"]));
        assert_eq!(graph.dependents_closure(["loner"]), set(&["loner"]));
    }
}

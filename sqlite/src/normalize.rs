//! DDL text normalization for equality comparison.
//!
//! Two `CREATE …` statements produced by the same SQLite version can
//! differ in whitespace, comments, and identifier quoting while meaning
//! the same thing. [`normalize`] folds those differences away so the
//! planner can compare schema versions textually. The result is **never
//! executed** — it exists only to answer "are these two definitions the
//! same object".

use std::sync::LazyLock;

use regex::Regex;

static LINE_COMMENT_RE: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"--[^\n]*").expect("static regex must compile"));

static WHITESPACE_RE: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"\s+").expect("static regex must compile"));

static PUNCT_SPACING_RE: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"\s*([(),])\s*").expect("static regex must compile"));

static QUOTED_BAREWORD_RE: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r#""([A-Za-z_][A-Za-z0-9_]*)""#).expect("static regex must compile"));

/// Normalizes a DDL statement for equality comparison.
///
/// Applied in order: strip `--` line comments, collapse whitespace runs
/// to single spaces, delete spaces adjacent to `(` `)` `,`, unquote
/// `"word"` identifiers that need no quoting, trim. Identifier case is
/// preserved; callers compare names case-insensitively via lowercased
/// map keys.
///
/// Idempotent: `normalize(normalize(x)) == normalize(x)`.
pub fn normalize(sql: &str) -> String {
    let stripped = LINE_COMMENT_RE.replace_all(sql, "");
    let collapsed = WHITESPACE_RE.replace_all(&stripped, " ");
    let tightened = PUNCT_SPACING_RE.replace_all(&collapsed, "$1");
    let unquoted = QUOTED_BAREWORD_RE.replace_all(&tightened, "$1");
    unquoted.trim().to_string()
}

/// Returns `true` when two DDL statements are equal after normalization.
pub fn normalized_eq(a: &str, b: &str) -> bool {
    normalize(a) == normalize(b)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_collapses_whitespace_and_punctuation() {
        let a = "CREATE TABLE users (\n  id INTEGER PRIMARY KEY ,\n  email TEXT\n)";
        assert_eq!(
            normalize(a),
            "CREATE TABLE users(id INTEGER PRIMARY KEY,email TEXT)"
        );
    }

    #[test]
    fn test_strips_line_comments() {
        let a = "CREATE TABLE t( -- user table\n  id INTEGER -- pk\n)";
        assert_eq!(normalize(a), "CREATE TABLE t(id INTEGER)");
    }

    #[test]
    fn test_unquotes_bareword_identifiers() {
        assert_eq!(
            normalize(r#"CREATE TABLE "users"("id" INTEGER)"#),
            "CREATE TABLE users(id INTEGER)"
        );
        // A quoted identifier that is not a bareword keeps its quotes.
        assert_eq!(
            normalize(r#"CREATE TABLE "user table"(id)"#),
            r#"CREATE TABLE "user table"(id)"#
        );
    }

    #[test]
    fn test_preserves_identifier_case() {
        assert_eq!(normalize("CREATE TABLE Users(Id)"), "CREATE TABLE Users(Id)");
    }

    #[test]
    fn test_idempotent() {
        let inputs = [
            "CREATE  TABLE t ( a , b )",
            "CREATE INDEX \"idx\" ON t(a) -- trailing",
            "  CREATE VIEW v AS SELECT * FROM t  ",
        ];
        for input in inputs {
            let once = normalize(input);
            assert_eq!(normalize(&once), once);
        }
    }

    #[test]
    fn test_equivalent_definitions_compare_equal() {
        assert!(normalized_eq(
            "CREATE TABLE users(id INTEGER PRIMARY KEY, email TEXT NOT NULL)",
            "CREATE TABLE \"users\" (\n  id INTEGER PRIMARY KEY,\n  email TEXT NOT NULL\n)"
        ));
        assert!(!normalized_eq(
            "CREATE TABLE users(id INTEGER)",
            "CREATE TABLE users(id TEXT)"
        ));
    }
}

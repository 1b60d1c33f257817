//! Target-schema loading from a directory of `.sql` files.

use std::path::{Path, PathBuf};

use crate::error::{DatabaseError, Result};

/// Lists the `.sql` files directly under `dir`, sorted by file name.
///
/// # Errors
///
/// Returns [`DatabaseError::IoError`] if the directory cannot be read.
pub fn list_schema_files(dir: impl AsRef<Path>) -> Result<Vec<PathBuf>> {
    let dir = dir.as_ref();
    let mut paths = Vec::new();
    for entry in std::fs::read_dir(dir)? {
        let entry = entry?;
        let path = entry.path();
        if path.extension().and_then(|e| e.to_str()) == Some("sql") {
            paths.push(path);
        }
    }
    paths.sort();
    Ok(paths)
}

/// Concatenates every `.sql` file under `dir` into one target schema text.
///
/// Files are joined in file-name order so that multi-file schemas have a
/// stable definition order.
///
/// # Errors
///
/// Returns [`DatabaseError::NoSchemaFiles`] if the directory holds no
/// `.sql` files, or [`DatabaseError::IoError`] on read failure.
pub fn load_schema_sql(dir: impl AsRef<Path>) -> Result<String> {
    let dir = dir.as_ref();
    let paths = list_schema_files(dir)?;
    if paths.is_empty() {
        return Err(DatabaseError::NoSchemaFiles(dir.to_path_buf()));
    }

    let mut sql = String::new();
    for path in &paths {
        let content = std::fs::read_to_string(path)?;
        if !sql.is_empty() && !sql.ends_with('\n') {
            sql.push('\n');
        }
        sql.push_str(&content);
    }
    Ok(sql)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_load_schema_sql_concatenates_in_name_order() {
        let dir = tempfile::tempdir().unwrap();
        std::fs::write(dir.path().join("02-posts.sql"), "CREATE TABLE posts(id);").unwrap();
        std::fs::write(dir.path().join("01-users.sql"), "CREATE TABLE users(id);").unwrap();
        std::fs::write(dir.path().join("ignore.txt"), "nope").unwrap();

        let sql = load_schema_sql(dir.path()).unwrap();
        let users = sql.find("users").unwrap();
        let posts = sql.find("posts").unwrap();
        assert!(users < posts);
    }

    #[test]
    fn test_load_schema_sql_empty_dir_errors() {
        let dir = tempfile::tempdir().unwrap();
        let err = load_schema_sql(dir.path()).unwrap_err();
        assert!(matches!(err, DatabaseError::NoSchemaFiles(_)));
    }
}

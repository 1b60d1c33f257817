//! Versioned migration files: naming, loading, and generation.
//!
//! A migration file is named `<version><sep><name>.sql` where the version
//! is a run of digits, the separator is `-` or `_`, and the name is
//! `[a-zA-Z0-9_-]+`. Files that do not match are ignored so that editor
//! droppings and README files can live alongside migrations.

use std::path::{Path, PathBuf};
use std::sync::LazyLock;

use regex::Regex;
use sha2::{Digest, Sha256};

use crate::error::{DatabaseError, Result};

static FILE_NAME_RE: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"^(\d+)[-_]([a-zA-Z0-9_-]+)\.sql$").expect("static regex must compile")
});

static NAME_RE: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"^[a-zA-Z0-9_-]+$").expect("static regex must compile"));

/// A migration file read from disk.
///
/// Ordering and equality of migrations are driven by `version`; `name`
/// is the stable identity the runner's bookkeeping table is keyed by.
#[derive(Debug, Clone)]
pub struct MigrationFile {
    /// Numeric version from the file-name prefix.
    pub version: i64,
    /// Human-readable name from the file name.
    pub name: String,
    /// Full path of the file.
    pub path: PathBuf,
    /// Literal file content. Hashed verbatim for tamper detection.
    pub content: String,
}

/// Parses a migration file name into `(version, name)`.
///
/// Returns `None` for names that do not follow the
/// `<version>[-_]<name>.sql` convention.
pub fn parse_file_name(file_name: &str) -> Option<(i64, String)> {
    let caps = FILE_NAME_RE.captures(file_name)?;
    let version: i64 = caps[1].parse().ok()?;
    Some((version, caps[2].to_string()))
}

/// Loads every migration file under `dir`, ascending by version.
///
/// A directory that does not exist yields an empty list — a project
/// without a migrations directory simply has no migrations yet.
///
/// # Errors
///
/// Returns [`DatabaseError::DuplicateVersion`] if two files carry the
/// same numeric prefix, or [`DatabaseError::IoError`] if a matching file
/// cannot be read.
pub fn load_migrations(dir: impl AsRef<Path>) -> Result<Vec<MigrationFile>> {
    let dir = dir.as_ref();
    if !dir.is_dir() {
        return Ok(Vec::new());
    }

    let mut files = Vec::new();
    for entry in std::fs::read_dir(dir)? {
        let entry = entry?;
        let path = entry.path();
        let Some(file_name) = path.file_name().and_then(|n| n.to_str()) else {
            continue;
        };
        let Some((version, name)) = parse_file_name(file_name) else {
            continue;
        };
        let content = std::fs::read_to_string(&path)?;
        files.push(MigrationFile {
            version,
            name,
            path,
            content,
        });
    }

    files.sort_by(|a, b| a.version.cmp(&b.version).then_with(|| a.name.cmp(&b.name)));

    for pair in files.windows(2) {
        if pair[0].version == pair[1].version {
            return Err(DatabaseError::DuplicateVersion {
                version: pair[0].version,
                first: pair[0].file_name(),
                second: pair[1].file_name(),
            });
        }
    }

    Ok(files)
}

impl MigrationFile {
    fn file_name(&self) -> String {
        self.path
            .file_name()
            .map(|n| n.to_string_lossy().into_owned())
            .unwrap_or_default()
    }
}

/// Computes the SHA-256 hex digest of raw bytes.
///
/// The runner hashes each migration file's literal content with this and
/// refuses to re-run a file whose recorded hash no longer matches.
pub fn sha256_hex(bytes: &[u8]) -> String {
    let hash = Sha256::digest(bytes);
    format!("{:x}", hash)
}

/// Returns the next sequential version after the given migrations.
///
/// Starts at 1 for an empty set.
pub fn next_version(files: &[MigrationFile]) -> i64 {
    files.iter().map(|f| f.version).max().unwrap_or(0) + 1
}

/// Builds a zero-padded sequential file name, e.g. `0007-add-users.sql`.
///
/// # Errors
///
/// Returns [`DatabaseError::InvalidName`] if `name` contains characters
/// outside `[a-zA-Z0-9_-]`.
pub fn sequential_file_name(version: i64, name: &str) -> Result<String> {
    validate_name(name)?;
    Ok(format!("{version:04}-{name}.sql"))
}

/// Builds a Unix-seconds-prefixed file name, e.g. `1722600000-add-users.sql`.
///
/// # Errors
///
/// Returns [`DatabaseError::InvalidName`] if `name` contains characters
/// outside `[a-zA-Z0-9_-]`.
pub fn timestamp_file_name(name: &str) -> Result<String> {
    validate_name(name)?;
    Ok(format!("{}-{name}.sql", chrono::Utc::now().timestamp()))
}

/// Writes a new migration file under `dir`, creating the directory if
/// needed, and returns its path.
///
/// # Errors
///
/// Returns [`DatabaseError::IoError`] if the directory or file cannot be
/// written.
pub fn write_migration(dir: impl AsRef<Path>, file_name: &str, sql: &str) -> Result<PathBuf> {
    let dir = dir.as_ref();
    std::fs::create_dir_all(dir)?;
    let path = dir.join(file_name);
    std::fs::write(&path, sql)?;
    Ok(path)
}

fn validate_name(name: &str) -> Result<()> {
    if NAME_RE.is_match(name) {
        Ok(())
    } else {
        Err(DatabaseError::InvalidName(name.to_string()))
    }
}

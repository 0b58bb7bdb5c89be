//! `SQLite` registries of a simulated-camera data repository.
//!
//! Three kinds of registry exist: the input registry of raw amplifier
//! files, the calibration registry and the defect registry. Each is a
//! single `SQLite` file built in one pass by a builder in this module's
//! children and queried afterwards.

pub mod calib;
pub mod defect;
pub mod migrations;
pub mod raw;
pub mod schema;

use std::fmt;
use std::path::{Path, PathBuf};
use std::str::FromStr;

use rusqlite::Connection;
use serde::Serialize;
use tracing::{debug, info, warn};

use crate::error::{Error, Result};
use crate::mapper::Dataset;

pub use calib::build_calib_registry;
pub use defect::{build_defect_registry, DefectRow};
pub use raw::{build_input_registry, RawRow, ScanCounts, VisitRow};

/// What a registry indexes.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, clap::ValueEnum)]
#[serde(rename_all = "lowercase")]
pub enum RegistryKind {
    /// Raw amplifier files.
    Raw,
    /// Bias, dark, flat and fringe frames.
    Calib,
    /// Defect lists.
    Defect,
}

impl RegistryKind {
    /// Name stored in the registry.
    #[must_use]
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Raw => "raw",
            Self::Calib => "calib",
            Self::Defect => "defect",
        }
    }

    /// Conventional file name.
    #[must_use]
    pub fn default_file_name(self) -> &'static str {
        match self {
            Self::Raw => "registry.sqlite3",
            Self::Calib => "calibRegistry.sqlite3",
            Self::Defect => "defectRegistry.sqlite3",
        }
    }

    /// `CREATE` statements for the tables of this kind.
    ///
    /// # Errors
    ///
    /// Returns an error only if a built-in calibration template is malformed.
    pub fn schema_statements(self) -> Result<Vec<String>> {
        let owned = |stmts: &[&str]| stmts.iter().map(|s| (*s).to_string()).collect();
        Ok(match self {
            Self::Raw => owned(schema::RAW_SCHEMA),
            Self::Defect => owned(schema::DEFECT_SCHEMA),
            Self::Calib => {
                let mut stmts = Vec::new();
                for dataset in Dataset::CALIBS {
                    stmts.extend(schema::calib_tables(dataset, &dataset.path_template()?));
                }
                stmts
            }
        })
    }
}

impl fmt::Display for RegistryKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for RegistryKind {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self> {
        match s.to_ascii_lowercase().as_str() {
            "raw" => Ok(Self::Raw),
            "calib" => Ok(Self::Calib),
            "defect" => Ok(Self::Defect),
            _ => Err(Error::id_format("registry kind", s)),
        }
    }
}

/// An open registry.
#[derive(Debug)]
pub struct Registry {
    path: PathBuf,
    conn: Connection,
    kind: RegistryKind,
}

impl Registry {
    /// Open or create a registry at the given path.
    ///
    /// Creates the parent directories and database file if they don't
    /// exist, and the tables of `kind` if they are missing.
    ///
    /// # Errors
    ///
    /// Returns an error if the database cannot be opened or schema
    /// initialization fails.
    pub fn open(path: impl AsRef<Path>, kind: RegistryKind) -> Result<Self> {
        let path = path.as_ref().to_path_buf();

        if let Some(parent) = path.parent() {
            if !parent.as_os_str().is_empty() && !parent.exists() {
                std::fs::create_dir_all(parent).map_err(|source| Error::DirectoryCreate {
                    path: parent.to_path_buf(),
                    source,
                })?;
            }
        }

        debug!("Opening {kind} registry at {}", path.display());
        let conn = Connection::open(&path).map_err(|source| Error::DatabaseOpen {
            path: path.clone(),
            source,
        })?;
        migrations::initialize_schema(&conn, kind)?;

        info!("Registry opened at {}", path.display());
        Ok(Self { path, conn, kind })
    }

    /// Create a new registry, refusing to overwrite an existing file.
    ///
    /// # Errors
    ///
    /// Returns [`Error::RegistryExists`] if `path` exists.
    pub fn create(path: impl AsRef<Path>, kind: RegistryKind) -> Result<Self> {
        let path = path.as_ref();
        if path.exists() {
            return Err(Error::RegistryExists {
                path: path.to_path_buf(),
            });
        }
        Self::open(path, kind)
    }

    /// Create a new registry, deleting any existing file first.
    ///
    /// # Errors
    ///
    /// Returns an error if the old file cannot be removed or the new one
    /// cannot be created.
    pub fn replace(path: impl AsRef<Path>, kind: RegistryKind) -> Result<Self> {
        let path = path.as_ref();
        if path.exists() {
            info!("Deleting existing {}", path.display());
            std::fs::remove_file(path)?;
        }
        info!("Creating {}", path.display());
        Self::open(path, kind)
    }

    /// Open a registry that must already exist.
    ///
    /// # Errors
    ///
    /// Returns [`Error::RegistryMissing`] if `path` does not exist.
    pub fn open_existing(path: impl AsRef<Path>, kind: RegistryKind) -> Result<Self> {
        let path = path.as_ref();
        if !path.exists() {
            return Err(Error::RegistryMissing {
                path: path.to_path_buf(),
            });
        }
        Self::open(path, kind)
    }

    /// Create an in-memory registry for testing and dry runs.
    ///
    /// # Errors
    ///
    /// Returns an error if the in-memory database cannot be created.
    pub fn open_in_memory(kind: RegistryKind) -> Result<Self> {
        let conn = Connection::open_in_memory().map_err(|source| Error::DatabaseOpen {
            path: PathBuf::from(":memory:"),
            source,
        })?;
        migrations::initialize_schema(&conn, kind)?;
        Ok(Self {
            path: PathBuf::from(":memory:"),
            conn,
            kind,
        })
    }

    /// Path to the database file.
    #[must_use]
    pub fn path(&self) -> &Path {
        &self.path
    }

    /// What this registry indexes.
    #[must_use]
    pub fn kind(&self) -> RegistryKind {
        self.kind
    }

    /// Names of the data tables, excluding bookkeeping.
    ///
    /// # Errors
    ///
    /// Returns an error if the database operation fails.
    pub fn table_names(&self) -> Result<Vec<String>> {
        let mut stmt = self.conn.prepare(
            r"
            SELECT name FROM sqlite_master
            WHERE type = 'table' AND name NOT IN ('registry_info', 'sqlite_sequence')
            ORDER BY name
            ",
        )?;
        let names = stmt
            .query_map([], |row| row.get(0))?
            .collect::<std::result::Result<Vec<String>, _>>()?;
        Ok(names)
    }

    /// Count the rows of a table.
    ///
    /// # Errors
    ///
    /// Returns [`Error::UnknownTable`] if the registry has no such table.
    pub fn count(&self, table: &str) -> Result<i64> {
        if !self.table_names()?.iter().any(|t| t == table) {
            return Err(Error::UnknownTable(table.to_string()));
        }
        let count: i64 = self
            .conn
            .query_row(&format!("SELECT COUNT(*) FROM \"{table}\""), [], |row| {
                row.get(0)
            })?;
        Ok(count)
    }

    /// Registry statistics.
    ///
    /// # Errors
    ///
    /// Returns an error if the database operation fails.
    pub fn stats(&self) -> Result<RegistryStats> {
        let mut tables = Vec::new();
        for name in self.table_names()? {
            let rows = self.count(&name)?;
            tables.push(TableCount { name, rows });
        }

        let db_size_bytes = if self.path.to_string_lossy() == ":memory:" {
            0
        } else {
            std::fs::metadata(&self.path).map(|m| m.len()).unwrap_or(0)
        };

        Ok(RegistryStats {
            kind: self.kind,
            schema_version: migrations::get_schema_version(&self.conn)?,
            tables,
            db_size_bytes,
        })
    }
}

/// Row count of one table.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct TableCount {
    /// Table name.
    pub name: String,
    /// Number of rows.
    pub rows: i64,
}

/// Statistics about a registry.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct RegistryStats {
    /// What the registry indexes.
    pub kind: RegistryKind,
    /// Recorded schema version.
    pub schema_version: i32,
    /// Row counts of the data tables.
    pub tables: Vec<TableCount>,
    /// Size of the database file in bytes.
    pub db_size_bytes: u64,
}

/// `"22"` becomes `"2,2"` and `"22A"` becomes `"2,2,A"`.
pub(crate) fn comma_form(path_form: &str) -> String {
    let mut out = String::with_capacity(path_form.len() * 2);
    for (i, c) in path_form.chars().enumerate() {
        if i > 0 {
            out.push(',');
        }
        out.push(c);
    }
    out
}

/// Paths under `dir` matching `pattern`. Unreadable entries are logged.
pub(crate) fn glob_under(dir: &Path, pattern: &str) -> Result<Vec<PathBuf>> {
    let full = format!("{}/{pattern}", glob::Pattern::escape(&dir.to_string_lossy()));
    let mut paths = Vec::new();
    for entry in glob::glob(&full)? {
        match entry {
            Ok(path) => paths.push(path),
            Err(e) => warn!("Error accessing {}: {e}", e.path().display()),
        }
    }
    Ok(paths)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_open_in_memory() {
        let registry = Registry::open_in_memory(RegistryKind::Raw).unwrap();
        assert_eq!(registry.path(), Path::new(":memory:"));
        assert_eq!(registry.kind(), RegistryKind::Raw);
        assert_eq!(
            registry.table_names().unwrap(),
            vec!["raw", "raw_skyTile", "raw_visit"]
        );
    }

    #[test]
    fn test_count_unknown_table() {
        let registry = Registry::open_in_memory(RegistryKind::Defect).unwrap();
        assert_eq!(registry.count("defect").unwrap(), 0);
        let err = registry.count("raw; DROP TABLE defect").unwrap_err();
        assert!(matches!(err, Error::UnknownTable(_)));
    }

    #[test]
    fn test_create_refuses_existing() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("registry.sqlite3");
        drop(Registry::create(&path, RegistryKind::Raw).unwrap());
        let err = Registry::create(&path, RegistryKind::Raw).unwrap_err();
        assert!(matches!(err, Error::RegistryExists { .. }));
    }

    #[test]
    fn test_replace_starts_fresh() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("defectRegistry.sqlite3");
        std::fs::write(&path, b"not a database").unwrap();
        let registry = Registry::replace(&path, RegistryKind::Defect).unwrap();
        assert_eq!(registry.count("defect").unwrap(), 0);
    }

    #[test]
    fn test_open_existing_requires_file() {
        let dir = tempfile::tempdir().unwrap();
        let err = Registry::open_existing(dir.path().join("none.sqlite3"), RegistryKind::Raw)
            .unwrap_err();
        assert!(matches!(err, Error::RegistryMissing { .. }));
    }

    #[test]
    fn test_open_creates_parent_dirs() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("a").join("b").join("registry.sqlite3");
        let registry = Registry::open(&path, RegistryKind::Raw).unwrap();
        assert!(path.exists());
        let stats = registry.stats().unwrap();
        assert_eq!(stats.schema_version, migrations::CURRENT_VERSION);
        assert!(stats.db_size_bytes > 0);
        assert_eq!(stats.tables.len(), 3);
    }

    #[test]
    fn test_kind_round_trip() {
        for kind in [RegistryKind::Raw, RegistryKind::Calib, RegistryKind::Defect] {
            assert_eq!(kind.as_str().parse::<RegistryKind>().unwrap(), kind);
        }
        assert!("skytile".parse::<RegistryKind>().is_err());
        assert_eq!(RegistryKind::Calib.default_file_name(), "calibRegistry.sqlite3");
    }

    #[test]
    fn test_comma_form() {
        assert_eq!(comma_form("22"), "2,2");
        assert_eq!(comma_form("22A"), "2,2,A");
        assert_eq!(comma_form(""), "");
    }
}

//! Registry schema versioning.
//!
//! Every registry carries a `registry_info` table holding its kind and
//! schema version. Registries written by older tools have no such table;
//! opening one adds it and records the current version.

use rusqlite::{Connection, OptionalExtension};

use crate::error::{Error, Result};

use super::schema::CREATE_REGISTRY_INFO_TABLE;
use super::RegistryKind;

/// The current schema version.
pub const CURRENT_VERSION: i32 = 1;

const VERSION_KEY: &str = "schema_version";
const KIND_KEY: &str = "kind";

/// Create the tables of a registry kind and bring its schema up to date.
///
/// # Errors
///
/// Returns an error if schema creation or migration fails, or if the
/// registry was created as a different kind.
pub fn initialize_schema(conn: &Connection, kind: RegistryKind) -> Result<()> {
    conn.execute(CREATE_REGISTRY_INFO_TABLE, [])?;
    for statement in kind.schema_statements()? {
        conn.execute(&statement, [])?;
    }

    match get_info(conn, KIND_KEY)? {
        Some(stored) if stored != kind.as_str() => {
            return Err(Error::DatabaseMigration {
                message: format!("registry holds {stored} data, not {}", kind.as_str()),
            });
        }
        Some(_) => {}
        None => set_info(conn, KIND_KEY, kind.as_str())?,
    }

    let version = get_schema_version(conn)?;
    if version < CURRENT_VERSION {
        run_migrations(conn, version)?;
    }
    Ok(())
}

fn get_info(conn: &Connection, key: &str) -> Result<Option<String>> {
    Ok(conn
        .query_row(
            "SELECT value FROM registry_info WHERE key = ?1",
            [key],
            |row| row.get(0),
        )
        .optional()?)
}

fn set_info(conn: &Connection, key: &str, value: &str) -> Result<()> {
    conn.execute(
        "INSERT OR REPLACE INTO registry_info (key, value) VALUES (?1, ?2)",
        (key, value),
    )?;
    Ok(())
}

/// The stored schema version; 0 when none is recorded.
///
/// # Errors
///
/// Returns an error if the stored version is not an integer.
pub fn get_schema_version(conn: &Connection) -> Result<i32> {
    match get_info(conn, VERSION_KEY)? {
        Some(value) => value.parse().map_err(|_| Error::DatabaseMigration {
            message: format!("invalid schema version: {value}"),
        }),
        None => Ok(0),
    }
}

fn set_schema_version(conn: &Connection, version: i32) -> Result<()> {
    set_info(conn, VERSION_KEY, &version.to_string())
}

fn run_migrations(conn: &Connection, from_version: i32) -> Result<()> {
    let mut current = from_version;
    while current < CURRENT_VERSION {
        current += 1;
        run_migration(conn, current)?;
    }
    set_schema_version(conn, CURRENT_VERSION)
}

fn run_migration(conn: &Connection, version: i32) -> Result<()> {
    match version {
        1 => set_schema_version(conn, 1),
        _ => Err(Error::DatabaseMigration {
            message: format!("unknown migration version: {version}"),
        }),
    }
}

//! `SQLite` schema definitions for the registries.
//!
//! Column names follow the registries read by downstream data-access
//! tools (`taiObs`, `expTime`, `ccdSerial`, ...), so they are camelCase.

use crate::mapper::Dataset;
use crate::template::{FieldKind, PathTemplate};

/// Bookkeeping table present in every registry.
pub const CREATE_REGISTRY_INFO_TABLE: &str = r"
CREATE TABLE IF NOT EXISTS registry_info (
    key TEXT PRIMARY KEY,
    value TEXT NOT NULL
)
";

/// One row per raw amplifier snap.
pub const CREATE_RAW_TABLE: &str = r"
CREATE TABLE IF NOT EXISTS raw (
    id INTEGER PRIMARY KEY AUTOINCREMENT,
    visit INT,
    filter TEXT,
    snap INT,
    raft TEXT,
    sensor TEXT,
    channel TEXT,
    taiObs TEXT,
    expTime DOUBLE
)
";

/// Sky tiles overlapped by each raw row.
pub const CREATE_RAW_SKYTILE_TABLE: &str = r"
CREATE TABLE IF NOT EXISTS raw_skyTile (
    id INTEGER,
    skyTile INTEGER
)
";

/// One row per visit, derived from snap 0 of `raw`.
pub const CREATE_RAW_VISIT_TABLE: &str = r"
CREATE TABLE IF NOT EXISTS raw_visit (
    visit INT,
    filter TEXT,
    taiObs TEXT,
    expTime DOUBLE,
    UNIQUE(visit)
)
";

/// Uniqueness of raw rows. Created once the table is filled.
pub const CREATE_RAW_UNIQUE_INDEX: &str = r"
CREATE UNIQUE INDEX IF NOT EXISTS uq_raw ON raw (visit, snap, raft, sensor, channel)
";

/// Lookup of sky tiles by raw row.
pub const CREATE_SKYTILE_ID_INDEX: &str = r"
CREATE INDEX IF NOT EXISTS ix_skyTile_id ON raw_skyTile (id)
";

/// Lookup of raw rows by sky tile.
pub const CREATE_SKYTILE_TILE_INDEX: &str = r"
CREATE INDEX IF NOT EXISTS ix_skyTile_tile ON raw_skyTile (skyTile)
";

/// Defect files and the detectors they apply to.
pub const CREATE_DEFECT_TABLE: &str = r"
CREATE TABLE IF NOT EXISTS defect (
    id INTEGER PRIMARY KEY AUTOINCREMENT,
    path TEXT,
    version INT,
    ccd TEXT,
    ccdSerial TEXT,
    validStart TEXT,
    validEnd TEXT
)
";

/// Tables of an input (raw) registry, in creation order.
pub const RAW_SCHEMA: &[&str] = &[
    CREATE_RAW_TABLE,
    CREATE_RAW_SKYTILE_TABLE,
    CREATE_RAW_VISIT_TABLE,
];

/// Indexes built after a raw registry is filled.
pub const RAW_INDEXES: &[&str] = &[
    CREATE_RAW_UNIQUE_INDEX,
    CREATE_SKYTILE_ID_INDEX,
    CREATE_SKYTILE_TILE_INDEX,
];

/// Tables of a defect registry.
pub const DEFECT_SCHEMA: &[&str] = &[CREATE_DEFECT_TABLE];

fn column_type(kind: FieldKind) -> &'static str {
    match kind {
        FieldKind::Integer | FieldKind::Hex => "INT",
        FieldKind::Float => "FLOAT",
        FieldKind::Text => "TEXT",
    }
}

/// `CREATE TABLE` statements for a calibration dataset: one column per
/// template field plus the image size, and a `<name>_md` table holding
/// every header card.
#[must_use]
pub fn calib_tables(dataset: Dataset, template: &PathTemplate) -> [String; 2] {
    let name = dataset.as_str();
    let mut columns = String::from("id INTEGER PRIMARY KEY AUTOINCREMENT");
    for field in template.unique_fields() {
        columns.push_str(&format!(", {} {}", field.key, column_type(field.kind)));
    }
    columns.push_str(", width INT, height INT");
    [
        format!("CREATE TABLE IF NOT EXISTS {name} ({columns})"),
        format!(
            "CREATE TABLE IF NOT EXISTS {name}_md (id INTEGER REFERENCES {name}(id), key TEXT, value TEXT)"
        ),
    ]
}

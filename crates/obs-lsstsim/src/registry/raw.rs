//! The input registry of raw amplifier files.
//!
//! The builder walks a repository laid out as
//!
//! ```text
//! raw/v<visit>-f<filter>/E00<snap>/R<xy>/S<xy>/imsim_<visit>_R<xy>_S<xy>_C<xy>_E00<snap>.fits[.gz]
//! ```
//!
//! and records one `raw` row per file. `raw_visit` is derived from the
//! snap 0 rows when the scan ends, whether or not it succeeded.

use std::collections::HashSet;
use std::ops::AddAssign;
use std::path::{Path, PathBuf};
use std::sync::LazyLock;

use regex::Regex;
use rusqlite::types::Value as SqlValue;
use rusqlite::{params, params_from_iter};
use serde::Serialize;
use tracing::{debug, info, warn};

use super::{comma_form, glob_under, Registry, RegistryKind};
use crate::error::{Error, Result};
use crate::fits;
use crate::ids::DataId;
use crate::time;

static RAW_PATH_RE: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(
        r"v(\d+)-f(\w)/E00(\d)/R(\d)(\d)/S(\d)(\d)/imsim_(\d+)_R(\d)(\d)_S(\d)(\d)_C(\d)(\d)_E00(\d)\.fits",
    )
    .expect("static regex is valid")
});

/// One raw amplifier snap.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct RawRow {
    /// Visit number.
    pub visit: u64,
    /// Filter name.
    pub filter: String,
    /// Snap, 0 or 1.
    pub snap: i64,
    /// Raft, `"x,y"`.
    pub raft: String,
    /// Sensor, `"x,y"`.
    pub sensor: String,
    /// Channel, `"x,y"`.
    pub channel: String,
    /// UTC start of the exposure.
    pub tai_obs: Option<String>,
    /// Exposure time in seconds.
    pub exp_time: Option<f64>,
}

impl RawRow {
    /// Key identifying the file, e.g. `85471048_Fr_E0_R2,2_S1,1_C1,4`.
    #[must_use]
    pub fn key(&self) -> String {
        format!(
            "{}_F{}_E{}_R{}_S{}_C{}",
            self.visit, self.filter, self.snap, self.raft, self.sensor, self.channel
        )
    }

    fn from_row(row: &rusqlite::Row) -> rusqlite::Result<Self> {
        Ok(Self {
            visit: row.get::<_, i64>(0)? as u64,
            filter: row.get(1)?,
            snap: row.get(2)?,
            raft: row.get(3)?,
            sensor: row.get(4)?,
            channel: row.get(5)?,
            tai_obs: row.get(6)?,
            exp_time: row.get(7)?,
        })
    }
}

/// One visit.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct VisitRow {
    /// Visit number.
    pub visit: u64,
    /// Filter name.
    pub filter: String,
    /// UTC start of the exposure.
    pub tai_obs: Option<String>,
    /// Exposure time in seconds.
    pub exp_time: Option<f64>,
}

const RAW_COLUMNS: &str = "visit, filter, snap, raft, sensor, channel, taiObs, expTime";

impl Registry {
    /// Insert a raw row. Returns `false` if an identical row is already
    /// present.
    ///
    /// # Errors
    ///
    /// Returns an error if the database operation fails.
    pub fn insert_raw(&self, row: &RawRow) -> Result<bool> {
        if self.contains_raw(row)? {
            return Ok(false);
        }
        self.conn.execute(
            &format!("INSERT INTO raw ({RAW_COLUMNS}) VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8)"),
            params![
                row.visit as i64,
                row.filter,
                row.snap,
                row.raft,
                row.sensor,
                row.channel,
                row.tai_obs,
                row.exp_time,
            ],
        )?;
        debug!("Inserted raw row {}", row.key());
        Ok(true)
    }

    /// Whether a row with the same visit, snap, raft, sensor and channel
    /// exists.
    ///
    /// # Errors
    ///
    /// Returns an error if the database operation fails.
    pub fn contains_raw(&self, row: &RawRow) -> Result<bool> {
        let count: i64 = self.conn.query_row(
            r"
            SELECT COUNT(*) FROM raw
            WHERE visit = ?1 AND snap = ?2 AND raft = ?3 AND sensor = ?4 AND channel = ?5
            ",
            params![row.visit as i64, row.snap, row.raft, row.sensor, row.channel],
            |r| r.get(0),
        )?;
        Ok(count > 0)
    }

    /// Keys of every raw row.
    ///
    /// # Errors
    ///
    /// Returns an error if the database operation fails.
    pub fn raw_keys(&self) -> Result<HashSet<String>> {
        let mut stmt = self.conn.prepare(&format!("SELECT {RAW_COLUMNS} FROM raw"))?;
        let keys = stmt
            .query_map([], RawRow::from_row)?
            .map(|r| r.map(|row| row.key()))
            .collect::<std::result::Result<HashSet<_>, _>>()?;
        Ok(keys)
    }

    /// Raw rows matching every key present in a data ID.
    ///
    /// Aliases such as `ccdName` or `ampName` are resolved first.
    ///
    /// # Errors
    ///
    /// Returns an error if the data ID is malformed or the query fails.
    pub fn lookup_raw(&self, data_id: &DataId) -> Result<Vec<RawRow>> {
        data_id.validate()?;
        let id = data_id.transform()?;

        let mut clauses = Vec::new();
        let mut values: Vec<SqlValue> = Vec::new();
        let mut add = |column: &str, value: SqlValue| {
            values.push(value);
            clauses.push(format!("{column} = ?{}", values.len()));
        };
        if let Some(visit) = id.visit {
            add("visit", SqlValue::Integer(visit as i64));
        }
        if let Some(snap) = id.snap {
            add("snap", SqlValue::Integer(snap));
        }
        if let Some(filter) = &id.filter {
            add("filter", SqlValue::Text(filter.clone()));
        }
        for (column, value) in [("raft", &id.raft), ("sensor", &id.sensor), ("channel", &id.channel)] {
            if let Some(v) = value {
                add(column, SqlValue::Text(comma_form(v)));
            }
        }

        let mut sql = format!("SELECT {RAW_COLUMNS} FROM raw");
        if !clauses.is_empty() {
            sql.push_str(" WHERE ");
            sql.push_str(&clauses.join(" AND "));
        }
        sql.push_str(" ORDER BY visit, snap, raft, sensor, channel");

        let mut stmt = self.conn.prepare(&sql)?;
        let rows = stmt
            .query_map(params_from_iter(values), RawRow::from_row)?
            .collect::<std::result::Result<Vec<_>, _>>()?;
        Ok(rows)
    }

    /// Every visit, in visit order.
    ///
    /// # Errors
    ///
    /// Returns an error if the database operation fails.
    pub fn visits(&self) -> Result<Vec<VisitRow>> {
        let mut stmt = self
            .conn
            .prepare("SELECT visit, filter, taiObs, expTime FROM raw_visit ORDER BY visit")?;
        let rows = stmt
            .query_map([], |row| {
                Ok(VisitRow {
                    visit: row.get::<_, i64>(0)? as u64,
                    filter: row.get(1)?,
                    tai_obs: row.get(2)?,
                    exp_time: row.get(3)?,
                })
            })?
            .collect::<std::result::Result<Vec<_>, _>>()?;
        Ok(rows)
    }

    /// Rebuild `raw_visit` from the snap 0 rows of `raw`. Returns the
    /// number of visits.
    ///
    /// # Errors
    ///
    /// Returns an error if the database operation fails.
    pub fn rebuild_raw_visits(&self) -> Result<usize> {
        let tx = self.conn.unchecked_transaction()?;
        tx.execute("DELETE FROM raw_visit", [])?;
        let n = tx.execute(
            r"
            INSERT OR IGNORE INTO raw_visit
            SELECT DISTINCT visit, filter, taiObs, expTime FROM raw
            WHERE snap = 0
            ORDER BY visit
            ",
            [],
        )?;
        tx.commit()?;
        debug!("Rebuilt raw_visit with {n} visits");
        Ok(n)
    }

    /// Create the uniqueness and sky-tile indexes.
    ///
    /// # Errors
    ///
    /// Returns an error if an index cannot be built, e.g. because `raw`
    /// holds duplicate rows.
    pub fn create_raw_indexes(&self) -> Result<()> {
        for statement in super::schema::RAW_INDEXES {
            self.conn.execute(statement, [])?;
        }
        Ok(())
    }
}

/// Per-directory tallies of a registry scan.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct ScanCounts {
    /// Files added.
    pub processed: usize,
    /// Files already registered.
    pub skipped: usize,
    /// Files whose paths follow no known convention.
    pub unrecognized: usize,
    /// Files whose headers could not be read.
    pub failed: usize,
}

impl AddAssign for ScanCounts {
    fn add_assign(&mut self, other: Self) {
        self.processed += other.processed;
        self.skipped += other.skipped;
        self.unrecognized += other.unrecognized;
        self.failed += other.failed;
    }
}

/// Parse a raw file path into a row without header values.
///
/// Returns `None` if the path does not follow the raw layout or its
/// directory and file names disagree.
#[must_use]
pub fn parse_raw_path(path: &str) -> Option<RawRow> {
    let caps = RAW_PATH_RE.captures(path)?;
    let agree = [(8, 1), (9, 4), (10, 5), (11, 6), (12, 7), (15, 3)];
    if agree.iter().any(|&(a, b)| caps[a] != caps[b]) {
        return None;
    }
    Some(RawRow {
        visit: caps[1].parse().ok()?,
        filter: caps[2].to_string(),
        snap: caps[3].parse().ok()?,
        raft: format!("{},{}", &caps[4], &caps[5]),
        sensor: format!("{},{}", &caps[6], &caps[7]),
        channel: format!("{},{}", &caps[13], &caps[14]),
        tai_obs: None,
        exp_time: None,
    })
}

/// Build an input registry from raw directory trees.
///
/// Each directory is either a repository root with a `raw/` subdirectory
/// or a single visit directory. With an input registry, the output starts
/// as a copy of it and rows already present are skipped.
///
/// # Errors
///
/// Returns [`Error::RegistryExists`] if `output` exists,
/// [`Error::RegistryMissing`] if `input` is given but absent, or a
/// database error. Unrecognized files and unreadable headers are logged
/// and counted, not returned.
pub fn build_input_registry(
    dirs: &[PathBuf],
    input: Option<&Path>,
    output: &Path,
) -> Result<ScanCounts> {
    if output.exists() {
        return Err(Error::RegistryExists {
            path: output.to_path_buf(),
        });
    }
    if let Some(input) = input {
        if !input.exists() {
            return Err(Error::RegistryMissing {
                path: input.to_path_buf(),
            });
        }
        std::fs::copy(input, output)?;
    }

    let registry = Registry::open(output, RegistryKind::Raw)?;
    let mut done = registry.raw_keys()?;
    if !done.is_empty() {
        info!("Input registry holds {} raw rows", done.len());
    }

    let scanned = scan_dirs(&registry, dirs, &mut done);

    info!("Cleaning up...");
    let finalized = registry
        .rebuild_raw_visits()
        .and_then(|visits| registry.create_raw_indexes().map(|()| visits));

    let counts = scanned?;
    let visits = finalized?;
    info!(
        processed = counts.processed,
        skipped = counts.skipped,
        unrecognized = counts.unrecognized,
        failed = counts.failed,
        visits,
        "Input registry written to {}",
        output.display()
    );
    Ok(counts)
}

fn scan_dirs(registry: &Registry, dirs: &[PathBuf], done: &mut HashSet<String>) -> Result<ScanCounts> {
    let mut total = ScanCounts::default();
    for dir in dirs {
        if dir.join("raw").exists() {
            for visit_dir in glob_under(&dir.join("raw"), "v*-f*")? {
                total += process_visit(registry, &visit_dir, done)?;
            }
        } else {
            total += process_visit(registry, dir, done)?;
        }
    }
    Ok(total)
}

fn process_visit(registry: &Registry, visit_dir: &Path, done: &mut HashSet<String>) -> Result<ScanCounts> {
    info!("{} ... started", visit_dir.display());
    let mut total = ScanCounts::default();
    for raft_dir in glob_under(visit_dir, "E00[01]/R[0-4][0-4]")? {
        total += process_raft(registry, &raft_dir, done)?;
    }
    info!("{} ... completed", visit_dir.display());
    Ok(total)
}

fn process_raft(registry: &Registry, raft_dir: &Path, done: &mut HashSet<String>) -> Result<ScanCounts> {
    let mut counts = ScanCounts::default();
    let files = glob_under(
        raft_dir,
        "S[0-2][0-2]/imsim_*_R[0-4][0-4]_S[0-2][0-2]_C[01][0-7]_E00[01].fits*",
    )?;

    let tx = registry.conn.unchecked_transaction()?;
    let registered = register_files(registry, &files, done, &mut counts);
    // rows added before a failure stay in the registry
    tx.commit()?;
    registered?;

    info!(
        "{} ... {} processed, {} skipped, {} unrecognized",
        raft_dir.display(),
        counts.processed,
        counts.skipped,
        counts.unrecognized
    );
    Ok(counts)
}

fn register_files(
    registry: &Registry,
    files: &[PathBuf],
    done: &mut HashSet<String>,
    counts: &mut ScanCounts,
) -> Result<()> {
    for path in files {
        let path_str = path.to_string_lossy().replace('\\', "/");
        let Some(mut row) = parse_raw_path(&path_str) else {
            warn!("Unrecognized file: {}", path.display());
            counts.unrecognized += 1;
            continue;
        };
        let key = row.key();
        if done.contains(&key) {
            counts.skipped += 1;
            continue;
        }

        match read_exposure(path) {
            Ok((tai_obs, exp_time)) => {
                row.tai_obs = Some(tai_obs);
                row.exp_time = Some(exp_time);
            }
            Err(e) if e.is_skippable() => {
                warn!("Cannot read header of {}: {e}", path.display());
                counts.failed += 1;
                continue;
            }
            Err(e) => return Err(e),
        }
        registry.insert_raw(&row)?;
        done.insert(key);
        counts.processed += 1;
    }
    Ok(())
}

/// `taiObs` and `expTime` of a raw file.
fn read_exposure(path: &Path) -> Result<(String, f64)> {
    let header = fits::read_primary_header(path)?;
    let exp_time = header.require_f64("EXPTIME")?;
    let tai_obs = time::tai_mjd_to_utc_string(header.require_f64("MJD-OBS")?)?;
    Ok((tai_obs, exp_time))
}

//! Ingest of simulator output into a data repository.
//!
//! Each file's primary header is translated into a raw registry row, the
//! file is transferred to the location its dataset template gives, and
//! the row is added to the input registry.

use std::fmt;
use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};
use tracing::{debug, info, warn};

use crate::error::{Error, Result};
use crate::fits::{self, Header, Value};
use crate::ids::DataId;
use crate::mapper::{Dataset, Mapper};
use crate::registry::{comma_form, RawRow, Registry, RegistryKind};
use crate::time;

/// Filters in index order, as written by the simulator.
const FILTERS: &str = "ugrizy";

/// How an ingested file reaches the repository.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize, clap::ValueEnum)]
#[serde(rename_all = "lowercase")]
pub enum TransferMode {
    /// Copy the file.
    Copy,
    /// Symlink to the file.
    #[default]
    Link,
    /// Move the file.
    Move,
    /// Leave the file where it is; register only.
    Skip,
}

impl fmt::Display for TransferMode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            Self::Copy => "copy",
            Self::Link => "link",
            Self::Move => "move",
            Self::Skip => "skip",
        })
    }
}

fn header_int(header: &Header, keyword: &str) -> Result<i64> {
    let value = header.require(keyword)?;
    value
        .as_i64()
        .or_else(|| value.as_str().and_then(|s| s.trim().parse().ok()))
        .ok_or_else(|| Error::InvalidHeaderValue {
            keyword: keyword.to_string(),
            value: value.to_string(),
        })
}

fn tail(s: &str, n: usize) -> &str {
    let start = s.char_indices().rev().nth(n - 1).map_or(0, |(i, _)| i);
    &s[start..]
}

/// Filter name from `FILTER`, given either as a letter or as an index
/// into `ugrizy`.
///
/// # Errors
///
/// Returns an error if the keyword is missing or names no filter.
pub fn translate_filter(header: &Header) -> Result<String> {
    let value = header.require("FILTER")?;
    let invalid = || Error::InvalidHeaderValue {
        keyword: "FILTER".to_string(),
        value: value.to_string(),
    };
    let index = match value {
        Value::Integer(i) => *i,
        Value::Text(s) => match s.trim().parse::<i64>() {
            Ok(i) => i,
            Err(_) if s.trim().len() == 1 && FILTERS.contains(s.trim()) => {
                return Ok(s.trim().to_string());
            }
            Err(_) => return Err(invalid()),
        },
        _ => return Err(invalid()),
    };
    usize::try_from(index)
        .ok()
        .and_then(|i| FILTERS.get(i..=i))
        .map(str::to_string)
        .ok_or_else(invalid)
}

/// Snap number from the `OUTFILE` keyword: the three digits before a
/// `.fits` suffix, or the last three characters otherwise.
///
/// # Errors
///
/// Returns an error if the keyword is missing or the digits don't parse.
pub fn translate_snap(header: &Header) -> Result<i64> {
    let outfile = header.require_str("OUTFILE")?;
    let digits = match outfile.strip_suffix(".fits") {
        Some(stem) => tail(stem, 3),
        None => tail(outfile, 3),
    };
    digits.parse().map_err(|_| Error::InvalidHeaderValue {
        keyword: "OUTFILE".to_string(),
        value: outfile.to_string(),
    })
}

/// Translate a simulator primary header into a raw registry row.
///
/// E-images have no `AMPID` and get the nominal channel `0,0`.
///
/// # Errors
///
/// Returns an error if a required keyword is missing or malformed.
pub fn translate_header(header: &Header) -> Result<RawRow> {
    let chip = header.require_str("CHIPID")?;
    let raft = chip.get(1..3).ok_or_else(|| Error::InvalidHeaderValue {
        keyword: "CHIPID".to_string(),
        value: chip.to_string(),
    })?;
    let channel = match header.get("AMPID").and_then(Value::as_str) {
        Some(amp) => comma_form(tail(amp, 2)),
        None => "0,0".to_string(),
    };
    let obsid = header_int(header, "OBSID")?;
    let visit = u64::try_from(obsid).map_err(|_| Error::InvalidHeaderValue {
        keyword: "OBSID".to_string(),
        value: obsid.to_string(),
    })?;
    Ok(RawRow {
        visit,
        filter: translate_filter(header)?,
        snap: translate_snap(header)?,
        raft: comma_form(raft),
        sensor: comma_form(tail(chip, 2)),
        channel,
        tai_obs: Some(time::tai_mjd_to_utc_string(header.require_f64("MJD-OBS")?)?),
        exp_time: Some(header.require_f64("EXPTIME")?),
    })
}

/// Dataset a simulator file belongs to, from its name.
///
/// # Errors
///
/// Returns [`Error::UnrecognizedFilename`] for anything but amplifier
/// (`lsst_a`) and e-image (`lsst_e`) files.
pub fn dataset_for(filename: &Path) -> Result<Dataset> {
    let name = filename.to_string_lossy();
    if name.contains("lsst_a") {
        Ok(Dataset::Raw)
    } else if name.contains("lsst_e") {
        Ok(Dataset::Eimage)
    } else {
        Err(Error::UnrecognizedFilename(filename.to_path_buf()))
    }
}

/// Repository path for an ingested file.
///
/// # Errors
///
/// Returns an error if the name is unrecognized or the row cannot fill
/// the dataset template.
pub fn destination(mapper: &Mapper, row: &RawRow, filename: &Path) -> Result<PathBuf> {
    let dataset = dataset_for(filename)?;
    let data_id = DataId {
        visit: Some(row.visit),
        snap: Some(row.snap),
        raft: Some(row.raft.clone()),
        sensor: Some(row.sensor.clone()),
        channel: Some(row.channel.clone()),
        filter: Some(row.filter.clone()),
        ..DataId::default()
    };
    mapper.path(dataset, &data_id)
}

/// Options for [`ingest`].
#[derive(Debug, Clone, Default)]
pub struct IngestOptions {
    /// How files are transferred.
    pub mode: TransferMode,
    /// Log what would happen without touching files or the registry.
    pub dry_run: bool,
    /// Start a fresh registry instead of adding to an existing one.
    pub create: bool,
    /// File name patterns of files to leave out.
    pub bad_files: Vec<String>,
    /// Data IDs of files to leave out, from [`parse_bad_id`].
    pub bad_ids: Vec<DataId>,
    /// Registry location; defaults to `registry.sqlite3` in the repository.
    pub registry: Option<PathBuf>,
}

/// Outcome of an ingest run.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct IngestSummary {
    /// Files considered after glob expansion.
    pub files: usize,
    /// Files transferred (or that would be, in a dry run).
    pub transferred: usize,
    /// Files declared bad.
    pub bad: usize,
    /// Files whose header or name could not be used.
    pub failed: usize,
    /// Files already present in the registry.
    pub already_ingested: usize,
    /// Rows added to the registry.
    pub rows_added: usize,
    /// Rows identical to one seen earlier in the run.
    pub duplicates: usize,
}

fn expand_globs(patterns: &[String]) -> Result<Vec<PathBuf>> {
    let mut files = Vec::new();
    for pattern in patterns {
        let before = files.len();
        for entry in glob::glob(pattern)? {
            match entry {
                Ok(path) => files.push(path),
                Err(e) => warn!("Error accessing {}: {e}", e.path().display()),
            }
        }
        if files.len() == before {
            warn!("No files match {pattern}");
        }
    }
    Ok(files)
}

fn is_bad_file(path: &Path, bad_files: &[glob::Pattern]) -> bool {
    let name = path.file_name().map(|n| n.to_string_lossy()).unwrap_or_default();
    bad_files.iter().any(|p| p.matches(&name))
}

/// Parse a bad data ID written as whitespace-separated `key=value` pairs,
/// e.g. `"visit=85471048 raft=2,2"`.
///
/// # Errors
///
/// Returns an error if a pair is malformed or names an unknown key.
pub fn parse_bad_id(s: &str) -> Result<DataId> {
    let pairs: Vec<&str> = s.split_whitespace().collect();
    if pairs.is_empty() {
        return Err(Error::id_format("data ID", s));
    }
    DataId::parse_pairs(&pairs)?.transform()
}

/// Whether every key a bad data ID sets agrees with the row.
fn matches_bad_id(row: &RawRow, bad: &DataId) -> bool {
    let agrees = |want: &Option<String>, have: &str| {
        want.as_deref()
            .map_or(true, |w| w.replace(',', "") == have.replace(',', ""))
    };
    bad.visit.map_or(true, |v| v == row.visit)
        && bad.snap.map_or(true, |s| s == row.snap)
        && agrees(&bad.filter, &row.filter)
        && agrees(&bad.raft, &row.raft)
        && agrees(&bad.sensor, &row.sensor)
        && agrees(&bad.channel, &row.channel)
}

fn open_registry(path: &Path, options: &IngestOptions) -> Result<Registry> {
    if options.dry_run {
        if path.exists() && !options.create {
            Registry::open_existing(path, RegistryKind::Raw)
        } else {
            Registry::open_in_memory(RegistryKind::Raw)
        }
    } else if options.create {
        Registry::replace(path, RegistryKind::Raw)
    } else {
        Registry::open(path, RegistryKind::Raw)
    }
}

/// Transfer one file. An existing destination is left alone.
///
/// # Errors
///
/// Returns an error if the destination directory cannot be created or the
/// transfer fails.
pub fn transfer(source: &Path, dest: &Path, mode: TransferMode, dry_run: bool) -> Result<bool> {
    if mode == TransferMode::Skip {
        return Ok(true);
    }
    if dry_run {
        info!("Would {mode} from {} to {}", source.display(), dest.display());
        return Ok(true);
    }
    if let Some(parent) = dest.parent() {
        std::fs::create_dir_all(parent).map_err(|source| Error::DirectoryCreate {
            path: parent.to_path_buf(),
            source,
        })?;
    }
    if dest.symlink_metadata().is_ok() {
        warn!("{} already exists; not ingesting", dest.display());
        return Ok(false);
    }
    match mode {
        TransferMode::Copy => {
            std::fs::copy(source, dest)?;
        }
        TransferMode::Link => link(&std::path::absolute(source)?, dest)?,
        TransferMode::Move => {
            if std::fs::rename(source, dest).is_err() {
                std::fs::copy(source, dest)?;
                std::fs::remove_file(source)?;
            }
        }
        TransferMode::Skip => {}
    }
    debug!("{mode}: {} -> {}", source.display(), dest.display());
    Ok(true)
}

#[cfg(unix)]
fn link(source: &Path, dest: &Path) -> std::io::Result<()> {
    std::os::unix::fs::symlink(source, dest)
}

#[cfg(not(unix))]
fn link(source: &Path, dest: &Path) -> std::io::Result<()> {
    std::fs::hard_link(source, dest)
}

/// Ingest the files matching `patterns` into the repository at `root`.
///
/// Bad files, unreadable headers and unrecognized names are logged and
/// counted. When the run ends `raw_visit` is rebuilt.
///
/// # Errors
///
/// Returns an error if a pattern is invalid, the registry cannot be
/// opened or written, or a transfer fails.
pub fn ingest(patterns: &[String], root: &Path, options: &IngestOptions) -> Result<IngestSummary> {
    let bad_files = options
        .bad_files
        .iter()
        .map(|p| glob::Pattern::new(p))
        .collect::<std::result::Result<Vec<_>, _>>()?;
    let registry_path = options
        .registry
        .clone()
        .unwrap_or_else(|| root.join(RegistryKind::Raw.default_file_name()));
    let registry = open_registry(&registry_path, options)?;
    let mapper = Mapper::new(root);

    let files = expand_globs(patterns)?;
    let mut summary = IngestSummary {
        files: files.len(),
        ..IngestSummary::default()
    };
    let mut seen: Vec<RawRow> = Vec::new();

    for file in &files {
        if is_bad_file(file, &bad_files) {
            info!("Skipping declared bad file {}", file.display());
            summary.bad += 1;
            continue;
        }

        let prepared = fits::read_primary_header(file)
            .and_then(|header| translate_header(&header))
            .and_then(|row| destination(&mapper, &row, file).map(|dest| (row, dest)));
        let (row, dest) = match prepared {
            Ok(prepared) => prepared,
            Err(e) if e.is_skippable() => {
                warn!("Cannot ingest {}: {e}", file.display());
                summary.failed += 1;
                continue;
            }
            Err(e) => return Err(e),
        };
        if options.bad_ids.iter().any(|bad| matches_bad_id(&row, bad)) {
            info!("Skipping declared bad file {}: {}", file.display(), row.key());
            summary.bad += 1;
            continue;
        }

        if registry.contains_raw(&row)? {
            warn!("{}: already ingested: {}", file.display(), row.key());
            summary.already_ingested += 1;
        }
        if transfer(file, &dest, options.mode, options.dry_run)? {
            summary.transferred += 1;
        }

        if seen.contains(&row) {
            summary.duplicates += 1;
            continue;
        }
        if options.dry_run {
            info!("Would add row {}", row.key());
        } else if registry.insert_raw(&row)? {
            summary.rows_added += 1;
        }
        seen.push(row);
    }

    if options.dry_run {
        info!("Would rebuild raw_visit");
    } else {
        let visits = registry.rebuild_raw_visits()?;
        info!("Registry now has {visits} visits");
    }
    info!(
        "Ingested {} of {} files into {}",
        summary.transferred,
        summary.files,
        root.display()
    );
    Ok(summary)
}

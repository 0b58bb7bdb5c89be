//! CLI command definitions.
//!
//! This module defines the structure of all CLI subcommands.

use std::path::PathBuf;

use clap::{Args, Subcommand};

use crate::camera::{Box2I, Extent2I, Point2I};
use crate::ingest::TransferMode;
use crate::registry::RegistryKind;

/// Data ID and packed ID commands.
#[derive(Debug, Subcommand)]
pub enum IdCommand {
    /// Resolve aliases and show the path form of a data ID
    Transform(IdArgs),

    /// Pack an amplifier exposure ID
    Amp(IdArgs),

    /// Pack a CCD exposure ID
    Ccd(IdArgs),

    /// Pack a coadd ID from tract, patch and filter
    Coadd {
        /// Leave out the filter (merged coadds)
        #[arg(long)]
        merged: bool,

        #[command(flatten)]
        id: IdArgs,
    },

    /// Unpack a CCD exposure ID
    DecodeCcd {
        /// The packed ID
        id: u64,

        /// Output as JSON
        #[arg(short, long)]
        json: bool,
    },

    /// Unpack an amplifier exposure ID
    DecodeAmp {
        /// The packed ID
        id: u64,

        /// Output as JSON
        #[arg(short, long)]
        json: bool,
    },

    /// Show where a dataset lives
    Path {
        /// Dataset type (raw, eimage, postISRCCD, calexp, bias, dark, flat, fringe)
        dataset: String,

        /// Repository root (defaults to the configured root)
        #[arg(long)]
        root: Option<PathBuf>,

        #[command(flatten)]
        id: IdArgs,
    },
}

/// A data ID given as `key=value` pairs.
#[derive(Debug, Args)]
pub struct IdArgs {
    /// Data ID pairs, e.g. `visit=85471048 raft=2,2 sensor=1,1`
    #[arg(required = true, value_name = "KEY=VALUE")]
    pub pairs: Vec<String>,

    /// Output as JSON
    #[arg(short, long)]
    pub json: bool,
}

/// Camera repository commands.
#[derive(Debug, Subcommand)]
pub enum CameraCommand {
    /// Build a camera repository from PhoSim text descriptions
    Build {
        /// Description directory (defaults to the configured one)
        #[arg(short, long)]
        description: Option<PathBuf>,

        /// Output directory (defaults to the configured one)
        #[arg(short, long)]
        output: Option<PathBuf>,

        /// PhoSim version (defaults to phosim_version.txt)
        #[arg(long)]
        phosim_version: Option<String>,

        /// Replace an existing output directory
        #[arg(long)]
        clobber: bool,
    },

    /// Extract a gain and saturation file from amplifier images
    Gains {
        /// Directory of `lsst_a_*.fits.gz` files
        amp_dir: PathBuf,

        /// Output file
        #[arg(short, long, default_value = "gain_saturation.txt")]
        output: PathBuf,
    },
}

/// Registry commands.
#[derive(Debug, Subcommand)]
pub enum RegistryCommand {
    /// Build an input registry from raw directory trees
    Raw {
        /// Repository roots or visit directories
        #[arg(required = true)]
        dirs: Vec<PathBuf>,

        /// Existing registry whose rows are kept
        #[arg(short, long)]
        input: Option<PathBuf>,

        /// Output registry (defaults to registry.sqlite3 in the repository)
        #[arg(short, long)]
        output: Option<PathBuf>,
    },

    /// Build the calibration registry
    Calib {
        /// Calibration root (defaults to the configured one)
        #[arg(long)]
        root: Option<PathBuf>,

        /// Output registry
        #[arg(short, long)]
        output: Option<PathBuf>,
    },

    /// Build the defect registry
    Defect {
        /// Directory of `rev_*` defect lists
        #[arg(long)]
        defect_dir: Option<PathBuf>,

        /// Output registry
        #[arg(short, long)]
        output: Option<PathBuf>,

        /// PhoSim version used in detector serials
        #[arg(long)]
        phosim_version: Option<String>,
    },

    /// Show table row counts
    Stats {
        /// Which registry
        #[arg(value_enum, default_value = "raw")]
        kind: RegistryKind,

        /// Registry file (defaults to the configured location)
        #[arg(short, long)]
        registry: Option<PathBuf>,

        /// Output as JSON
        #[arg(short, long)]
        json: bool,
    },

    /// Find raw rows matching a data ID
    Lookup {
        /// Registry file (defaults to the configured location)
        #[arg(short, long)]
        registry: Option<PathBuf>,

        #[command(flatten)]
        id: IdArgs,
    },

    /// List visits
    Visits {
        /// Registry file (defaults to the configured location)
        #[arg(short, long)]
        registry: Option<PathBuf>,

        /// Output as JSON
        #[arg(short, long)]
        json: bool,
    },

    /// List defect lists
    Defects {
        /// Only lists for this detector, e.g. "R:2,2 S:1,1"
        #[arg(long)]
        ccd: Option<String>,

        /// Registry file (defaults to the configured location)
        #[arg(short, long)]
        registry: Option<PathBuf>,

        /// Output as JSON
        #[arg(short, long)]
        json: bool,
    },
}

/// Ingest command arguments.
#[derive(Debug, Args)]
pub struct IngestCommand {
    /// Files or glob patterns to ingest
    #[arg(required = true)]
    pub files: Vec<String>,

    /// Repository root (defaults to the configured root)
    #[arg(long)]
    pub root: Option<PathBuf>,

    /// How files reach the repository (defaults to the configured mode)
    #[arg(short, long, value_enum)]
    pub mode: Option<TransferMode>,

    /// Registry file (defaults to registry.sqlite3 in the repository)
    #[arg(short, long)]
    pub registry: Option<PathBuf>,

    /// Start a fresh registry
    #[arg(long)]
    pub create: bool,

    /// Show what would be done without doing it
    #[arg(short = 'n', long)]
    pub dry_run: bool,

    /// File name pattern to leave out (repeatable)
    #[arg(long = "bad-file", value_name = "PATTERN")]
    pub bad_files: Vec<String>,

    /// Data ID to leave out, e.g. "visit=85471048 raft=2,2" (repeatable)
    #[arg(long = "bad-id", value_name = "PAIRS")]
    pub bad_ids: Vec<String>,

    /// Output as JSON
    #[arg(short, long)]
    pub json: bool,
}

/// Visit info command arguments.
#[derive(Debug, Args)]
pub struct VisitInfoCommand {
    /// FITS file
    pub file: PathBuf,

    /// Header unit to read
    #[arg(long, default_value = "0")]
    pub hdu: usize,

    /// Packed exposure ID to record
    #[arg(long)]
    pub exposure_id: Option<u64>,

    /// Output as JSON
    #[arg(short, long)]
    pub json: bool,
}

/// ISR commands.
#[derive(Debug, Subcommand)]
pub enum IsrCommand {
    /// Show which snaps a sensor needs
    Plan {
        /// Registry file (defaults to the configured location)
        #[arg(short, long)]
        registry: Option<PathBuf>,

        /// Use snap 0 only
        #[arg(long)]
        no_snap_combine: bool,

        #[command(flatten)]
        id: IdArgs,
    },

    /// Sum two snaps into one exposure with merged header keys
    CombineSnaps {
        /// Snap 0 image
        snap0: PathBuf,

        /// Snap 1 image
        snap1: PathBuf,

        /// Output file
        #[arg(short, long)]
        output: PathBuf,
    },

    /// Set e-image header cards and build its mask plane
    Eimage {
        /// Input e-image
        input: PathBuf,

        /// Output file
        #[arg(short, long)]
        output: PathBuf,

        /// Defect box in the readout frame as x,y,width,height (repeatable)
        #[arg(long = "defect", value_name = "X,Y,W,H", value_parser = parse_box)]
        defects: Vec<Box2I>,

        /// EDGE border width (defaults to the configured value)
        #[arg(long)]
        edge_border: Option<usize>,

        /// Output as JSON
        #[arg(short, long)]
        json: bool,
    },
}

fn parse_box(s: &str) -> Result<Box2I, String> {
    let values = s
        .split(',')
        .map(|v| v.trim().parse::<i64>())
        .collect::<Result<Vec<_>, _>>()
        .map_err(|e| format!("{s:?}: {e}"))?;
    match values[..] {
        [x, y, w, h] => Ok(Box2I::from_extent(Point2I::new(x, y), Extent2I::new(w, h))),
        _ => Err(format!("{s:?}: expected x,y,width,height")),
    }
}

/// Configuration commands.
#[derive(Debug, Subcommand)]
pub enum ConfigCommand {
    /// Show current configuration
    Show {
        /// Output as JSON
        #[arg(short, long)]
        json: bool,
    },

    /// Show the configuration file path
    Path,

    /// Validate configuration
    Validate {
        /// Path to configuration file to validate
        #[arg(short, long)]
        file: Option<PathBuf>,
    },
}

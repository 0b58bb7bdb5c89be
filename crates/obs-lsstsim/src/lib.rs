//! `obs-lsstsim` - Simulated LSST camera support
//!
//! This library knows how simulated LSST data is named, identified and laid
//! out on disk: data IDs and their packed 64-bit forms, dataset path
//! templates, camera repositories built from PhoSim descriptions, and the
//! `SQLite` registries of raw, calibration and defect files.

#![warn(missing_docs)]
#![warn(missing_debug_implementations)]
#![deny(unsafe_code)]

pub mod camera;
pub mod cli;
pub mod config;
pub mod error;
pub mod fits;
pub mod ids;
pub mod ingest;
pub mod isr;
pub mod logging;
pub mod mapper;
pub mod registry;
pub mod template;
pub mod time;
pub mod visit_info;

pub use config::Config;
pub use error::{Error, Result};
pub use ids::DataId;
pub use logging::init_logging;
pub use mapper::{Dataset, Mapper};
pub use registry::{Registry, RegistryKind};

//! Command-line interface for obs-lsstsim.
//!
//! This module provides the CLI structure and command handlers for the
//! `lsstsim` binary.

mod commands;

use std::path::PathBuf;

use clap::{Parser, Subcommand};

pub use commands::{
    CameraCommand, ConfigCommand, IdArgs, IdCommand, IngestCommand, IsrCommand, RegistryCommand,
    VisitInfoCommand,
};

/// lsstsim - Simulated LSST camera tools
///
/// Translates data IDs and packed exposure IDs, builds camera repositories
/// from PhoSim descriptions, and builds and queries the registries of a
/// simulated-camera data repository.
#[derive(Debug, Parser)]
#[command(name = "lsstsim")]
#[command(author, version, about, long_about = None)]
#[command(propagate_version = true)]
pub struct Cli {
    /// Path to custom configuration file
    #[arg(short, long, global = true, value_name = "FILE")]
    pub config: Option<PathBuf>,

    /// Increase verbosity (-v for debug, -vv for trace)
    #[arg(short, long, action = clap::ArgAction::Count, global = true)]
    pub verbose: u8,

    /// Suppress all output except errors
    #[arg(short, long, global = true)]
    pub quiet: bool,

    /// The command to execute
    #[command(subcommand)]
    pub command: Command,
}

/// Available commands.
#[derive(Debug, Subcommand)]
pub enum Command {
    /// Work with data IDs and packed IDs
    #[command(subcommand)]
    Id(IdCommand),

    /// Build camera repositories
    #[command(subcommand)]
    Camera(CameraCommand),

    /// Build and query registries
    #[command(subcommand)]
    Registry(RegistryCommand),

    /// Ingest simulator output into a repository
    Ingest(IngestCommand),

    /// Show the visit info of a raw file
    VisitInfo(VisitInfoCommand),

    /// ISR bookkeeping
    #[command(subcommand)]
    Isr(IsrCommand),

    /// View or validate configuration
    #[command(subcommand)]
    Config(ConfigCommand),
}

impl Cli {
    /// Get the verbosity level based on flags.
    #[must_use]
    pub fn verbosity(&self) -> crate::logging::Verbosity {
        if self.quiet {
            crate::logging::Verbosity::Quiet
        } else {
            match self.verbose {
                0 => crate::logging::Verbosity::Normal,
                1 => crate::logging::Verbosity::Verbose,
                _ => crate::logging::Verbosity::Trace,
            }
        }
    }
}

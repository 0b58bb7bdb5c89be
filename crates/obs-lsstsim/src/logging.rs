//! Log output of the `lsstsim` binary.
//!
//! Library code only emits `tracing` events. The binary picks a filter in
//! this order: `OBS_LSSTSIM_LOG`, then `RUST_LOG`, then the `-q`/`-v`
//! flags. Events from other crates are kept at warnings unless one of the
//! variables says otherwise.

use tracing::level_filters::LevelFilter;
use tracing_subscriber::EnvFilter;

/// Environment variable with a filter directive, read before `RUST_LOG`.
pub const LOG_ENV: &str = "OBS_LSSTSIM_LOG";

/// How much the binary logs, from the command-line flags.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Default)]
pub enum Verbosity {
    /// `-q`: errors only.
    Quiet,
    /// Progress messages.
    #[default]
    Normal,
    /// `-v`: per-file and per-row detail.
    Verbose,
    /// `-vv`: everything.
    Trace,
}

impl Verbosity {
    /// Level of this crate's own events.
    #[must_use]
    pub fn level(self) -> LevelFilter {
        match self {
            Self::Quiet => LevelFilter::ERROR,
            Self::Normal => LevelFilter::INFO,
            Self::Verbose => LevelFilter::DEBUG,
            Self::Trace => LevelFilter::TRACE,
        }
    }

    /// Filter directive used when neither environment variable is set.
    #[must_use]
    pub fn directive(self) -> String {
        let level = match self {
            Self::Quiet => "error",
            Self::Normal => "info",
            Self::Verbose => "debug",
            Self::Trace => "trace",
        };
        format!("warn,obs_lsstsim={level},lsstsim={level}")
    }
}

fn select_directive(verbosity: Verbosity, own: Option<&str>, rust_log: Option<&str>) -> String {
    [own, rust_log]
        .into_iter()
        .flatten()
        .map(str::trim)
        .find(|d| !d.is_empty())
        .map_or_else(|| verbosity.directive(), str::to_string)
}

/// Install the stderr log writer. Later calls leave the first one in place.
///
/// An unparseable directive in the environment falls back to the flags.
///
/// ```no_run
/// use obs_lsstsim::{init_logging, logging::Verbosity};
///
/// init_logging(Verbosity::Verbose);
/// ```
pub fn init_logging(verbosity: Verbosity) {
    let own = std::env::var(LOG_ENV).ok();
    let rust_log = std::env::var(EnvFilter::DEFAULT_ENV).ok();
    let directive = select_directive(verbosity, own.as_deref(), rust_log.as_deref());
    let filter = EnvFilter::try_new(&directive).unwrap_or_else(|e| {
        eprintln!("ignoring log filter {directive:?}: {e}");
        EnvFilter::new(verbosity.directive())
    });

    let _ = tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr)
        .without_time()
        .with_target(verbosity >= Verbosity::Verbose)
        .try_init();
}

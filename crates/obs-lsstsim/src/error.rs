//! Error types for obs-lsstsim.
//!
//! This module defines all error types used throughout the crate, providing
//! detailed context for debugging and user-friendly error messages.

use std::path::PathBuf;
use thiserror::Error;

/// The main error type for obs-lsstsim operations.
#[derive(Error, Debug)]
pub enum Error {
    // === Data ID Errors ===
    /// A raft, sensor, channel or patch string has the wrong shape.
    #[error("invalid {component} identifier: {value:?}")]
    IdFormat {
        /// Which identifier component was malformed.
        component: &'static str,
        /// The offending value.
        value: String,
    },

    /// A data ID component is well-formed but outside its legal range.
    #[error("{what} not in range [{min},{max}): {value}")]
    IdRange {
        /// Which quantity was out of range.
        what: &'static str,
        /// The offending value.
        value: i64,
        /// Inclusive lower bound.
        min: i64,
        /// Exclusive upper bound.
        max: i64,
    },

    /// A data ID lacks a key the operation requires.
    #[error("data ID is missing required key '{key}'")]
    MissingKey {
        /// The missing key.
        key: &'static str,
    },

    /// A data ID alias (e.g. `ccdName`) could not be parsed.
    #[error("invalid value for {alias}: {value:?}")]
    InvalidAlias {
        /// Name of the alias key.
        alias: &'static str,
        /// The offending value.
        value: String,
    },

    /// A filter name with no known coadd index.
    #[error("unknown filter: {0:?}")]
    UnknownFilter(String),

    /// A snap identifier other than 0 or 1.
    #[error("unrecognized snapId={0}")]
    InvalidSnap(i64),

    /// A snap the processing plan needs has no raw data.
    #[error("could not find snap={snap} for {id}")]
    MissingSnap {
        /// The absent snap.
        snap: i64,
        /// The sensor-level data ID.
        id: String,
    },

    /// A modified Julian date outside the representable range.
    #[error("MJD {0} cannot be represented as a date")]
    InvalidTime(f64),

    // === Registry Errors ===
    /// Failed to open or create the registry database.
    #[error("failed to open registry at {path}: {source}")]
    DatabaseOpen {
        /// Path to the registry file.
        path: PathBuf,
        /// The underlying error.
        #[source]
        source: rusqlite::Error,
    },

    /// A registry query failed.
    #[error("registry query failed: {0}")]
    DatabaseQuery(#[from] rusqlite::Error),

    /// Failed to run registry schema migrations.
    #[error("registry migration failed: {message}")]
    DatabaseMigration {
        /// Description of what went wrong.
        message: String,
    },

    /// The output registry already exists and would be overwritten.
    #[error("output registry {path} exists; will not overwrite")]
    RegistryExists {
        /// Path to the existing registry.
        path: PathBuf,
    },

    /// A registry has no table of the requested name.
    #[error("registry has no table {0:?}")]
    UnknownTable(String),

    /// An input registry named on the command line does not exist.
    #[error("input registry {path} does not exist")]
    RegistryMissing {
        /// Path that was expected to exist.
        path: PathBuf,
    },

    // === Input File Errors ===
    /// A FITS file could not be parsed.
    #[error("malformed FITS file {path}: {message}")]
    Fits {
        /// Path to the FITS file.
        path: PathBuf,
        /// Description of what went wrong.
        message: String,
    },

    /// A FITS header lacks a keyword the operation requires.
    #[error("FITS header is missing keyword {keyword}")]
    MissingHeaderKey {
        /// The missing keyword.
        keyword: String,
    },

    /// A FITS header keyword has a value of the wrong type or shape.
    #[error("FITS header keyword {keyword} has invalid value {value:?}")]
    InvalidHeaderValue {
        /// The keyword.
        keyword: String,
        /// The rendered value.
        value: String,
    },

    /// A camera description text file could not be parsed.
    #[error("{path}:{line}: {message}")]
    DescriptionParse {
        /// Path to the description file.
        path: PathBuf,
        /// One-based line number.
        line: usize,
        /// Description of what went wrong.
        message: String,
    },

    /// A path template could not be compiled or rendered.
    #[error("invalid path template {template:?}: {message}")]
    Template {
        /// The template text.
        template: String,
        /// Description of what went wrong.
        message: String,
    },

    /// A file-matching pattern is not a valid glob.
    #[error("invalid glob pattern: {0}")]
    Glob(#[from] glob::PatternError),

    /// A file name follows none of the known naming conventions.
    #[error("unrecognized filename: {0}")]
    UnrecognizedFilename(PathBuf),

    // === Configuration Errors ===
    /// Failed to load configuration.
    #[error("failed to load configuration: {0}")]
    ConfigLoad(Box<figment::Error>),

    /// Configuration validation failed.
    #[error("invalid configuration: {message}")]
    ConfigValidation {
        /// Description of the validation failure.
        message: String,
    },

    // === I/O Errors ===
    /// File system operation failed.
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    /// Failed to create a required directory.
    #[error("failed to create directory {path}: {source}")]
    DirectoryCreate {
        /// Path that couldn't be created.
        path: PathBuf,
        /// The underlying error.
        #[source]
        source: std::io::Error,
    },

    /// An output directory exists and clobbering was not requested.
    #[error("directory {path} exists")]
    DirectoryExists {
        /// The existing directory.
        path: PathBuf,
    },

    // === Serialization Errors ===
    /// JSON serialization/deserialization failed.
    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    // === Generic Errors ===
    /// An internal error occurred (bug).
    #[error("internal error: {0}")]
    Internal(String),
}

/// A specialized Result type for obs-lsstsim operations.
pub type Result<T> = std::result::Result<T, Error>;

impl From<figment::Error> for Error {
    fn from(err: figment::Error) -> Self {
        Self::ConfigLoad(Box::new(err))
    }
}

impl Error {
    /// Create a new identifier format error.
    #[must_use]
    pub fn id_format(component: &'static str, value: impl Into<String>) -> Self {
        Self::IdFormat {
            component,
            value: value.into(),
        }
    }

    /// Create a new identifier range error for the half-open range `[min, max)`.
    #[must_use]
    pub fn id_range(what: &'static str, value: i64, min: i64, max: i64) -> Self {
        Self::IdRange {
            what,
            value,
            min,
            max,
        }
    }

    /// Create a new FITS parse error.
    #[must_use]
    pub fn fits(path: impl Into<PathBuf>, message: impl Into<String>) -> Self {
        Self::Fits {
            path: path.into(),
            message: message.into(),
        }
    }

    /// Create a new description-file parse error.
    #[must_use]
    pub fn description(path: impl Into<PathBuf>, line: usize, message: impl Into<String>) -> Self {
        Self::DescriptionParse {
            path: path.into(),
            line,
            message: message.into(),
        }
    }

    /// Create a new missing header keyword error.
    #[must_use]
    pub fn missing_header_key(keyword: impl Into<String>) -> Self {
        Self::MissingHeaderKey {
            keyword: keyword.into(),
        }
    }

    /// Create a new internal error.
    #[must_use]
    pub fn internal(message: impl Into<String>) -> Self {
        Self::Internal(message.into())
    }

    /// Check if this error came from a malformed or out-of-range data ID.
    #[must_use]
    pub fn is_data_id_error(&self) -> bool {
        matches!(
            self,
            Self::IdFormat { .. }
                | Self::IdRange { .. }
                | Self::MissingKey { .. }
                | Self::InvalidAlias { .. }
                | Self::UnknownFilter(_)
                | Self::InvalidSnap(_)
        )
    }

    /// Check if a scan should log this error and move on to the next file.
    #[must_use]
    pub fn is_skippable(&self) -> bool {
        matches!(
            self,
            Self::Fits { .. }
                | Self::MissingHeaderKey { .. }
                | Self::InvalidHeaderValue { .. }
                | Self::UnrecognizedFilename(_)
                | Self::InvalidTime(_)
                | Self::Io(_)
        ) || self.is_data_id_error()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_id_format_display() {
        let err = Error::id_format("raft", "2-2");
        assert_eq!(err.to_string(), "invalid raft identifier: \"2-2\"");
    }

    #[test]
    fn test_id_range_display() {
        let err = Error::id_range("tract", 128, 0, 128);
        assert_eq!(err.to_string(), "tract not in range [0,128): 128");
    }

    #[test]
    fn test_missing_key_display() {
        let err = Error::MissingKey { key: "visit" };
        assert!(err.to_string().contains("'visit'"));
    }

    #[test]
    fn test_invalid_snap_display() {
        assert_eq!(Error::InvalidSnap(2).to_string(), "unrecognized snapId=2");
    }

    #[test]
    fn test_is_data_id_error() {
        assert!(Error::id_format("sensor", "x").is_data_id_error());
        assert!(Error::UnknownFilter("q".into()).is_data_id_error());
        assert!(!Error::internal("bug").is_data_id_error());
    }

    #[test]
    fn test_is_skippable() {
        assert!(Error::fits("/tmp/a.fits", "truncated").is_skippable());
        assert!(Error::missing_header_key("EXPTIME").is_skippable());
        assert!(!Error::RegistryExists {
            path: PathBuf::from("registry.sqlite3")
        }
        .is_skippable());
    }

    #[test]
    fn test_description_error_display() {
        let err = Error::description("/data/segmentation.txt", 12, "expected 12 columns");
        assert_eq!(
            err.to_string(),
            "/data/segmentation.txt:12: expected 12 columns"
        );
    }

    #[test]
    fn test_registry_exists_display() {
        let err = Error::RegistryExists {
            path: PathBuf::from("/repo/registry.sqlite3"),
        };
        let msg = err.to_string();
        assert!(msg.contains("/repo/registry.sqlite3"));
        assert!(msg.contains("will not overwrite"));
    }

    #[test]
    fn test_from_io_error() {
        let io_err = std::io::Error::new(std::io::ErrorKind::NotFound, "file not found");
        let err: Error = io_err.into();
        assert!(err.to_string().contains("file not found"));
    }

    #[test]
    fn test_from_rusqlite_error() {
        let result = rusqlite::Connection::open_with_flags(
            "/nonexistent/path/registry.sqlite3",
            rusqlite::OpenFlags::SQLITE_OPEN_READ_ONLY,
        );
        if let Err(sqlite_err) = result {
            let err: Error = sqlite_err.into();
            assert!(matches!(err, Error::DatabaseQuery(_)));
        }
    }

    #[test]
    fn test_from_json_error() {
        let json_result: std::result::Result<i32, serde_json::Error> =
            serde_json::from_str("not valid json");
        if let Err(json_err) = json_result {
            let err: Error = json_err.into();
            assert!(matches!(err, Error::Json(_)));
        }
    }

    #[test]
    fn test_directory_exists_display() {
        let err = Error::DirectoryExists {
            path: PathBuf::from("/out/camera"),
        };
        assert_eq!(err.to_string(), "directory /out/camera exists");
    }
}

//! Configuration management for obs-lsstsim.
//!
//! This module provides configuration loading and validation using figment,
//! supporting TOML config files, environment variables, and defaults.

use std::path::{Path, PathBuf};

use figment::{
    providers::{Env, Format, Serialized, Toml},
    Figment,
};
use serde::{Deserialize, Serialize};

use crate::error::{Error, Result};
use crate::ingest::TransferMode;
use crate::isr::IsrConfig;
use crate::registry::RegistryKind;

/// Default configuration file name.
const CONFIG_FILE_NAME: &str = "config.toml";

/// Configuration directory name.
const CONFIG_DIR_NAME: &str = "obs_lsstsim";

/// Prefix of configuration environment variables.
const ENV_PREFIX: &str = "OBS_LSSTSIM_";

/// Application configuration.
///
/// Configuration is loaded from (in order of precedence, highest first):
/// 1. Environment variables (prefixed with `OBS_LSSTSIM_`, sections
///    separated by `__`, e.g. `OBS_LSSTSIM_ISR__DO_SNAP_COMBINE`)
/// 2. TOML config file at `~/.config/obs_lsstsim/config.toml`
/// 3. Default values
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct Config {
    /// Camera description input.
    pub description: DescriptionConfig,
    /// Repository and registry locations.
    pub registry: RegistryConfig,
    /// Ingest behavior.
    pub ingest: IngestConfig,
    /// ISR bookkeeping.
    pub isr: IsrConfig,
}

/// Camera description configuration.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct DescriptionConfig {
    /// Directory holding the PhoSim text descriptions.
    pub dir: Option<PathBuf>,
    /// PhoSim version; read from `phosim_version.txt` when unset.
    pub phosim_version: Option<String>,
    /// Where the camera repository is written.
    pub output_dir: PathBuf,
}

/// Repository configuration.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct RegistryConfig {
    /// Repository root.
    pub root: PathBuf,
    /// Calibration repository root; the repository root when unset.
    pub calib_root: Option<PathBuf>,
    /// Directory of defect lists.
    pub defect_dir: Option<PathBuf>,
}

/// Ingest configuration.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct IngestConfig {
    /// How files reach the repository.
    pub mode: TransferMode,
    /// File name patterns never ingested.
    pub bad_files: Vec<String>,
    /// Data IDs never ingested, each as space-separated `key=value` pairs.
    pub bad_ids: Vec<String>,
}

impl Default for DescriptionConfig {
    fn default() -> Self {
        Self {
            dir: None,
            phosim_version: None,
            output_dir: PathBuf::from("camera"),
        }
    }
}

impl Default for RegistryConfig {
    fn default() -> Self {
        Self {
            root: PathBuf::from("."),
            calib_root: None,
            defect_dir: None,
        }
    }
}

impl Config {
    /// Load configuration from all sources.
    ///
    /// Configuration is loaded in this order (later sources override earlier):
    /// 1. Default values
    /// 2. TOML config file (if exists)
    /// 3. Environment variables (prefixed with `OBS_LSSTSIM_`)
    ///
    /// # Errors
    ///
    /// Returns an error if configuration loading or parsing fails.
    pub fn load() -> Result<Self> {
        Self::load_from(None)
    }

    /// Load configuration with an optional custom config path.
    ///
    /// # Errors
    ///
    /// Returns an error if configuration loading or parsing fails.
    pub fn load_from(config_path: Option<PathBuf>) -> Result<Self> {
        let config_file = config_path.unwrap_or_else(Self::default_config_path);

        let figment = Figment::new()
            .merge(Serialized::defaults(Config::default()))
            .merge(Toml::file(&config_file).nested())
            .merge(Env::prefixed(ENV_PREFIX).split("__"));

        let config: Config = figment.extract()?;
        config.validate()?;
        Ok(config)
    }

    /// Load and validate one configuration file, which must exist.
    ///
    /// # Errors
    ///
    /// Returns an error if the file is missing, unparseable, or holds
    /// invalid values.
    pub fn validate_file(path: &Path) -> Result<Self> {
        if !path.is_file() {
            return Err(Error::ConfigValidation {
                message: format!("configuration file not found: {}", path.display()),
            });
        }
        Self::load_from(Some(path.to_path_buf()))
    }

    /// Get the default configuration file path.
    #[must_use]
    pub fn default_config_path() -> PathBuf {
        dirs::config_dir()
            .unwrap_or_else(|| PathBuf::from(".config"))
            .join(CONFIG_DIR_NAME)
            .join(CONFIG_FILE_NAME)
    }

    /// Validate the configuration.
    ///
    /// # Errors
    ///
    /// Returns an error if any configuration values are invalid.
    pub fn validate(&self) -> Result<()> {
        if self.isr.sat_val <= 0 {
            return Err(Error::ConfigValidation {
                message: format!("sat_val must be positive, got {}", self.isr.sat_val),
            });
        }

        if let Some(key) = self
            .isr
            .average_keys
            .iter()
            .find(|k| self.isr.sum_keys.contains(k))
        {
            return Err(Error::ConfigValidation {
                message: format!("{key} is both an average key and a sum key"),
            });
        }

        if self
            .description
            .phosim_version
            .as_deref()
            .is_some_and(|v| v.trim().is_empty())
        {
            return Err(Error::ConfigValidation {
                message: "phosim_version must not be empty".to_string(),
            });
        }

        for pattern in &self.ingest.bad_files {
            if glob::Pattern::new(pattern).is_err() {
                return Err(Error::ConfigValidation {
                    message: format!("invalid bad file pattern: {pattern}"),
                });
            }
        }

        for id in &self.ingest.bad_ids {
            if let Err(e) = crate::ingest::parse_bad_id(id) {
                return Err(Error::ConfigValidation {
                    message: format!("invalid bad id {id:?}: {e}"),
                });
            }
        }

        Ok(())
    }

    /// Path of a registry, resolving defaults.
    ///
    /// The calibration registry lives in the calibration root; the others
    /// in the repository root.
    #[must_use]
    pub fn registry_path(&self, kind: RegistryKind) -> PathBuf {
        let base = match kind {
            RegistryKind::Calib => self.calib_root(),
            RegistryKind::Raw | RegistryKind::Defect => self.registry.root.clone(),
        };
        base.join(kind.default_file_name())
    }

    /// The calibration repository root.
    #[must_use]
    pub fn calib_root(&self) -> PathBuf {
        self.registry
            .calib_root
            .clone()
            .unwrap_or_else(|| self.registry.root.clone())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_config() {
        let config = Config::default();

        assert!(config.description.dir.is_none());
        assert_eq!(config.description.output_dir, PathBuf::from("camera"));
        assert_eq!(config.registry.root, PathBuf::from("."));
        assert_eq!(config.ingest.mode, TransferMode::Link);
        assert!(config.isr.do_snap_combine);
    }

    #[test]
    fn test_validate_valid_config() {
        let config = Config::default();
        assert!(config.validate().is_ok());
    }

    #[test]
    fn test_validate_sat_val() {
        let mut config = Config::default();
        config.isr.sat_val = 0;

        let err = config.validate().unwrap_err().to_string();
        assert!(err.contains("sat_val"));
    }

    #[test]
    fn test_validate_overlapping_keys() {
        let mut config = Config::default();
        config.isr.sum_keys.push("AIRMASS".to_string());

        let err = config.validate().unwrap_err().to_string();
        assert!(err.contains("AIRMASS"));
    }

    #[test]
    fn test_validate_empty_version() {
        let mut config = Config::default();
        config.description.phosim_version = Some("  ".to_string());
        assert!(config.validate().is_err());
    }

    #[test]
    fn test_validate_bad_file_pattern() {
        let mut config = Config::default();
        config.ingest.bad_files = vec!["[invalid".to_string()];

        let err = config.validate().unwrap_err().to_string();
        assert!(err.contains("invalid bad file pattern"));
    }

    #[test]
    fn test_validate_bad_ids() {
        let mut config = Config::default();
        config.ingest.bad_ids = vec!["visit=85471048 raft=2,2".to_string()];
        assert!(config.validate().is_ok());

        config.ingest.bad_ids.push("visit=abc".to_string());
        let err = config.validate().unwrap_err().to_string();
        assert!(err.contains("invalid bad id"));
    }

    #[test]
    fn test_registry_paths() {
        let mut config = Config::default();
        config.registry.root = PathBuf::from("/repo");
        assert_eq!(
            config.registry_path(RegistryKind::Raw),
            PathBuf::from("/repo/registry.sqlite3")
        );
        assert_eq!(
            config.registry_path(RegistryKind::Calib),
            PathBuf::from("/repo/calibRegistry.sqlite3")
        );
        config.registry.calib_root = Some(PathBuf::from("/calib"));
        assert_eq!(
            config.registry_path(RegistryKind::Calib),
            PathBuf::from("/calib/calibRegistry.sqlite3")
        );
    }

    #[test]
    fn test_load_from_toml_file() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("config.toml");
        std::fs::write(
            &path,
            "[registry]\nroot = \"/data/repo\"\n\n[ingest]\nmode = \"copy\"\n\n[isr]\ndo_snap_combine = false\n",
        )
        .unwrap();

        let config = Config::load_from(Some(path)).unwrap();
        assert_eq!(config.registry.root, PathBuf::from("/data/repo"));
        assert_eq!(config.ingest.mode, TransferMode::Copy);
        assert!(!config.isr.do_snap_combine);
        assert!(config.isr.do_write);
    }

    #[test]
    fn test_validate_file() {
        let dir = tempfile::tempdir().unwrap();
        let good = dir.path().join("good.toml");
        std::fs::write(&good, "[isr]\nsat_val = 90000\n").unwrap();
        assert_eq!(Config::validate_file(&good).unwrap().isr.sat_val, 90_000);

        let bad = dir.path().join("bad.toml");
        std::fs::write(&bad, "[isr]\nsat_val = -1\n").unwrap();
        assert!(matches!(
            Config::validate_file(&bad),
            Err(Error::ConfigValidation { .. })
        ));

        let unparseable = dir.path().join("broken.toml");
        std::fs::write(&unparseable, "[isr\nsat_val = ").unwrap();
        assert!(Config::validate_file(&unparseable).is_err());

        assert!(matches!(
            Config::validate_file(&dir.path().join("none.toml")),
            Err(Error::ConfigValidation { .. })
        ));
    }

    #[test]
    fn test_load_from_missing_file_uses_defaults() {
        let dir = tempfile::tempdir().unwrap();
        let config = Config::load_from(Some(dir.path().join("none.toml"))).unwrap();
        assert_eq!(config.description.output_dir, PathBuf::from("camera"));
    }
}

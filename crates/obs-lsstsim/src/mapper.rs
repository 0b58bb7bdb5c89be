//! Dataset path templates for a simulated-camera data repository.

use std::fmt;
use std::path::{Path, PathBuf};
use std::str::FromStr;

use serde::{Deserialize, Serialize};

use crate::error::{Error, Result};
use crate::ids::DataId;
use crate::template::PathTemplate;

/// A dataset type with a file location.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub enum Dataset {
    /// Per-amplifier raw snap.
    Raw,
    /// Per-sensor electron image.
    Eimage,
    /// Per-sensor assembled, ISR-corrected snap.
    #[serde(rename = "postISRCCD")]
    PostIsrCcd,
    /// Per-sensor calibrated exposure.
    Calexp,
    /// Bias frame.
    Bias,
    /// Dark frame.
    Dark,
    /// Flat field.
    Flat,
    /// Fringe frame.
    Fringe,
}

impl Dataset {
    /// Every dataset type, in a stable order.
    pub const ALL: [Self; 8] = [
        Self::Raw,
        Self::Eimage,
        Self::PostIsrCcd,
        Self::Calexp,
        Self::Bias,
        Self::Dark,
        Self::Flat,
        Self::Fringe,
    ];

    /// Calibration dataset types.
    pub const CALIBS: [Self; 4] = [Self::Bias, Self::Dark, Self::Flat, Self::Fringe];

    /// The dataset type name.
    #[must_use]
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Raw => "raw",
            Self::Eimage => "eimage",
            Self::PostIsrCcd => "postISRCCD",
            Self::Calexp => "calexp",
            Self::Bias => "bias",
            Self::Dark => "dark",
            Self::Flat => "flat",
            Self::Fringe => "fringe",
        }
    }

    /// The path template, relative to the repository root.
    ///
    /// Raft, sensor and channel are substituted in path form (`"22"`).
    #[must_use]
    pub fn template(self) -> &'static str {
        match self {
            Self::Raw => {
                "raw/v%(visit)d-f%(filter)s/E%(snap)03d/R%(raft)s/S%(sensor)s/\
                 imsim_%(visit)d_R%(raft)s_S%(sensor)s_C%(channel)s_E%(snap)03d.fits.gz"
            }
            Self::Eimage => {
                "eimage/v%(visit)d-f%(filter)s/E%(snap)03d/R%(raft)s/S%(sensor)s/\
                 eimage_%(visit)d_R%(raft)s_S%(sensor)s_E%(snap)03d.fits.gz"
            }
            Self::PostIsrCcd => {
                "postISRCCD/v%(visit)d-f%(filter)s/E%(snap)03d/R%(raft)s/S%(sensor)s.fits"
            }
            Self::Calexp => "calexp/v%(visit)d-f%(filter)s/R%(raft)s/S%(sensor)s.fits",
            Self::Bias => "bias/imsim_0_R%(raft)s_S%(sensor)s_C%(channel)s_E000.fits",
            Self::Dark => "dark/imsim_1_R%(raft)s_S%(sensor)s_C%(channel)s_E000.fits",
            Self::Flat | Self::Fringe => {
                "flat_%(filter)s/imsim_2_R%(raft)s_S%(sensor)s_C%(channel)s_E000.fits"
            }
        }
    }

    /// Whether this is a calibration dataset.
    #[must_use]
    pub fn is_calib(self) -> bool {
        Self::CALIBS.contains(&self)
    }

    /// Compile the path template.
    ///
    /// # Errors
    ///
    /// Returns an error only if the built-in template is malformed.
    pub fn path_template(self) -> Result<PathTemplate> {
        PathTemplate::parse(self.template())
    }
}

impl fmt::Display for Dataset {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for Dataset {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self> {
        Self::ALL
            .into_iter()
            .find(|d| d.as_str().eq_ignore_ascii_case(s))
            .ok_or_else(|| Error::id_format("dataset", s))
    }
}

/// Locates datasets inside a repository.
#[derive(Debug, Clone)]
pub struct Mapper {
    root: PathBuf,
    calib_root: PathBuf,
}

impl Mapper {
    /// Create a mapper for a repository whose calibrations live in the same tree.
    pub fn new(root: impl Into<PathBuf>) -> Self {
        let root = root.into();
        Self {
            calib_root: root.clone(),
            root,
        }
    }

    /// Use a separate calibration repository.
    #[must_use]
    pub fn with_calib_root(mut self, calib_root: impl Into<PathBuf>) -> Self {
        self.calib_root = calib_root.into();
        self
    }

    /// Repository root.
    #[must_use]
    pub fn root(&self) -> &Path {
        &self.root
    }

    /// Path of a dataset relative to its repository root.
    ///
    /// The data ID is validated and transformed to path form first.
    ///
    /// # Errors
    ///
    /// Returns an error if the data ID is invalid or lacks a key the
    /// template needs.
    pub fn relative_path(&self, dataset: Dataset, data_id: &DataId) -> Result<String> {
        data_id.validate()?;
        let path_id = data_id.transform()?;
        dataset.path_template()?.render(&path_id.to_fields())
    }

    /// Absolute path of a dataset.
    ///
    /// # Errors
    ///
    /// See [`Mapper::relative_path`].
    pub fn path(&self, dataset: Dataset, data_id: &DataId) -> Result<PathBuf> {
        let base = if dataset.is_calib() {
            &self.calib_root
        } else {
            &self.root
        };
        Ok(base.join(self.relative_path(dataset, data_id)?))
    }
}

//! Camera repository built from the PhoSim text descriptions.
//!
//! A description directory holds `focalplanelayout.txt`,
//! `segmentation.txt`, `gain_saturation.txt` and `phosim_version.txt`.
//! The repository written from it is a directory with `camera.json` and
//! one `<R..._S...>.json` amplifier table per detector.

pub mod gain;
pub mod geometry;
pub mod layout;
pub mod segmentation;

use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};
use tracing::info;

use crate::error::{Error, Result};
use crate::ids::names::short_ccd_name;

pub use gain::{GainSaturation, GainTable};
pub use geometry::{Box2I, Extent2I, Point2I};
pub use layout::{DetectorConfig, DetectorType};
pub use segmentation::{AmpInfo, AmpTable};

/// Camera name.
pub const CAMERA_NAME: &str = "LSST";

/// Plate scale in arcsec per mm.
pub const PLATE_SCALE: f64 = 20.0;

/// Cubic term of the focal-plane distortion, relative to the plate scale.
pub const PINCUSHION: f64 = 0.925;

/// File name of the camera configuration in a repository.
pub const CAMERA_FILE: &str = "camera.json";

/// Standard file names in a description directory.
pub const LAYOUT_FILE: &str = "focalplanelayout.txt";
/// Amplifier segmentation.
pub const SEGMENTATION_FILE: &str = "segmentation.txt";
/// Gain and saturation overrides.
pub const GAIN_FILE: &str = "gain_saturation.txt";
/// PhoSim release the descriptions come from.
pub const VERSION_FILE: &str = "phosim_version.txt";

/// Radial map from focal-plane mm to field angle in radians.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RadialTransform {
    /// Polynomial coefficients, constant term first.
    pub coeffs: Vec<f64>,
    /// The polynomial maps field angle to focal plane and is used inverted.
    pub inverted: bool,
}

impl RadialTransform {
    /// Scale plus pincushion for a plate scale in arcsec per mm.
    #[must_use]
    pub fn for_plate_scale(arcsec_per_mm: f64) -> Self {
        let s = (arcsec_per_mm / 3600.0).to_radians();
        Self {
            coeffs: vec![0.0, 1.0 / s, 0.0, PINCUSHION / s],
            inverted: true,
        }
    }
}

/// The whole camera.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CameraConfig {
    /// Camera name.
    pub name: String,
    /// Arcsec per mm.
    pub plate_scale: f64,
    /// Focal plane to field angle.
    pub field_angle_transform: RadialTransform,
    /// Detectors in layout order.
    pub detectors: Vec<DetectorConfig>,
}

impl CameraConfig {
    /// Camera with the standard optics and the given detectors.
    #[must_use]
    pub fn new(detectors: Vec<DetectorConfig>) -> Self {
        Self {
            name: CAMERA_NAME.to_string(),
            plate_scale: PLATE_SCALE,
            field_angle_transform: RadialTransform::for_plate_scale(PLATE_SCALE),
            detectors,
        }
    }
}

/// Inputs for building a camera repository.
#[derive(Debug, Clone)]
pub struct CameraSources {
    /// Detector layout file.
    pub layout: PathBuf,
    /// Segmentation file.
    pub segmentation: PathBuf,
    /// Gain file; a missing file means every amplifier uses defaults.
    pub gains: PathBuf,
    /// PhoSim version recorded in detector serials.
    pub phosim_version: String,
}

impl CameraSources {
    /// Standard files of a description directory. The PhoSim version is
    /// read from the directory unless given.
    ///
    /// # Errors
    ///
    /// Returns an error if the version is not given and cannot be read.
    pub fn from_description_dir(dir: &Path, phosim_version: Option<String>) -> Result<Self> {
        let phosim_version = match phosim_version {
            Some(v) => v,
            None => read_phosim_version(dir)?,
        };
        Ok(Self {
            layout: dir.join(LAYOUT_FILE),
            segmentation: dir.join(SEGMENTATION_FILE),
            gains: dir.join(GAIN_FILE),
            phosim_version,
        })
    }
}

/// Read `phosim_version.txt` from a description directory.
///
/// # Errors
///
/// Returns an error if the file cannot be read or is empty.
pub fn read_phosim_version(dir: &Path) -> Result<String> {
    let path = dir.join(VERSION_FILE);
    let version = std::fs::read_to_string(&path)?.trim().to_string();
    if version.is_empty() {
        return Err(Error::description(path, 1, "empty PhoSim version"));
    }
    Ok(version)
}

/// A parsed camera, ready to be written.
#[derive(Debug, Clone, PartialEq)]
pub struct Camera {
    /// Camera configuration.
    pub config: CameraConfig,
    /// Amplifier tables, one per detector.
    pub amp_tables: Vec<AmpTable>,
}

impl Camera {
    /// Parse the description files.
    ///
    /// # Errors
    ///
    /// Returns an error if any description file is malformed.
    pub fn build(sources: &CameraSources) -> Result<Self> {
        let gains = if sources.gains.exists() {
            GainTable::read(&sources.gains)?
        } else {
            info!(path = %sources.gains.display(), "No gain file; using defaults");
            GainTable::new()
        };
        let amp_tables = segmentation::read_segmentation(&sources.segmentation, &gains)?;
        let detectors = layout::read_layout(&sources.layout, &sources.phosim_version)?;
        Ok(Self {
            config: CameraConfig::new(detectors),
            amp_tables,
        })
    }

    /// Write the repository into `out_dir`.
    ///
    /// An existing `out_dir` is replaced when `clobber` is set.
    ///
    /// # Errors
    ///
    /// Returns [`Error::DirectoryExists`] if `out_dir` exists and
    /// `clobber` is not set, or an I/O error.
    pub fn write_repository(&self, out_dir: &Path, clobber: bool) -> Result<Vec<PathBuf>> {
        make_dir(out_dir, clobber)?;

        let mut written = Vec::with_capacity(self.amp_tables.len() + 1);
        let camera_path = out_dir.join(CAMERA_FILE);
        std::fs::write(&camera_path, serde_json::to_string_pretty(&self.config)?)?;
        written.push(camera_path);

        for table in &self.amp_tables {
            let path = out_dir.join(format!("{}.json", short_ccd_name(&table.detector)));
            std::fs::write(&path, serde_json::to_string_pretty(table)?)?;
            written.push(path);
        }
        info!(
            detectors = self.config.detectors.len(),
            amp_tables = self.amp_tables.len(),
            dir = %out_dir.display(),
            "Wrote camera repository"
        );
        Ok(written)
    }
}

fn make_dir(dir: &Path, clobber: bool) -> Result<()> {
    if dir.exists() {
        if clobber && dir.is_dir() {
            info!(dir = %dir.display(), "Clobbering directory");
            std::fs::remove_dir_all(dir)?;
        } else {
            return Err(Error::DirectoryExists {
                path: dir.to_path_buf(),
            });
        }
    }
    std::fs::create_dir_all(dir).map_err(|source| Error::DirectoryCreate {
        path: dir.to_path_buf(),
        source,
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    const LAYOUT: &str = "\
R22_S11 0.0 0.0 10.0 4000 4072 0 0 0 Group0 0.0 0.0 0.0 0.0 0.0
R00_S22_C0 -317500.0 -306500.0 10.0 2000 4072 0 0 0 Group1 0.0 0.0 0.0 0.0 0.0
";

    const SEGMENTS: &str = "\
R22_S11 2 4000 4072
R22_S11_C00 0 1999 0 508 -1 1 1.7 0 0 0 5.0
R22_S11_C10 2000 3999 0 508 -1 1 1.7 0 0 0 5.0
R00_S22_C0 1 2000 4072
R00_S22_C0_C00 0 1999 0 508 -1 1 1.7 0 0 0 5.0
";

    fn description_dir() -> tempfile::TempDir {
        let dir = tempfile::tempdir().unwrap();
        std::fs::write(dir.path().join(LAYOUT_FILE), LAYOUT).unwrap();
        std::fs::write(dir.path().join(SEGMENTATION_FILE), SEGMENTS).unwrap();
        std::fs::write(dir.path().join(GAIN_FILE), "R22_S11_C00 2.0 90000\n").unwrap();
        std::fs::write(dir.path().join(VERSION_FILE), "3.4.2\n").unwrap();
        dir
    }

    #[test]
    fn test_radial_coefficients() {
        let t = RadialTransform::for_plate_scale(PLATE_SCALE);
        let s = 20.0 / 3600.0 * std::f64::consts::PI / 180.0;
        assert_eq!(t.coeffs.len(), 4);
        assert!((t.coeffs[1] - 1.0 / s).abs() < 1e-6);
        assert!((t.coeffs[3] - 0.925 / s).abs() < 1e-6);
        assert!(t.inverted);
    }

    #[test]
    fn test_build_reads_version_and_gains() {
        let dir = description_dir();
        let sources = CameraSources::from_description_dir(dir.path(), None).unwrap();
        assert_eq!(sources.phosim_version, "3.4.2");
        let camera = Camera::build(&sources).unwrap();
        assert_eq!(camera.config.name, "LSST");
        assert_eq!(camera.config.detectors.len(), 2);
        assert_eq!(camera.config.detectors[1].serial, "R00_S22_C0_3.4.2");
        assert_eq!(camera.amp_tables.len(), 2);
        assert_eq!(camera.amp_tables[0].amps[0].saturation, 90_000);
        assert_eq!(camera.amp_tables[0].amps[1].saturation, 65_535);
    }

    #[test]
    fn test_write_repository() {
        let dir = description_dir();
        let sources = CameraSources::from_description_dir(dir.path(), Some("v1".into())).unwrap();
        let camera = Camera::build(&sources).unwrap();
        let out = dir.path().join("camera");
        let written = camera.write_repository(&out, false).unwrap();
        assert_eq!(written.len(), 3);
        assert!(out.join("camera.json").exists());
        assert!(out.join("R22_S11.json").exists());
        assert!(out.join("R00_S22A.json").exists());

        let text = std::fs::read_to_string(out.join("camera.json")).unwrap();
        let config: CameraConfig = serde_json::from_str(&text).unwrap();
        assert_eq!(config.name, "LSST");
        assert_eq!(config.detectors.len(), 2);
        assert_eq!(config.detectors[0].name, "R:2,2 S:1,1");
    }

    #[test]
    fn test_existing_dir_needs_clobber() {
        let dir = description_dir();
        let sources = CameraSources::from_description_dir(dir.path(), None).unwrap();
        let camera = Camera::build(&sources).unwrap();
        let out = dir.path().join("camera");
        std::fs::create_dir(&out).unwrap();
        std::fs::write(out.join("stale.json"), "{}").unwrap();

        let err = camera.write_repository(&out, false).unwrap_err();
        assert!(matches!(err, Error::DirectoryExists { .. }));

        camera.write_repository(&out, true).unwrap();
        assert!(!out.join("stale.json").exists());
    }

    #[test]
    fn test_missing_version_file() {
        let dir = tempfile::tempdir().unwrap();
        assert!(read_phosim_version(dir.path()).is_err());
    }
}

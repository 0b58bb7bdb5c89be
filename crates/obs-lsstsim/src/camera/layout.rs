//! Detector placement from a PhoSim `focalplanelayout.txt`.
//!
//! Each non-comment line describes one detector with whitespace-separated
//! columns:
//!
//! ```text
//! 0 name   1 x (um)   2 y (um)   3 pixel size (um)   4 ny   5 nx
//! 9 group  10 yaw    11 pitch    12 roll   13 dx (mm)  14 dy (mm)
//! ```

use std::path::Path;

use serde::{Deserialize, Serialize};
use tracing::debug;

use super::geometry::{Box2I, Point2I};
use crate::error::{Error, Result};
use crate::ids::names::{detector_id_from_abbrev, expand_detector_name};

const MIN_COLUMNS: usize = 15;

/// Detector purpose.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "UPPERCASE")]
pub enum DetectorType {
    /// Science sensor.
    Science,
    /// Focus sensor.
    Focus,
    /// Guide sensor.
    Guider,
    /// Wavefront sensor.
    Wavefront,
}

impl DetectorType {
    /// Numeric code used in camera descriptions.
    #[must_use]
    pub fn code(self) -> i32 {
        match self {
            Self::Science => 0,
            Self::Focus => 1,
            Self::Guider => 2,
            Self::Wavefront => 3,
        }
    }

    fn from_group(group: &str) -> Option<Self> {
        match group {
            "Group0" => Some(Self::Science),
            "Group1" => Some(Self::Wavefront),
            "Group2" => Some(Self::Guider),
            _ => None,
        }
    }
}

/// Placement and shape of one detector.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct DetectorConfig {
    /// Full name, `R:x,y S:x,y[,c]`.
    pub name: String,
    /// Numeric id.
    pub id: i64,
    /// `<abbreviated name>_<phosim version>`.
    pub serial: String,
    /// Purpose.
    pub detector_type: DetectorType,
    /// Pixel bounding box.
    pub bbox: Box2I,
    /// Offset of the reference position on the focal plane, in mm.
    pub offset: [f64; 2],
    /// Reference position in pixels.
    pub refpos: [f64; 2],
    /// Yaw in degrees, including the quarter turn into camera coordinates.
    pub yaw_deg: f64,
    /// Pitch in degrees.
    pub pitch_deg: f64,
    /// Roll in degrees.
    pub roll_deg: f64,
    /// Pixel size in mm.
    pub pixel_size: [f64; 2],
    /// Whether the pixel axes are swapped.
    pub transpose_detector: bool,
}

fn column<T: std::str::FromStr>(
    path: &Path,
    line: usize,
    els: &[&str],
    index: usize,
    what: &str,
) -> Result<T> {
    els[index]
        .parse()
        .map_err(|_| Error::description(path, line, format!("bad {what}: {:?}", els[index])))
}

/// Parse a detector layout file.
///
/// # Errors
///
/// Returns an error if the file cannot be read or a line is malformed.
pub fn read_layout(path: &Path, phosim_version: &str) -> Result<Vec<DetectorConfig>> {
    let text = std::fs::read_to_string(path)?;
    parse_layout(path, &text, phosim_version)
}

/// Parse detector layout text; `path` is used only in error messages.
///
/// # Errors
///
/// Returns an error if a line is malformed.
pub fn parse_layout(path: &Path, text: &str, phosim_version: &str) -> Result<Vec<DetectorConfig>> {
    let mut detectors = Vec::new();
    for (i, raw) in text.lines().enumerate() {
        let line = i + 1;
        if raw.starts_with('#') || raw.trim().is_empty() {
            continue;
        }
        let els: Vec<&str> = raw.split_whitespace().collect();
        if els.len() < MIN_COLUMNS {
            return Err(Error::description(
                path,
                line,
                format!("expected at least {MIN_COLUMNS} columns, found {}", els.len()),
            ));
        }
        let abbrev = els[0];
        let name = expand_detector_name(abbrev)
            .map_err(|e| Error::description(path, line, e.to_string()))?;
        let id = detector_id_from_abbrev(abbrev)
            .map_err(|e| Error::description(path, line, e.to_string()))?;

        let x_um: f64 = column(path, line, &els, 1, "x position")?;
        let y_um: f64 = column(path, line, &els, 2, "y position")?;
        let pix_um: f64 = column(path, line, &els, 3, "pixel size")?;
        let ny: i64 = column(path, line, &els, 4, "row count")?;
        let nx: i64 = column(path, line, &els, 5, "column count")?;
        let detector_type = DetectorType::from_group(els[9]).ok_or_else(|| {
            Error::description(path, line, format!("unknown detector group {:?}", els[9]))
        })?;
        let yaw: f64 = column(path, line, &els, 10, "yaw")?;
        let pitch: f64 = column(path, line, &els, 11, "pitch")?;
        let roll: f64 = column(path, line, &els, 12, "roll")?;
        let dx: f64 = column(path, line, &els, 13, "x offset")?;
        let dy: f64 = column(path, line, &els, 14, "y offset")?;

        detectors.push(DetectorConfig {
            name,
            id,
            serial: format!("{abbrev}_{phosim_version}"),
            detector_type,
            bbox: Box2I::from_corners(Point2I::new(0, 0), Point2I::new(nx - 1, ny - 1)),
            offset: [x_um / 1000.0 + dx, y_um / 1000.0 + dy],
            refpos: [(nx as f64 - 1.0) / 2.0, (ny as f64 - 1.0) / 2.0],
            yaw_deg: 90.0 + yaw,
            pitch_deg: pitch,
            roll_deg: roll,
            pixel_size: [pix_um / 1000.0, pix_um / 1000.0],
            transpose_detector: false,
        });
    }
    debug!(count = detectors.len(), path = %path.display(), "Parsed detector layout");
    Ok(detectors)
}

#[cfg(test)]
mod tests {
    use super::*;

    const LAYOUT: &str = "\
# name x y pix ny nx thick group? ...
R22_S11 0.0 0.0 10.0 4000 4072 0 0 0 Group0 0.0 0.0 0.0 0.0 0.0
R00_S22_C0 -317500.0 -306500.0 10.0 2000 4072 0 0 0 Group1 0.5 0.1 0.2 0.01 -0.02

R40_S00 -300000.0 300000.0 10.0 4000 4072 0 0 0 Group2 0.0 0.0 0.0 0.0 0.0
";

    fn parse() -> Vec<DetectorConfig> {
        parse_layout(Path::new("focalplanelayout.txt"), LAYOUT, "3.4.2").unwrap()
    }

    #[test]
    fn test_science_detector() {
        let dets = parse();
        assert_eq!(dets.len(), 3);
        let d = &dets[0];
        assert_eq!(d.name, "R:2,2 S:1,1");
        assert_eq!(d.id, 2211);
        assert_eq!(d.serial, "R22_S11_3.4.2");
        assert_eq!(d.detector_type, DetectorType::Science);
        assert_eq!(d.bbox.max(), Point2I::new(4071, 3999));
        assert_eq!(d.refpos, [2035.5, 1999.5]);
        assert!((d.yaw_deg - 90.0).abs() < 1e-12);
        assert!((d.pixel_size[0] - 0.01).abs() < 1e-12);
    }

    #[test]
    fn test_wavefront_detector() {
        let d = &parse()[1];
        assert_eq!(d.name, "R:0,0 S:2,2,A");
        assert_eq!(d.id, 10_022);
        assert_eq!(d.detector_type, DetectorType::Wavefront);
        assert!((d.offset[0] - (-317.5 + 0.01)).abs() < 1e-9);
        assert!((d.offset[1] - (-306.5 - 0.02)).abs() < 1e-9);
        assert!((d.yaw_deg - 90.5).abs() < 1e-12);
        assert!((d.pitch_deg - 0.1).abs() < 1e-12);
    }

    #[test]
    fn test_guider_type() {
        assert_eq!(parse()[2].detector_type, DetectorType::Guider);
        assert_eq!(DetectorType::Guider.code(), 2);
    }

    #[test]
    fn test_short_line_reports_location() {
        let err = parse_layout(Path::new("l.txt"), "#\nR22_S11 0 0 10\n", "v").unwrap_err();
        assert_eq!(
            err.to_string(),
            "l.txt:2: expected at least 15 columns, found 4"
        );
    }

    #[test]
    fn test_unknown_group() {
        let text = "R22_S11 0 0 10 4000 4072 0 0 0 Group7 0 0 0 0 0\n";
        assert!(parse_layout(Path::new("l.txt"), text, "v").is_err());
    }
}

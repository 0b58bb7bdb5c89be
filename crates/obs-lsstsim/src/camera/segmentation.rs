//! Amplifier tables from a PhoSim `segmentation.txt`.
//!
//! A line with four columns (`name nAmps ny nx`) starts a detector; the
//! amplifier lines that follow it carry
//!
//! ```text
//! 0 name  1 ymin  2 ymax  3 xmin  4 xmax  5 xflip  6 yflip  7 gain ... 11 readnoise
//! ```
//!
//! PhoSim pixel coordinates are a quarter turn away from the image
//! coordinates used here, so rows are mirrored about `ny - 1`.

use std::path::Path;

use serde::{Deserialize, Serialize};
use tracing::debug;

use super::gain::GainTable;
use super::geometry::{Box2I, Extent2I, Point2I};
use crate::error::{Error, Result};
use crate::ids::names::expand_detector_name;

/// Saturation used when the gain table has no entry.
pub const DEFAULT_SATURATION: i64 = 65_535;

/// Rows of serial prescan in a raw amplifier image.
pub const PRESCAN: i64 = 1;
/// Columns of extended serial register, used as overscan.
pub const EXTENDED: i64 = 4;
/// Columns of horizontal overscan.
pub const H_OVERSCAN: i64 = 0;
/// Rows of vertical overscan.
pub const V_OVERSCAN: i64 = 0;

const MIN_AMP_COLUMNS: usize = 12;

/// Corner of the amplifier read out first.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "UPPERCASE")]
pub enum ReadoutCorner {
    /// Lower left.
    Ll,
    /// Lower right.
    Lr,
    /// Upper right.
    Ur,
    /// Upper left.
    Ul,
}

/// Amplifier non-linearity model.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Linearity {
    /// Model name.
    pub kind: String,
    /// Model coefficients.
    pub coeffs: [f64; 4],
}

impl Default for Linearity {
    fn default() -> Self {
        Self {
            kind: "None".to_string(),
            coeffs: [0.0, 1.0, 0.0, 0.0],
        }
    }
}

/// Electronic and raw-layout description of one amplifier.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct AmpInfo {
    /// `"x,y"`.
    pub name: String,
    /// Data region in assembled detector pixels.
    pub bbox: Box2I,
    /// Electrons per ADU.
    pub gain: f64,
    /// ADU.
    pub saturation: i64,
    /// Level above which pixels are suspect; NaN when not known.
    #[serde(with = "nan_as_null")]
    pub suspect_level: f64,
    /// Electrons.
    pub read_noise: f64,
    /// First pixel read.
    pub readout_corner: ReadoutCorner,
    /// Non-linearity.
    pub linearity: Linearity,
    /// Raw image is mirrored in x.
    pub raw_flip_x: bool,
    /// Raw image is mirrored in y.
    pub raw_flip_y: bool,
    /// Whole raw amplifier image.
    pub raw_bbox: Box2I,
    /// Data region of the raw image.
    pub raw_data_bbox: Box2I,
    /// Horizontal overscan of the raw image.
    pub raw_horizontal_overscan_bbox: Box2I,
    /// Vertical overscan of the raw image.
    pub raw_vertical_overscan_bbox: Box2I,
    /// Prescan of the raw image.
    pub raw_prescan_bbox: Box2I,
    /// Offset of the raw image within an assembled raw detector.
    pub raw_xy_offset: Extent2I,
}

/// JSON has no NaN, so it is written as `null`.
mod nan_as_null {
    use serde::{Deserialize, Deserializer, Serializer};

    pub fn serialize<S: Serializer>(value: &f64, s: S) -> Result<S::Ok, S::Error> {
        if value.is_nan() {
            s.serialize_none()
        } else {
            s.serialize_f64(*value)
        }
    }

    pub fn deserialize<'de, D: Deserializer<'de>>(d: D) -> Result<f64, D::Error> {
        Ok(Option::<f64>::deserialize(d)?.unwrap_or(f64::NAN))
    }
}

/// Amplifiers of one detector.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AmpTable {
    /// Full detector name, `R:x,y S:x,y[,c]`.
    pub detector: String,
    /// Amplifiers in file order.
    pub amps: Vec<AmpInfo>,
}

fn int_column(path: &Path, line: usize, els: &[&str], index: usize) -> Result<i64> {
    els[index].parse().map_err(|_| {
        Error::description(path, line, format!("column {index} is not an integer: {:?}", els[index]))
    })
}

fn float_column(path: &Path, line: usize, els: &[&str], index: usize) -> Result<f64> {
    els[index].parse().map_err(|_| {
        Error::description(path, line, format!("column {index} is not a number: {:?}", els[index]))
    })
}

/// `R22_S11_C17` gives `"1,7"`.
fn amp_name(phosim_name: &str) -> Option<String> {
    let suffix = phosim_name.rsplit('_').next()?;
    let mut chars = suffix.chars().skip(1);
    let (x, y) = (chars.next()?, chars.next()?);
    Some(format!("{x},{y}"))
}

struct Builder {
    detector: String,
    ny: i64,
    wavefront: bool,
    amps: Vec<AmpInfo>,
}

/// Parse a segmentation file.
///
/// # Errors
///
/// Returns an error if the file cannot be read or is malformed.
pub fn read_segmentation(path: &Path, gains: &GainTable) -> Result<Vec<AmpTable>> {
    let text = std::fs::read_to_string(path)?;
    parse_segmentation(path, &text, gains)
}

/// Parse segmentation text; `path` is used only in error messages.
///
/// # Errors
///
/// Returns an error if an amplifier line precedes every detector line,
/// has too few columns, or holds non-numeric values.
pub fn parse_segmentation(path: &Path, text: &str, gains: &GainTable) -> Result<Vec<AmpTable>> {
    let mut tables = Vec::new();
    let mut current: Option<Builder> = None;

    for (i, raw) in text.lines().enumerate() {
        let line = i + 1;
        if raw.starts_with('#') {
            continue;
        }
        let els: Vec<&str> = raw.split_whitespace().collect();
        if els.is_empty() {
            continue;
        }
        if els.len() == 4 {
            if let Some(done) = current.take() {
                tables.push(AmpTable {
                    detector: done.detector,
                    amps: done.amps,
                });
            }
            let detector = expand_detector_name(els[0])
                .map_err(|e| Error::description(path, line, e.to_string()))?;
            current = Some(Builder {
                detector,
                ny: int_column(path, line, &els, 2)?,
                wavefront: els[0].split('_').count() == 3,
                amps: Vec::new(),
            });
            continue;
        }

        let Some(builder) = current.as_mut() else {
            return Err(Error::description(
                path,
                line,
                "amplifier line before any detector line",
            ));
        };
        if els.len() < MIN_AMP_COLUMNS {
            return Err(Error::description(
                path,
                line,
                format!("expected at least {MIN_AMP_COLUMNS} columns, found {}", els.len()),
            ));
        }
        let amp = parse_amp(path, line, &els, builder, gains)?;
        builder.amps.push(amp);
    }

    if let Some(done) = current {
        tables.push(AmpTable {
            detector: done.detector,
            amps: done.amps,
        });
    }
    debug!(detectors = tables.len(), path = %path.display(), "Parsed segmentation");
    Ok(tables)
}

fn parse_amp(
    path: &Path,
    line: usize,
    els: &[&str],
    builder: &Builder,
    gains: &GainTable,
) -> Result<AmpInfo> {
    let name = amp_name(els[0])
        .ok_or_else(|| Error::description(path, line, format!("bad amplifier name {:?}", els[0])))?;

    let mut y0 = builder.ny - 1 - int_column(path, line, els, 2)?;
    let mut y1 = builder.ny - 1 - int_column(path, line, els, 1)?;
    // The C1 half of a wavefront sensor is offset by its own height.
    if builder.wavefront && y0 > 0 {
        y1 -= y0;
        y0 = 0;
    }
    let x0 = int_column(path, line, els, 3)?;
    let x1 = int_column(path, line, els, 4)?;

    let (gain, saturation) = match gains.get(els[0]) {
        Some(g) => (g.gain, g.saturation),
        None => (float_column(path, line, els, 7)?, DEFAULT_SATURATION),
    };
    let read_noise = float_column(path, line, els, 11)?;
    let raw_flip_x = int_column(path, line, els, 5)? != -1;
    let raw_flip_y = int_column(path, line, els, 6)? != 1;

    let ndx = x1 - x0 + 1;
    let ndy = y1 - y0 + 1;
    if ndx <= 0 || ndy <= 0 {
        return Err(Error::description(path, line, "empty amplifier region"));
    }
    let extra_x = EXTENDED + H_OVERSCAN;
    let extra_y = PRESCAN + V_OVERSCAN;

    Ok(AmpInfo {
        name,
        bbox: Box2I::from_corners(Point2I::new(x0, y0), Point2I::new(x1, y1)),
        gain,
        saturation,
        suspect_level: f64::NAN,
        read_noise,
        readout_corner: ReadoutCorner::Ll,
        linearity: Linearity::default(),
        raw_flip_x,
        raw_flip_y,
        raw_bbox: Box2I::from_extent(
            Point2I::new(0, 0),
            Extent2I::new(EXTENDED + ndx + H_OVERSCAN, PRESCAN + ndy + V_OVERSCAN),
        ),
        raw_data_bbox: Box2I::from_extent(Point2I::new(EXTENDED, PRESCAN), Extent2I::new(ndx, ndy)),
        raw_horizontal_overscan_bbox: Box2I::from_extent(
            Point2I::new(0, PRESCAN),
            Extent2I::new(EXTENDED, ndy),
        ),
        raw_vertical_overscan_bbox: Box2I::from_extent(
            Point2I::new(EXTENDED, PRESCAN + ndy),
            Extent2I::new(ndx, V_OVERSCAN),
        ),
        raw_prescan_bbox: Box2I::from_extent(Point2I::new(EXTENDED, 0), Extent2I::new(ndx, PRESCAN)),
        raw_xy_offset: Extent2I::new(
            x0 + extra_x * x0.div_euclid(ndx),
            y0 + extra_y * y0.div_euclid(ndy),
        ),
    })
}

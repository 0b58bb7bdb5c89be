//! Instrument signature removal bookkeeping.
//!
//! Detector-level corrections happen elsewhere. This module decides which
//! snaps a sensor needs and combines them, and prepares e-images: header
//! cards for an image that was never read out, plus a mask plane built from
//! the image border, the defect list and saturation.

use std::collections::BTreeSet;
use std::path::Path;

use serde::{Deserialize, Serialize};
use tracing::{debug, info, warn};

use crate::camera::{Box2I, Extent2I, Point2I};
use crate::error::{Error, Result};
use crate::fits::{self, Header};
use crate::ids::DataId;

/// Header keys averaged when two snaps are combined.
pub const AVERAGE_KEYS: &[&str] = &[
    "TAI", "MJD-OBS", "AIRMASS", "AZIMUTH", "ZENITH", "ROTANG", "SPIDANG", "ROTRATE",
];

/// Header keys summed when two snaps are combined.
pub const SUM_KEYS: &[&str] = &["EXPTIME", "CREXPTM", "DARKTIME"];

/// Saturation level of e-images.
pub const EIMAGE_SATURATION: i64 = 100_000;

/// Mask plane bits.
pub mod mask {
    /// Bad pixel.
    pub const BAD: u16 = 1 << 0;
    /// Saturated pixel.
    pub const SAT: u16 = 1 << 1;
    /// Interpolated pixel.
    pub const INTRP: u16 = 1 << 2;
    /// Cosmic ray.
    pub const CR: u16 = 1 << 3;
    /// Near the image edge.
    pub const EDGE: u16 = 1 << 4;
}

/// ISR settings for simulated sensors.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct IsrConfig {
    /// Apply dark correction. Simulated data has no darks.
    pub do_dark: bool,
    /// Combine the two snaps of a visit; otherwise use snap 0.
    pub do_snap_combine: bool,
    /// Write each corrected snap.
    pub do_write_snaps: bool,
    /// Write the final exposure.
    pub do_write: bool,
    /// Keys averaged when combining snaps.
    pub average_keys: Vec<String>,
    /// Keys summed when combining snaps.
    pub sum_keys: Vec<String>,
    /// Saturation level written into e-image headers.
    pub sat_val: i64,
    /// Width of the EDGE border masked on e-images.
    pub mask_edge_border: usize,
}

impl Default for IsrConfig {
    fn default() -> Self {
        Self {
            do_dark: false,
            do_snap_combine: true,
            do_write_snaps: true,
            do_write: true,
            average_keys: AVERAGE_KEYS.iter().map(|k| (*k).to_string()).collect(),
            sum_keys: SUM_KEYS.iter().map(|k| (*k).to_string()).collect(),
            sat_val: EIMAGE_SATURATION,
            mask_edge_border: 0,
        }
    }
}

/// What to do for one sensor.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct SnapPlan {
    /// Snaps to correct, in order.
    pub snaps: Vec<i64>,
    /// Whether the corrected snaps are combined.
    pub combine: bool,
    /// Whether each corrected snap is written.
    pub write_snaps: bool,
    /// Whether the final exposure is written.
    pub write: bool,
}

/// Plan the snaps of a sensor from the snaps that have raw data.
///
/// # Errors
///
/// Returns [`Error::InvalidSnap`] for a snap other than 0 or 1, and
/// [`Error::MissingSnap`] if a snap the plan needs is absent.
pub fn plan_snaps(config: &IsrConfig, sensor: &DataId, available: &[i64]) -> Result<SnapPlan> {
    let mut snaps = BTreeSet::new();
    for &snap in available {
        if !(0..=1).contains(&snap) {
            return Err(Error::InvalidSnap(snap));
        }
        snaps.insert(snap);
    }

    let required: &[i64] = if config.do_snap_combine {
        &[0, 1]
    } else {
        warn!("doSnapCombine false; using snap 0 as the result");
        &[0]
    };
    for &snap in required {
        if !snaps.contains(&snap) {
            return Err(Error::MissingSnap {
                snap,
                id: sensor.to_string(),
            });
        }
    }

    let plan = SnapPlan {
        snaps: snaps.into_iter().collect(),
        combine: config.do_snap_combine,
        write_snaps: config.do_write_snaps,
        write: config.do_write,
    };
    info!("Performing ISR on sensor {sensor}: snaps {:?}", plan.snaps);
    Ok(plan)
}

/// Header of a combined exposure: snap 0's cards with the average and sum
/// keys merged from both snaps.
///
/// A key missing or non-numeric in either snap keeps snap 0's value.
#[must_use]
pub fn combine_snap_metadata(config: &IsrConfig, snap0: &Header, snap1: &Header) -> Header {
    let mut combined = snap0.clone();
    let merge = |combined: &mut Header, keys: &[String], f: fn(f64, f64) -> f64| {
        for key in keys {
            match (snap0.get_f64(key), snap1.get_f64(key)) {
                (Some(a), Some(b)) => combined.set(key, f(a, b)),
                _ => warn!("Keyword {key} not found in both snaps"),
            }
        }
    };
    merge(&mut combined, &config.average_keys, |a, b| (a + b) / 2.0);
    merge(&mut combined, &config.sum_keys, |a, b| a + b);
    combined
}

/// Combine the two snaps of a sensor: pixels are summed and the header
/// comes from [`combine_snap_metadata`].
///
/// # Errors
///
/// Returns an error if either snap cannot be read, the sizes differ, or
/// the output cannot be written.
pub fn combine_snaps(
    config: &IsrConfig,
    snap0: &Path,
    snap1: &Path,
    output: &Path,
) -> Result<Header> {
    let (header0, pixels0) = fits::read_image(snap0)?;
    let (header1, pixels1) = fits::read_image(snap1)?;
    let (size0, size1) = (header0.image_size()?, header1.image_size()?);
    if size0 != size1 {
        return Err(Error::fits(
            snap1,
            format!("{}x{} image does not match snap 0 ({}x{})", size1.0, size1.1, size0.0, size0.1),
        ));
    }

    let combined = combine_snap_metadata(config, &header0, &header1);
    let pixels: Vec<f32> = pixels0.iter().zip(&pixels1).map(|(a, b)| a + b).collect();
    fits::write_image(output, &combined, &pixels, None)?;
    info!("Combined snaps into {}", output.display());
    Ok(combined)
}

/// Add the cards expected of an image that was never read out.
pub fn set_eimage_cards(header: &mut Header, sat_val: i64) {
    header.set("RDNOISE", 0.0);
    header.set("SATURATE", sat_val);
    header.set("GAINEFF", 1.0);
}

/// Flag pixels at or above `threshold` as saturated. Returns the number of
/// pixels flagged.
pub fn mask_saturated(image: &[f32], planes: &mut [u16], threshold: f32) -> usize {
    let mut count = 0;
    for (value, bits) in image.iter().zip(planes.iter_mut()) {
        if *value >= threshold {
            *bits |= mask::SAT;
            count += 1;
        }
    }
    count
}

/// Clear the SAT bit of pixels that are also BAD, so hot pixels are not
/// interpolated as saturation. Returns the number of pixels changed.
pub fn unmask_sat_hot_pixels(planes: &mut [u16]) -> usize {
    let both = mask::BAD | mask::SAT;
    let mut count = 0;
    for bits in planes.iter_mut().filter(|b| **b & both == both) {
        *bits &= !mask::SAT;
        count += 1;
    }
    count
}

/// Set the EDGE bit on a border of `npix` pixels of a row-major mask.
///
/// The top and right borders are one pixel wider than the others.
///
/// # Errors
///
/// Returns an error if `planes` does not hold `width * height` pixels.
pub fn mask_edges(planes: &mut [u16], width: usize, height: usize, npix: usize) -> Result<()> {
    if planes.len() != width * height {
        return Err(Error::internal(format!(
            "mask has {} pixels, expected {width}x{height}",
            planes.len()
        )));
    }
    if npix == 0 || width == 0 {
        return Ok(());
    }
    let top = height.saturating_sub(npix + 1);
    let right = width.saturating_sub(npix + 1);
    for (y, row) in planes.chunks_mut(width).enumerate() {
        let whole_row = y < npix || y >= top;
        for (x, bits) in row.iter_mut().enumerate() {
            if whole_row || x < npix || x >= right {
                *bits |= mask::EDGE;
            }
        }
    }
    Ok(())
}

/// Defect boxes in the transposed frame of an e-image, optionally only
/// those overlapping `check`.
#[must_use]
pub fn transpose_defects(defects: &[Box2I], check: Option<&Box2I>) -> Vec<Box2I> {
    defects
        .iter()
        .map(Box2I::transposed)
        .filter(|b| check.map_or(true, |c| b.overlaps(c)))
        .collect()
}

/// Set the BAD bit inside each defect box, clipped to the image. Returns
/// the number of boxes that touched the image.
///
/// # Errors
///
/// Returns an error if `planes` does not hold `width * height` pixels.
pub fn mask_defects(
    planes: &mut [u16],
    width: usize,
    height: usize,
    defects: &[Box2I],
) -> Result<usize> {
    if planes.len() != width * height {
        return Err(Error::internal(format!(
            "mask has {} pixels, expected {width}x{height}",
            planes.len()
        )));
    }
    let clip = |lo: i64, hi: i64, len: usize| {
        let lo = usize::try_from(lo.max(0)).ok()?;
        let hi = usize::try_from(hi).ok()?.min(len.checked_sub(1)?);
        (lo <= hi).then_some((lo, hi))
    };

    let mut count = 0;
    for defect in defects.iter().filter(|d| !d.is_empty()) {
        let max = defect.max();
        let (Some((x0, x1)), Some((y0, y1))) = (
            clip(defect.min.x, max.x, width),
            clip(defect.min.y, max.y, height),
        ) else {
            continue;
        };
        for row in planes.chunks_mut(width).skip(y0).take(y1 - y0 + 1) {
            for bits in &mut row[x0..=x1] {
                *bits |= mask::BAD;
            }
        }
        count += 1;
    }
    Ok(count)
}

/// Counts from [`process_eimage`].
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct EimageSummary {
    /// Image width in pixels.
    pub width: usize,
    /// Image height in pixels.
    pub height: usize,
    /// Defect boxes that fell on the image.
    pub defects: usize,
    /// Pixels at or above the saturation level.
    pub saturated: usize,
    /// Saturated pixels left flagged only as BAD.
    pub hot_pixels: usize,
}

/// Prepare an e-image for processing.
///
/// The output holds the input pixels as `f32` with the e-image cards set,
/// and a `MASK` extension with EDGE, BAD and SAT bits. Defects are given in
/// the readout frame and transposed onto the e-image.
///
/// # Errors
///
/// Returns an error if the input is not a two-dimensional image or the
/// output cannot be written.
pub fn process_eimage(
    config: &IsrConfig,
    input: &Path,
    defects: &[Box2I],
    output: &Path,
) -> Result<EimageSummary> {
    let (mut header, pixels) = fits::read_image(input)?;
    let (width, height) = header.image_size()?;
    let mut planes = vec![0u16; pixels.len()];
    mask_edges(&mut planes, width, height, config.mask_edge_border)?;

    let frame = Box2I::from_extent(
        Point2I::new(0, 0),
        Extent2I::new(width as i64, height as i64),
    );
    let defects = mask_defects(
        &mut planes,
        width,
        height,
        &transpose_defects(defects, Some(&frame)),
    )?;
    #[allow(clippy::cast_precision_loss)]
    let saturated = mask_saturated(&pixels, &mut planes, config.sat_val as f32);
    let hot_pixels = unmask_sat_hot_pixels(&mut planes);
    debug!("{saturated} saturated pixels, {hot_pixels} of them hot");

    set_eimage_cards(&mut header, config.sat_val);
    fits::write_image(output, &header, &pixels, Some(&planes))?;
    info!("Wrote e-image {}", output.display());
    Ok(EimageSummary {
        width,
        height,
        defects,
        saturated,
        hot_pixels,
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    fn sensor() -> DataId {
        DataId::ccd(85_471_048, "2,2", "1,1")
    }

    #[test]
    fn test_defaults() {
        let config = IsrConfig::default();
        assert!(!config.do_dark);
        assert!(config.do_snap_combine && config.do_write_snaps && config.do_write);
        assert_eq!(config.sum_keys, vec!["EXPTIME", "CREXPTM", "DARKTIME"]);
        assert_eq!(config.average_keys.len(), 8);
    }

    #[test]
    fn test_plan_requires_both_snaps_when_combining() {
        let config = IsrConfig::default();
        let plan = plan_snaps(&config, &sensor(), &[1, 0]).unwrap();
        assert_eq!(plan.snaps, vec![0, 1]);
        assert!(plan.combine);

        let err = plan_snaps(&config, &sensor(), &[0]).unwrap_err();
        assert!(matches!(err, Error::MissingSnap { snap: 1, .. }));
    }

    #[test]
    fn test_plan_without_combining_needs_snap_zero() {
        let config = IsrConfig {
            do_snap_combine: false,
            ..IsrConfig::default()
        };
        assert_eq!(plan_snaps(&config, &sensor(), &[0]).unwrap().snaps, vec![0]);
        assert!(matches!(
            plan_snaps(&config, &sensor(), &[1]),
            Err(Error::MissingSnap { snap: 0, .. })
        ));
    }

    #[test]
    fn test_plan_rejects_unknown_snap() {
        let err = plan_snaps(&IsrConfig::default(), &sensor(), &[0, 2]).unwrap_err();
        assert_eq!(err.to_string(), "unrecognized snapId=2");
    }

    #[test]
    fn test_combine_snap_metadata() {
        let mut a = Header::new();
        a.set("EXPTIME", 15.0);
        a.set("MJD-OBS", 51_544.0);
        a.set("AIRMASS", 1.2);
        a.set("FILTER", "r");
        let mut b = a.clone();
        b.set("EXPTIME", 15.0);
        b.set("MJD-OBS", 51_544.5);
        b.set("FILTER", "g");

        let combined = combine_snap_metadata(&IsrConfig::default(), &a, &b);
        assert_eq!(combined.get_f64("EXPTIME"), Some(30.0));
        assert_eq!(combined.get_f64("MJD-OBS"), Some(51_544.25));
        assert_eq!(combined.get_f64("AIRMASS"), Some(1.2));
        assert_eq!(combined.require_str("FILTER").unwrap(), "r");
        assert!(!combined.contains("DARKTIME"));
    }

    #[test]
    fn test_set_eimage_cards() {
        let mut h = Header::new();
        set_eimage_cards(&mut h, EIMAGE_SATURATION);
        assert_eq!(h.get_f64("RDNOISE"), Some(0.0));
        assert_eq!(h.require_i64("SATURATE").unwrap(), 100_000);
        assert_eq!(h.get_f64("GAINEFF"), Some(1.0));
    }

    #[test]
    fn test_saturation_masks() {
        let image = [10.0, 200_000.0, 100_000.0, 5.0];
        let mut bits = [0, mask::BAD, 0, mask::BAD];
        assert_eq!(mask_saturated(&image, &mut bits, 100_000.0), 2);
        assert_eq!(bits, [0, mask::BAD | mask::SAT, mask::SAT, mask::BAD]);
        assert_eq!(unmask_sat_hot_pixels(&mut bits), 1);
        assert_eq!(bits, [0, mask::BAD, mask::SAT, mask::BAD]);
    }

    #[test]
    fn test_mask_edges() {
        let mut bits = vec![0u16; 6 * 5];
        mask_edges(&mut bits, 6, 5, 1).unwrap();
        let edge = |x: usize, y: usize| bits[y * 6 + x] & mask::EDGE != 0;
        assert!(edge(0, 0) && edge(3, 0));
        assert!(edge(0, 2) && !edge(1, 2) && !edge(3, 2) && edge(4, 2) && edge(5, 2));
        assert!(edge(2, 3) && edge(2, 4));
        assert!(!edge(2, 1));
        assert!(mask_edges(&mut bits, 4, 4, 1).is_err());
    }

    #[test]
    fn test_transpose_defects() {
        let defects = [
            Box2I::from_extent(Point2I::new(10, 2), Extent2I::new(3, 1)),
            Box2I::from_extent(Point2I::new(100, 200), Extent2I::new(1, 1)),
        ];
        let all = transpose_defects(&defects, None);
        assert_eq!(
            all[0],
            Box2I::from_extent(Point2I::new(2, 10), Extent2I::new(1, 3))
        );
        let check = Box2I::from_extent(Point2I::new(0, 0), Extent2I::new(50, 50));
        assert_eq!(transpose_defects(&defects, Some(&check)).len(), 1);
    }

    #[test]
    fn test_mask_defects_clips_to_image() {
        let mut bits = vec![0u16; 4 * 3];
        let defects = [
            Box2I::from_extent(Point2I::new(-1, 1), Extent2I::new(2, 5)),
            Box2I::from_extent(Point2I::new(3, 0), Extent2I::new(1, 1)),
            Box2I::from_extent(Point2I::new(9, 9), Extent2I::new(2, 2)),
            Box2I::from_extent(Point2I::new(1, 1), Extent2I::new(0, 2)),
        ];
        assert_eq!(mask_defects(&mut bits, 4, 3, &defects).unwrap(), 2);
        let bad: Vec<usize> = bits
            .iter()
            .enumerate()
            .filter(|(_, b)| **b & mask::BAD != 0)
            .map(|(i, _)| i)
            .collect();
        assert_eq!(bad, vec![3, 4, 8]);
        assert!(mask_defects(&mut bits, 5, 3, &defects).is_err());
    }

    fn write_snap(path: &Path, exptime: f64, mjd: f64, pixels: &[f32]) {
        let mut header = Header::image(-32, &[3, 2]);
        header.set("EXPTIME", exptime);
        header.set("MJD-OBS", mjd);
        header.set("FILTER", "r");
        fits::write_image(path, &header, pixels, None).unwrap();
    }

    #[test]
    fn test_combine_snaps() {
        let dir = tempfile::tempdir().unwrap();
        let (snap0, snap1) = (dir.path().join("e0.fits"), dir.path().join("e1.fits"));
        write_snap(&snap0, 15.0, 51_544.0, &[1.0, 2.0, 3.0, 4.0, 5.0, 6.0]);
        write_snap(&snap1, 15.0, 51_544.5, &[1.0; 6]);

        let output = dir.path().join("combined.fits");
        let header = combine_snaps(&IsrConfig::default(), &snap0, &snap1, &output).unwrap();
        assert_eq!(header.get_f64("EXPTIME"), Some(30.0));

        let (written, pixels) = fits::read_image(&output).unwrap();
        assert_eq!(pixels, vec![2.0, 3.0, 4.0, 5.0, 6.0, 7.0]);
        assert_eq!(written.get_f64("MJD-OBS"), Some(51_544.25));
        assert_eq!(written.require_str("FILTER").unwrap(), "r");
    }

    #[test]
    fn test_combine_snaps_rejects_size_mismatch() {
        let dir = tempfile::tempdir().unwrap();
        let (snap0, snap1) = (dir.path().join("e0.fits"), dir.path().join("e1.fits"));
        write_snap(&snap0, 15.0, 51_544.0, &[0.0; 6]);
        fits::write_image(&snap1, &Header::image(-32, &[2, 2]), &[0.0; 4], None).unwrap();
        let output = dir.path().join("combined.fits");
        assert!(matches!(
            combine_snaps(&IsrConfig::default(), &snap0, &snap1, &output),
            Err(Error::Fits { .. })
        ));
        assert!(!output.exists());
    }

    #[test]
    fn test_process_eimage() {
        let dir = tempfile::tempdir().unwrap();
        let input = dir.path().join("eimage.fits");
        // 4 columns, 3 rows; pixels 5 and 6 saturate
        let mut pixels = [10.0f32; 12];
        pixels[5] = 150_000.0;
        pixels[6] = 100_000.0;
        fits::write_image(&input, &Header::image(-32, &[4, 3]), &pixels, None).unwrap();

        // readout-frame box at x=1, y=1 lands on e-image pixel (1, 1) = index 5
        let defects = [Box2I::from_extent(Point2I::new(1, 1), Extent2I::new(1, 1))];
        let output = dir.path().join("processed.fits");
        let summary = process_eimage(&IsrConfig::default(), &input, &defects, &output).unwrap();
        assert_eq!(
            summary,
            EimageSummary {
                width: 4,
                height: 3,
                defects: 1,
                saturated: 2,
                hot_pixels: 1,
            }
        );

        let (header, written) = fits::read_image(&output).unwrap();
        assert_eq!(written, pixels);
        assert_eq!(header.require_i64("SATURATE").unwrap(), EIMAGE_SATURATION);
        assert_eq!(header.get_f64("GAINEFF"), Some(1.0));
        let headers = fits::read_headers(&output).unwrap();
        assert_eq!(headers[1].require_str("EXTNAME").unwrap(), "MASK");
    }

    #[test]
    fn test_process_eimage_masks_edges() {
        let dir = tempfile::tempdir().unwrap();
        let input = dir.path().join("eimage.fits");
        fits::write_image(&input, &Header::image(-32, &[6, 5]), &[1.0; 30], None).unwrap();
        let config = IsrConfig {
            mask_edge_border: 1,
            ..IsrConfig::default()
        };
        let output = dir.path().join("processed.fits");
        let summary = process_eimage(&config, &input, &[], &output).unwrap();
        assert_eq!(summary.saturated, 0);
        assert_eq!(summary.defects, 0);
        assert!(process_eimage(&config, &dir.path().join("none.fits"), &[], &output).is_err());
    }
}

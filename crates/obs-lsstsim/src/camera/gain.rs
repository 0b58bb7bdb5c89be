//! Per-amplifier gain and saturation tables.
//!
//! The text form has one `AMP gain saturation` line per amplifier, where
//! `AMP` is the PhoSim amplifier name such as `R22_S11_C00`.

use std::collections::BTreeMap;
use std::fmt::Write as _;
use std::path::Path;

use serde::Serialize;
use tracing::{debug, info, warn};

use crate::error::{Error, Result};
use crate::fits;

/// Gain and saturation of one amplifier.
#[derive(Debug, Clone, Copy, PartialEq, Serialize)]
pub struct GainSaturation {
    /// Gain in electrons per ADU.
    pub gain: f64,
    /// Saturation level in ADU.
    pub saturation: i64,
}

/// Gain and saturation keyed by PhoSim amplifier name.
#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct GainTable {
    amps: BTreeMap<String, GainSaturation>,
}

impl GainTable {
    /// Create an empty table.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Add or replace an amplifier.
    pub fn insert(&mut self, amp: impl Into<String>, value: GainSaturation) {
        self.amps.insert(amp.into(), value);
    }

    /// Look up an amplifier.
    #[must_use]
    pub fn get(&self, amp: &str) -> Option<&GainSaturation> {
        self.amps.get(amp)
    }

    /// Number of amplifiers.
    #[must_use]
    pub fn len(&self) -> usize {
        self.amps.len()
    }

    /// Whether the table is empty.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.amps.is_empty()
    }

    /// Parse the text form; `path` is used only in error messages.
    ///
    /// # Errors
    ///
    /// Returns an error if a line has fewer than three columns or
    /// non-numeric values.
    pub fn parse(path: &Path, text: &str) -> Result<Self> {
        let mut table = Self::new();
        for (i, raw) in text.lines().enumerate() {
            let els: Vec<&str> = raw.split_whitespace().collect();
            if els.is_empty() {
                continue;
            }
            let [amp, gain, saturation, ..] = els.as_slice() else {
                return Err(Error::description(
                    path,
                    i + 1,
                    "expected 'AMP gain saturation'",
                ));
            };
            let gain: f64 = gain
                .parse()
                .map_err(|_| Error::description(path, i + 1, format!("bad gain {gain:?}")))?;
            let saturation = parse_saturation(saturation).ok_or_else(|| {
                Error::description(path, i + 1, format!("bad saturation {saturation:?}"))
            })?;
            table.insert(*amp, GainSaturation { gain, saturation });
        }
        Ok(table)
    }

    /// Read the text form from a file.
    ///
    /// # Errors
    ///
    /// Returns an error if the file cannot be read or parsed.
    pub fn read(path: &Path) -> Result<Self> {
        let text = std::fs::read_to_string(path)?;
        Self::parse(path, &text)
    }

    /// Render the text form, sorted by amplifier name.
    #[must_use]
    pub fn to_text(&self) -> String {
        let mut out = String::new();
        for (amp, v) in &self.amps {
            let _ = writeln!(out, "{amp} {} {}", v.gain, v.saturation);
        }
        out
    }

    /// Write the text form to a file.
    ///
    /// # Errors
    ///
    /// Returns an error if the file cannot be written.
    pub fn write(&self, path: &Path) -> Result<()> {
        std::fs::write(path, self.to_text())?;
        info!(amps = self.len(), path = %path.display(), "Wrote gain file");
        Ok(())
    }
}

/// Saturation may be written as a float; it is truncated like `int()`.
fn parse_saturation(s: &str) -> Option<i64> {
    s.parse::<i64>()
        .ok()
        .or_else(|| s.parse::<f64>().ok().filter(|v| v.is_finite()).map(|v| v.trunc() as i64))
}

/// Collect gain and saturation from PhoSim amplifier images in `dir`
/// (`lsst_a_*R??_S??_C??*.fits.gz`), keyed by `CCDID_AMPID`.
///
/// Files whose headers cannot be read are logged and skipped.
///
/// # Errors
///
/// Returns an error if `dir` cannot be turned into a glob pattern.
pub fn extract_from_amp_images(dir: &Path) -> Result<GainTable> {
    let pattern = format!(
        "{}/lsst_a_*R??_S??_C??*.fits.gz",
        glob::Pattern::escape(&dir.to_string_lossy())
    );
    let mut table = GainTable::new();
    for entry in glob::glob(&pattern)? {
        let path = match entry {
            Ok(path) => path,
            Err(e) => {
                warn!("Error accessing {}: {e}", e.path().display());
                continue;
            }
        };
        debug!(path = %path.display(), "Reading amplifier header");
        match amp_gain(&path) {
            Ok((amp, value)) => table.insert(amp, value),
            Err(e) if e.is_skippable() => warn!(path = %path.display(), "Skipping: {e}"),
            Err(e) => return Err(e),
        }
    }
    Ok(table)
}

fn amp_gain(path: &Path) -> Result<(String, GainSaturation)> {
    let header = fits::read_primary_header(path)?;
    let amp = format!(
        "{}_{}",
        header.require_str("CCDID")?,
        header.require_str("AMPID")?
    );
    let gain = header.require_f64("GAIN")?;
    let saturation = header.require_f64("SATURATE")?.trunc() as i64;
    Ok((amp, GainSaturation { gain, saturation }))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::fits::Header;

    #[test]
    fn test_parse_and_render_sorted() {
        let text = "R22_S11_C01 1.7 100000\n\nR22_S11_C00 1.5 95000.0\n";
        let table = GainTable::parse(Path::new("gain.txt"), text).unwrap();
        assert_eq!(table.len(), 2);
        assert_eq!(
            table.get("R22_S11_C00"),
            Some(&GainSaturation {
                gain: 1.5,
                saturation: 95_000
            })
        );
        assert_eq!(
            table.to_text(),
            "R22_S11_C00 1.5 95000\nR22_S11_C01 1.7 100000\n"
        );
    }

    #[test]
    fn test_parse_rejects_short_line() {
        let err = GainTable::parse(Path::new("gain.txt"), "R22_S11_C00 1.5\n").unwrap_err();
        assert!(err.to_string().starts_with("gain.txt:1:"));
    }

    #[test]
    fn test_extract_from_amp_images() {
        let dir = tempfile::tempdir().unwrap();
        for (amp, gain) in [("C00", 1.5), ("C17", 1.8)] {
            let mut h = Header::image(16, &[]);
            h.set("CCDID", "R22_S11");
            h.set("AMPID", amp);
            h.set("GAIN", gain);
            h.set("SATURATE", 100_000.7);
            let name = format!("lsst_a_99_f2_R22_S11_{amp}_E000.fits.gz");
            fits::write_headers(&dir.path().join(name), &[h]).unwrap();
        }
        std::fs::write(dir.path().join("lsst_a_1_R22_S11_C05_E000.fits.gz"), b"junk").unwrap();
        std::fs::write(dir.path().join("lsst_e_1_R22_S11_E000.fits.gz"), b"junk").unwrap();

        let table = extract_from_amp_images(dir.path()).unwrap();
        assert_eq!(table.len(), 2);
        let c17 = table.get("R22_S11_C17").unwrap();
        assert!((c17.gain - 1.8).abs() < 1e-12);
        assert_eq!(c17.saturation, 100_000);
    }

    #[test]
    fn test_write_and_read() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("gain_saturation.txt");
        let mut table = GainTable::new();
        table.insert(
            "R01_S00_C10",
            GainSaturation {
                gain: 2.0,
                saturation: 65_535,
            },
        );
        table.write(&path).unwrap();
        assert_eq!(GainTable::read(&path).unwrap(), table);
    }
}

//! The defect registry.
//!
//! Defect lists live under `rev_<version>/defects<n>[AB].fits`; the detector
//! a list applies to is the `NAME` keyword of its first extension.

use std::path::Path;
use std::sync::LazyLock;

use regex::Regex;
use serde::Serialize;
use tracing::{info, warn};

use super::{glob_under, Registry, RegistryKind};
use crate::error::Result;
use crate::fits;
use crate::ids::names::short_ccd_name;

/// Start of the validity range given to every defect list.
pub const VALID_START: &str = "1970-01-01";

/// End of the validity range given to every defect list.
pub const VALID_END: &str = "2037-12-31";

static DEFECT_PATH_RE: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"rev_(\d+)/defects(\d+)[AB]*\.fits$").expect("static regex is valid")
});

/// One registered defect list.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct DefectRow {
    /// Path relative to the defect directory.
    pub path: String,
    /// Revision from the `rev_<n>` directory.
    pub version: i64,
    /// Full detector name.
    pub ccd: String,
    /// Short detector name and simulator version, e.g. `R22_S11_3.4`.
    pub ccd_serial: String,
    /// First valid date.
    pub valid_start: String,
    /// Last valid date.
    pub valid_end: String,
}

impl DefectRow {
    fn from_row(row: &rusqlite::Row) -> rusqlite::Result<Self> {
        Ok(Self {
            path: row.get(0)?,
            version: row.get(1)?,
            ccd: row.get(2)?,
            ccd_serial: row.get(3)?,
            valid_start: row.get(4)?,
            valid_end: row.get(5)?,
        })
    }
}

impl Registry {
    /// Add a defect list.
    ///
    /// # Errors
    ///
    /// Returns an error if the database operation fails.
    pub fn insert_defect(&self, row: &DefectRow) -> Result<()> {
        self.conn.execute(
            r"
            INSERT INTO defect (path, version, ccd, ccdSerial, validStart, validEnd)
            VALUES (?1, ?2, ?3, ?4, ?5, ?6)
            ",
            (
                &row.path,
                row.version,
                &row.ccd,
                &row.ccd_serial,
                &row.valid_start,
                &row.valid_end,
            ),
        )?;
        Ok(())
    }

    /// Registered defect lists, optionally only those of one detector.
    ///
    /// # Errors
    ///
    /// Returns an error if the database operation fails.
    pub fn defects(&self, ccd: Option<&str>) -> Result<Vec<DefectRow>> {
        let mut stmt = self.conn.prepare(
            r"
            SELECT path, version, ccd, ccdSerial, validStart, validEnd
            FROM defect
            WHERE ?1 IS NULL OR ccd = ?1
            ORDER BY id
            ",
        )?;
        let rows = stmt
            .query_map([ccd], DefectRow::from_row)?
            .collect::<std::result::Result<Vec<_>, _>>()?;
        Ok(rows)
    }
}

/// Build the defect registry for the lists under `defect_dir`, replacing
/// any existing registry at `output`. Returns the number of lists added.
///
/// # Errors
///
/// Returns an error if the registry cannot be written.
pub fn build_defect_registry(
    defect_dir: &Path,
    output: &Path,
    phosim_version: &str,
) -> Result<usize> {
    let registry = Registry::replace(output, RegistryKind::Defect)?;
    let mut added = 0;

    for path in glob_under(defect_dir, "rev_*/defects*.fits")? {
        let relative = path
            .strip_prefix(defect_dir)
            .unwrap_or(&path)
            .to_string_lossy()
            .replace('\\', "/");
        let Some(caps) = DEFECT_PATH_RE.captures(&relative) else {
            warn!("Skipping bad data: {}", path.display());
            continue;
        };
        let version: i64 = caps[1].parse().unwrap_or_default();

        let header = match fits::read_header(&path, 1) {
            Ok(header) => header,
            Err(e) if e.is_skippable() => {
                warn!("Cannot read header of {}: {e}", path.display());
                continue;
            }
            Err(e) => return Err(e),
        };
        let ccd = match header.require_str("NAME") {
            Ok(name) => name.to_string(),
            Err(e) => {
                warn!("Skipping {}: {e}", path.display());
                continue;
            }
        };

        registry.insert_defect(&DefectRow {
            path: relative,
            version,
            ccd_serial: format!("{}_{phosim_version}", short_ccd_name(&ccd)),
            ccd,
            valid_start: VALID_START.to_string(),
            valid_end: VALID_END.to_string(),
        })?;
        added += 1;
    }

    info!("Registered {added} defect lists");
    Ok(added)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::fits::Header;

    fn write_defects(dir: &Path, relative: &str, ccd: &str) {
        let path = dir.join(relative);
        std::fs::create_dir_all(path.parent().unwrap()).unwrap();
        let mut table = Header::extension();
        table.set("NAME", ccd);
        fits::write_headers(&path, &[Header::image(8, &[]), table]).unwrap();
    }

    #[test]
    fn test_build_defect_registry() {
        let dir = tempfile::tempdir().unwrap();
        let defects = dir.path().join("defects");
        write_defects(&defects, "rev_2/defects0A.fits", "R:2,2 S:1,1");
        write_defects(&defects, "rev_2/defects1.fits", "R:0,1 S:2,0");
        write_defects(&defects, "rev_x/defects2.fits", "R:0,1 S:2,1");

        let output = dir.path().join("defectRegistry.sqlite3");
        assert_eq!(build_defect_registry(&defects, &output, "3.4").unwrap(), 2);

        let registry = Registry::open_existing(&output, RegistryKind::Defect).unwrap();
        let rows = registry.defects(Some("R:2,2 S:1,1")).unwrap();
        assert_eq!(
            rows,
            vec![DefectRow {
                path: "rev_2/defects0A.fits".to_string(),
                version: 2,
                ccd: "R:2,2 S:1,1".to_string(),
                ccd_serial: "R22_S11_3.4".to_string(),
                valid_start: VALID_START.to_string(),
                valid_end: VALID_END.to_string(),
            }]
        );
        assert_eq!(registry.defects(None).unwrap().len(), 2);
    }

    #[test]
    fn test_missing_extension_skipped() {
        let dir = tempfile::tempdir().unwrap();
        let defects = dir.path().join("defects");
        std::fs::create_dir_all(defects.join("rev_1")).unwrap();
        fits::write_headers(&defects.join("rev_1/defects0.fits"), &[Header::image(8, &[])])
            .unwrap();
        let output = dir.path().join("defectRegistry.sqlite3");
        assert_eq!(build_defect_registry(&defects, &output, "3.4").unwrap(), 0);
    }

    #[test]
    fn test_rebuild_replaces_rows() {
        let dir = tempfile::tempdir().unwrap();
        let defects = dir.path().join("defects");
        write_defects(&defects, "rev_1/defects0.fits", "R:2,2 S:1,1");
        let output = dir.path().join("defectRegistry.sqlite3");
        build_defect_registry(&defects, &output, "3.4").unwrap();
        build_defect_registry(&defects, &output, "3.4").unwrap();
        let registry = Registry::open_existing(&output, RegistryKind::Defect).unwrap();
        assert_eq!(registry.count("defect").unwrap(), 1);
    }
}

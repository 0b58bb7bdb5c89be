//! The calibration registry.
//!
//! Bias, dark, flat and fringe frames are found with the calibration path
//! templates. Fringe frames are the flat files registered a second time.

use std::collections::BTreeMap;
use std::path::Path;

use rusqlite::params_from_iter;
use rusqlite::types::Value as SqlValue;
use tracing::{info, warn};

use super::{comma_form, Registry, RegistryKind};
use crate::error::Result;
use crate::fits::{self, Header};
use crate::mapper::Dataset;
use crate::template::{FieldKind, PathTemplate};

fn sql_value(kind: FieldKind, key: &str, value: &str) -> SqlValue {
    match key {
        "raft" | "sensor" | "channel" => return SqlValue::Text(comma_form(value)),
        _ => {}
    }
    match kind {
        FieldKind::Integer | FieldKind::Hex => value
            .parse()
            .map_or_else(|_| SqlValue::Text(value.to_string()), SqlValue::Integer),
        FieldKind::Float => value
            .parse()
            .map_or_else(|_| SqlValue::Text(value.to_string()), SqlValue::Real),
        FieldKind::Text => SqlValue::Text(value.to_string()),
    }
}

impl Registry {
    /// Register one calibration file and its header cards. Returns the
    /// new row id.
    ///
    /// Raft, sensor and channel values in path form (`"22"`) are stored
    /// as `"2,2"`.
    ///
    /// # Errors
    ///
    /// Returns an error if the database operation fails.
    pub fn insert_calib(
        &self,
        dataset: Dataset,
        template: &PathTemplate,
        values: &BTreeMap<String, String>,
        header: &Header,
    ) -> Result<i64> {
        let name = dataset.as_str();
        let mut columns = Vec::new();
        let mut row = Vec::new();
        for field in template.unique_fields() {
            columns.push(field.key.as_str());
            row.push(
                values
                    .get(&field.key)
                    .map_or(SqlValue::Null, |v| sql_value(field.kind, &field.key, v)),
            );
        }
        columns.extend(["width", "height"]);
        for keyword in ["NAXIS1", "NAXIS2"] {
            row.push(
                header
                    .get(keyword)
                    .and_then(fits::Value::as_i64)
                    .map_or(SqlValue::Null, SqlValue::Integer),
            );
        }

        let placeholders: Vec<String> = (1..=row.len()).map(|i| format!("?{i}")).collect();
        let tx = self.conn.unchecked_transaction()?;
        tx.execute(
            &format!(
                "INSERT INTO {name} ({}) VALUES ({})",
                columns.join(", "),
                placeholders.join(", ")
            ),
            params_from_iter(row),
        )?;
        let id = tx.last_insert_rowid();
        {
            let mut stmt = tx.prepare(&format!("INSERT INTO {name}_md VALUES (?1, ?2, ?3)"))?;
            for card in header.cards() {
                stmt.execute((id, &card.keyword, card.value.to_string()))?;
            }
        }
        tx.commit()?;
        Ok(id)
    }

    /// Header cards recorded for a calibration row, in header order.
    ///
    /// # Errors
    ///
    /// Returns an error if the database operation fails.
    pub fn calib_metadata(&self, dataset: Dataset, id: i64) -> Result<Vec<(String, String)>> {
        let mut stmt = self.conn.prepare(&format!(
            "SELECT key, value FROM {}_md WHERE id = ?1 ORDER BY rowid",
            dataset.as_str()
        ))?;
        let cards = stmt
            .query_map([id], |row| Ok((row.get(0)?, row.get(1)?)))?
            .collect::<std::result::Result<Vec<_>, _>>()?;
        Ok(cards)
    }
}

/// Build the calibration registry for the frames under `root`, replacing
/// any existing registry at `output`. Returns the number of rows added
/// per calibration type.
///
/// Files whose headers cannot be read are logged and skipped.
///
/// # Errors
///
/// Returns an error if the registry cannot be written.
pub fn build_calib_registry(root: &Path, output: &Path) -> Result<Vec<(Dataset, usize)>> {
    let registry = Registry::replace(output, RegistryKind::Calib)?;
    let mut added = Vec::new();

    for dataset in Dataset::CALIBS {
        let template = dataset.path_template()?;
        let mut count = 0;
        for (path, values) in template.scan(root)? {
            let header = match fits::read_primary_header(&path) {
                Ok(header) => header,
                Err(e) if e.is_skippable() => {
                    warn!("Cannot read header of {}: {e}", path.display());
                    continue;
                }
                Err(e) => return Err(e),
            };
            registry.insert_calib(dataset, &template, &values, &header)?;
            count += 1;
        }
        info!("Registered {count} {dataset} frames");
        added.push((dataset, count));
    }
    Ok(added)
}

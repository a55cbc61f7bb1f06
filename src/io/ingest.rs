//! JSON input loading.
//!
//! - company snapshots: a JSON array of [`CompanySnapshot`] objects, or one object
//! - sector tables: a JSON object `{ "<sector>": <multiplier>, ... }` layered over
//!   the default table
//!
//! Everything that fails here is a usage problem and maps to exit code 2.

use std::collections::BTreeMap;
use std::fs::File;
use std::io::{BufReader, Read};
use std::path::Path;

use serde::Deserialize;

use crate::chain::SectorTable;
use crate::domain::{CompanySnapshot, UnknownSectorPolicy};
use crate::error::AppError;

#[derive(Deserialize)]
#[serde(untagged)]
enum SnapshotInput {
    Many(Vec<CompanySnapshot>),
    One(CompanySnapshot),
}

/// Load company snapshots from a JSON file.
pub fn read_snapshots_json(path: &Path) -> Result<Vec<CompanySnapshot>, AppError> {
    let file = File::open(path)
        .map_err(|e| AppError::new(2, format!("Failed to open snapshots JSON '{}': {e}", path.display())))?;
    parse_snapshots(BufReader::new(file))
}

pub fn parse_snapshots<R: Read>(reader: R) -> Result<Vec<CompanySnapshot>, AppError> {
    let input: SnapshotInput =
        serde_json::from_reader(reader).map_err(|e| AppError::new(2, format!("Invalid snapshots JSON: {e}")))?;
    let snapshots = match input {
        SnapshotInput::Many(v) => v,
        SnapshotInput::One(s) => vec![s],
    };
    if snapshots.is_empty() {
        return Err(AppError::new(2, "Snapshots JSON contains no companies."));
    }
    Ok(snapshots)
}

/// Load sector multipliers and merge them over the default table.
pub fn read_sector_table_json(path: &Path, policy: UnknownSectorPolicy) -> Result<SectorTable, AppError> {
    let file = File::open(path)
        .map_err(|e| AppError::new(2, format!("Failed to open sector table '{}': {e}", path.display())))?;
    parse_sector_table(BufReader::new(file), policy)
}

pub fn parse_sector_table<R: Read>(reader: R, policy: UnknownSectorPolicy) -> Result<SectorTable, AppError> {
    let overrides: BTreeMap<String, f64> =
        serde_json::from_reader(reader).map_err(|e| AppError::new(2, format!("Invalid sector table JSON: {e}")))?;
    let mut table = SectorTable::default().with_policy(policy);
    for (sector, multiplier) in &overrides {
        table
            .insert(sector, *multiplier)
            .map_err(|e| AppError::new(2, e.to_string()))?;
    }
    Ok(table)
}

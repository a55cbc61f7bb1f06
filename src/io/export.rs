//! JSON exports.
//!
//! Single-company results serialize [`ForecastResult`] as-is; batches wrap the
//! results with a failure list so a partially failed batch is still one
//! machine-readable document.

use std::fs::File;
use std::io::{BufWriter, Write};
use std::path::Path;

use serde::Serialize;

use crate::chain::BatchOutcome;
use crate::domain::ForecastResult;
use crate::error::AppError;

#[derive(Debug, Clone, Serialize)]
pub struct FailureRecord {
    pub index: usize,
    pub company: String,
    pub exit_code: u8,
    pub error: String,
}

#[derive(Debug, Clone, Serialize)]
pub struct BatchReport<'a> {
    pub results: &'a [ForecastResult],
    pub failures: Vec<FailureRecord>,
    pub skipped: usize,
    pub cancelled: bool,
}

impl<'a> BatchReport<'a> {
    pub fn from_outcome(outcome: &'a BatchOutcome) -> Self {
        let failures = outcome
            .failed
            .iter()
            .map(|f| FailureRecord {
                index: f.index,
                company: f.company.clone(),
                exit_code: f.error.exit_code(),
                error: f.error.to_string(),
            })
            .collect();
        Self {
            results: &outcome.completed,
            failures,
            skipped: outcome.skipped,
            cancelled: outcome.cancelled,
        }
    }
}

/// Pretty-printed JSON string.
pub fn to_json_string<T: Serialize + ?Sized>(value: &T) -> Result<String, AppError> {
    serde_json::to_string_pretty(value).map_err(|e| AppError::new(5, format!("Failed to serialize JSON: {e}")))
}

/// Write any serializable value as pretty JSON.
pub fn write_json<T: Serialize + ?Sized>(path: &Path, value: &T) -> Result<(), AppError> {
    let file = File::create(path)
        .map_err(|e| AppError::new(2, format!("Failed to create export JSON '{}': {e}", path.display())))?;
    let mut writer = BufWriter::new(file);
    serde_json::to_writer_pretty(&mut writer, value)
        .map_err(|e| AppError::new(2, format!("Failed to write export JSON: {e}")))?;
    writer
        .flush()
        .map_err(|e| AppError::new(2, format!("Failed to write export JSON: {e}")))?;
    Ok(())
}

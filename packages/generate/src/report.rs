//! `effort.csv` writer.

use std::path::Path;

use hab_effort_models::EffortRecord;

use crate::{GenerateError, write_atomic};

/// File name of the effort report.
pub const EFFORT_FILE_NAME: &str = "effort.csv";

/// Renders records as CSV with a `hab_region,year,effort` header.
///
/// The header is written even when there are no records.
///
/// # Errors
///
/// Returns [`GenerateError::Csv`] if serialization fails.
pub fn render_effort_csv(records: &[EffortRecord]) -> Result<Vec<u8>, GenerateError> {
    let mut writer = csv::WriterBuilder::new()
        .has_headers(false)
        .from_writer(Vec::new());

    writer.write_record(["hab_region", "year", "effort"])?;
    for record in records {
        writer.serialize(record)?;
    }

    writer
        .into_inner()
        .map_err(|e| GenerateError::Csv(e.into_error().into()))
}

/// Writes the effort report to `path`.
///
/// # Errors
///
/// Returns [`GenerateError`] if rendering or writing fails.
pub fn write_effort_csv(path: &Path, records: &[EffortRecord]) -> Result<(), GenerateError> {
    let bytes = render_effort_csv(records)?;
    write_atomic(path, &bytes)?;
    log::info!("Wrote {} effort rows to {}", records.len(), path.display());
    Ok(())
}

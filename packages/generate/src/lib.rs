#![cfg_attr(feature = "fail-on-warnings", deny(warnings))]
#![warn(clippy::all, clippy::pedantic, clippy::nursery, clippy::cargo)]
#![allow(clippy::multiple_crate_versions, clippy::cargo_common_metadata)]

//! Output artifacts of an effort run.
//!
//! - `effort.csv`: one row per region and year ([`report`]).
//! - `facets.geojson`: grid cells of one region/year over the simplified
//!   region outline, tagged by year-month for faceted plotting
//!   ([`facets`]).

pub mod facets;
pub mod report;

use thiserror::Error;

/// Errors that can occur while writing outputs.
#[derive(Debug, Error)]
pub enum GenerateError {
    /// CSV serialization failed.
    #[error("CSV error: {0}")]
    Csv(#[from] csv::Error),

    /// `GeoJSON` serialization failed.
    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    /// I/O error writing an output file.
    #[error("I/O error at {path}: {source}")]
    Io {
        /// Path that caused the error.
        path: String,
        /// Underlying I/O error.
        source: std::io::Error,
    },

    /// A cell boundary could not be resolved.
    #[error("Grid error: {0}")]
    Grid(#[from] hab_effort_grid::GridError),

    /// The requested region is not in the region set.
    #[error("Region {0} is not in the region set")]
    MissingRegion(hab_effort_models::RegionId),
}

/// Writes `contents` to `path` through a temp file and rename, creating
/// the parent directory if needed.
///
/// # Errors
///
/// Returns [`GenerateError::Io`] if any filesystem step fails.
pub fn write_atomic(path: &std::path::Path, contents: &[u8]) -> Result<(), GenerateError> {
    if let Some(parent) = path.parent()
        && !parent.as_os_str().is_empty()
    {
        std::fs::create_dir_all(parent).map_err(|e| GenerateError::Io {
            path: parent.display().to_string(),
            source: e,
        })?;
    }

    let tmp_path = path.with_extension("tmp");
    std::fs::write(&tmp_path, contents).map_err(|e| GenerateError::Io {
        path: tmp_path.display().to_string(),
        source: e,
    })?;

    std::fs::rename(&tmp_path, path).map_err(|e| GenerateError::Io {
        path: path.display().to_string(),
        source: e,
    })
}

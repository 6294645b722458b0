#![cfg_attr(feature = "fail-on-warnings", deny(warnings))]
#![warn(clippy::all, clippy::pedantic, clippy::nursery, clippy::cargo)]
#![allow(clippy::multiple_crate_versions, clippy::cargo_common_metadata)]

//! Sampling effort computation.
//!
//! Takes raw occurrences through the three enrichment steps (calendar
//! period, region, grid cell) and reduces them to one effort count per
//! region and year.

pub mod aggregate;
pub mod enrich;
pub mod temporal;

use hab_effort_models::UnknownRegion;
use thiserror::Error;

pub use aggregate::aggregate;
pub use enrich::enrich;
pub use temporal::year_month;

/// Errors that can occur during effort computation.
#[derive(Debug, Error)]
pub enum AnalyticsError {
    /// Timestamp outside the representable calendar range.
    #[error("Timestamp {millis} ms is outside the supported date range")]
    Timestamp {
        /// Offending epoch milliseconds.
        millis: i64,
    },

    /// Coordinates that cannot be assigned a grid cell.
    #[error("Grid error: {0}")]
    Grid(#[from] hab_effort_grid::GridError),

    /// Region id with no entry in the name table.
    #[error(transparent)]
    UnknownRegion(#[from] UnknownRegion),
}

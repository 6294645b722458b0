#![cfg_attr(feature = "fail-on-warnings", deny(warnings))]
#![warn(clippy::all, clippy::pedantic, clippy::nursery, clippy::cargo)]
#![allow(clippy::multiple_crate_versions, clippy::cargo_common_metadata)]

//! Discrete global grid cell assignment.
//!
//! Occurrences are binned into H3 cells, a hierarchical icosahedral
//! tessellation of the sphere with near-equal-area cells. A single
//! resolution is fixed when the [`CellIndexer`] is built and used for
//! every assignment in the run.

use geo::{LineString, Polygon};
use h3o::{CellIndex, LatLng, Resolution};
use hab_effort_models::CellId;
use serde::Deserialize;

/// Resolution used when none is configured (~5.2 km² cells).
pub const DEFAULT_RESOLUTION: u8 = 7;

/// Errors from grid operations.
#[derive(Debug, Clone, PartialEq, thiserror::Error)]
pub enum GridError {
    /// Resolution outside the grid's 0-15 range.
    #[error("Invalid grid resolution {0} (expected 0-15)")]
    InvalidResolution(u8),

    /// Coordinates that cannot be placed on the sphere.
    #[error("Invalid coordinate (lat={lat}, lon={lon})")]
    InvalidCoordinate {
        /// Latitude in degrees.
        lat: f64,
        /// Longitude in degrees.
        lon: f64,
    },

    /// A cell id that is not a valid H3 index.
    #[error("Invalid cell id {0}")]
    InvalidCell(CellId),
}

/// Grid settings.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Deserialize)]
pub struct GridConfig {
    /// H3 resolution, 0 (coarsest) to 15.
    #[serde(default = "default_resolution")]
    pub resolution: u8,
}

impl Default for GridConfig {
    fn default() -> Self {
        Self {
            resolution: DEFAULT_RESOLUTION,
        }
    }
}

const fn default_resolution() -> u8 {
    DEFAULT_RESOLUTION
}

/// Maps coordinates to cells at one fixed resolution.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct CellIndexer {
    resolution: Resolution,
}

impl CellIndexer {
    /// Creates an indexer at `resolution`.
    ///
    /// # Errors
    ///
    /// Returns [`GridError::InvalidResolution`] if `resolution > 15`.
    pub fn new(resolution: u8) -> Result<Self, GridError> {
        let resolution =
            Resolution::try_from(resolution).map_err(|_| GridError::InvalidResolution(resolution))?;
        Ok(Self { resolution })
    }

    /// Creates an indexer from config.
    ///
    /// # Errors
    ///
    /// Returns [`GridError::InvalidResolution`] if the configured
    /// resolution is out of range.
    pub fn from_config(config: &GridConfig) -> Result<Self, GridError> {
        Self::new(config.resolution)
    }

    /// The fixed resolution.
    #[must_use]
    pub fn resolution(&self) -> u8 {
        u8::from(self.resolution)
    }

    /// Returns the cell containing (`lat`, `lon`).
    ///
    /// # Errors
    ///
    /// Returns [`GridError::InvalidCoordinate`] for non-finite input.
    pub fn cell_id(&self, lat: f64, lon: f64) -> Result<CellId, GridError> {
        let coord = LatLng::new(lat, lon).map_err(|_| GridError::InvalidCoordinate { lat, lon })?;
        Ok(CellId(u64::from(coord.to_cell(self.resolution))))
    }
}

impl Default for CellIndexer {
    fn default() -> Self {
        Self {
            resolution: Resolution::Seven,
        }
    }
}

/// Returns the boundary of `cell` as a closed lon/lat polygon.
///
/// Hexagons have six vertices, the twelve pentagons per resolution have
/// five; cells crossing a face edge may carry extra distortion vertices.
///
/// # Errors
///
/// Returns [`GridError::InvalidCell`] if `cell` is not a valid index.
pub fn cell_to_polygon(cell: CellId) -> Result<Polygon<f64>, GridError> {
    let index = CellIndex::try_from(cell.0).map_err(|_| GridError::InvalidCell(cell))?;

    let coords: Vec<(f64, f64)> = index
        .boundary()
        .iter()
        .map(|vertex| (vertex.lng(), vertex.lat()))
        .collect();

    // `Polygon::new` closes the ring.
    Ok(Polygon::new(LineString::from(coords), vec![]))
}

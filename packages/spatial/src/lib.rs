#![cfg_attr(feature = "fail-on-warnings", deny(warnings))]
#![warn(clippy::all, clippy::pedantic, clippy::nursery, clippy::cargo)]
#![allow(clippy::multiple_crate_versions, clippy::cargo_common_metadata)]

//! In-memory spatial index for region attribution.
//!
//! Loads HAB region polygons from the region shapefile, builds an R-tree
//! over their bounding boxes, and answers point-in-region lookups with
//! boundary-inclusive `intersects` semantics.

pub mod regions;

use std::collections::BTreeSet;

use geo::{BoundingRect, Intersects, MultiPolygon, Point};
use hab_effort_models::{Occurrence, RegionId};
use rstar::{AABB, RTree, RTreeObject};

pub use regions::{DEFAULT_ATTRIBUTE, Region};

/// Errors that can occur while loading or indexing regions.
#[derive(Debug, thiserror::Error)]
pub enum SpatialError {
    /// The region archive is not a readable zip file.
    #[error("Zip error: {0}")]
    Zip(#[from] zip::result::ZipError),

    /// The shapefile could not be parsed.
    #[error("Shapefile error: {0}")]
    Shapefile(#[from] shapefile::Error),

    /// I/O error reading region files.
    #[error("I/O error at {path}: {source}")]
    Io {
        /// Path that caused the error.
        path: String,
        /// Underlying I/O error.
        source: std::io::Error,
    },

    /// Region data is present but does not have the expected shape.
    #[error("Malformed region data: {message}")]
    Malformed {
        /// Description of what went wrong.
        message: String,
    },
}

/// A region polygon stored in the R-tree.
struct RegionEntry {
    id: RegionId,
    /// Position in load order; lower wins when regions overlap.
    order: usize,
    envelope: AABB<[f64; 2]>,
    polygon: MultiPolygon<f64>,
}

impl RTreeObject for RegionEntry {
    type Envelope = AABB<[f64; 2]>;

    fn envelope(&self) -> Self::Envelope {
        self.envelope
    }
}

/// Pre-built spatial index over the HAB regions.
///
/// Regions are expected not to overlap. If they do, a point is attributed
/// to the intersecting region that was loaded first, regardless of the
/// order the R-tree yields candidates in.
pub struct RegionIndex {
    tree: RTree<RegionEntry>,
    regions: Vec<Region>,
}

impl RegionIndex {
    /// Builds the index from regions in load order.
    #[must_use]
    pub fn new(regions: Vec<Region>) -> Self {
        let entries = regions
            .iter()
            .enumerate()
            .map(|(order, region)| RegionEntry {
                id: region.id,
                order,
                envelope: compute_envelope(&region.geometry),
                polygon: region.geometry.clone(),
            })
            .collect();

        let tree = RTree::bulk_load(entries);
        log::info!("Loaded {} region polygons into spatial index", tree.size());

        Self { tree, regions }
    }

    /// Reads a zipped region shapefile and indexes it.
    ///
    /// # Errors
    ///
    /// Returns [`SpatialError`] if the archive or shapefile is malformed.
    pub fn from_zip_bytes(bytes: &[u8], attribute: &str) -> Result<Self, SpatialError> {
        Ok(Self::new(regions::read_zip(bytes, attribute)?))
    }

    /// Reads an extracted region shapefile directory and indexes it.
    ///
    /// # Errors
    ///
    /// Returns [`SpatialError`] if the directory or shapefile is malformed.
    pub fn from_dir(dir: &std::path::Path, attribute: &str) -> Result<Self, SpatialError> {
        Ok(Self::new(regions::read_dir(dir, attribute)?))
    }

    /// Looks up the region containing a point, boundary inclusive.
    #[must_use]
    pub fn lookup(&self, lng: f64, lat: f64) -> Option<RegionId> {
        let point = Point::new(lng, lat);
        let query_env = AABB::from_point([lng, lat]);

        self.tree
            .locate_in_envelope_intersecting(&query_env)
            .filter(|entry| entry.polygon.intersects(&point))
            .min_by_key(|entry| entry.order)
            .map(|entry| entry.id)
    }

    /// Attributes every occurrence to a region.
    ///
    /// The result has exactly one entry per input, in input order.
    #[must_use]
    pub fn join(&self, occurrences: &[Occurrence]) -> Vec<Option<RegionId>> {
        occurrences
            .iter()
            .map(|o| self.lookup(o.longitude, o.latitude))
            .collect()
    }

    /// Distinct region ids present in the index.
    #[must_use]
    pub fn region_ids(&self) -> BTreeSet<RegionId> {
        self.regions.iter().map(|r| r.id).collect()
    }

    /// Full footprint of a region, merging every record that carries its id.
    #[must_use]
    pub fn geometry(&self, id: RegionId) -> Option<MultiPolygon<f64>> {
        let polygons: Vec<_> = self
            .regions
            .iter()
            .filter(|r| r.id == id)
            .flat_map(|r| r.geometry.0.iter().cloned())
            .collect();

        if polygons.is_empty() {
            None
        } else {
            Some(MultiPolygon(polygons))
        }
    }

    /// Number of region records.
    #[must_use]
    pub fn len(&self) -> usize {
        self.regions.len()
    }

    /// Whether the index holds no regions.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.regions.is_empty()
    }
}

/// Compute the bounding box envelope for a [`MultiPolygon`].
fn compute_envelope(mp: &MultiPolygon<f64>) -> AABB<[f64; 2]> {
    mp.bounding_rect().map_or_else(
        || AABB::from_point([0.0, 0.0]),
        |rect| AABB::from_corners([rect.min().x, rect.min().y], [rect.max().x, rect.max().y]),
    )
}

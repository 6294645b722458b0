//! Facet map of sampled grid cells for one region and year.
//!
//! The output is a `GeoJSON` `FeatureCollection` meant for an external
//! renderer: the first feature is the region outline (simplified), then
//! one cell polygon per distinct (year-month, cell). Each cell carries a
//! `facet` property (`YYYY-MM`) to split panels on.

use std::collections::BTreeSet;
use std::path::Path;

use geo::Simplify as _;
use geojson::{Feature, FeatureCollection, Geometry, JsonObject};
use hab_effort_grid::cell_to_polygon;
use hab_effort_models::{CellId, EnrichedOccurrence, RegionId, YearMonth};
use hab_effort_spatial::RegionIndex;

use crate::{GenerateError, write_atomic};

/// File name of the facet map.
pub const FACETS_FILE_NAME: &str = "facets.geojson";

/// Default Ramer-Douglas-Peucker tolerance for the outline, in degrees.
pub const DEFAULT_SIMPLIFY_TOLERANCE: f64 = 0.1;

/// Builds the facet map for `region` in `year`.
///
/// # Errors
///
/// Returns [`GenerateError::MissingRegion`] if the region is not in the
/// index, or [`GenerateError::Grid`] if a cell boundary cannot be built.
pub fn facet_map(
    enriched: &[EnrichedOccurrence],
    index: &RegionIndex,
    region: RegionId,
    year: i32,
    tolerance: f64,
) -> Result<FeatureCollection, GenerateError> {
    let outline = index
        .geometry(region)
        .ok_or(GenerateError::MissingRegion(region))?
        .simplify(tolerance);

    let cells: BTreeSet<(YearMonth, CellId)> = enriched
        .iter()
        .filter(|e| e.region == Some(region) && e.period.year == year)
        .map(|e| (e.period, e.cell))
        .collect();

    let mut features = Vec::with_capacity(cells.len() + 1);

    let mut props = JsonObject::new();
    props.insert("kind".to_string(), "region".into());
    props.insert("region".to_string(), region.0.into());
    features.push(feature(Geometry::new(geojson::Value::from(&outline)), props));

    for (period, cell) in &cells {
        let polygon = cell_to_polygon(*cell)?;
        let mut props = JsonObject::new();
        props.insert("kind".to_string(), "cell".into());
        props.insert("facet".to_string(), period.to_string().into());
        props.insert("cell".to_string(), cell.to_string().into());
        features.push(feature(Geometry::new(geojson::Value::from(&polygon)), props));
    }

    let facets: BTreeSet<YearMonth> = cells.iter().map(|(period, _)| *period).collect();
    log::info!(
        "Facet map for region {region} in {year}: {} cells across {} months",
        cells.len(),
        facets.len()
    );

    Ok(FeatureCollection {
        bbox: None,
        features,
        foreign_members: None,
    })
}

/// Writes a facet map to `path`.
///
/// # Errors
///
/// Returns [`GenerateError`] if serialization or writing fails.
pub fn write_facet_map(path: &Path, map: &FeatureCollection) -> Result<(), GenerateError> {
    write_atomic(path, &serde_json::to_vec(map)?)?;
    log::info!("Wrote facet map to {}", path.display());
    Ok(())
}

fn feature(geometry: Geometry, properties: JsonObject) -> Feature {
    Feature {
        bbox: None,
        geometry: Some(geometry),
        id: None,
        properties: Some(properties),
        foreign_members: None,
    }
}

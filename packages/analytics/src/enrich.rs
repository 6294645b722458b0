//! Attaches period, region, and grid cell to each occurrence.

use hab_effort_grid::CellIndexer;
use hab_effort_models::{EnrichedOccurrence, Occurrence};
use hab_effort_spatial::RegionIndex;

use crate::AnalyticsError;
use crate::temporal::year_month;

/// Enriches every occurrence, preserving input order and length.
///
/// Occurrences outside every region keep `region: None`; they are not an
/// error here and are dropped later by [`crate::aggregate`].
///
/// # Errors
///
/// Returns [`AnalyticsError`] on the first occurrence with an
/// unrepresentable timestamp or non-finite coordinates.
pub fn enrich(
    occurrences: &[Occurrence],
    index: &RegionIndex,
    indexer: &CellIndexer,
) -> Result<Vec<EnrichedOccurrence>, AnalyticsError> {
    let regions = index.join(occurrences);

    let enriched = occurrences
        .iter()
        .zip(regions)
        .map(|(occurrence, region)| {
            Ok(EnrichedOccurrence {
                occurrence: *occurrence,
                period: year_month(occurrence.date_mid)?,
                region,
                cell: indexer.cell_id(occurrence.latitude, occurrence.longitude)?,
            })
        })
        .collect::<Result<Vec<_>, AnalyticsError>>()?;

    let assigned = enriched.iter().filter(|e| e.region.is_some()).count();
    log::info!(
        "Enriched {} occurrences: {assigned} in a region, {} outside all regions",
        enriched.len(),
        enriched.len() - assigned
    );

    Ok(enriched)
}

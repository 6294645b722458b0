//! Effort aggregation.
//!
//! Effort for a (region, year) is the number of distinct (month, cell)
//! pairs with at least one occurrence. Repeated observations in the same
//! cell and month count once.

use std::collections::{BTreeMap, BTreeSet};

use hab_effort_models::{CellId, EffortRecord, EnrichedOccurrence, RegionId, RegionNames};

use crate::AnalyticsError;

/// Reduces enriched occurrences to one [`EffortRecord`] per region/year.
///
/// Occurrences without a region are skipped. Rows come out ordered by
/// region id, then year.
///
/// # Errors
///
/// Returns [`AnalyticsError::UnknownRegion`] if a region id has no entry
/// in `names`.
pub fn aggregate(
    enriched: &[EnrichedOccurrence],
    names: &RegionNames,
) -> Result<Vec<EffortRecord>, AnalyticsError> {
    let distinct: BTreeSet<(RegionId, i32, u32, CellId)> = enriched
        .iter()
        .filter_map(|e| {
            e.region
                .map(|region| (region, e.period.year, e.period.month, e.cell))
        })
        .collect();

    let mut counts: BTreeMap<(RegionId, i32), u64> = BTreeMap::new();
    for (region, year, _month, _cell) in &distinct {
        *counts.entry((*region, *year)).or_default() += 1;
    }

    log::info!(
        "Aggregated {} distinct region/year/month/cell units into {} rows",
        distinct.len(),
        counts.len()
    );

    counts
        .into_iter()
        .map(|((region, year), effort)| {
            Ok(EffortRecord {
                hab_region: names.code(region)?.to_string(),
                year,
                effort,
            })
        })
        .collect()
}

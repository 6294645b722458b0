//! Cache-or-fetch loaders for the two pipeline inputs.

use hab_effort_models::Occurrence;

use crate::cache::CacheStore;
use crate::{RemoteSource, SourceError};

/// Cache key of the occurrence snapshot.
pub const OCCURRENCES_KEY: &str = "occurrences.csv";

/// Cache key of the zipped region shapefile.
pub const REGIONS_KEY: &str = "regions.zip";

/// Returns the cached occurrence snapshot, fetching and caching it on a
/// miss.
///
/// # Errors
///
/// Returns [`SourceError`] if the cache cannot be read or written, the
/// snapshot is malformed, or the fetch fails.
pub async fn load_occurrences(
    cache: &dyn CacheStore,
    remote: &dyn RemoteSource,
    taxon_ids: &[u32],
) -> Result<Vec<Occurrence>, SourceError> {
    if let Some(bytes) = cache.load(OCCURRENCES_KEY)? {
        let occurrences = decode_occurrences(&bytes)?;
        log::info!(
            "Loaded {} occurrences from cache ({OCCURRENCES_KEY})",
            occurrences.len()
        );
        return Ok(occurrences);
    }

    let occurrences = remote.fetch_occurrences(taxon_ids).await?;
    cache.store(OCCURRENCES_KEY, &encode_occurrences(&occurrences)?)?;
    log::info!("Cached {} occurrences", occurrences.len());

    Ok(occurrences)
}

/// Returns the cached region archive, downloading and caching it on a
/// miss.
///
/// # Errors
///
/// Returns [`SourceError`] if the cache cannot be read or written or the
/// download fails.
pub async fn load_region_archive(
    cache: &dyn CacheStore,
    remote: &dyn RemoteSource,
    url: &str,
) -> Result<Vec<u8>, SourceError> {
    if let Some(bytes) = cache.load(REGIONS_KEY)? {
        log::info!("Loaded region archive from cache ({REGIONS_KEY})");
        return Ok(bytes);
    }

    let bytes = remote.fetch_archive(url).await?;
    if bytes.is_empty() {
        return Err(SourceError::Decode {
            message: format!("Empty region archive from {url}"),
        });
    }
    cache.store(REGIONS_KEY, &bytes)?;

    Ok(bytes)
}

/// Serializes occurrences as CSV with Darwin Core headers.
///
/// # Errors
///
/// Returns [`SourceError::Csv`] if serialization fails.
pub fn encode_occurrences(occurrences: &[Occurrence]) -> Result<Vec<u8>, SourceError> {
    let mut writer = csv::Writer::from_writer(Vec::new());
    for occurrence in occurrences {
        writer.serialize(occurrence)?;
    }
    writer.into_inner().map_err(|e| SourceError::Decode {
        message: format!("Failed to flush occurrence CSV: {e}"),
    })
}

/// Parses an occurrence snapshot written by [`encode_occurrences`].
///
/// # Errors
///
/// Returns [`SourceError::Csv`] if a row is missing a column or holds a
/// non-numeric value.
pub fn decode_occurrences(bytes: &[u8]) -> Result<Vec<Occurrence>, SourceError> {
    csv::Reader::from_reader(bytes)
        .deserialize()
        .collect::<Result<Vec<Occurrence>, _>>()
        .map_err(Into::into)
}

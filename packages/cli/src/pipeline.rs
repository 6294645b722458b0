//! End-to-end effort run.
//!
//! Chains load -> join -> grid -> aggregate -> report in a single pass.
//! The report is written only after every step succeeded, so a failed run
//! leaves no partial `effort.csv` behind.

use std::collections::BTreeSet;
use std::path::PathBuf;
use std::time::Instant;

use hab_effort_analytics::{AnalyticsError, aggregate, enrich};
use hab_effort_generate::GenerateError;
use hab_effort_generate::facets::{FACETS_FILE_NAME, facet_map, write_facet_map};
use hab_effort_generate::report::{EFFORT_FILE_NAME, write_effort_csv};
use hab_effort_grid::{CellIndexer, GridError};
use hab_effort_models::UnknownRegion;
use hab_effort_source::{
    CacheStore, REGIONS_KEY, RemoteSource, SourceError, load_occurrences, load_region_archive,
};
use hab_effort_spatial::regions::dir_has_shapefile;
use hab_effort_spatial::{RegionIndex, SpatialError};

use crate::config::{ConfigError, PipelineConfig};

/// Errors that abort a run.
#[derive(Debug, thiserror::Error)]
pub enum PipelineError {
    /// The config is invalid.
    #[error(transparent)]
    Config(#[from] ConfigError),

    /// Loading occurrences or the region archive failed.
    #[error(transparent)]
    Source(#[from] SourceError),

    /// The region shapefile could not be read.
    #[error(transparent)]
    Spatial(#[from] SpatialError),

    /// The grid resolution or a coordinate is invalid.
    #[error(transparent)]
    Grid(#[from] GridError),

    /// The region set contains an id missing from `[regions.names]`.
    #[error(transparent)]
    UnknownRegion(#[from] UnknownRegion),

    /// Enrichment or aggregation failed.
    #[error(transparent)]
    Analytics(#[from] AnalyticsError),

    /// Writing an output file failed.
    #[error(transparent)]
    Generate(#[from] GenerateError),

    /// No region directory, cached archive, or archive URL is available.
    #[error("No region source: set regions.archive_url or regions.directory")]
    NoRegionSource,
}

/// What a completed run produced.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RunSummary {
    /// Occurrences loaded.
    pub occurrences: usize,
    /// Occurrences that fell inside a region.
    pub assigned: usize,
    /// Distinct region ids in the region set.
    pub regions: usize,
    /// Distinct grid cells holding an assigned occurrence.
    pub cells: usize,
    /// Rows written to `effort.csv`.
    pub rows: usize,
    /// Path of `effort.csv`.
    pub effort_path: PathBuf,
    /// Path of the facet map, if one was requested.
    pub facets_path: Option<PathBuf>,
}

/// Runs the pipeline against the given cache and remote.
///
/// # Errors
///
/// Returns [`PipelineError`] on the first failing step. Nothing is written
/// to the output directory in that case.
pub async fn run(
    config: &PipelineConfig,
    cache: &dyn CacheStore,
    remote: &dyn RemoteSource,
) -> Result<RunSummary, PipelineError> {
    let start = Instant::now();

    let names = config.region_names()?;
    let plot = config.plot_target(&names)?;
    let indexer = CellIndexer::from_config(&config.grid)?;
    log::info!(
        "Grid resolution {}, {} region names",
        indexer.resolution(),
        names.len()
    );

    let occurrences = load_occurrences(cache, remote, &config.obis.taxon_ids).await?;

    let index = load_regions(config, cache, remote).await?;
    names.validate(&index.region_ids())?;
    log::info!("Loaded {} region polygons", index.len());

    let enriched = enrich(&occurrences, &index, &indexer)?;
    let records = aggregate(&enriched, &names)?;

    let effort_path = config.output_dir.join(EFFORT_FILE_NAME);
    write_effort_csv(&effort_path, &records)?;

    let facets_path = match plot {
        Some((region, year)) => {
            let map = facet_map(
                &enriched,
                &index,
                region,
                year,
                config.plot.simplify_tolerance,
            )?;
            let path = config.output_dir.join(FACETS_FILE_NAME);
            write_facet_map(&path, &map)?;
            Some(path)
        }
        None => None,
    };

    let summary = RunSummary {
        occurrences: occurrences.len(),
        assigned: enriched.iter().filter(|e| e.region.is_some()).count(),
        regions: index.region_ids().len(),
        cells: enriched
            .iter()
            .filter(|e| e.region.is_some())
            .map(|e| e.cell)
            .collect::<BTreeSet<_>>()
            .len(),
        rows: records.len(),
        effort_path,
        facets_path,
    };

    log::info!(
        "Run complete in {:.1}s: {} occurrences, {} in {} regions, {} unassigned, \
         {} distinct cells, {} rows",
        start.elapsed().as_secs_f64(),
        summary.occurrences,
        summary.assigned,
        summary.regions,
        summary.occurrences - summary.assigned,
        summary.cells,
        summary.rows,
    );

    Ok(summary)
}

/// Reads the region set from the extracted directory if it has a
/// shapefile, otherwise from the cached or downloaded archive.
async fn load_regions(
    config: &PipelineConfig,
    cache: &dyn CacheStore,
    remote: &dyn RemoteSource,
) -> Result<RegionIndex, PipelineError> {
    let attribute = config.regions.attribute.as_str();

    if let Some(dir) = &config.regions.directory
        && dir_has_shapefile(dir)
    {
        log::info!("Reading regions from {}", dir.display());
        return Ok(RegionIndex::from_dir(dir, attribute)?);
    }

    let bytes = match &config.regions.archive_url {
        Some(url) => load_region_archive(cache, remote, url).await?,
        None => cache
            .load(REGIONS_KEY)
            .map_err(SourceError::from)?
            .ok_or(PipelineError::NoRegionSource)?,
    };

    Ok(RegionIndex::from_zip_bytes(&bytes, attribute)?)
}

#[cfg(test)]
mod tests {
    use std::path::Path;
    use std::sync::atomic::{AtomicUsize, Ordering};

    use async_trait::async_trait;
    use hab_effort_models::{Occurrence, RegionId};
    use hab_effort_source::{MemoryCache, OCCURRENCES_KEY};
    use shapefile::dbase::{FieldName, FieldValue, Record, TableWriterBuilder};
    use shapefile::{Point, Polygon, PolygonRing};

    use super::*;

    /// 2010-06-15T00:00:00Z
    const JUNE: i64 = 1_276_560_000_000;
    /// 2010-07-15T00:00:00Z
    const JULY: i64 = 1_279_152_000_000;

    struct CountingRemote {
        occurrences: Vec<Occurrence>,
        occurrence_calls: AtomicUsize,
        archive_calls: AtomicUsize,
    }

    impl CountingRemote {
        fn new(occurrences: Vec<Occurrence>) -> Self {
            Self {
                occurrences,
                occurrence_calls: AtomicUsize::new(0),
                archive_calls: AtomicUsize::new(0),
            }
        }

        fn calls(&self) -> (usize, usize) {
            (
                self.occurrence_calls.load(Ordering::SeqCst),
                self.archive_calls.load(Ordering::SeqCst),
            )
        }
    }

    #[async_trait]
    impl RemoteSource for CountingRemote {
        async fn fetch_occurrences(
            &self,
            _taxon_ids: &[u32],
        ) -> Result<Vec<Occurrence>, SourceError> {
            self.occurrence_calls.fetch_add(1, Ordering::SeqCst);
            Ok(self.occurrences.clone())
        }

        async fn fetch_archive(&self, _url: &str) -> Result<Vec<u8>, SourceError> {
            self.archive_calls.fetch_add(1, Ordering::SeqCst);
            Ok(Vec::new())
        }
    }

    const fn occ(longitude: f64, latitude: f64, date_mid: i64) -> Occurrence {
        Occurrence {
            longitude,
            latitude,
            date_mid,
        }
    }

    /// Two June records in one cell, one July record in the same cell, and
    /// one record off every region.
    fn north_sea() -> Vec<Occurrence> {
        vec![
            occ(3.25, 51.5, JUNE),
            occ(3.25, 51.5, JUNE + 3_600_000),
            occ(3.25, 51.5, JULY),
            occ(-150.0, -40.0, JUNE),
        ]
    }

    /// Writes a one-polygon shapefile covering Europe with the given id.
    fn write_regions(dir: &Path, id: f64) {
        std::fs::create_dir_all(dir).unwrap();
        let table = TableWriterBuilder::new()
            .add_numeric_field(FieldName::try_from("hab_region").unwrap(), 10, 0);
        let mut writer = shapefile::Writer::from_path(dir.join("hab_regions.shp"), table).unwrap();

        let polygon = Polygon::new(PolygonRing::Outer(vec![
            Point::new(-10.0, 35.0),
            Point::new(-10.0, 70.0),
            Point::new(30.0, 70.0),
            Point::new(30.0, 35.0),
            Point::new(-10.0, 35.0),
        ]));
        let mut record = Record::default();
        record.insert("hab_region".to_string(), FieldValue::Numeric(Some(id)));
        writer.write_shape_and_record(&polygon, &record).unwrap();
    }

    fn config_for(root: &Path) -> PipelineConfig {
        let mut config = PipelineConfig::load(None).unwrap();
        config.output_dir = root.join("output");
        config.regions.directory = Some(root.join("regions"));
        config
    }

    fn scratch(name: &str) -> PathBuf {
        let root = std::env::temp_dir().join(name);
        let _ = std::fs::remove_dir_all(&root);
        root
    }

    #[tokio::test]
    async fn counts_distinct_cell_months_per_region_year() {
        let root = scratch("hab_effort_pipeline_counts");
        write_regions(&root.join("regions"), 5.0);
        let config = config_for(&root);
        let remote = CountingRemote::new(north_sea());
        let cache = MemoryCache::new();

        let summary = run(&config, &cache, &remote).await.unwrap();

        assert_eq!(summary.occurrences, 4);
        assert_eq!(summary.assigned, 3);
        assert_eq!(summary.regions, 1);
        assert_eq!(summary.cells, 1);
        assert_eq!(summary.rows, 1);
        assert_eq!(summary.facets_path, None);
        assert_eq!(
            std::fs::read_to_string(&summary.effort_path).unwrap(),
            "hab_region,year,effort\nEUR,2010,2\n"
        );
        assert_eq!(remote.calls(), (1, 0));
        assert!(cache.contains(OCCURRENCES_KEY));

        let _ = std::fs::remove_dir_all(&root);
    }

    #[tokio::test]
    async fn cached_rerun_skips_fetch_and_reproduces_report() {
        let root = scratch("hab_effort_pipeline_rerun");
        write_regions(&root.join("regions"), 5.0);
        let config = config_for(&root);
        let remote = CountingRemote::new(north_sea());
        let cache = MemoryCache::new();

        let first = run(&config, &cache, &remote).await.unwrap();
        let first_bytes = std::fs::read(&first.effort_path).unwrap();
        let second = run(&config, &cache, &remote).await.unwrap();
        let second_bytes = std::fs::read(&second.effort_path).unwrap();

        assert_eq!(remote.calls(), (1, 0));
        assert_eq!(first_bytes, second_bytes);

        let _ = std::fs::remove_dir_all(&root);
    }

    #[tokio::test]
    async fn region_outside_name_table_aborts_before_writing() {
        let root = scratch("hab_effort_pipeline_unknown_region");
        write_regions(&root.join("regions"), 14.0);
        let config = config_for(&root);
        let remote = CountingRemote::new(north_sea());

        let err = run(&config, &MemoryCache::new(), &remote)
            .await
            .unwrap_err();

        assert!(
            matches!(
                err,
                PipelineError::UnknownRegion(UnknownRegion(RegionId(14)))
            ),
            "{err}"
        );
        assert!(!root.join("output").join(EFFORT_FILE_NAME).exists());

        let _ = std::fs::remove_dir_all(&root);
    }

    #[tokio::test]
    async fn writes_facet_map_when_plot_is_configured() {
        let root = scratch("hab_effort_pipeline_facets");
        write_regions(&root.join("regions"), 5.0);
        let mut config = config_for(&root);
        config.plot.region = Some("EUR".to_string());
        config.plot.year = Some(2010);
        let remote = CountingRemote::new(north_sea());

        let summary = run(&config, &MemoryCache::new(), &remote).await.unwrap();

        let path = summary.facets_path.unwrap();
        let geojson = std::fs::read_to_string(path).unwrap();
        assert!(geojson.contains("FeatureCollection"));
        assert!(geojson.contains("2010-06"));
        assert!(geojson.contains("2010-07"));

        let _ = std::fs::remove_dir_all(&root);
    }

    #[tokio::test]
    async fn missing_region_source_is_an_error() {
        let root = scratch("hab_effort_pipeline_no_regions");
        let mut config = config_for(&root);
        config.regions.directory = None;
        config.regions.archive_url = None;
        let remote = CountingRemote::new(north_sea());

        let err = run(&config, &MemoryCache::new(), &remote)
            .await
            .unwrap_err();

        assert!(matches!(err, PipelineError::NoRegionSource), "{err}");
        assert!(!root.join("output").exists());

        let _ = std::fs::remove_dir_all(&root);
    }

    #[tokio::test]
    async fn empty_archive_download_is_an_error() {
        let root = scratch("hab_effort_pipeline_empty_archive");
        let mut config = config_for(&root);
        config.regions.directory = None;
        config.regions.archive_url = Some("http://localhost/regions.zip".to_string());
        let remote = CountingRemote::new(north_sea());

        let err = run(&config, &MemoryCache::new(), &remote)
            .await
            .unwrap_err();

        assert!(
            matches!(err, PipelineError::Source(SourceError::Decode { .. })),
            "{err}"
        );
        assert_eq!(remote.calls(), (1, 1));

        let _ = std::fs::remove_dir_all(&root);
    }
}

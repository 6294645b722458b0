//! Pipeline configuration.
//!
//! The default `effort.toml` is baked into the binary at compile time via
//! [`include_str!`]; `--config <path>` replaces it wholesale.

use std::collections::BTreeMap;
use std::path::{Path, PathBuf};

use hab_effort_generate::facets::DEFAULT_SIMPLIFY_TOLERANCE;
use hab_effort_grid::GridConfig;
use hab_effort_models::{InvalidRegionKey, RegionId, RegionNames};
use hab_effort_source::obis::ObisConfig;
use hab_effort_spatial::regions::DEFAULT_ATTRIBUTE;
use serde::Deserialize;

/// Configuration embedded at compile time.
const DEFAULT_CONFIG: &str = include_str!("../config/effort.toml");

/// Errors that can occur while loading configuration.
#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    /// The config file could not be read.
    #[error("I/O error at {path}: {source}")]
    Io {
        /// Path that caused the error.
        path: String,
        /// Underlying I/O error.
        source: std::io::Error,
    },

    /// The config is not valid TOML or does not match the schema.
    #[error("Invalid config: {0}")]
    Parse(#[from] toml::de::Error),

    /// A `[regions.names]` key is not a region id.
    #[error(transparent)]
    InvalidRegionKey(#[from] InvalidRegionKey),

    /// `[plot]` names a region code missing from `[regions.names]`.
    #[error("Plot region {0} is not in [regions.names]")]
    UnknownPlotRegion(String),

    /// Only one of `plot.region` and `plot.year` is set.
    #[error("Plot needs both a region and a year")]
    IncompletePlot,
}

/// Top-level pipeline configuration.
#[derive(Debug, Clone, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct PipelineConfig {
    /// Directory holding the cached occurrence snapshot and region archive.
    #[serde(default = "default_cache_dir")]
    pub cache_dir: PathBuf,
    /// Directory receiving `effort.csv` and the facet map.
    #[serde(default = "default_output_dir")]
    pub output_dir: PathBuf,
    /// OBIS query settings.
    pub obis: ObisConfig,
    /// Region set settings.
    pub regions: RegionsConfig,
    /// Grid settings.
    #[serde(default)]
    pub grid: GridConfig,
    /// Facet map settings.
    #[serde(default)]
    pub plot: PlotConfig,
}

/// Where the region polygons come from and how they are labeled.
#[derive(Debug, Clone, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct RegionsConfig {
    /// URL of the zipped region shapefile.
    #[serde(default)]
    pub archive_url: Option<String>,
    /// Attribute holding the integer region id.
    #[serde(default = "default_attribute")]
    pub attribute: String,
    /// Already-extracted shapefile directory. Used instead of the archive
    /// when it contains a `.shp`.
    #[serde(default)]
    pub directory: Option<PathBuf>,
    /// Region id to short code.
    pub names: BTreeMap<String, String>,
}

/// Which region and year to draw, if any.
#[derive(Debug, Clone, PartialEq, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct PlotConfig {
    /// Region code, e.g. `EUR`.
    #[serde(default)]
    pub region: Option<String>,
    /// Calendar year.
    #[serde(default)]
    pub year: Option<i32>,
    /// Outline simplification tolerance in degrees.
    #[serde(default = "default_simplify_tolerance")]
    pub simplify_tolerance: f64,
}

impl Default for PlotConfig {
    fn default() -> Self {
        Self {
            region: None,
            year: None,
            simplify_tolerance: DEFAULT_SIMPLIFY_TOLERANCE,
        }
    }
}

fn default_cache_dir() -> PathBuf {
    PathBuf::from("data/cache")
}

fn default_output_dir() -> PathBuf {
    PathBuf::from("data/output")
}

fn default_attribute() -> String {
    DEFAULT_ATTRIBUTE.to_string()
}

const fn default_simplify_tolerance() -> f64 {
    DEFAULT_SIMPLIFY_TOLERANCE
}

impl PipelineConfig {
    /// Parses a TOML document.
    ///
    /// # Errors
    ///
    /// Returns [`ConfigError::Parse`] if the document does not match the
    /// schema.
    pub fn from_toml(contents: &str) -> Result<Self, ConfigError> {
        Ok(toml::from_str(contents)?)
    }

    /// Loads `path`, or the embedded default when `None`.
    ///
    /// # Errors
    ///
    /// Returns [`ConfigError`] if the file cannot be read or parsed.
    pub fn load(path: Option<&Path>) -> Result<Self, ConfigError> {
        let Some(path) = path else {
            return Self::from_toml(DEFAULT_CONFIG);
        };

        let contents = std::fs::read_to_string(path).map_err(|e| ConfigError::Io {
            path: path.display().to_string(),
            source: e,
        })?;
        log::info!("Loaded config from {}", path.display());
        Self::from_toml(&contents)
    }

    /// Builds the region name table.
    ///
    /// # Errors
    ///
    /// Returns [`ConfigError::InvalidRegionKey`] if a key is not an id.
    pub fn region_names(&self) -> Result<RegionNames, ConfigError> {
        Ok(RegionNames::from_table(&self.regions.names)?)
    }

    /// Resolves the configured plot to a region id and year.
    ///
    /// # Errors
    ///
    /// Returns [`ConfigError`] if only half of the target is set or the
    /// region code is unknown.
    pub fn plot_target(&self, names: &RegionNames) -> Result<Option<(RegionId, i32)>, ConfigError> {
        match (&self.plot.region, self.plot.year) {
            (None, None) => Ok(None),
            (Some(code), Some(year)) => names
                .id_for_code(code)
                .map(|id| Some((id, year)))
                .ok_or_else(|| ConfigError::UnknownPlotRegion(code.clone())),
            _ => Err(ConfigError::IncompletePlot),
        }
    }
}

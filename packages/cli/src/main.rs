#![cfg_attr(feature = "fail-on-warnings", deny(warnings))]
#![warn(clippy::all, clippy::pedantic, clippy::nursery, clippy::cargo)]
#![allow(clippy::multiple_crate_versions, clippy::cargo_common_metadata)]

//! Command-line runner for the HAB sampling effort pipeline.
//!
//! Loads (or fetches and caches) OBIS phytoplankton occurrences and the HAB
//! region polygons, assigns each occurrence a region and a grid cell, and
//! writes per-region, per-year sampling effort to `effort.csv`.
//!
//! Uses `indicatif-log-bridge` (via [`hab_effort_cli_utils::init_logger`])
//! to route `log` output through `indicatif::MultiProgress` so that log
//! lines and progress bars never fight for the terminal.

mod config;
mod pipeline;

use std::path::PathBuf;

use clap::Parser;
use hab_effort_cli_utils::IndicatifProgress;
use hab_effort_source::{FsCache, HttpSource};

use crate::config::PipelineConfig;

#[derive(Parser)]
#[command(name = "hab_effort", about = "HAB region phytoplankton sampling effort")]
struct Cli {
    /// TOML config replacing the built-in defaults
    #[arg(long)]
    config: Option<PathBuf>,

    /// Directory for the occurrence and region caches
    #[arg(long)]
    cache_dir: Option<PathBuf>,

    /// Directory for `effort.csv` and the facet map
    #[arg(long)]
    output_dir: Option<PathBuf>,

    /// Region code to draw a facet map for (e.g. `EUR`)
    #[arg(long, requires = "plot_year")]
    plot_region: Option<String>,

    /// Year to draw a facet map for
    #[arg(long, requires = "plot_region")]
    plot_year: Option<i32>,
}

impl Cli {
    fn apply(self, config: &mut PipelineConfig) {
        if let Some(dir) = self.cache_dir {
            config.cache_dir = dir;
        }
        if let Some(dir) = self.output_dir {
            config.output_dir = dir;
        }
        if self.plot_region.is_some() {
            config.plot.region = self.plot_region;
        }
        if self.plot_year.is_some() {
            config.plot.year = self.plot_year;
        }
    }
}

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    let multi = hab_effort_cli_utils::init_logger();
    let cli = Cli::parse();

    let mut config = PipelineConfig::load(cli.config.as_deref())?;
    cli.apply(&mut config);

    let occurrence_bar = IndicatifProgress::records_bar(&multi, "OBIS occurrences");
    let archive_bar = IndicatifProgress::bytes_bar(&multi, "Region archive");
    let remote = HttpSource::new(config.obis.clone())?
        .with_progress(occurrence_bar.clone(), archive_bar.clone());
    let cache = FsCache::new(config.cache_dir.clone());

    let result = pipeline::run(&config, &cache, &remote).await;

    occurrence_bar.finish("Occurrences ready".to_string());
    archive_bar.finish("Regions ready".to_string());

    let summary = result?;
    println!("Wrote {}", summary.effort_path.display());
    if let Some(path) = summary.facets_path {
        println!("Wrote {}", path.display());
    }

    Ok(())
}

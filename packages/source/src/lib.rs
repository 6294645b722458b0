#![cfg_attr(feature = "fail-on-warnings", deny(warnings))]
#![warn(clippy::all, clippy::pedantic, clippy::nursery, clippy::cargo)]
#![allow(clippy::multiple_crate_versions, clippy::cargo_common_metadata)]

//! Cached loaders for OBIS occurrence records and the HAB region archive.
//!
//! Both inputs go through the same contract: ask the [`CacheStore`] first,
//! and only on a miss call the [`RemoteSource`], persist what came back,
//! and return it. A rerun with a populated cache issues no network
//! requests at all.

pub mod cache;
pub mod download;
pub mod http;
pub mod loader;
pub mod obis;
pub mod progress;

use async_trait::async_trait;
use hab_effort_models::Occurrence;

pub use cache::{CacheError, CacheStore, FsCache, MemoryCache};
pub use http::HttpSource;
pub use loader::{OCCURRENCES_KEY, REGIONS_KEY, load_occurrences, load_region_archive};

/// Errors that can occur while loading input data.
#[derive(Debug, thiserror::Error)]
pub enum SourceError {
    /// HTTP request failed.
    #[error("HTTP request failed: {0}")]
    Http(#[from] reqwest::Error),

    /// Non-success HTTP status.
    #[error("HTTP {status} for {url}")]
    HttpStatus {
        /// Request URL.
        url: String,
        /// HTTP status code.
        status: u16,
    },

    /// JSON parsing failed.
    #[error("JSON parse error: {0}")]
    Json(#[from] serde_json::Error),

    /// Occurrence cache could not be encoded or decoded.
    #[error("Occurrence CSV error: {0}")]
    Csv(#[from] csv::Error),

    /// Cache read or write failed.
    #[error("Cache error: {0}")]
    Cache(#[from] CacheError),

    /// Fetched payload did not have the expected shape.
    #[error("Decode error: {message}")]
    Decode {
        /// Description of what went wrong.
        message: String,
    },
}

/// The remote side of the loaders.
///
/// [`HttpSource`] talks to the real services; tests substitute fakes that
/// count calls.
#[async_trait]
pub trait RemoteSource: Send + Sync {
    /// Fetches every occurrence record for the given `WoRMS` taxon ids.
    ///
    /// # Errors
    ///
    /// Returns [`SourceError`] if any page request fails.
    async fn fetch_occurrences(&self, taxon_ids: &[u32]) -> Result<Vec<Occurrence>, SourceError>;

    /// Downloads a binary archive.
    ///
    /// # Errors
    ///
    /// Returns [`SourceError`] if the download fails.
    async fn fetch_archive(&self, url: &str) -> Result<Vec<u8>, SourceError>;
}

//! [`RemoteSource`] backed by `reqwest`.

use std::sync::Arc;

use async_trait::async_trait;
use hab_effort_models::Occurrence;

use crate::obis::ObisConfig;
use crate::progress::{ProgressCallback, null_progress};
use crate::{RemoteSource, SourceError, download, obis};

/// User agent sent with every request.
const USER_AGENT: &str = "hab-effort/0.1";

/// Fetches occurrences from OBIS and archives over plain HTTP.
pub struct HttpSource {
    client: reqwest::Client,
    obis: ObisConfig,
    occurrence_progress: Arc<dyn ProgressCallback>,
    archive_progress: Arc<dyn ProgressCallback>,
}

impl HttpSource {
    /// Builds a source with its own HTTP client.
    ///
    /// # Errors
    ///
    /// Returns [`SourceError::Http`] if the client cannot be built.
    pub fn new(obis: ObisConfig) -> Result<Self, SourceError> {
        let client = reqwest::Client::builder().user_agent(USER_AGENT).build()?;
        Ok(Self {
            client,
            obis,
            occurrence_progress: null_progress(),
            archive_progress: null_progress(),
        })
    }

    /// Reports occurrence paging and archive download progress to
    /// separate indicators.
    #[must_use]
    pub fn with_progress(
        mut self,
        occurrences: Arc<dyn ProgressCallback>,
        archive: Arc<dyn ProgressCallback>,
    ) -> Self {
        self.occurrence_progress = occurrences;
        self.archive_progress = archive;
        self
    }
}

#[async_trait]
impl RemoteSource for HttpSource {
    async fn fetch_occurrences(&self, taxon_ids: &[u32]) -> Result<Vec<Occurrence>, SourceError> {
        obis::fetch_occurrences(
            &self.client,
            &self.obis,
            taxon_ids,
            self.occurrence_progress.as_ref(),
        )
        .await
    }

    async fn fetch_archive(&self, url: &str) -> Result<Vec<u8>, SourceError> {
        self.archive_progress.set_message(format!("Downloading {url}"));
        let bytes =
            download::download_bytes(&self.client, url, self.archive_progress.as_ref()).await?;
        self.archive_progress
            .finish(format!("{} bytes", bytes.len()));
        Ok(bytes)
    }
}

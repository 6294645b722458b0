//! Streaming download of binary archives into memory.

use futures::StreamExt as _;

use crate::SourceError;
use crate::progress::ProgressCallback;

/// Log a progress line every this many bytes.
const LOG_EVERY_BYTES: u64 = 10 * 1_048_576;

/// Downloads `url` into a byte buffer, logging progress as it goes.
///
/// # Errors
///
/// Returns [`SourceError`] if the request fails, the response is not
/// successful, or the body stream breaks.
pub async fn download_bytes(
    client: &reqwest::Client,
    url: &str,
    progress: &dyn ProgressCallback,
) -> Result<Vec<u8>, SourceError> {
    log::info!("Downloading {url}");

    let response = client.get(url).send().await?;

    if !response.status().is_success() {
        return Err(SourceError::HttpStatus {
            url: url.to_string(),
            status: response.status().as_u16(),
        });
    }

    let total_size = response.content_length();
    if let Some(size) = total_size {
        #[allow(clippy::cast_precision_loss)]
        let mb = size as f64 / 1_048_576.0;
        log::info!("  file size: {mb:.1} MB");
        progress.set_total(size);
    }

    let mut buffer = Vec::with_capacity(
        total_size
            .and_then(|s| usize::try_from(s).ok())
            .unwrap_or_default(),
    );
    let mut stream = response.bytes_stream();
    let mut last_logged: u64 = 0;

    while let Some(chunk) = stream.next().await {
        let chunk = chunk?;
        buffer.extend_from_slice(&chunk);
        progress.inc(chunk.len() as u64);

        let downloaded = buffer.len() as u64;
        if downloaded / LOG_EVERY_BYTES > last_logged {
            last_logged = downloaded / LOG_EVERY_BYTES;
            #[allow(clippy::cast_precision_loss)]
            let mb = downloaded as f64 / 1_048_576.0;
            log::debug!("  downloaded {mb:.0} MB");
        }
    }

    #[allow(clippy::cast_precision_loss)]
    let mb = buffer.len() as f64 / 1_048_576.0;
    log::info!("  download complete: {mb:.1} MB");

    Ok(buffer)
}

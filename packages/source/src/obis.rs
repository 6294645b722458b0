//! OBIS v3 occurrence API client.
//!
//! Pages through `/occurrence` with the `after` cursor (the id of the last
//! record on the previous page), requesting only the three columns the
//! pipeline needs plus `id` for the cursor.

use hab_effort_models::Occurrence;
use serde::Deserialize;

use crate::SourceError;
use crate::progress::ProgressCallback;

/// Default OBIS API base URL.
pub const DEFAULT_API_URL: &str = "https://api.obis.org/v3";

/// Default number of records per page.
pub const DEFAULT_PAGE_SIZE: u32 = 10_000;

/// Columns requested from the API.
const FIELDS: &str = "id,decimalLongitude,decimalLatitude,date_mid";

/// Connection settings for the OBIS API.
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
pub struct ObisConfig {
    /// API base URL (without the `/occurrence` suffix).
    #[serde(default = "default_api_url")]
    pub api_url: String,
    /// `WoRMS` `AphiaID`s to query.
    pub taxon_ids: Vec<u32>,
    /// Records per page.
    #[serde(default = "default_page_size")]
    pub page_size: u32,
}

fn default_api_url() -> String {
    DEFAULT_API_URL.to_string()
}

const fn default_page_size() -> u32 {
    DEFAULT_PAGE_SIZE
}

/// One page of the `/occurrence` response.
#[derive(Debug, Deserialize)]
struct OccurrencePage {
    #[serde(default)]
    total: Option<u64>,
    #[serde(default)]
    results: Vec<RawOccurrence>,
}

/// A record as returned by the API; any column may be absent.
#[derive(Debug, Deserialize)]
struct RawOccurrence {
    id: Option<String>,
    #[serde(rename = "decimalLongitude")]
    longitude: Option<f64>,
    #[serde(rename = "decimalLatitude")]
    latitude: Option<f64>,
    date_mid: Option<f64>,
}

/// A decoded page.
#[derive(Debug, Default, PartialEq)]
pub struct ParsedPage {
    /// Complete records.
    pub occurrences: Vec<Occurrence>,
    /// Records on the page, complete or not.
    pub received: usize,
    /// Records dropped for missing coordinates or date.
    pub dropped: usize,
    /// Cursor for the next page.
    pub last_id: Option<String>,
    /// Total record count reported by the API.
    pub total: Option<u64>,
}

/// Decodes one `/occurrence` response body.
///
/// Records without both coordinates and `date_mid` cannot be placed in a
/// region, a cell, or a month, so they are dropped and counted.
///
/// # Errors
///
/// Returns [`SourceError::Json`] if the body is not a valid page.
pub fn parse_page(body: &str) -> Result<ParsedPage, SourceError> {
    let page: OccurrencePage = serde_json::from_str(body)?;

    let mut parsed = ParsedPage {
        received: page.results.len(),
        total: page.total,
        ..ParsedPage::default()
    };

    for raw in page.results {
        if raw.id.is_some() {
            parsed.last_id.clone_from(&raw.id);
        }
        match (raw.longitude, raw.latitude, raw.date_mid) {
            (Some(longitude), Some(latitude), Some(date_mid)) if date_mid.is_finite() => {
                #[allow(clippy::cast_possible_truncation)]
                let date_mid = date_mid as i64;
                parsed.occurrences.push(Occurrence {
                    longitude,
                    latitude,
                    date_mid,
                });
            }
            _ => parsed.dropped += 1,
        }
    }

    Ok(parsed)
}

/// Fetches every occurrence for `taxon_ids`, following the cursor until
/// the API returns an empty page. Pages may be shorter than `page_size`.
///
/// # Errors
///
/// Returns [`SourceError`] on the first failed page; there is no retry.
pub async fn fetch_occurrences(
    client: &reqwest::Client,
    config: &ObisConfig,
    taxon_ids: &[u32],
    progress: &dyn ProgressCallback,
) -> Result<Vec<Occurrence>, SourceError> {
    let url = format!("{}/occurrence", config.api_url.trim_end_matches('/'));
    let taxa = taxon_ids
        .iter()
        .map(u32::to_string)
        .collect::<Vec<_>>()
        .join(",");
    let size = config.page_size.to_string();

    log::info!("Fetching OBIS occurrences for taxa [{taxa}] from {url}");
    progress.set_message(format!("OBIS occurrences (taxa {taxa})"));

    let mut occurrences = Vec::new();
    let mut dropped: usize = 0;
    let mut after: Option<String> = None;
    let mut page_num: u32 = 0;
    let mut received: u64 = 0;
    let mut reported_total: Option<u64> = None;

    loop {
        let mut query: Vec<(&str, &str)> = vec![
            ("taxonid", taxa.as_str()),
            ("fields", FIELDS),
            ("size", size.as_str()),
        ];
        if let Some(cursor) = after.as_deref() {
            query.push(("after", cursor));
        }

        let response = client.get(&url).query(&query).send().await?;
        let status = response.status();
        if !status.is_success() {
            return Err(SourceError::HttpStatus {
                url,
                status: status.as_u16(),
            });
        }

        let body = response.text().await?;
        let page = parse_page(&body)?;

        if page_num == 0
            && let Some(total) = page.total
        {
            log::info!("OBIS reports {total} matching records");
            progress.set_total(total);
            reported_total = Some(total);
        }

        log::debug!(
            "Page {page_num}: {} records ({} dropped)",
            page.received,
            page.dropped
        );
        progress.inc(page.received as u64);

        received += page.received as u64;
        dropped += page.dropped;
        occurrences.extend(page.occurrences);

        if page.received == 0 {
            break;
        }
        let Some(cursor) = page.last_id else {
            return Err(SourceError::Decode {
                message: format!("OBIS page {page_num} has records but no id to continue from"),
            });
        };
        after = Some(cursor);
        page_num += 1;
    }

    if let Some(total) = reported_total
        && received < total
    {
        log::warn!("OBIS reported {total} records but only {received} were returned");
    }
    if dropped > 0 {
        log::warn!("Dropped {dropped} OBIS records missing coordinates or date_mid");
    }
    progress.finish(format!("{} occurrences", occurrences.len()));
    log::info!("Fetched {} occurrences", occurrences.len());

    Ok(occurrences)
}

#[cfg(test)]
mod tests {
    use std::sync::Arc;
    use std::sync::atomic::{AtomicUsize, Ordering};

    use tokio::io::{AsyncReadExt as _, AsyncWriteExt as _};
    use tokio::net::TcpListener;

    use super::*;

    #[test]
    fn parses_page_and_drops_incomplete_records() {
        let body = r#"{
            "total": 3,
            "results": [
                {"id": "a", "decimalLongitude": 3.1, "decimalLatitude": 51.5, "date_mid": 1276560000000},
                {"id": "b", "decimalLongitude": 3.2, "decimalLatitude": 51.6},
                {"id": "c", "decimalLongitude": -70.0, "decimalLatitude": 42.0, "date_mid": 1262304000000.0}
            ]
        }"#;

        let page = parse_page(body).unwrap();
        assert_eq!(page.total, Some(3));
        assert_eq!(page.received, 3);
        assert_eq!(page.dropped, 1);
        assert_eq!(page.last_id.as_deref(), Some("c"));
        assert_eq!(page.occurrences.len(), 2);
        assert_eq!(page.occurrences[0].date_mid, 1_276_560_000_000);
        assert_eq!(page.occurrences[1].date_mid, 1_262_304_000_000);
    }

    #[test]
    fn parses_empty_page() {
        let page = parse_page(r#"{"total": 0, "results": []}"#).unwrap();
        assert_eq!(page.received, 0);
        assert!(page.last_id.is_none());
    }

    #[test]
    fn rejects_non_json_body() {
        assert!(matches!(
            parse_page("<html>gateway timeout</html>"),
            Err(SourceError::Json(_))
        ));
    }

    /// Serves `records` from a local `/occurrence` endpoint, at most
    /// `cap` per page regardless of the requested size, honouring `after`.
    /// Returns the base URL and a request counter.
    async fn serve_pages(records: usize, cap: usize) -> (String, Arc<AtomicUsize>) {
        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap();
        let requests = Arc::new(AtomicUsize::new(0));
        let counter = requests.clone();

        tokio::spawn(async move {
            loop {
                let Ok((mut socket, _)) = listener.accept().await else {
                    return;
                };
                counter.fetch_add(1, Ordering::SeqCst);

                let mut request = Vec::new();
                let mut buf = [0_u8; 1024];
                while !request.windows(4).any(|w| w == b"\r\n\r\n") {
                    let n = socket.read(&mut buf).await.unwrap();
                    if n == 0 {
                        break;
                    }
                    request.extend_from_slice(&buf[..n]);
                }
                let request = String::from_utf8_lossy(&request);
                let request_line = request.lines().next().unwrap_or_default();

                let start = request_line
                    .split(['?', '&', ' '])
                    .find_map(|part| part.strip_prefix("after=r"))
                    .and_then(|n| n.parse::<usize>().ok())
                    .map_or(0, |last| last + 1);
                let end = (start + cap).min(records);

                let results: Vec<String> = (start..end)
                    .map(|i| {
                        format!(
                            r#"{{"id":"r{i}","decimalLongitude":{i}.5,"decimalLatitude":10.0,"date_mid":1276560000000}}"#
                        )
                    })
                    .collect();
                let body = format!(r#"{{"total":{records},"results":[{}]}}"#, results.join(","));
                let response = format!(
                    "HTTP/1.1 200 OK\r\nContent-Type: application/json\r\nContent-Length: {}\r\nConnection: close\r\n\r\n{body}",
                    body.len()
                );
                socket.write_all(response.as_bytes()).await.unwrap();
                socket.shutdown().await.ok();
            }
        });

        (format!("http://{addr}"), requests)
    }

    fn local_client() -> reqwest::Client {
        reqwest::Client::builder().no_proxy().build().unwrap()
    }

    #[tokio::test]
    async fn keeps_paging_when_server_caps_page_size() {
        let (api_url, requests) = serve_pages(7, 3).await;
        let config = ObisConfig {
            api_url,
            taxon_ids: vec![148_899],
            page_size: 5,
        };

        let occurrences = fetch_occurrences(
            &local_client(),
            &config,
            &config.taxon_ids,
            &crate::progress::NullProgress,
        )
        .await
        .unwrap();

        assert_eq!(occurrences.len(), 7);
        let longitudes: Vec<f64> = occurrences.iter().map(|o| o.longitude).collect();
        assert_eq!(longitudes, vec![0.5, 1.5, 2.5, 3.5, 4.5, 5.5, 6.5]);
        // 3 + 3 + 1, then the empty page that ends the loop.
        assert_eq!(requests.load(Ordering::SeqCst), 4);
    }

    #[tokio::test]
    async fn empty_result_set_is_a_single_request() {
        let (api_url, requests) = serve_pages(0, 3).await;
        let config = ObisConfig {
            api_url,
            taxon_ids: vec![19_542],
            page_size: 10,
        };

        let occurrences = fetch_occurrences(
            &local_client(),
            &config,
            &config.taxon_ids,
            &crate::progress::NullProgress,
        )
        .await
        .unwrap();

        assert!(occurrences.is_empty());
        assert_eq!(requests.load(Ordering::SeqCst), 1);
    }

    #[test]
    fn config_defaults() {
        let config: ObisConfig = serde_json::from_str(r#"{"taxon_ids": [148899]}"#).unwrap();
        assert_eq!(config.api_url, DEFAULT_API_URL);
        assert_eq!(config.page_size, DEFAULT_PAGE_SIZE);
        assert_eq!(config.taxon_ids, vec![148_899]);
    }
}

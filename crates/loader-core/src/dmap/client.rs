use std::path::Path;
use std::time::Duration;

use chrono::{DateTime, NaiveDate, Utc};
use serde::Deserialize;
use tracing::instrument;

use crate::db::Warehouse;
use crate::error::{LoaderError, LoaderResult};

const REQUEST_TIMEOUT: Duration = Duration::from_secs(15);
const MAX_RETRIES: u32 = 3;
const RETRY_BACKOFF: Duration = Duration::from_secs(15);
const PAGE_LIMIT: u32 = 100;
const MAX_PAGES: u32 = 10;
const LAST_UPDATED_FORMAT: &str = "%Y-%m-%dT%H:%M:%S%.f";

#[derive(Debug, Clone, Deserialize)]
pub struct ApiResult {
    pub id: String,
    pub dataset_id: String,
    pub url: String,
    pub start_date: String,
    pub end_date: String,
    pub last_updated: String,
}

#[derive(Debug, Deserialize)]
struct ApiResponse {
    success: bool,
    results: Vec<ApiResult>,
}

/// Resolves the `apikey` query param from the environment based on which
/// DMAP endpoint family a URL belongs to.
///
/// Grounded on `dmap_api.apikey_from_environment`.
pub fn apikey_from_environment(url: &str) -> String {
    if url.contains("datasetpublicusersapi") {
        std::env::var("PUBLIC_KEY").unwrap_or_else(|_| "NOKEY".to_string())
    } else if url.contains("datasetcontrolleduserapi") {
        std::env::var("CONTROLLED_KEY").unwrap_or_else(|_| "NOKEY".to_string())
    } else {
        "NOKEY".to_string()
    }
}

/// Streams `url` to `local_path`, retrying transport failures up to 3 times
/// with a 15 second fixed backoff. Returns `Ok(false)` on a 403 (treated as
/// a non-fatal auth rejection the caller should skip past), `Ok(true)` on
/// success.
///
/// Grounded on `dmap_api.download_from_url`.
#[instrument(skip(client))]
pub async fn download_from_url(client: &reqwest::Client, url: &str, local_path: &Path) -> LoaderResult<bool> {
    let mut attempt = 0;
    loop {
        let response = client.get(url).timeout(REQUEST_TIMEOUT).send().await;
        match response {
            Ok(resp) if resp.status().as_u16() == 403 => return Ok(false),
            Ok(resp) if resp.status().is_success() => {
                let bytes = resp.bytes().await?;
                tokio::fs::write(local_path, &bytes).await?;
                return Ok(true);
            }
            Ok(resp) => {
                if attempt >= MAX_RETRIES {
                    let status = resp.status();
                    let body = resp.text().await.unwrap_or_default();
                    return Err(LoaderError::TransientTransport(
                        format!("GET {url} failed with {status}: {body}").into(),
                    ));
                }
            }
            Err(err) => {
                if attempt >= MAX_RETRIES {
                    return Err(LoaderError::from(err));
                }
            }
        }
        attempt += 1;
        tokio::time::sleep(RETRY_BACKOFF).await;
    }
}

/// Fetches every outstanding result for a DMAP endpoint URL, paginating in
/// 100-record pages up to 10 pages, filtering out results already applied
/// per the endpoint's `api_metadata.last_updated` watermark.
///
/// Grounded on `dmap_api.get_api_results`.
#[instrument(skip(client, warehouse))]
pub async fn get_api_results(client: &reqwest::Client, warehouse: &Warehouse, url: &str) -> LoaderResult<Vec<ApiResult>> {
    let last_updated: Option<DateTime<Utc>> = sqlx::query_scalar("SELECT last_updated FROM ods.api_metadata WHERE url = $1")
        .bind(url)
        .fetch_optional(warehouse.pool())
        .await?;

    let apikey = apikey_from_environment(url);
    let mut params = vec![
        ("apikey".to_string(), apikey),
        ("limit".to_string(), PAGE_LIMIT.to_string()),
    ];
    if let Some(ts) = last_updated {
        let filter_date: NaiveDate = (ts - chrono::Duration::days(1)).date_naive();
        params.push(("last_updated".to_string(), filter_date.format("%Y-%m-%d").to_string()));
    }

    let mut all_results = Vec::new();
    for page in 0..MAX_PAGES {
        let mut page_params = params.clone();
        page_params.push(("offset".to_string(), (PAGE_LIMIT * page).to_string()));

        let response = fetch_page(client, url, &page_params).await?;
        if response.results.is_empty() {
            break;
        }
        all_results.extend(response.results);
    }

    all_results.sort_by(|a, b| a.last_updated.cmp(&b.last_updated));

    if let Some(ts) = last_updated {
        let watermark = ts.format(LAST_UPDATED_FORMAT).to_string();
        all_results.retain(|r| r.last_updated.as_str() > watermark.as_str());
    }

    Ok(all_results)
}

async fn fetch_page(client: &reqwest::Client, url: &str, params: &[(String, String)]) -> LoaderResult<ApiResponse> {
    let mut attempt = 0;
    loop {
        let result = client.get(url).timeout(REQUEST_TIMEOUT).query(params).send().await;
        match result {
            Ok(resp) if resp.status().is_success() => {
                let body: ApiResponse = resp.json().await?;
                if !body.success {
                    if attempt >= MAX_RETRIES {
                        return Err(LoaderError::TransientTransport("DMAP response missing success flag".into()));
                    }
                } else {
                    return Ok(body);
                }
            }
            Ok(resp) => {
                if attempt >= MAX_RETRIES {
                    let status = resp.status();
                    return Err(LoaderError::TransientTransport(format!("GET {url} failed with {status}").into()));
                }
            }
            Err(err) => {
                if attempt >= MAX_RETRIES {
                    return Err(LoaderError::from(err));
                }
            }
        }
        attempt += 1;
        tokio::time::sleep(RETRY_BACKOFF).await;
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn apikey_resolved_from_url_shape() {
        unsafe {
            std::env::set_var("PUBLIC_KEY", "pub-key");
        }
        assert_eq!(
            apikey_from_environment("https://dmap.example/datasetpublicusersapi/aggregations/foo"),
            "pub-key"
        );
        assert_eq!(
            apikey_from_environment("https://dmap.example/unknown/foo"),
            "NOKEY"
        );
    }
}

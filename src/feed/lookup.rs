use futures::{Stream, StreamExt};
use serde::Deserialize;
use std::fmt;
use std::time::Duration;
use thiserror::Error;
use url::Url;

use crate::util::{clean_field, validate_site_url};

const MAX_LOOKUP_RESPONSE_SIZE: usize = 1024 * 1024; // 1MB

/// Longest wait between two attempts at the same service.
const MAX_RETRY_DELAY: Duration = Duration::from_secs(30);

/// A third-party feed-discovery service.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum LookupService {
    /// Inoreader "smart search" autocomplete.
    Inoreader,
    /// Feedly feed search.
    Feedly,
}

impl LookupService {
    pub fn name(self) -> &'static str {
        match self {
            LookupService::Inoreader => "inoreader",
            LookupService::Feedly => "feedly",
        }
    }

    pub fn default_base_url(self) -> &'static str {
        match self {
            LookupService::Inoreader => "https://www.inoreader.com",
            LookupService::Feedly => "https://cloud.feedly.com",
        }
    }

    /// Builds the search request URL. The site URL is percent-encoded into
    /// the query string.
    fn request_url(self, base_url: &str, web_url: &str) -> Result<Url, LookupError> {
        let base = base_url.trim_end_matches('/');
        let url = match self {
            LookupService::Inoreader => Url::parse_with_params(
                &format!("{base}/autocomplete.php"),
                &[("term", web_url), ("origin", "smart_search")],
            ),
            LookupService::Feedly => Url::parse_with_params(
                &format!("{base}/v3/search/feeds/"),
                &[("query", web_url)],
            ),
        };
        url.map_err(|e| LookupError::InvalidUrl(e.to_string()))
    }

    /// Extracts the first feed URL from a response body.
    ///
    /// - Inoreader answers with an array of suggestions; the first one with
    ///   `"type": "feed"` carries the feed URL in `value`.
    /// - Feedly answers with `{"results": [...]}`; the first result with a
    ///   `feedId` carries the feed URL behind a `feed/` prefix.
    ///
    /// `Ok(None)` means the service answered but knows no feed.
    fn parse_response(self, bytes: &[u8]) -> Result<Option<String>, LookupError> {
        let candidate = match self {
            LookupService::Inoreader => {
                let items: Vec<serde_json::Value> = serde_json::from_slice(bytes)?;
                items
                    .iter()
                    .find(|item| item.get("type").and_then(|t| t.as_str()) == Some("feed"))
                    .and_then(|item| item.get("value"))
                    .and_then(|v| v.as_str())
                    .map(str::to_owned)
            }
            LookupService::Feedly => {
                let search: FeedlySearch = serde_json::from_slice(bytes)?;
                search
                    .results
                    .iter()
                    .find_map(|result| result.get("feedId").and_then(|id| id.as_str()))
                    .map(|id| id.strip_prefix("feed/").unwrap_or(id).to_owned())
            }
        };

        Ok(candidate.map(|c| clean_field(&c)).filter(|c| {
            if let Err(e) = validate_site_url(c) {
                tracing::warn!(service = self.name(), candidate = %c, error = %e, "Ignoring feed candidate that is not an http(s) URL");
                return false;
            }
            true
        }))
    }
}

impl fmt::Display for LookupService {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

#[derive(Debug, Deserialize)]
struct FeedlySearch {
    #[serde(default)]
    results: Vec<serde_json::Value>,
}

/// A lookup service together with the base URL it is reached at.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct LookupEndpoint {
    pub service: LookupService,
    pub base_url: String,
}

impl LookupEndpoint {
    /// The service at its public address.
    pub fn public(service: LookupService) -> Self {
        Self {
            service,
            base_url: service.default_base_url().to_owned(),
        }
    }
}

/// Timeout and retry policy applied to every lookup request.
#[derive(Debug, Clone, Copy)]
pub struct LookupSettings {
    /// Per-request timeout.
    pub timeout: Duration,
    /// Total attempts per service call, including the first. At least 1.
    pub attempts: u32,
    /// Delay before the first retry; doubles for each later retry.
    pub backoff: Duration,
}

impl Default for LookupSettings {
    fn default() -> Self {
        Self {
            timeout: Duration::from_secs(10),
            attempts: 2,
            backoff: Duration::from_millis(500),
        }
    }
}

/// Errors from a single lookup-service call.
#[derive(Debug, Error)]
pub enum LookupError {
    /// Transport-level failure (DNS, connect, TLS, body read).
    #[error("network error: {0}")]
    Network(#[from] reqwest::Error),
    /// Non-2xx response.
    #[error("HTTP error: status {0}")]
    HttpStatus(u16),
    /// Request exceeded the configured timeout.
    #[error("request timed out")]
    Timeout,
    /// Response body exceeded the 1MB limit.
    #[error("response too large")]
    TooLarge,
    /// Response body was not the JSON shape the service documents.
    #[error("unexpected response: {0}")]
    Parse(#[from] serde_json::Error),
    /// The request URL could not be built from the configured base URL.
    #[error("invalid request URL: {0}")]
    InvalidUrl(String),
}

impl LookupError {
    /// Returns true if this error is transient and the request should be retried.
    pub fn is_retryable(&self) -> bool {
        match self {
            LookupError::Timeout | LookupError::Network(_) => true,
            LookupError::HttpStatus(status) => *status >= 500 || *status == 429,
            LookupError::TooLarge | LookupError::Parse(_) | LookupError::InvalidUrl(_) => false,
        }
    }
}

/// Asks one lookup service for the feed URL of `web_url`.
///
/// Transient failures are retried up to `settings.attempts` times in total
/// with exponential backoff. Returns `Ok(None)` when the service answered
/// but had no feed for the site.
pub async fn lookup_feed(
    client: &reqwest::Client,
    endpoint: &LookupEndpoint,
    web_url: &str,
    settings: &LookupSettings,
) -> Result<Option<String>, LookupError> {
    let url = endpoint.service.request_url(&endpoint.base_url, web_url)?;
    let attempts = settings.attempts.max(1);
    let mut retry_count = 0;

    loop {
        match lookup_once(client, endpoint.service, &url, settings.timeout).await {
            Ok(found) => return Ok(found),
            Err(e) if e.is_retryable() && retry_count + 1 < attempts => {
                let delay = retry_delay(settings.backoff, retry_count);
                tracing::debug!(
                    service = %endpoint.service,
                    site = %web_url,
                    error = %e,
                    retry = retry_count + 1,
                    delay_ms = delay.as_millis() as u64,
                    "Retrying lookup after transient error"
                );
                tokio::time::sleep(delay).await;
                retry_count += 1;
            }
            Err(e) => return Err(e),
        }
    }
}

/// Exponential backoff for the `retry`-th retry (0-based), capped at
/// [`MAX_RETRY_DELAY`].
fn retry_delay(backoff: Duration, retry: u32) -> Duration {
    let factor = 2u32.checked_pow(retry).unwrap_or(u32::MAX);
    backoff.saturating_mul(factor).min(MAX_RETRY_DELAY)
}

/// One request. `timeout` covers sending and reading the whole body.
async fn lookup_once(
    client: &reqwest::Client,
    service: LookupService,
    url: &Url,
    timeout: Duration,
) -> Result<Option<String>, LookupError> {
    let bytes = tokio::time::timeout(timeout, fetch_body(client, url))
        .await
        .map_err(|_| LookupError::Timeout)??;

    service.parse_response(&bytes)
}

async fn fetch_body(client: &reqwest::Client, url: &Url) -> Result<Vec<u8>, LookupError> {
    let response = client
        .get(url.as_str())
        .send()
        .await
        .map_err(LookupError::Network)?;

    if !response.status().is_success() {
        return Err(LookupError::HttpStatus(response.status().as_u16()));
    }

    read_limited_bytes(response).await
}

/// Reads a response body, failing once it passes the size limit.
async fn read_limited_bytes(response: reqwest::Response) -> Result<Vec<u8>, LookupError> {
    if let Some(len) = response.content_length() {
        if len as usize > MAX_LOOKUP_RESPONSE_SIZE {
            return Err(LookupError::TooLarge);
        }
    }

    collect_limited(response.bytes_stream(), MAX_LOOKUP_RESPONSE_SIZE).await
}

/// Concatenates body chunks, failing as soon as the total passes `limit`.
async fn collect_limited<S, B>(mut stream: S, limit: usize) -> Result<Vec<u8>, LookupError>
where
    S: Stream<Item = Result<B, reqwest::Error>> + Unpin,
    B: AsRef<[u8]>,
{
    let mut bytes = Vec::new();

    while let Some(chunk) = stream.next().await {
        let chunk = chunk.map_err(LookupError::Network)?;
        let chunk = chunk.as_ref();
        if bytes.len().saturating_add(chunk.len()) > limit {
            return Err(LookupError::TooLarge);
        }
        bytes.extend_from_slice(chunk);
    }

    Ok(bytes)
}

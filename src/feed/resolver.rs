use crossterm::style::{Color, Stylize};
use std::sync::Arc;

use super::extract::Entry;
use super::lookup::{lookup_feed, LookupEndpoint, LookupError, LookupService, LookupSettings};
use super::opml::CacheMap;

/// Outcome of resolving one website URL to a feed URL.
#[derive(Debug)]
pub enum Resolution {
    /// Known from the previous run's output; no service was contacted.
    Cached(String),
    /// Returned by a lookup service.
    Found {
        rss_url: String,
        service: LookupService,
    },
    /// No service produced a feed. Holds any service failures that happened
    /// along the way; an empty list means every service asked answered
    /// "no feed". `services_asked` is 0 when no endpoint is configured.
    NotFound {
        failures: Vec<(LookupService, LookupError)>,
        services_asked: usize,
    },
}

impl Resolution {
    pub fn rss_url(&self) -> Option<&str> {
        match self {
            Resolution::Cached(url) | Resolution::Found { rss_url: url, .. } => Some(url.as_str()),
            Resolution::NotFound { .. } => None,
        }
    }

    pub fn into_rss_url(self) -> Option<String> {
        match self {
            Resolution::Cached(url) | Resolution::Found { rss_url: url, .. } => Some(url),
            Resolution::NotFound { .. } => None,
        }
    }

    pub fn is_cache_hit(&self) -> bool {
        matches!(self, Resolution::Cached(_))
    }

    /// True if at least one lookup service was contacted.
    pub fn made_lookup(&self) -> bool {
        match self {
            Resolution::Cached(_) => false,
            Resolution::Found { .. } => true,
            Resolution::NotFound { services_asked, .. } => *services_asked > 0,
        }
    }

    /// The console line reporting how `entry` was resolved.
    pub fn progress_line(&self, entry: &Entry) -> String {
        match self {
            Resolution::Cached(rss_url) => format!("ALREADY HAVE: {}: {}", entry.name, rss_url),
            Resolution::Found { rss_url, service } => {
                format!("SMART SEARCH ({}): {}: {}", service, entry.name, rss_url)
            }
            Resolution::NotFound { .. } => match self.failure_reason() {
                Some(reason) => format!("UNABLE FIND: {}: {} ({})", entry.name, entry.web_url, reason),
                None => format!("UNABLE FIND: {}: {}", entry.name, entry.web_url),
            },
        }
    }

    fn color(&self) -> Color {
        match self {
            Resolution::Cached(_) => Color::Yellow,
            Resolution::Found { .. } => Color::Green,
            Resolution::NotFound { .. } => Color::Red,
        }
    }

    /// Human-readable reason for a miss, if any service failed.
    pub fn failure_reason(&self) -> Option<String> {
        match self {
            Resolution::NotFound { failures, .. } if !failures.is_empty() => Some(
                failures
                    .iter()
                    .map(|(service, e)| format!("{service}: {e}"))
                    .collect::<Vec<_>>()
                    .join("; "),
            ),
            _ => None,
        }
    }
}

/// Maps website URLs to feed URLs: cache first, then each lookup service in
/// order, stopping at the first hit.
///
/// Cloning is cheap; the HTTP client and cache map are shared.
#[derive(Clone)]
pub struct Resolver {
    client: reqwest::Client,
    endpoints: Arc<[LookupEndpoint]>,
    settings: LookupSettings,
    cache: Arc<CacheMap>,
}

impl Resolver {
    pub fn new(
        client: reqwest::Client,
        endpoints: Vec<LookupEndpoint>,
        settings: LookupSettings,
        cache: CacheMap,
    ) -> Self {
        Self {
            client,
            endpoints: endpoints.into(),
            settings,
            cache: Arc::new(cache),
        }
    }

    /// Resolves `web_url` to a feed URL.
    ///
    /// A cache hit returns immediately without any network traffic. Otherwise
    /// each endpoint is asked in order. A service that fails (network, HTTP
    /// status, timeout, bad body) is logged and skipped like one that found
    /// nothing, so one broken service or response never aborts the batch.
    pub async fn resolve(&self, web_url: &str) -> Resolution {
        if let Some(rss_url) = self.cache.get(web_url) {
            tracing::debug!(site = %web_url, feed = %rss_url, "Cache hit");
            return Resolution::Cached(rss_url.clone());
        }

        let mut failures = Vec::new();
        for endpoint in self.endpoints.iter() {
            match lookup_feed(&self.client, endpoint, web_url, &self.settings).await {
                Ok(Some(rss_url)) => {
                    tracing::debug!(site = %web_url, feed = %rss_url, service = %endpoint.service, "Feed found");
                    return Resolution::Found {
                        rss_url,
                        service: endpoint.service,
                    };
                }
                Ok(None) => {
                    tracing::debug!(site = %web_url, service = %endpoint.service, "Service knows no feed");
                }
                Err(e) => {
                    tracing::warn!(site = %web_url, service = %endpoint.service, error = %e, "Feed lookup failed");
                    failures.push((endpoint.service, e));
                }
            }
        }

        Resolution::NotFound {
            failures,
            services_asked: self.endpoints.len(),
        }
    }

    /// Resolves an entry and prints its progress line.
    pub async fn resolve_entry(&self, entry: &Entry) -> Resolution {
        let resolution = self.resolve(&entry.web_url).await;
        println!("{}", resolution.progress_line(entry).with(resolution.color()));
        resolution
    }
}

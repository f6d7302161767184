//! Configuration file parser for `blogroll.toml`.
//!
//! The config file is optional. A missing file yields `Config::default()`,
//! which reproduces the classic behaviour: read `README.md`, write
//! `engineering_blogs.opml` and `engineering_blogs.json` in the working
//! directory, ask Inoreader then Feedly.
use serde::Deserialize;
use std::path::{Path, PathBuf};
use std::time::Duration;
use thiserror::Error;

use crate::feed::{LookupEndpoint, LookupService, LookupSettings};
use crate::util::validate_site_url;

/// Upper bound on concurrent resolutions, to stay polite to the services.
const MAX_CONCURRENCY: usize = 16;

/// Upper bound on attempts per lookup-service call.
const MAX_LOOKUP_ATTEMPTS: u32 = 5;

// ============================================================================
// Error Types
// ============================================================================

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("Failed to read config file: {0}")]
    Io(#[from] std::io::Error),

    #[error("Invalid TOML in config file: {0}")]
    Parse(#[from] toml::de::Error),

    /// Config file exceeds maximum allowed size.
    #[error("Config file too large: {0}")]
    TooLarge(String),

    #[error("Invalid config value for `{key}`: {reason}")]
    Invalid { key: &'static str, reason: String },
}

// ============================================================================
// Configuration Structs
// ============================================================================

/// Top-level configuration.
///
/// All fields use `#[serde(default)]` so any subset of keys can be specified.
#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct Config {
    /// Source document listing `* <name> <url>` entries.
    pub source: PathBuf,

    /// OPML output; also read back as the feed cache on the next run.
    pub opml_path: PathBuf,

    /// JSON catalog output.
    pub json_path: PathBuf,

    /// Title of the subscription list and its grouping outline.
    pub title: String,

    /// Website URLs that are never resolved or written.
    pub exclude: Vec<String>,

    /// Number of entries resolved at once (clamped to 1..=16).
    pub concurrency: usize,

    /// Per-request timeout for lookup services, in seconds.
    pub request_timeout_secs: u64,

    /// Total attempts per lookup-service call, including the first
    /// (clamped to 1..=5).
    pub lookup_attempts: u32,

    /// Delay before the first retry, in milliseconds. Doubles per retry.
    pub retry_backoff_ms: u64,

    pub services: ServicesConfig,
}

/// Where the lookup services live and which to ask first.
#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct ServicesConfig {
    pub inoreader_base_url: String,
    pub feedly_base_url: String,
    /// Services asked in this order. Empty means cache-only.
    pub order: Vec<LookupService>,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            source: PathBuf::from("README.md"),
            opml_path: PathBuf::from("engineering_blogs.opml"),
            json_path: PathBuf::from("engineering_blogs.json"),
            title: "Engineering Blogs".to_string(),
            exclude: Vec::new(),
            concurrency: 4,
            request_timeout_secs: 10,
            lookup_attempts: 2,
            retry_backoff_ms: 500,
            services: ServicesConfig::default(),
        }
    }
}

impl Default for ServicesConfig {
    fn default() -> Self {
        Self {
            inoreader_base_url: LookupService::Inoreader.default_base_url().to_string(),
            feedly_base_url: LookupService::Feedly.default_base_url().to_string(),
            order: vec![LookupService::Inoreader, LookupService::Feedly],
        }
    }
}

impl Config {
    /// Maximum config file size (1 MB).
    const MAX_FILE_SIZE: u64 = 1_048_576;

    const KNOWN_KEYS: [&'static str; 10] = [
        "source",
        "opml_path",
        "json_path",
        "title",
        "exclude",
        "concurrency",
        "request_timeout_secs",
        "lookup_attempts",
        "retry_backoff_ms",
        "services",
    ];

    /// Load configuration from a TOML file.
    ///
    /// - Missing file → `Ok(Config::default())`
    /// - Empty file → `Ok(Config::default())`
    /// - Invalid TOML → `Err(ConfigError::Parse)` with line number info
    /// - Unknown keys → accepted, logged as warning
    /// - Unusable service base URL → `Err(ConfigError::Invalid)`
    pub fn load(path: &Path) -> Result<Self, ConfigError> {
        // Check file size before reading
        match std::fs::metadata(path) {
            Ok(meta) if meta.len() > Self::MAX_FILE_SIZE => {
                return Err(ConfigError::TooLarge(format!(
                    "Config file is {} bytes (max {} bytes)",
                    meta.len(),
                    Self::MAX_FILE_SIZE
                )));
            }
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => {
                tracing::debug!(path = %path.display(), "No config file found, using defaults");
                return Ok(Self::default());
            }
            Err(e) => return Err(ConfigError::Io(e)),
            Ok(_) => {}
        }

        let content = match std::fs::read_to_string(path) {
            Ok(c) => c,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => {
                tracing::debug!(path = %path.display(), "Config file disappeared, using defaults");
                return Ok(Self::default());
            }
            Err(e) => return Err(ConfigError::Io(e)),
        };

        if content.trim().is_empty() {
            tracing::debug!(path = %path.display(), "Config file is empty, using defaults");
            return Ok(Self::default());
        }

        if let Ok(raw) = content.parse::<toml::Table>() {
            for key in raw.keys() {
                if !Self::KNOWN_KEYS.contains(&key.as_str()) {
                    tracing::warn!(key = %key, "Unknown key in config file, ignoring");
                }
            }
        }

        let config: Config = toml::from_str(&content)?;
        config.validate()?;
        tracing::info!(path = %path.display(), source = %config.source.display(), "Loaded configuration");
        Ok(config)
    }

    fn validate(&self) -> Result<(), ConfigError> {
        for (key, url) in [
            ("services.inoreader_base_url", &self.services.inoreader_base_url),
            ("services.feedly_base_url", &self.services.feedly_base_url),
        ] {
            validate_site_url(url).map_err(|e| ConfigError::Invalid {
                key,
                reason: e.to_string(),
            })?;
        }
        if self.title.trim().is_empty() {
            return Err(ConfigError::Invalid {
                key: "title",
                reason: "must not be empty".to_string(),
            });
        }
        Ok(())
    }

    /// Places both output files under `dir`, keeping their file names.
    pub fn with_output_dir(mut self, dir: &Path) -> Self {
        for path in [&mut self.opml_path, &mut self.json_path] {
            if let Some(name) = path.file_name() {
                *path = dir.join(name);
            }
        }
        self
    }

    /// Lookup endpoints in the configured order, duplicates removed.
    pub fn endpoints(&self) -> Vec<LookupEndpoint> {
        let mut endpoints: Vec<LookupEndpoint> = Vec::new();
        for &service in &self.services.order {
            if endpoints.iter().any(|e| e.service == service) {
                continue;
            }
            let base_url = match service {
                LookupService::Inoreader => &self.services.inoreader_base_url,
                LookupService::Feedly => &self.services.feedly_base_url,
            };
            endpoints.push(LookupEndpoint {
                service,
                base_url: base_url.clone(),
            });
        }
        endpoints
    }

    pub fn lookup_settings(&self) -> LookupSettings {
        LookupSettings {
            timeout: Duration::from_secs(self.request_timeout_secs.max(1)),
            attempts: self.lookup_attempts.clamp(1, MAX_LOOKUP_ATTEMPTS),
            backoff: Duration::from_millis(self.retry_backoff_ms),
        }
    }

    pub fn concurrency(&self) -> usize {
        self.concurrency.clamp(1, MAX_CONCURRENCY)
    }
}

// ============================================================================
// Tests
// ============================================================================

//! One batch run: read the list, resolve every blog, write both outputs.
//!
//! Stages, each usable on its own:
//!
//! 1. [`select_entries`] - extract entries, drop excluded and duplicate URLs
//! 2. [`crate::feed::read_cache`] - feed URLs carried over from the last run
//! 3. [`crate::catalog::build`] - resolve and sort
//! 4. OPML + JSON serialization
//!
//! Failing to read the source or to write an output is fatal. A failed
//! lookup only makes that one entry unresolved.

use std::collections::HashSet;
use std::path::{Path, PathBuf};
use thiserror::Error;

use crate::catalog::{self, Record};
use crate::config::Config;
use crate::feed::{self, Entry, Resolver};
use crate::util::atomic_write;

/// Fatal pipeline failures.
#[derive(Debug, Error)]
pub enum PipelineError {
    /// The source document is missing or unreadable.
    #[error("Failed to read source document '{}': {source}", path.display())]
    Source {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    /// An output file could not be produced.
    #[error("Failed to write '{}': {reason:#}", path.display())]
    Output { path: PathBuf, reason: anyhow::Error },

    /// The HTTP client could not be constructed.
    #[error("Failed to build HTTP client: {0}")]
    Client(#[from] reqwest::Error),
}

/// What [`select_entries`] kept and what it dropped.
#[derive(Debug, Default, Clone, PartialEq, Eq)]
pub struct Selection {
    /// Entries to resolve, in document order.
    pub entries: Vec<Entry>,
    /// Entries whose URL is on the exclude list.
    pub excluded: Vec<Entry>,
    /// Later entries repeating an earlier entry's URL.
    pub duplicates: Vec<Entry>,
}

/// Extracts entries from `text`, dropping excluded URLs and repeated URLs.
///
/// The first occurrence of a URL wins.
pub fn select_entries(text: &str, exclude: &[String]) -> Selection {
    let exclude: HashSet<&str> = exclude.iter().map(String::as_str).collect();
    let mut seen: HashSet<String> = HashSet::new();
    let mut selection = Selection::default();

    for entry in feed::entries(text) {
        if exclude.contains(entry.web_url.as_str()) {
            selection.excluded.push(entry);
        } else if seen.insert(entry.web_url.clone()) {
            selection.entries.push(entry);
        } else {
            tracing::warn!(blog = %entry.name, url = %entry.web_url, "Duplicate URL in source document, keeping first occurrence");
            selection.duplicates.push(entry);
        }
    }

    selection
}

/// Outcome of a completed run.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RunSummary {
    /// Records written to both outputs, in output order.
    pub resolved: Vec<Record>,
    /// Records with no feed, sorted like `resolved`.
    pub unresolved: Vec<Record>,
    pub cache_hits: usize,
    pub looked_up: usize,
    pub excluded: usize,
    pub duplicates: usize,
}

/// Runs the whole pipeline described by `config`.
pub async fn run(config: &Config) -> Result<RunSummary, PipelineError> {
    let text = tokio::fs::read_to_string(&config.source)
        .await
        .map_err(|source| PipelineError::Source {
            path: config.source.clone(),
            source,
        })?;

    let selection = select_entries(&text, &config.exclude);
    for entry in &selection.excluded {
        println!("{}", skipped_line(entry));
    }
    tracing::info!(
        entries = selection.entries.len(),
        excluded = selection.excluded.len(),
        duplicates = selection.duplicates.len(),
        "Extracted entries"
    );

    let cache = feed::read_cache(&config.opml_path).await;

    let client = reqwest::Client::builder()
        .user_agent(concat!("blogroll/", env!("CARGO_PKG_VERSION")))
        .build()?;
    let resolver = Resolver::new(
        client,
        config.endpoints(),
        config.lookup_settings(),
        cache,
    );

    let (catalog, stats) =
        catalog::build(selection.entries, &resolver, config.concurrency()).await;

    // Render both documents before touching either file
    let opml = feed::export_opml(&config.title, &catalog.opml_feeds())
        .map_err(|reason| output_error(&config.opml_path, reason))?;
    let json = catalog
        .to_json()
        .map_err(|reason| output_error(&config.json_path, reason))?;

    atomic_write(&config.opml_path, opml.as_bytes())
        .map_err(|reason| output_error(&config.opml_path, reason))?;
    atomic_write(&config.json_path, json.as_bytes())
        .map_err(|reason| output_error(&config.json_path, reason))?;

    println!(
        "{}",
        done_line(catalog.resolved.len(), &config.opml_path, &config.json_path)
    );
    if let Some(report) = unresolved_report(&catalog.unresolved) {
        println!("{report}");
    }

    Ok(RunSummary {
        resolved: catalog.resolved,
        unresolved: catalog.unresolved,
        cache_hits: stats.cache_hits,
        looked_up: stats.looked_up,
        excluded: selection.excluded.len(),
        duplicates: selection.duplicates.len(),
    })
}

fn output_error(path: &Path, reason: anyhow::Error) -> PipelineError {
    PipelineError::Output {
        path: path.to_path_buf(),
        reason,
    }
}

/// Console line for an entry dropped by the exclude list.
pub fn skipped_line(entry: &Entry) -> String {
    format!("SKIPPED: {}: {}", entry.name, entry.web_url)
}

/// Console line summarising what was written.
pub fn done_line(written: usize, opml_path: &Path, json_path: &Path) -> String {
    format!(
        "DONE: {} written to {} and {}",
        written,
        opml_path.display(),
        json_path.display()
    )
}

/// The trailing unresolved-entries report, or `None` when every entry resolved.
pub fn unresolved_report(unresolved: &[Record]) -> Option<String> {
    if unresolved.is_empty() {
        return None;
    }
    let mut report = format!("UNRESOLVED ({}):", unresolved.len());
    for record in unresolved {
        report.push_str(&format!("\n  {} | {}", record.name, record.web_url));
    }
    Some(report)
}

//! Catalog assembly and the JSON catalog format.
//!
//! A [`Catalog`] is built once per run from the resolved entries. Records are
//! split into `resolved` and `unresolved`, and each partition is sorted by
//! [`capitalize`]d name. Only `resolved` records reach the output files.

use anyhow::{Context, Result};
use futures::stream::{self, StreamExt};
use serde::Serialize;

use crate::feed::{Entry, OpmlFeed, Resolution, Resolver};
use crate::util::capitalize;

/// One blog, after resolution.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Record {
    pub name: String,
    pub web_url: String,
    /// `None` only for unresolved records.
    pub rss_url: Option<String>,
    pub desc: Option<String>,
    pub tags: Option<Vec<String>>,
}

impl Record {
    /// Merges an entry with its resolved feed URL (if any).
    pub fn from_entry(entry: Entry, rss_url: Option<String>) -> Self {
        Self {
            name: entry.name,
            web_url: entry.web_url,
            rss_url,
            desc: None,
            tags: None,
        }
    }
}

/// Resolved and unresolved records, each sorted by collation key.
#[derive(Debug, Default, Clone, PartialEq, Eq)]
pub struct Catalog {
    pub resolved: Vec<Record>,
    pub unresolved: Vec<Record>,
}

/// Counters gathered while building a catalog.
#[derive(Debug, Default, Clone, Copy, PartialEq, Eq)]
pub struct BuildStats {
    /// Entries answered from the cache.
    pub cache_hits: usize,
    /// Entries for which at least one lookup service was contacted.
    pub looked_up: usize,
}

/// JSON shape of a resolved record. Field order is the output order.
#[derive(Serialize)]
struct CatalogEntry<'a> {
    title: &'a str,
    desc: Option<&'a str>,
    site_url: &'a str,
    rss_url: Option<&'a str>,
    tags: Option<&'a [String]>,
}

impl<'a> From<&'a Record> for CatalogEntry<'a> {
    fn from(record: &'a Record) -> Self {
        Self {
            title: &record.name,
            desc: record.desc.as_deref(),
            site_url: &record.web_url,
            rss_url: record.rss_url.as_deref(),
            tags: record.tags.as_deref(),
        }
    }
}

impl Catalog {
    /// Partitions records on `rss_url` and sorts both partitions.
    ///
    /// The sort is stable, so records with equal keys keep their input order.
    pub fn from_records(records: impl IntoIterator<Item = Record>) -> Self {
        let (mut resolved, mut unresolved): (Vec<Record>, Vec<Record>) = records
            .into_iter()
            .partition(|record| record.rss_url.is_some());
        sort_records(&mut resolved);
        sort_records(&mut unresolved);
        Self {
            resolved,
            unresolved,
        }
    }

    /// Resolved records as subscription-list outlines, in catalog order.
    pub fn opml_feeds(&self) -> Vec<OpmlFeed> {
        self.resolved
            .iter()
            .filter_map(|record| {
                record.rss_url.as_ref().map(|rss_url| OpmlFeed {
                    title: record.name.clone(),
                    xml_url: rss_url.clone(),
                    html_url: Some(record.web_url.clone()),
                })
            })
            .collect()
    }

    /// Renders resolved records as a JSON array with 4-space indentation.
    pub fn to_json(&self) -> Result<String> {
        let entries: Vec<CatalogEntry<'_>> = self.resolved.iter().map(CatalogEntry::from).collect();

        let mut buf = Vec::new();
        let formatter = serde_json::ser::PrettyFormatter::with_indent(b"    ");
        let mut serializer = serde_json::Serializer::with_formatter(&mut buf, formatter);
        entries
            .serialize(&mut serializer)
            .context("Failed to serialize catalog")?;

        String::from_utf8(buf).context("Generated JSON contains invalid UTF-8")
    }
}

fn sort_records(records: &mut [Record]) {
    records.sort_by_cached_key(|record| capitalize(&record.name));
}

/// Resolves every entry and assembles the catalog.
///
/// Up to `concurrency` resolutions run at once. Progress lines are printed
/// as entries finish; the catalog order does not depend on completion order.
pub async fn build(
    entries: Vec<Entry>,
    resolver: &Resolver,
    concurrency: usize,
) -> (Catalog, BuildStats) {
    let resolved: Vec<(Entry, Resolution)> = stream::iter(entries)
        .map(|entry| async move {
            let resolution = resolver.resolve_entry(&entry).await;
            (entry, resolution)
        })
        .buffered(concurrency.max(1))
        .collect()
        .await;

    let mut stats = BuildStats::default();
    let records: Vec<Record> = resolved
        .into_iter()
        .map(|(entry, resolution)| {
            if resolution.is_cache_hit() {
                stats.cache_hits += 1;
            } else if resolution.made_lookup() {
                stats.looked_up += 1;
            }
            Record::from_entry(entry, resolution.into_rss_url())
        })
        .collect();

    (Catalog::from_records(records), stats)
}

use anyhow::{Context, Result};
use quick_xml::events::{BytesDecl, BytesEnd, BytesStart, BytesText, Event};
use quick_xml::{Reader, Writer};
use std::collections::HashMap;
use std::io::Cursor;
use std::path::Path;
use thiserror::Error;

use crate::util::validate_site_url;

/// Maximum allowed nesting depth for OPML outline elements.
/// Prevents stack overflow attacks from maliciously crafted deeply nested OPMLs.
const MAX_OPML_DEPTH: usize = 50;

/// Website URL -> feed URL, carried over from a previous run's OPML output.
pub type CacheMap = HashMap<String, String>;

/// Errors that can occur during OPML parsing.
#[derive(Debug, Error)]
pub enum OpmlError {
    /// OPML nesting depth exceeds safety limit.
    #[error("OPML nesting depth exceeds maximum of {0} levels")]
    MaxDepthExceeded(usize),

    /// XML parsing failed.
    #[error("XML parse error: {0}")]
    XmlParse(String),

    /// File I/O error.
    #[error("Failed to read OPML file: {0}")]
    Io(#[from] std::io::Error),
}

/// A feed subscription as it appears in an OPML `<outline>` element.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct OpmlFeed {
    /// Display title. Sourced from `title`, falling back to `text`, then
    /// to the feed URL itself.
    pub title: String,
    /// URL of the RSS/Atom feed (`xmlUrl`).
    pub xml_url: String,
    /// URL of the website (`htmlUrl`), if present.
    pub html_url: Option<String>,
}

/// Reads a previously generated OPML file into a [`CacheMap`].
///
/// Only outlines carrying both `htmlUrl` and `xmlUrl` contribute. A missing
/// file is the normal first-run case and yields an empty map. An unreadable
/// or malformed file is logged and also yields an empty map: every entry is
/// then simply looked up again.
pub async fn read_cache(path: &Path) -> CacheMap {
    let content = match tokio::fs::read_to_string(path).await {
        Ok(content) => content,
        Err(e) if e.kind() == std::io::ErrorKind::NotFound => {
            tracing::debug!(path = %path.display(), "No previous OPML output, starting with empty cache");
            return CacheMap::new();
        }
        Err(e) => {
            tracing::warn!(path = %path.display(), error = %e, "Failed to read previous OPML output, ignoring cache");
            return CacheMap::new();
        }
    };

    match parse_opml_content(&content) {
        Ok(feeds) => {
            let cache = cache_from_feeds(feeds);
            tracing::debug!(path = %path.display(), entries = cache.len(), "Loaded feed cache");
            cache
        }
        Err(e) => {
            tracing::warn!(path = %path.display(), error = %e, "Previous OPML output is malformed, ignoring cache");
            CacheMap::new()
        }
    }
}

fn cache_from_feeds(feeds: Vec<OpmlFeed>) -> CacheMap {
    feeds
        .into_iter()
        .filter_map(|feed| feed.html_url.map(|html_url| (html_url, feed.xml_url)))
        .collect()
}

/// Parses OPML content and extracts every outline that has an `xmlUrl`.
///
/// Nested and flat layouts are both handled; grouping outlines (no
/// `xmlUrl`) are traversed but not returned. Attribute names are matched
/// case-insensitively, so `xmlurl`/`htmlurl` written by other tools count.
fn parse_opml_content(content: &str) -> Result<Vec<OpmlFeed>, OpmlError> {
    // quick-xml (0.37) never parses <!ENTITY> declarations. Only the
    // five XML builtins are resolved; anything else is an unescape error.
    let mut reader = Reader::from_str(content);
    reader.config_mut().trim_text(true);

    let mut feeds = Vec::new();
    let mut buf = Vec::new();
    let mut depth: usize = 0;

    loop {
        match reader.read_event_into(&mut buf) {
            Ok(Event::Start(e)) if e.name().as_ref() == b"outline" => {
                depth += 1;
                if depth > MAX_OPML_DEPTH {
                    return Err(OpmlError::MaxDepthExceeded(MAX_OPML_DEPTH));
                }
                if let Some(feed) = parse_outline_attributes(&e, &reader)? {
                    feeds.push(feed);
                }
            }
            Ok(Event::Empty(e)) if e.name().as_ref() == b"outline" => {
                if let Some(feed) = parse_outline_attributes(&e, &reader)? {
                    feeds.push(feed);
                }
            }
            Ok(Event::End(e)) if e.name().as_ref() == b"outline" => {
                depth = depth.saturating_sub(1);
            }
            Ok(Event::Eof) => break,
            Err(e) => return Err(OpmlError::XmlParse(e.to_string())),
            _ => {}
        }
        buf.clear();
    }

    Ok(feeds)
}

/// Returns `Some(OpmlFeed)` for outlines with a valid `xmlUrl`, `None` for
/// grouping outlines.
fn parse_outline_attributes(
    e: &BytesStart<'_>,
    reader: &Reader<&[u8]>,
) -> Result<Option<OpmlFeed>, OpmlError> {
    let mut xml_url = None;
    let mut html_url = None;
    let mut title = None;
    let mut text = None;

    let decoder = reader.decoder();
    for attr_result in e.attributes() {
        let attr = match attr_result {
            Ok(attr) => attr,
            Err(e) => {
                tracing::warn!(error = %e, "Skipping malformed OPML attribute");
                continue;
            }
        };
        let key = attr.key.as_ref();
        let value = || {
            attr.decode_and_unescape_value(decoder)
                .map(|v| v.into_owned())
                .map_err(|e| OpmlError::XmlParse(e.to_string()))
        };
        if key.eq_ignore_ascii_case(b"xmlUrl") {
            xml_url = Some(value()?);
        } else if key.eq_ignore_ascii_case(b"htmlUrl") {
            html_url = Some(value()?);
        } else if key == b"title" {
            title = Some(value()?);
        } else if key == b"text" {
            text = Some(value()?);
        }
    }

    let Some(xml_url) = xml_url else {
        return Ok(None);
    };

    if let Err(e) = validate_site_url(&xml_url) {
        tracing::warn!(url = %xml_url, error = %e, "Skipping cached outline with invalid feed URL");
        return Ok(None);
    }

    Ok(Some(OpmlFeed {
        title: title.or(text).unwrap_or_else(|| xml_url.clone()),
        xml_url,
        html_url,
    }))
}

/// Renders the subscription list as an OPML 1.0 document.
///
/// Layout: `<head><title>` carries `title`; `<body>` holds one grouping
/// outline (also named `title`) whose children are one
/// `<outline type="rss" text title xmlUrl htmlUrl/>` per feed, in the order
/// given.
pub fn export_opml(title: &str, feeds: &[OpmlFeed]) -> Result<String> {
    let mut writer = Writer::new_with_indent(Cursor::new(Vec::new()), b' ', 2);

    writer
        .write_event(Event::Decl(BytesDecl::new("1.0", Some("utf-8"), None)))
        .context("Failed to write XML declaration")?;

    let mut opml = BytesStart::new("opml");
    opml.push_attribute(("version", "1.0"));
    writer
        .write_event(Event::Start(opml))
        .context("Failed to write opml element")?;

    writer
        .write_event(Event::Start(BytesStart::new("head")))
        .context("Failed to write head element")?;
    writer
        .write_event(Event::Start(BytesStart::new("title")))
        .context("Failed to write title element")?;
    writer
        .write_event(Event::Text(BytesText::new(title)))
        .context("Failed to write title text")?;
    writer
        .write_event(Event::End(BytesEnd::new("title")))
        .context("Failed to write title end")?;
    writer
        .write_event(Event::End(BytesEnd::new("head")))
        .context("Failed to write head end")?;

    writer
        .write_event(Event::Start(BytesStart::new("body")))
        .context("Failed to write body element")?;

    let mut group = BytesStart::new("outline");
    group.push_attribute(("text", title));
    group.push_attribute(("title", title));
    if feeds.is_empty() {
        writer
            .write_event(Event::Empty(group))
            .context("Failed to write group outline")?;
    } else {
        writer
            .write_event(Event::Start(group))
            .context("Failed to write group outline")?;

        for feed in feeds {
            let mut outline = BytesStart::new("outline");
            outline.push_attribute(("type", "rss"));
            outline.push_attribute(("text", feed.title.as_str()));
            outline.push_attribute(("title", feed.title.as_str()));
            outline.push_attribute(("xmlUrl", feed.xml_url.as_str()));
            if let Some(ref html_url) = feed.html_url {
                outline.push_attribute(("htmlUrl", html_url.as_str()));
            }
            writer
                .write_event(Event::Empty(outline))
                .context("Failed to write outline element")?;
        }

        writer
            .write_event(Event::End(BytesEnd::new("outline")))
            .context("Failed to write group outline end")?;
    }

    writer
        .write_event(Event::End(BytesEnd::new("body")))
        .context("Failed to write body end")?;
    writer
        .write_event(Event::End(BytesEnd::new("opml")))
        .context("Failed to write opml end")?;

    let mut result = writer.into_inner().into_inner();
    result.push(b'\n');
    String::from_utf8(result).context("Generated OPML contains invalid UTF-8")
}

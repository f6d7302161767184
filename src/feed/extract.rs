use regex::Regex;
use std::str::Lines;
use std::sync::LazyLock;

use crate::util::{clean_field, validate_site_url};

/// A list item of the form `* <name> <url>`.
///
/// The name is everything between the marker and the last ` http` on the
/// line, so names may themselves contain spaces.
static ENTRY_PATTERN: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"\* (.*) (http.*)").expect("Invalid entry pattern"));

/// A blog listed in the source document, exactly as written there.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Entry {
    /// Display name, with control characters and surrounding whitespace removed.
    pub name: String,
    /// Website URL. Casing and query string are kept as written.
    pub web_url: String,
}

/// Lazy iterator over the entries of a source document.
///
/// Cloning the iterator restarts from the clone point without re-reading
/// anything; a fresh [`entries`] call restarts from the top.
#[derive(Debug, Clone)]
pub struct Entries<'a> {
    lines: Lines<'a>,
}

/// Extracts `(name, url)` entries from the full text of a source document.
///
/// Each line is matched on its own. Lines that don't match, and matches
/// whose name is blank or whose URL is not an absolute http(s) URL, are
/// skipped. Duplicates are passed through in document order.
pub fn entries(text: &str) -> Entries<'_> {
    Entries {
        lines: text.lines(),
    }
}

impl Iterator for Entries<'_> {
    type Item = Entry;

    fn next(&mut self) -> Option<Entry> {
        for line in self.lines.by_ref() {
            if let Some(entry) = parse_line(line) {
                return Some(entry);
            }
        }
        None
    }
}

fn parse_line(line: &str) -> Option<Entry> {
    let caps = ENTRY_PATTERN.captures(line)?;
    let name = clean_field(caps.get(1).map_or("", |m| m.as_str()));
    let web_url = caps.get(2).map_or("", |m| m.as_str()).trim_end();

    if name.is_empty() {
        tracing::warn!(line = %line, "Skipping list item with empty name");
        return None;
    }

    if let Err(e) = validate_site_url(web_url) {
        tracing::warn!(url = %web_url, error = %e, "Skipping list item with invalid URL");
        return None;
    }

    Some(Entry {
        name,
        web_url: web_url.to_owned(),
    })
}

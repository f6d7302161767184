//! Feed-side adapters: reading the blog list, carrying feed URLs over from
//! the previous run, and asking discovery services for the rest.
//!
//! # Architecture
//!
//! - [`extract`] - pulls `* <name> <url>` entries out of the source document
//! - [`opml`] - reads the previous OPML output as a cache, writes the new one
//! - [`lookup`] - the Inoreader and Feedly feed-discovery clients
//! - [`resolver`] - cache first, then each lookup service in order
//!
//! # Example
//!
//! ```ignore
//! use blogroll::feed::{entries, read_cache, LookupEndpoint, LookupService, Resolver};
//!
//! let cache = read_cache(Path::new("engineering_blogs.opml")).await;
//! let resolver = Resolver::new(
//!     client,
//!     vec![
//!         LookupEndpoint::public(LookupService::Inoreader),
//!         LookupEndpoint::public(LookupService::Feedly),
//!     ],
//!     LookupSettings::default(),
//!     cache,
//! );
//! for entry in entries(&readme) {
//!     let feed = resolver.resolve(&entry.web_url).await.into_rss_url();
//! }
//! ```

mod extract;
mod lookup;
mod opml;
mod resolver;

pub use extract::{entries, Entries, Entry};
pub use lookup::{lookup_feed, LookupEndpoint, LookupError, LookupService, LookupSettings};
pub use opml::{export_opml, read_cache, CacheMap, OpmlError, OpmlFeed};
pub use resolver::{Resolution, Resolver};

//! Builds an OPML subscription list and a JSON catalog from a curated list of
//! engineering blogs.
//!
//! The source document lists blogs as `* <name> <url>` lines. Each website
//! URL is mapped to its RSS/Atom feed URL, first from the previous run's
//! OPML output and otherwise through feed-discovery services. See
//! [`pipeline::run`] for the full batch.

pub mod catalog;
pub mod config;
pub mod feed;
pub mod pipeline;
pub mod util;

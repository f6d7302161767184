//! Utility functions shared by the extractor, resolver and serializers.
//!
//! - **URL validation**: website and service URLs must be absolute http(s)
//! - **Text processing**: the catalog collation key and control-char stripping
//! - **Files**: atomic writes for the two output files
//!
//! # Examples
//!
//! ```
//! use blogroll::util::{capitalize, validate_site_url};
//!
//! assert!(validate_site_url("https://example.com").is_ok());
//! assert_eq!(capitalize("mIT"), "Mit");
//! ```

mod fs;
mod text;
mod url_validator;

pub use fs::atomic_write;
pub use text::{capitalize, clean_field, strip_control_chars};
pub use url_validator::{validate_site_url, UrlValidationError};

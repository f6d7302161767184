use thiserror::Error;
use url::Url;

/// Errors that can occur while validating a website or service URL.
#[derive(Error, Debug)]
pub enum UrlValidationError {
    /// The URL string could not be parsed.
    #[error("Invalid URL: {0}")]
    InvalidUrl(#[from] url::ParseError),
    /// The URL uses a scheme other than http or https.
    #[error("Unsupported scheme: {0} (only http/https allowed)")]
    UnsupportedScheme(String),
    /// The URL parsed but names no host (e.g. `http:///path`).
    #[error("URL has no host")]
    MissingHost,
}

/// Validates that a string is an absolute http(s) URL with a host.
///
/// Used for website URLs pulled out of the source document and for the
/// configured lookup-service base URLs. The original string is what gets
/// stored and compared downstream; the parsed [`Url`] is returned only so
/// callers can inspect it.
///
/// # Examples
///
/// ```
/// use blogroll::util::validate_site_url;
///
/// let url = validate_site_url("https://netflixtechblog.com").unwrap();
/// assert_eq!(url.host_str(), Some("netflixtechblog.com"));
///
/// assert!(validate_site_url("ftp://example.com").is_err());
/// assert!(validate_site_url("not a url").is_err());
/// ```
pub fn validate_site_url(url_str: &str) -> Result<Url, UrlValidationError> {
    let url = Url::parse(url_str)?;

    match url.scheme() {
        "http" | "https" => {}
        scheme => return Err(UrlValidationError::UnsupportedScheme(scheme.to_owned())),
    }

    match url.host_str() {
        Some(host) if !host.is_empty() => Ok(url),
        _ => Err(UrlValidationError::MissingHost),
    }
}

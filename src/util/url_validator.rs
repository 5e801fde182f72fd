use std::net::IpAddr;
use thiserror::Error;
use url::Url;

/// Errors that can occur while validating the API base URL.
#[derive(Error, Debug)]
pub enum UrlValidationError {
    /// The URL string could not be parsed.
    #[error("Invalid URL: {0}")]
    InvalidUrl(#[from] url::ParseError),
    /// The URL uses a scheme other than http or https.
    #[error("Unsupported scheme: {0} (only https allowed)")]
    UnsupportedScheme(String),
    /// Plain http is only accepted for loopback hosts.
    #[error("Refusing to send credentials over plain http to {0}")]
    Insecure(String),
    /// Base URLs cannot carry a query or fragment.
    #[error("Base URL must not contain a query or fragment")]
    UnexpectedComponents,
}

/// SEC-003: Validate the base URL that credentials are sent to.
///
/// Requires `https`, except for loopback hosts (`localhost`, `127.0.0.1`,
/// `::1`) where `http` is accepted for local proxies and test servers.
/// The returned URL always ends in `/` so relative joins keep its path.
///
/// # Examples
///
/// ```
/// use feedsync::util::validate_api_base_url;
///
/// let url = validate_api_base_url("https://cloud.example.com/api").unwrap();
/// assert_eq!(url.as_str(), "https://cloud.example.com/api/");
///
/// assert!(validate_api_base_url("http://cloud.example.com").is_err());
/// assert!(validate_api_base_url("http://127.0.0.1:8080").is_ok());
/// ```
pub fn validate_api_base_url(url_str: &str) -> Result<Url, UrlValidationError> {
    let mut url = Url::parse(url_str)?;

    if url.query().is_some() || url.fragment().is_some() {
        return Err(UrlValidationError::UnexpectedComponents);
    }

    match url.scheme() {
        "https" => {}
        "http" => {
            let host = url.host_str().unwrap_or_default().to_string();
            if !is_loopback_host(&host) {
                return Err(UrlValidationError::Insecure(host));
            }
        }
        scheme => return Err(UrlValidationError::UnsupportedScheme(scheme.to_owned())),
    }

    if !url.path().ends_with('/') {
        let path = format!("{}/", url.path());
        url.set_path(&path);
    }

    Ok(url)
}

fn is_loopback_host(host: &str) -> bool {
    if host == "localhost" {
        return true;
    }
    let host = host
        .strip_prefix('[')
        .and_then(|h| h.strip_suffix(']'))
        .unwrap_or(host);
    host.parse::<IpAddr>().is_ok_and(|ip| ip.is_loopback())
}

use url::Url;

/// Extracts the lowercase host from a URL
///
/// # Examples
///
/// ```
/// use url::Url;
/// use pagewalk::url::extract_domain;
///
/// let url = Url::parse("https://Books.Example.com/catalogue/").unwrap();
/// assert_eq!(extract_domain(&url), Some("books.example.com".to_string()));
/// ```
pub fn extract_domain(url: &Url) -> Option<String> {
    url.host_str().map(|h| h.to_lowercase())
}

/// Returns the key used for per-host limits and robots.txt caching
///
/// Unlike [`extract_domain`] this keeps an explicit port, so two servers on
/// the same machine are treated as different hosts.
///
/// # Arguments
///
/// * `url` - The URL whose host is keyed
///
/// # Returns
///
/// * `Some(String)` - `host` or `host:port`
/// * `None` - If the URL has no host
pub fn host_key(url: &Url) -> Option<String> {
    let host = extract_domain(url)?;
    Some(match url.port() {
        Some(port) => format!("{}:{}", host, port),
        None => host,
    })
}

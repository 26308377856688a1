//! URL handling module for Pagewalk
//!
//! This module provides URL normalization for deduplication keys, host
//! extraction for per-host limits, and resolution of links found in pages.

mod domain;
mod normalize;

use url::Url;

// Re-export main functions
pub use domain::{extract_domain, host_key};
pub use normalize::{dedup_key, normalize_url};

/// Resolves a link href against the page it was found on
///
/// Returns None if the link should be excluded:
/// - empty or fragment-only hrefs
/// - `javascript:`, `mailto:`, `tel:` and `data:` links
/// - hrefs that fail to resolve
/// - anything that is not http(s) after resolution
///
/// # Arguments
///
/// * `href` - Raw `href` attribute value
/// * `base_url` - URL of the page containing the link
pub fn resolve_link(href: &str, base_url: &Url) -> Option<Url> {
    let href = href.trim();

    if href.is_empty() || href.starts_with('#') {
        return None;
    }

    let lowered = href.to_ascii_lowercase();
    if ["javascript:", "mailto:", "tel:", "data:"]
        .iter()
        .any(|scheme| lowered.starts_with(scheme))
    {
        return None;
    }

    let absolute = base_url.join(href).ok()?;
    match absolute.scheme() {
        "http" | "https" => Some(absolute),
        _ => None,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn base_url() -> Url {
        Url::parse("https://quotes.example.com/page/1/").unwrap()
    }

    #[test]
    fn test_resolve_relative_link() {
        let url = resolve_link("/page/2/", &base_url()).unwrap();
        assert_eq!(url.as_str(), "https://quotes.example.com/page/2/");
    }

    #[test]
    fn test_resolve_relative_path_link() {
        let base = Url::parse("https://books.example.com/catalogue/page-1.html").unwrap();
        let url = resolve_link("page-2.html", &base).unwrap();
        assert_eq!(url.as_str(), "https://books.example.com/catalogue/page-2.html");
    }

    #[test]
    fn test_resolve_absolute_link() {
        let url = resolve_link("https://other.example.com/x", &base_url()).unwrap();
        assert_eq!(url.as_str(), "https://other.example.com/x");
    }

    #[test]
    fn test_skip_special_schemes() {
        assert!(resolve_link("javascript:void(0)", &base_url()).is_none());
        assert!(resolve_link("JavaScript:void(0)", &base_url()).is_none());
        assert!(resolve_link("mailto:test@example.com", &base_url()).is_none());
        assert!(resolve_link("tel:+1234567890", &base_url()).is_none());
        assert!(resolve_link("data:text/html,<h1>x</h1>", &base_url()).is_none());
        assert!(resolve_link("ftp://example.com/file", &base_url()).is_none());
    }

    #[test]
    fn test_skip_empty_and_fragment() {
        assert!(resolve_link("   ", &base_url()).is_none());
        assert!(resolve_link("#top", &base_url()).is_none());
    }
}

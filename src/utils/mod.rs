//! Utility functions and helpers.

pub mod http;
pub mod log;

use url::Url;

/// Resolve a potentially relative URL against a base URL.
pub fn resolve_url(base: &Url, href: &str) -> String {
    base.join(href)
        .map(|u| u.to_string())
        .unwrap_or_else(|_| href.to_string())
}

/// Resolve a URL string against a base URL string.
pub fn resolve(base_url: &str, href: &str) -> Option<String> {
    Url::parse(base_url)
        .ok()
        .map(|base| resolve_url(&base, href))
}

/// Collapse runs of whitespace into single spaces and trim the ends.
pub fn squash_whitespace(text: &str) -> String {
    text.split_whitespace().collect::<Vec<_>>().join(" ")
}

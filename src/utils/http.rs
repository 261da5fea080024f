// src/utils/http.rs

//! HTTP client utilities.

use std::time::Duration;

use reqwest::redirect;

use crate::error::Result;
use crate::models::CrawlerConfig;

/// Create a configured asynchronous HTTP client.
///
/// Redirects are not followed automatically: a redirect away from the detail
/// pages is how the site reports a removed listing, so callers inspect them.
pub fn create_async_client(config: &CrawlerConfig) -> Result<reqwest::Client> {
    let client = reqwest::Client::builder()
        .user_agent(&config.user_agent)
        .timeout(Duration::from_secs(config.timeout_secs))
        .redirect(redirect::Policy::none())
        .build()?;
    Ok(client)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_client_builds_from_defaults() {
        assert!(create_async_client(&CrawlerConfig::default()).is_ok());
    }
}

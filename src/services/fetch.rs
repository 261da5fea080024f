// src/services/fetch.rs

//! HTTP fetch boundary.
//!
//! The crawler never lets the HTTP client follow redirects on its own: a
//! redirect away from the detail pages is how the site reports a removed
//! listing, so [`fetch_detail`] walks redirect chains itself.

use async_trait::async_trait;
use reqwest::header::LOCATION;

use crate::error::{AppError, Result};
use crate::models::{CrawlerConfig, SiteConfig};
use crate::utils::{http, resolve};

/// Raw response as seen by the crawler.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FetchResponse {
    pub status: u16,
    /// URL the response was served from
    pub url: String,
    /// Absolute redirect target, for 3xx responses
    pub location: Option<String>,
    pub body: String,
}

impl FetchResponse {
    pub fn is_redirect(&self) -> bool {
        (300..400).contains(&self.status)
    }

    pub fn is_success(&self) -> bool {
        (200..300).contains(&self.status)
    }
}

/// Trait for page fetchers.
#[async_trait]
pub trait Fetcher: Send + Sync {
    /// Fetch a single URL without following redirects.
    async fn fetch(&self, url: &str) -> Result<FetchResponse>;
}

/// `reqwest`-backed fetcher.
pub struct HttpFetcher {
    client: reqwest::Client,
}

impl HttpFetcher {
    pub fn new(config: &CrawlerConfig) -> Result<Self> {
        Ok(Self {
            client: http::create_async_client(config)?,
        })
    }
}

#[async_trait]
impl Fetcher for HttpFetcher {
    async fn fetch(&self, url: &str) -> Result<FetchResponse> {
        let response = self.client.get(url).send().await?;
        let status = response.status();
        let served_from = response.url().to_string();

        let location = response
            .headers()
            .get(LOCATION)
            .and_then(|value| value.to_str().ok())
            .map(|target| resolve(&served_from, target).unwrap_or_else(|| target.to_string()));

        let body = if status.is_redirection() {
            String::new()
        } else {
            response.text().await?
        };

        log::debug!("GET {} -> {}", url, status.as_u16());

        Ok(FetchResponse {
            status: status.as_u16(),
            url: served_from,
            location,
            body,
        })
    }
}

/// What a detail URL resolved to.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum DetailPage {
    /// A detail page was served
    Live { url: String, body: String },
    /// The site redirected away from the detail pages
    Gone { location: String },
}

/// Fetch a detail page, following redirects that stay on detail pages.
pub async fn fetch_detail(
    fetcher: &dyn Fetcher,
    url: &str,
    site: &SiteConfig,
    max_redirects: usize,
) -> Result<DetailPage> {
    let mut current = url.to_string();

    for _ in 0..=max_redirects {
        let response = fetcher.fetch(&current).await?;

        if response.is_redirect() {
            let location = response.location.ok_or_else(|| {
                AppError::crawl(&current, format!("HTTP {} without Location", response.status))
            })?;
            if !site.is_detail_url(&location) {
                return Ok(DetailPage::Gone { location });
            }
            log::debug!("Following detail redirect {} -> {}", current, location);
            current = location;
            continue;
        }

        if !response.is_success() {
            return Err(AppError::crawl(
                &current,
                format!("unexpected HTTP status {}", response.status),
            ));
        }

        return Ok(DetailPage::Live {
            url: response.url,
            body: response.body,
        });
    }

    Err(AppError::crawl(
        url,
        format!("more than {max_redirects} redirects"),
    ))
}

/// Fetch an index page; any non-2xx answer is an error.
pub async fn fetch_index(fetcher: &dyn Fetcher, url: &str) -> Result<FetchResponse> {
    let response = fetcher.fetch(url).await?;
    if !response.is_success() {
        return Err(AppError::crawl(
            url,
            format!("unexpected HTTP status {}", response.status),
        ));
    }
    Ok(response)
}

#[cfg(test)]
pub(crate) mod testing {
    use std::collections::HashMap;
    use std::sync::Mutex;

    use super::*;

    /// Serves canned responses and records every requested URL.
    #[derive(Default)]
    pub struct StaticFetcher {
        pages: HashMap<String, FetchResponse>,
        requested: Mutex<Vec<String>>,
    }

    impl StaticFetcher {
        pub fn new() -> Self {
            Self::default()
        }

        pub fn page(mut self, url: &str, body: impl Into<String>) -> Self {
            self.pages.insert(
                url.to_string(),
                FetchResponse {
                    status: 200,
                    url: url.to_string(),
                    location: None,
                    body: body.into(),
                },
            );
            self
        }

        pub fn redirect(mut self, url: &str, location: &str) -> Self {
            self.pages.insert(
                url.to_string(),
                FetchResponse {
                    status: 301,
                    url: url.to_string(),
                    location: Some(location.to_string()),
                    body: String::new(),
                },
            );
            self
        }

        pub fn requested(&self) -> Vec<String> {
            self.requested.lock().unwrap().clone()
        }

        pub fn was_requested(&self, url: &str) -> bool {
            self.requested.lock().unwrap().iter().any(|u| u == url)
        }
    }

    #[async_trait]
    impl Fetcher for StaticFetcher {
        async fn fetch(&self, url: &str) -> Result<FetchResponse> {
            self.requested.lock().unwrap().push(url.to_string());
            self.pages
                .get(url)
                .cloned()
                .ok_or_else(|| AppError::crawl(url, "connection refused"))
        }
    }
}

#[cfg(test)]
mod tests {
    use super::testing::StaticFetcher;
    use super::*;

    const DETAIL: &str = "https://example.test/iad/immobilien/d/mietwohnungen/graz/flat-1";

    #[tokio::test]
    async fn test_live_detail_page() {
        let fetcher = StaticFetcher::new().page(DETAIL, "<html></html>");
        let page = fetch_detail(&fetcher, DETAIL, &SiteConfig::default(), 3)
            .await
            .unwrap();
        assert_eq!(
            page,
            DetailPage::Live {
                url: DETAIL.to_string(),
                body: "<html></html>".to_string()
            }
        );
    }

    #[tokio::test]
    async fn test_redirect_to_index_means_gone() {
        let index = "https://example.test/iad/immobilien/mietwohnungen/graz";
        let fetcher = StaticFetcher::new().redirect(DETAIL, index);
        let page = fetch_detail(&fetcher, DETAIL, &SiteConfig::default(), 3)
            .await
            .unwrap();
        assert_eq!(
            page,
            DetailPage::Gone {
                location: index.to_string()
            }
        );
    }

    #[tokio::test]
    async fn test_redirect_between_detail_pages_is_followed() {
        let moved = "https://example.test/iad/immobilien/d/mietwohnungen/graz/flat-1-new";
        let fetcher = StaticFetcher::new()
            .redirect(DETAIL, moved)
            .page(moved, "moved");
        let page = fetch_detail(&fetcher, DETAIL, &SiteConfig::default(), 3)
            .await
            .unwrap();
        assert!(matches!(page, DetailPage::Live { url, .. } if url == moved));
    }

    #[tokio::test]
    async fn test_redirect_loop_is_bounded() {
        let other = "https://example.test/iad/immobilien/d/mietwohnungen/graz/flat-2";
        let fetcher = StaticFetcher::new()
            .redirect(DETAIL, other)
            .redirect(other, DETAIL);
        let result = fetch_detail(&fetcher, DETAIL, &SiteConfig::default(), 2).await;
        assert!(result.is_err());
        assert_eq!(fetcher.requested().len(), 3);
    }

    #[tokio::test]
    async fn test_fetch_failure_is_an_error() {
        let fetcher = StaticFetcher::new();
        assert!(
            fetch_detail(&fetcher, DETAIL, &SiteConfig::default(), 1)
                .await
                .is_err()
        );
    }
}

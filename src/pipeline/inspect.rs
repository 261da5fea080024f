// src/pipeline/inspect.rs

//! Fetch and extract a single detail page without touching the store.

use chrono::Utc;
use regex::Regex;

use crate::error::{AppError, Result};
use crate::models::{Config, DetailRequest, ExpirySignal, Observation};
use crate::services::{DetailExtractor, DetailPage, Fetcher, fetch_detail};

/// Build a detail request for a bare URL.
///
/// The category is the first one whose detail path the URL contains; the
/// item id is the trailing number of the URL, if any.
pub fn request_for_url(config: &Config, url: &str) -> Result<DetailRequest> {
    let site = &config.site;
    let category = site
        .categories
        .iter()
        .find(|c| url.contains(&site.detail_path(c)))
        .ok_or_else(|| AppError::validation(format!("{url} is not a detail page of any category")))?;

    let item_id = Regex::new(r"\d{6,}")
        .map_err(|e| AppError::config(e.to_string()))?
        .find_iter(url)
        .last()
        .map(|m| m.as_str().to_string())
        .unwrap_or_default();

    Ok(DetailRequest {
        item_id,
        url: url.to_string(),
        category: category.clone(),
        indexed_at: Utc::now(),
        known_price: None,
    })
}

/// Fetch `url` and return what the crawler would observe there.
pub async fn inspect_listing(
    config: &Config,
    fetcher: &dyn Fetcher,
    url: &str,
) -> Result<Observation> {
    let request = request_for_url(config, url)?;
    let extractor = DetailExtractor::from_config(config)?;

    match fetch_detail(fetcher, url, &config.site, config.crawler.max_redirects).await? {
        DetailPage::Live { url, body } => {
            let mut listing = extractor.extract(&body, &request)?;
            listing.url = url;
            Ok(Observation::Listing(Box::new(listing)))
        }
        DetailPage::Gone { .. } => Ok(Observation::Expired(ExpirySignal {
            item_id: request.item_id,
            row_id: None,
            url: request.url,
            expiry_date: Utc::now().date_naive(),
        })),
    }
}

// src/pipeline/walk.rs

//! Index walker: paginates one category and queues detail fetches.
//!
//! Pages of a category are visited one after another, newest listings
//! first. The walk ends when the last entry of a page predates the
//! watermark, when there is no next page, or on a pagination loop.

use std::collections::HashSet;
use std::time::Duration;

use chrono::{DateTime, Utc};
use futures::stream::{self, StreamExt};

use crate::error::Result;
use crate::models::{
    Category, CategoryReport, CategoryStats, Config, DetailRequest, ExpirySignal, IndexPage,
    IndexRow, InterestingListing, KnownItems, Observation, ObservedListing,
};
use crate::pipeline::commit::CommitSender;
use crate::services::{
    DetailExtractor, DetailPage, Fetcher, fetch_detail, fetch_index, parse_index_page,
};

/// Detail fetches selected from one index page.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct PagePlan {
    pub requests: Vec<DetailRequest>,
    /// The page's last entry predates the watermark
    pub stopped: bool,
}

/// Decide which entries of `page` need a detail fetch.
pub fn plan_page(
    page: &IndexPage,
    category: &Category,
    watermark: DateTime<Utc>,
    known: &KnownItems,
    stats: &mut CategoryStats,
) -> PagePlan {
    let mut plan = PagePlan::default();
    // Foreign and incomplete rows carry no usable date.
    let last = page
        .rows
        .iter()
        .rposition(|row| matches!(row, IndexRow::Entry(_)));

    for (i, row) in page.rows.iter().enumerate() {
        stats.seen += 1;

        let entry = match row {
            IndexRow::Entry(entry) => entry,
            IndexRow::Foreign { .. } => continue,
            IndexRow::Incomplete { item_id } => {
                log::error!("Failed to extract summary for item {item_id}");
                continue;
            }
        };

        if entry.published_at < watermark {
            if Some(i) == last {
                // Pages are sorted newest first, later pages are older still.
                log::info!("Reached last known item for '{}'", category.label());
                plan.stopped = true;
                break;
            }
            continue;
        }

        let known_price = known.price_of(&entry.item_id);
        match known_price {
            Some(price) if price == entry.price => continue,
            Some(price) => {
                log::info!(
                    "price for item {} ({} -> {}) changed!",
                    entry.item_id,
                    price,
                    entry.price
                );
                stats.price_changed += 1;
            }
            None => {
                log::info!("item '{}' is unknown", entry.item_id);
                stats.new += 1;
            }
        }

        stats.crawled += 1;
        log::debug!("queueing {}", entry.url);
        plan.requests.push(DetailRequest {
            item_id: entry.item_id.clone(),
            url: entry.url.clone(),
            category: category.clone(),
            indexed_at: entry.published_at,
            known_price,
        });
    }

    plan
}

/// Known and observed price of a re-fetched listing whose price moved.
///
/// An index price can differ from the detail price (rounding, reserved
/// listings), so only the detail page confirms a change.
pub fn price_change(request: &DetailRequest, listing: &ObservedListing) -> Option<(i64, i64)> {
    request
        .known_price
        .filter(|&known| known != listing.current_price)
        .map(|known| (known, listing.current_price))
}

/// Walks category indexes and feeds the committer.
pub struct IndexWalker<'a> {
    config: &'a Config,
    fetcher: &'a dyn Fetcher,
    extractor: &'a DetailExtractor,
    watermark: DateTime<Utc>,
    known: &'a KnownItems,
    commits: CommitSender,
}

impl<'a> IndexWalker<'a> {
    pub fn new(
        config: &'a Config,
        fetcher: &'a dyn Fetcher,
        extractor: &'a DetailExtractor,
        watermark: DateTime<Utc>,
        known: &'a KnownItems,
        commits: CommitSender,
    ) -> Self {
        Self {
            config,
            fetcher,
            extractor,
            watermark,
            known,
            commits,
        }
    }

    /// Walk one category to its end.
    ///
    /// Page and item failures are logged and counted; only a stopped
    /// committer is returned as an error.
    pub async fn walk(&self, category: &Category) -> Result<CategoryReport> {
        let site = &self.config.site;
        let mut report = CategoryReport::new(category);
        let mut visited = HashSet::new();
        let mut next = Some(site.index_url(category));

        while let Some(url) = next.take() {
            if !visited.insert(url.clone()) {
                log::warn!("Pagination loop for '{}' at {}", report.label, url);
                break;
            }
            if report.stats.pages >= site.max_pages {
                log::warn!(
                    "Stopping '{}' after {} pages",
                    report.label,
                    report.stats.pages
                );
                break;
            }
            report.stats.pages += 1;

            let Some(page) = self.load_page(&url, category).await else {
                break;
            };

            let plan = plan_page(&page, category, self.watermark, self.known, &mut report.stats);
            self.fetch_details(plan.requests, &mut report).await?;

            if plan.stopped {
                report.stats.stopped = true;
                break;
            }
            next = page.next_page;
        }

        Ok(report)
    }

    async fn load_page(&self, url: &str, category: &Category) -> Option<IndexPage> {
        let response = match fetch_index(self.fetcher, url).await {
            Ok(response) => response,
            Err(e) => {
                log::error!("Failed to fetch index page {url}: {e}");
                return None;
            }
        };

        match parse_index_page(
            &response.body,
            url,
            category,
            &self.config.site,
            self.extractor.selectors(),
        ) {
            Ok(Some(page)) => Some(page),
            Ok(None) => {
                log::error!("Did not find structured data block on {url}");
                None
            }
            Err(e) => {
                log::error!("{e}");
                None
            }
        }
    }

    async fn fetch_details(
        &self,
        requests: Vec<DetailRequest>,
        report: &mut CategoryReport,
    ) -> Result<()> {
        let delay = Duration::from_millis(self.config.crawler.request_delay_ms);
        let concurrency = self.config.crawler.max_concurrent.max(1);

        let mut details = stream::iter(requests)
            .map(|request| async move {
                let result = self.fetch_one(&request).await;
                (request, result)
            })
            .buffer_unordered(concurrency);

        while let Some((request, result)) = details.next().await {
            match result {
                Ok(observation) => {
                    if let Observation::Listing(listing) = &observation {
                        if self.config.interesting.matches(listing) {
                            report.interesting.push(InterestingListing::from(listing.as_ref()));
                        }
                    }
                    self.commits.send(observation).await?;
                }
                Err(e) => {
                    // Holds the watermark so the next run walks back to this entry.
                    report.record_failure(request.indexed_at);
                    log::warn!("Failed to fetch listing {} ({}): {}", request.item_id, request.url, e);
                }
            }

            if delay.as_millis() > 0 {
                tokio::time::sleep(delay).await;
            }
        }

        Ok(())
    }

    async fn fetch_one(&self, request: &DetailRequest) -> Result<Observation> {
        let page = fetch_detail(
            self.fetcher,
            &request.url,
            &self.config.site,
            self.config.crawler.max_redirects,
        )
        .await?;

        match page {
            DetailPage::Live { url, body } => {
                let mut listing = self.extractor.extract(&body, request)?;
                listing.url = url;
                if let Some((known, observed)) = price_change(request, &listing) {
                    log::info!(
                        "item {} changed price on its detail page ({} -> {})",
                        request.item_id,
                        known,
                        observed
                    );
                }
                Ok(Observation::Listing(Box::new(listing)))
            }
            DetailPage::Gone { location } => {
                log::debug!("{} redirected to {}", request.url, location);
                Ok(Observation::Expired(ExpirySignal {
                    item_id: request.item_id.clone(),
                    row_id: None,
                    url: request.url.clone(),
                    expiry_date: Utc::now().date_naive(),
                }))
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::listing::fixtures::observed;
    use crate::models::{Deal, IndexEntry, PropertyKind};
    use chrono::TimeZone;

    fn category() -> Category {
        Category::new("mietwohnungen", Deal::Rent, PropertyKind::Flat)
    }

    fn entry(item_id: &str, day: u32, price: i64) -> IndexRow {
        IndexRow::Entry(IndexEntry {
            item_id: item_id.to_string(),
            url: format!("https://example.test/iad/immobilien/d/mietwohnungen/graz/{item_id}"),
            published_at: Utc.with_ymd_and_hms(2026, 1, day, 12, 0, 0).unwrap(),
            price,
        })
    }

    fn watermark() -> DateTime<Utc> {
        Utc.with_ymd_and_hms(2026, 1, 10, 0, 0, 0).unwrap()
    }

    fn page(rows: Vec<IndexRow>) -> IndexPage {
        IndexPage {
            rows,
            next_page: Some("https://example.test/next".to_string()),
        }
    }

    fn ids(plan: &PagePlan) -> Vec<&str> {
        plan.requests.iter().map(|r| r.item_id.as_str()).collect()
    }

    #[test]
    fn test_new_and_changed_items_are_queued() {
        let known: KnownItems = [("2".to_string(), 900), ("3".to_string(), 1000)]
            .into_iter()
            .collect();
        let mut stats = CategoryStats::default();

        let plan = plan_page(
            &page(vec![entry("1", 15, 800), entry("2", 14, 900), entry("3", 13, 950)]),
            &category(),
            watermark(),
            &known,
            &mut stats,
        );

        assert_eq!(ids(&plan), vec!["1", "3"]);
        assert_eq!(plan.requests[1].known_price, Some(1000));
        assert!(!plan.stopped);
        assert_eq!(
            stats,
            CategoryStats {
                seen: 3,
                crawled: 2,
                new: 1,
                price_changed: 1,
                ..CategoryStats::default()
            }
        );
    }

    #[test]
    fn test_old_last_entry_stops_the_walk() {
        let mut stats = CategoryStats::default();
        let plan = plan_page(
            &page(vec![entry("1", 15, 800), entry("2", 5, 900)]),
            &category(),
            watermark(),
            &KnownItems::default(),
            &mut stats,
        );

        assert!(plan.stopped);
        assert_eq!(ids(&plan), vec!["1"]);
        assert_eq!(stats.seen, 2);
        assert_eq!(stats.crawled, 1);
    }

    #[test]
    fn test_old_entry_mid_page_is_skipped() {
        let mut stats = CategoryStats::default();
        let plan = plan_page(
            &page(vec![entry("1", 5, 800), entry("2", 15, 900)]),
            &category(),
            watermark(),
            &KnownItems::default(),
            &mut stats,
        );

        assert!(!plan.stopped);
        assert_eq!(ids(&plan), vec!["2"]);
        assert_eq!(stats.seen, 2);
    }

    #[test]
    fn test_foreign_and_incomplete_rows_are_counted_not_queued() {
        let mut stats = CategoryStats::default();
        let plan = plan_page(
            &page(vec![
                IndexRow::Foreign { item_id: "9".into() },
                IndexRow::Incomplete { item_id: "8".into() },
                entry("1", 15, 800),
            ]),
            &category(),
            watermark(),
            &KnownItems::default(),
            &mut stats,
        );

        assert_eq!(ids(&plan), vec!["1"]);
        assert_eq!(stats.seen, 3);
        assert_eq!(stats.crawled, 1);
    }

    #[test]
    fn test_trailing_foreign_row_does_not_hide_stop() {
        let mut stats = CategoryStats::default();
        let plan = plan_page(
            &page(vec![
                entry("1", 15, 800),
                entry("2", 5, 900),
                IndexRow::Foreign { item_id: "9".into() },
                IndexRow::Incomplete { item_id: "8".into() },
            ]),
            &category(),
            watermark(),
            &KnownItems::default(),
            &mut stats,
        );

        assert!(plan.stopped);
        assert_eq!(ids(&plan), vec!["1"]);
    }

    #[test]
    fn test_price_change_needs_known_price() {
        let mut listing = observed("3", 950, "2026-01-13 12:00");
        let mut request = DetailRequest {
            item_id: "3".into(),
            url: listing.url.clone(),
            category: category(),
            indexed_at: watermark(),
            known_price: None,
        };
        assert_eq!(price_change(&request, &listing), None);

        request.known_price = Some(1000);
        assert_eq!(price_change(&request, &listing), Some((1000, 950)));

        listing.current_price = 1000;
        assert_eq!(price_change(&request, &listing), None);
    }

    #[test]
    fn test_empty_page() {
        let mut stats = CategoryStats::default();
        let plan = plan_page(
            &page(Vec::new()),
            &category(),
            watermark(),
            &KnownItems::default(),
            &mut stats,
        );
        assert!(plan.requests.is_empty());
        assert!(!plan.stopped);
        assert_eq!(stats, CategoryStats::default());
    }
}

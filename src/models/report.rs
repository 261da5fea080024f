// src/models/report.rs

//! Per-run statistics and the end-of-run report.

use chrono::{DateTime, Utc};
use serde::Serialize;

use crate::models::{Category, Deal, ObservedListing};

/// Counters for one category walk.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct CategoryStats {
    /// Index entries looked at
    pub seen: usize,
    /// Detail pages queued
    pub crawled: usize,
    /// Queued because the item was unknown
    pub new: usize,
    /// Queued because the indexed price differs from the known one
    pub price_changed: usize,
    /// Walk ended on the watermark rather than on the last page
    pub stopped: bool,
    /// Pages fetched
    pub pages: usize,
    /// Detail pages that failed to fetch or extract
    pub failed: usize,
}

/// A listing matching the interesting-listing filter.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct InterestingListing {
    pub title: String,
    pub url: String,
    pub price: i64,
    pub size: u32,
    pub room_count: u32,
}

impl From<&ObservedListing> for InterestingListing {
    fn from(listing: &ObservedListing) -> Self {
        Self {
            title: listing.title.clone(),
            url: listing.url.clone(),
            price: listing.current_price,
            size: listing.size,
            room_count: listing.room_count,
        }
    }
}

/// Outcome of one category walk.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct CategoryReport {
    pub label: String,
    pub deal: Deal,
    pub stats: CategoryStats,
    pub interesting: Vec<InterestingListing>,
    /// Oldest index date among detail pages that failed this run
    pub retry_from: Option<DateTime<Utc>>,
}

impl CategoryReport {
    pub fn new(category: &Category) -> Self {
        Self {
            label: category.label(),
            deal: category.deal,
            stats: CategoryStats::default(),
            interesting: Vec::new(),
            retry_from: None,
        }
    }

    /// Count a failed detail page and remember its index date.
    pub fn record_failure(&mut self, indexed_at: DateTime<Utc>) {
        self.stats.failed += 1;
        self.retry_from = Some(self.retry_from.map_or(indexed_at, |at| at.min(indexed_at)));
    }
}

/// What the committer did with the observations it received.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct CommitStats {
    pub inserted: usize,
    pub updated: usize,
    pub unchanged: usize,
    pub expired: usize,
    pub confirmed: usize,
    pub rejected: usize,
    /// Observations for already-expired or missing rows
    pub skipped: usize,
}

impl CommitStats {
    pub fn total(&self) -> usize {
        self.inserted
            + self.updated
            + self.unchanged
            + self.expired
            + self.confirmed
            + self.rejected
            + self.skipped
    }
}

/// Everything a finished run reports.
#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct RunReport {
    pub categories: Vec<CategoryReport>,
    pub commits: CommitStats,
    pub expiry_checked: usize,
}

impl RunReport {
    pub fn interesting(&self) -> impl Iterator<Item = &InterestingListing> {
        self.categories.iter().flat_map(|c| c.interesting.iter())
    }

    /// Earliest index date the next run has to revisit, if any page failed.
    pub fn retry_from(&self) -> Option<DateTime<Utc>> {
        self.categories.iter().filter_map(|c| c.retry_from).min()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::PropertyKind;
    use chrono::TimeZone;

    #[test]
    fn test_retry_from_is_earliest_failure() {
        let day = |d| Utc.with_ymd_and_hms(2026, 1, d, 12, 0, 0).unwrap();
        let mut flats = CategoryReport::new(&Category::new("mietwohnungen", Deal::Rent, PropertyKind::Flat));
        let mut houses = CategoryReport::new(&Category::new("haus-mieten", Deal::Rent, PropertyKind::House));
        flats.record_failure(day(12));
        flats.record_failure(day(10));
        houses.record_failure(day(11));

        assert_eq!(flats.stats.failed, 2);
        assert_eq!(flats.retry_from, Some(day(10)));

        let report = RunReport {
            categories: vec![flats, houses],
            ..RunReport::default()
        };
        assert_eq!(report.retry_from(), Some(day(10)));
        assert_eq!(RunReport::default().retry_from(), None);
    }
}

// src/models/index.rs

//! Index page data: the listing summaries a category page exposes.

use chrono::{DateTime, Utc};

use crate::models::Category;

/// Summary of one listing as shown on an index page.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct IndexEntry {
    pub item_id: String,
    pub url: String,
    /// Publication or last-change date
    pub published_at: DateTime<Utc>,
    pub price: i64,
}

/// One slot of an index page, in page order.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum IndexRow {
    Entry(IndexEntry),
    /// Listing whose detail page belongs to another category
    Foreign { item_id: String },
    /// Summary missing its url, date or price
    Incomplete { item_id: String },
}

/// A parsed index page.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct IndexPage {
    pub rows: Vec<IndexRow>,
    /// Absolute URL of the next page, if any
    pub next_page: Option<String>,
}

/// A detail page queued for fetching by the walker.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DetailRequest {
    pub item_id: String,
    pub url: String,
    pub category: Category,
    /// Date shown on the index page; fallback for the edit date
    pub indexed_at: DateTime<Utc>,
    /// Price from the known-item snapshot, `None` for new listings
    pub known_price: Option<i64>,
}

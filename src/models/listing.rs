// src/models/listing.rs

//! Listing records: what the extractor observes and what the store keeps.

use std::collections::HashMap;

use chrono::{DateTime, NaiveDate, NaiveDateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::models::{Deal, PropertyKind};

/// Price recorded when the extractor could not read one.
pub const PRICE_UNKNOWN: i64 = -1;

/// A listing as extracted from its detail page during this run.
///
/// Every field has a default the extractor falls back to when the page lacks
/// the corresponding element: empty strings, zero counts, `None` for optional
/// attributes and [`PRICE_UNKNOWN`] for the price.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ObservedListing {
    /// Stable identifier assigned by the site
    pub item_id: String,

    /// Detail page URL
    pub url: String,

    pub deal: Deal,

    pub kind: PropertyKind,

    pub title: String,

    pub description: String,

    /// Asking price in whole currency units, or [`PRICE_UNKNOWN`]
    pub current_price: i64,

    /// Living area in m² (0 when unknown)
    pub size: u32,

    /// Number of rooms (0 when unknown)
    pub room_count: u32,

    pub postal_code: String,

    pub district: String,

    pub address: String,

    /// Energy pass entries rendered as `"label": "value"` pairs
    pub energy_info: Option<String>,

    /// Heating demand (HWB) in kWh/m²a
    pub heating_consumption: Option<f64>,

    /// Object information rendered as `"label": "value"` pairs
    pub features_info: Option<String>,

    /// Contract duration in years, "0" when unlimited
    pub contract_duration: Option<String>,

    /// Construction type, e.g. "altbau"
    pub construction_type: Option<String>,

    /// Whether the tenant/buyer pays a commission
    pub has_commission: bool,

    pub seller_is_private: bool,

    /// Last time the listing was edited on the site
    pub edit_date: NaiveDateTime,

    /// First publication, when the page carries structured data
    pub published_at: Option<DateTime<Utc>>,
}

impl ObservedListing {
    /// Whether the price can take part in a price-history merge.
    pub fn has_valid_price(&self) -> bool {
        self.current_price > 0
    }

    /// Price per m², or 0 when size or price are unknown.
    pub fn price_per_m2(&self) -> f64 {
        if self.size > 0 && self.has_valid_price() {
            self.current_price as f64 / self.size as f64
        } else {
            0.0
        }
    }
}

/// The site redirected a detail request away from the detail pages.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ExpirySignal {
    pub item_id: String,

    /// Row in the store, known when the signal comes from an expiry re-check
    pub row_id: Option<i64>,

    pub url: String,

    pub expiry_date: NaiveDate,
}

/// Everything the committer can be asked to reconcile.
#[derive(Debug, Clone, PartialEq)]
pub enum Observation {
    /// A full record extracted from a live detail page
    Listing(Box<ObservedListing>),

    /// The listing has been removed from the site
    Expired(ExpirySignal),

    /// An expiry re-check found the listing still online
    StillListed { row_id: i64, item_id: String },
}

impl Observation {
    pub fn item_id(&self) -> &str {
        match self {
            Observation::Listing(listing) => &listing.item_id,
            Observation::Expired(signal) => &signal.item_id,
            Observation::StillListed { item_id, .. } => item_id,
        }
    }
}

/// A persisted listing with its price history.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ListingRecord {
    /// Surrogate key; ignored on insert
    pub id: i64,

    pub item_id: String,

    pub deal: Deal,

    pub kind: PropertyKind,

    pub current_price: i64,
    pub min_price: i64,
    pub max_price: i64,
    pub previous_price: i64,

    pub min_price_date: NaiveDateTime,
    pub max_price_date: NaiveDateTime,
    pub previous_price_date: NaiveDateTime,
    pub edit_date: NaiveDateTime,

    pub price_per_m2: f64,

    pub size: u32,
    pub room_count: u32,
    pub postal_code: String,
    pub district: String,
    pub address: String,
    pub energy_info: Option<String>,
    pub heating_consumption: Option<f64>,
    pub features_info: Option<String>,
    pub contract_duration: Option<String>,
    pub construction_type: Option<String>,
    pub has_commission: bool,
    pub seller_is_private: bool,
    pub title: String,
    pub description: String,
    pub url: String,

    pub published_at: Option<DateTime<Utc>>,
    pub discovery_date: NaiveDate,
    pub discovery_timestamp: i64,

    /// Set once the listing disappears from the site; never cleared
    pub expiry_date: Option<NaiveDate>,

    /// Last time the listing was seen live or checked for removal
    pub expiry_last_check: DateTime<Utc>,
}

impl ListingRecord {
    pub fn is_expired(&self) -> bool {
        self.expiry_date.is_some()
    }
}

/// Fields written when an observed price differs from the stored one.
#[derive(Debug, Clone, PartialEq)]
pub struct PriceUpdate {
    pub current_price: i64,
    pub previous_price: i64,
    pub previous_price_date: NaiveDateTime,
    pub min_price: i64,
    pub min_price_date: NaiveDateTime,
    pub max_price: i64,
    pub max_price_date: NaiveDateTime,
    pub edit_date: NaiveDateTime,
    pub price_per_m2: f64,
    pub checked_at: DateTime<Utc>,
}

/// A stored listing due for a removal check.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ExpiryCandidate {
    pub row_id: i64,
    pub item_id: String,
    pub url: String,
}

/// Snapshot of `item_id -> current_price` taken at the start of a run.
#[derive(Debug, Clone, Default)]
pub struct KnownItems {
    prices: HashMap<String, i64>,
}

impl KnownItems {
    pub fn price_of(&self, item_id: &str) -> Option<i64> {
        self.prices.get(item_id).copied()
    }

    pub fn len(&self) -> usize {
        self.prices.len()
    }

    pub fn is_empty(&self) -> bool {
        self.prices.is_empty()
    }
}

impl FromIterator<(String, i64)> for KnownItems {
    fn from_iter<I: IntoIterator<Item = (String, i64)>>(iter: I) -> Self {
        Self {
            prices: iter.into_iter().collect(),
        }
    }
}


#[cfg(test)]
mod tests {
    use super::fixtures::observed;
    use super::*;

    #[test]
    fn test_price_per_m2() {
        let listing = observed("1", 1000, "2026-01-01 10:00");
        assert_eq!(listing.price_per_m2(), 20.0);
    }

    #[test]
    fn test_price_per_m2_ignores_sentinel_and_unknown_size() {
        let mut listing = observed("1", PRICE_UNKNOWN, "2026-01-01 10:00");
        assert_eq!(listing.price_per_m2(), 0.0);

        listing.current_price = 900;
        listing.size = 0;
        assert_eq!(listing.price_per_m2(), 0.0);
    }

    #[test]
    fn test_known_items_lookup() {
        let known: KnownItems = [("123456".to_string(), 800)].into_iter().collect();
        assert_eq!(known.price_of("123456"), Some(800));
        assert_eq!(known.price_of("654321"), None);
        assert_eq!(known.len(), 1);
    }
}

//! Storage abstractions for listing persistence.
//!
//! Two tables back the crawler:
//!
//! ```text
//! listings   one row per item_id, with its price history
//! meta       key/value pairs, holds `last_timestamp` (the run watermark)
//! ```
//!
//! A store is owned by exactly one writer at a time. During a crawl that
//! writer is the committer task (see `pipeline::commit`).

pub mod sqlite;

use chrono::{DateTime, NaiveDate, Utc};

use crate::error::Result;
use crate::models::{ExpiryCandidate, KnownItems, ListingRecord, PriceUpdate};

// Re-export for convenience
pub use sqlite::SqliteStore;

/// Row counts shown by the `info` command.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct StoreSummary {
    pub listings: usize,
    pub active: usize,
    pub expired: usize,
}

/// Trait for listing storage backends.
pub trait ListingStore: Send {
    /// Snapshot of every stored `item_id` with its current price.
    fn known_items(&self) -> Result<KnownItems>;

    /// Unexpired listings whose last check is older than `cutoff`.
    fn due_for_expiration(&self, cutoff: DateTime<Utc>) -> Result<Vec<ExpiryCandidate>>;

    fn find_by_item_id(&self, item_id: &str) -> Result<Option<ListingRecord>>;

    fn find_by_id(&self, id: i64) -> Result<Option<ListingRecord>>;

    /// Insert a new listing and return its row id. `record.id` is ignored.
    fn insert(&self, record: &ListingRecord) -> Result<i64>;

    /// Write merged price history to an existing row.
    fn update_by_id(&self, id: i64, update: &PriceUpdate) -> Result<()>;

    /// Set the expiry date (unless already set) and the check timestamp.
    fn mark_expired(&self, id: i64, expiry_date: NaiveDate, checked_at: DateTime<Utc>)
    -> Result<()>;

    /// Record that the listing was confirmed live.
    fn mark_checked(&self, id: i64, checked_at: DateTime<Utc>) -> Result<()>;

    /// Timestamp of the last completed run, epoch if none.
    fn read_watermark(&self) -> Result<DateTime<Utc>>;

    fn write_watermark(&self, at: DateTime<Utc>) -> Result<()>;

    fn summary(&self) -> Result<StoreSummary>;

    /// Run `f` in one transaction: committed if it returns `Ok`, rolled back otherwise.
    fn atomically<T, F>(&self, f: F) -> Result<T>
    where
        F: FnOnce(&Self) -> Result<T>,
        Self: Sized;
}

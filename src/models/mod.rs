// src/models/mod.rs

//! Domain models for the crawler.
//!
//! This module contains all data structures used throughout the application,
//! organized by their primary purpose.

mod category;
mod config;
mod index;
pub(crate) mod listing;
mod report;
mod selectors;

// Re-export all public types
pub use category::{Category, Deal, PropertyKind};
pub use config::{
    Config, CrawlerConfig, ExpiryConfig, ExtractionConfig, InterestingFilter, SiteConfig,
    StorageConfig,
};
pub use index::{DetailRequest, IndexEntry, IndexPage, IndexRow};
pub use listing::{
    ExpiryCandidate, ExpirySignal, KnownItems, ListingRecord, ObservedListing, Observation,
    PRICE_UNKNOWN, PriceUpdate,
};
pub use report::{
    CategoryReport, CategoryStats, CommitStats, InterestingListing, RunReport,
};
pub use selectors::PageSelectors;

//! Application configuration structures.

use std::fs;
use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};

use crate::error::{AppError, Result};
use crate::models::{Category, Deal, ObservedListing, PageSelectors};

/// Root application configuration.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct Config {
    /// HTTP and crawling behavior settings
    #[serde(default)]
    pub crawler: CrawlerConfig,

    /// Where the listing site lives and which indexes to walk
    #[serde(default)]
    pub site: SiteConfig,

    /// CSS selectors for index and detail pages
    #[serde(default)]
    pub selectors: PageSelectors,

    /// Plausibility ranges for extracted values
    #[serde(default)]
    pub extraction: ExtractionConfig,

    #[serde(default)]
    pub storage: StorageConfig,

    #[serde(default)]
    pub expiry: ExpiryConfig,

    /// Filter for listings reported at the end of a run
    #[serde(default)]
    pub interesting: InterestingFilter,
}

impl Config {
    /// Load configuration from a TOML file.
    pub fn load(path: impl AsRef<Path>) -> Result<Self> {
        let content = fs::read_to_string(path)?;
        Ok(toml::from_str(&content)?)
    }

    /// Load configuration or return default if loading fails.
    pub fn load_or_default(path: impl AsRef<Path>) -> Self {
        Self::load(&path).unwrap_or_else(|e| {
            log::warn!(
                "Config load failed from {:?}: {}. Using defaults.",
                path.as_ref(),
                e
            );
            Self::default()
        })
    }

    /// Validate configuration values for basic sanity.
    pub fn validate(&self) -> Result<()> {
        if self.crawler.user_agent.trim().is_empty() {
            return Err(AppError::validation("crawler.user_agent is empty"));
        }
        if self.crawler.timeout_secs == 0 {
            return Err(AppError::validation("crawler.timeout_secs must be > 0"));
        }
        if self.crawler.max_concurrent == 0 {
            return Err(AppError::validation("crawler.max_concurrent must be > 0"));
        }
        if url::Url::parse(&self.site.base_url).is_err() {
            return Err(AppError::validation(format!(
                "site.base_url is not a valid URL: {}",
                self.site.base_url
            )));
        }
        if self.site.categories.is_empty() {
            return Err(AppError::validation("No categories defined"));
        }
        if self.site.max_pages == 0 {
            return Err(AppError::validation("site.max_pages must be > 0"));
        }
        if self.site.detail_path_marker.is_empty() {
            return Err(AppError::validation("site.detail_path_marker is empty"));
        }
        if self.expiry.recheck_after_days == 0 {
            return Err(AppError::validation("expiry.recheck_after_days must be > 0"));
        }
        if self.extraction.min_price >= self.extraction.max_price {
            return Err(AppError::validation(
                "extraction.min_price must be below extraction.max_price",
            ));
        }
        if self.extraction.min_size >= self.extraction.max_size {
            return Err(AppError::validation(
                "extraction.min_size must be below extraction.max_size",
            ));
        }
        Ok(())
    }
}

/// HTTP client and crawling behavior settings.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CrawlerConfig {
    /// User-Agent header for HTTP requests
    #[serde(default = "defaults::user_agent")]
    pub user_agent: String,

    /// Request timeout in seconds
    #[serde(default = "defaults::timeout")]
    pub timeout_secs: u64,

    /// Delay between requests in milliseconds
    #[serde(default = "defaults::request_delay")]
    pub request_delay_ms: u64,

    /// Maximum concurrent requests
    #[serde(default = "defaults::max_concurrent")]
    pub max_concurrent: usize,

    /// Redirect hops followed between detail pages
    #[serde(default = "defaults::max_redirects")]
    pub max_redirects: usize,
}

impl Default for CrawlerConfig {
    fn default() -> Self {
        Self {
            user_agent: defaults::user_agent(),
            timeout_secs: defaults::timeout(),
            request_delay_ms: defaults::request_delay(),
            max_concurrent: defaults::max_concurrent(),
            max_redirects: defaults::max_redirects(),
        }
    }
}

/// Listing site layout.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SiteConfig {
    #[serde(default = "defaults::base_url")]
    pub base_url: String,

    /// Region segment of index and detail paths
    #[serde(default = "defaults::region_path")]
    pub region_path: String,

    #[serde(default = "defaults::rows_per_page")]
    pub rows_per_page: usize,

    /// Upper bound on index pages per category and run
    #[serde(default = "defaults::max_pages")]
    pub max_pages: usize,

    /// Path fragment every detail page URL contains
    #[serde(default = "defaults::detail_path_marker")]
    pub detail_path_marker: String,

    #[serde(default = "defaults::categories")]
    pub categories: Vec<Category>,
}

impl Default for SiteConfig {
    fn default() -> Self {
        Self {
            base_url: defaults::base_url(),
            region_path: defaults::region_path(),
            rows_per_page: defaults::rows_per_page(),
            max_pages: defaults::max_pages(),
            detail_path_marker: defaults::detail_path_marker(),
            categories: defaults::categories(),
        }
    }
}

impl SiteConfig {
    /// First index page of a category.
    pub fn index_url(&self, category: &Category) -> String {
        format!(
            "{}/iad/immobilien/{}/{}/?rows={}",
            self.base_url.trim_end_matches('/'),
            category.slug,
            self.region_path.trim_matches('/'),
            self.rows_per_page
        )
    }

    /// Path fragment shared by every detail page of a category.
    pub fn detail_path(&self, category: &Category) -> String {
        format!(
            "/immobilien{}{}/{}/",
            self.detail_path_marker,
            category.slug,
            self.region_path.trim_matches('/')
        )
    }

    /// Whether a URL points at a detail page.
    pub fn is_detail_url(&self, url: &str) -> bool {
        url.contains(&self.detail_path_marker)
    }
}

/// Plausibility ranges, values outside are logged.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ExtractionConfig {
    #[serde(default = "defaults::min_price")]
    pub min_price: i64,

    #[serde(default = "defaults::max_price")]
    pub max_price: i64,

    /// Sizes outside `min_size..max_size` are discarded
    #[serde(default = "defaults::min_size")]
    pub min_size: u32,

    #[serde(default = "defaults::max_size")]
    pub max_size: u32,
}

impl Default for ExtractionConfig {
    fn default() -> Self {
        Self {
            min_price: defaults::min_price(),
            max_price: defaults::max_price(),
            min_size: defaults::min_size(),
            max_size: defaults::max_size(),
        }
    }
}

/// Persistence settings.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct StorageConfig {
    /// SQLite database file
    #[serde(default = "defaults::database_path")]
    pub database_path: PathBuf,
}

impl Default for StorageConfig {
    fn default() -> Self {
        Self {
            database_path: defaults::database_path(),
        }
    }
}

/// Removal re-check settings.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ExpiryConfig {
    /// Listings not confirmed for this many days are re-checked
    #[serde(default = "defaults::recheck_after_days")]
    pub recheck_after_days: u32,
}

impl Default for ExpiryConfig {
    fn default() -> Self {
        Self {
            recheck_after_days: defaults::recheck_after_days(),
        }
    }
}

/// Listings worth a second look.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct InterestingFilter {
    #[serde(default = "defaults::interesting_deal")]
    pub deal: Deal,

    #[serde(default = "defaults::interesting_min_rooms")]
    pub min_rooms: u32,

    /// Exclusive upper bound on the price
    #[serde(default = "defaults::interesting_max_price")]
    pub max_price: i64,

    #[serde(default = "defaults::require_no_commission")]
    pub require_no_commission: bool,
}

impl Default for InterestingFilter {
    fn default() -> Self {
        Self {
            deal: defaults::interesting_deal(),
            min_rooms: defaults::interesting_min_rooms(),
            max_price: defaults::interesting_max_price(),
            require_no_commission: defaults::require_no_commission(),
        }
    }
}

impl InterestingFilter {
    pub fn matches(&self, listing: &ObservedListing) -> bool {
        listing.deal == self.deal
            && listing.room_count >= self.min_rooms
            && listing.has_valid_price()
            && listing.current_price < self.max_price
            && !(self.require_no_commission && listing.has_commission)
    }
}

mod defaults {
    use std::path::PathBuf;

    use crate::models::{Category, Deal, PropertyKind};

    // Crawler defaults
    pub fn user_agent() -> String {
        "Mozilla/5.0 (compatible; estate-crawler/0.1)".into()
    }
    pub fn timeout() -> u64 {
        30
    }
    pub fn request_delay() -> u64 {
        250
    }
    pub fn max_concurrent() -> usize {
        4
    }
    pub fn max_redirects() -> usize {
        5
    }

    // Site defaults
    pub fn base_url() -> String {
        "https://www.willhaben.at".into()
    }
    pub fn region_path() -> String {
        "steiermark/graz".into()
    }
    pub fn rows_per_page() -> usize {
        90
    }
    pub fn max_pages() -> usize {
        200
    }
    pub fn detail_path_marker() -> String {
        "/d/".into()
    }
    pub fn categories() -> Vec<Category> {
        vec![
            Category::new("mietwohnungen", Deal::Rent, PropertyKind::Flat),
            Category::new("haus-mieten", Deal::Rent, PropertyKind::House),
            Category::new("eigentumswohnung", Deal::Sale, PropertyKind::Flat),
            Category::new("haus-kaufen", Deal::Sale, PropertyKind::House),
        ]
    }

    // Extraction defaults
    pub fn min_price() -> i64 {
        100
    }
    pub fn max_price() -> i64 {
        3_500_000
    }
    pub fn min_size() -> u32 {
        30
    }
    pub fn max_size() -> u32 {
        2000
    }

    // Storage defaults
    pub fn database_path() -> PathBuf {
        PathBuf::from("listings.sqlite")
    }

    // Expiry defaults
    pub fn recheck_after_days() -> u32 {
        31
    }

    // Interesting-listing defaults
    pub fn interesting_deal() -> Deal {
        Deal::Rent
    }
    pub fn interesting_min_rooms() -> u32 {
        4
    }
    pub fn interesting_max_price() -> i64 {
        1700
    }
    pub fn require_no_commission() -> bool {
        true
    }
}

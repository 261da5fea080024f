//! Service layer for the crawler application.
//!
//! This module contains the page-level logic:
//! - Fetching pages and detecting removed listings (`Fetcher`, `fetch_detail`)
//! - Index page parsing (`parse_index_page`)
//! - Detail page extraction (`DetailExtractor`)
//! - Selector compilation (`CompiledSelectors`)

mod detail;
mod fetch;
mod index;
mod selectors;
mod structured;

pub use detail::DetailExtractor;
pub use fetch::{DetailPage, FetchResponse, Fetcher, HttpFetcher, fetch_detail, fetch_index};
pub use index::parse_index_page;
pub use selectors::{CompiledSelectors, parse_selector};

#[cfg(test)]
pub(crate) mod fixtures {
    pub use super::detail::fixtures::detail_html;
    pub use super::fetch::testing::StaticFetcher;
    pub use super::index::fixtures::{Ad, detail_url, index_html};
}

// src/lib.rs

//! Incremental real-estate listing crawler.
//!
//! Walks the paginated listing index of each configured category, fetches
//! the detail pages of new and re-priced listings, and reconciles them into
//! a SQLite price history.

pub mod error;
pub mod models;
pub mod pipeline;
pub mod services;
pub mod storage;
pub mod utils;

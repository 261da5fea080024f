//! Pipeline entry points for crawler operations.
//!
//! - `run_crawler`: one incremental crawl-and-reconcile run
//! - `inspect_listing`: extract a single detail page, writing nothing
//! - `rewind`: move the run watermark back

pub mod bookkeeping;
pub mod commit;
pub mod crawl;
pub mod inspect;
pub mod reconcile;
pub mod walk;

pub use bookkeeping::rewind;
pub use crawl::run_crawler;
pub use inspect::inspect_listing;

//! Crawling side of the site search: page fetching, link rules, the per-site
//! crawl scheduler and the command controller used by the binaries.

pub mod control;
pub mod fetch;
pub mod links;
pub mod scheduler;

pub use control::{ControlError, Controller};
pub use fetch::{Fetched, Fetcher};
pub use scheduler::{crawl_site, reindex_page, CrawlContext, CrawlOutcome};

//! Language-aware site search: lemmatizer, sled-backed inverted index,
//! page indexer, and the ranked query engine.

pub mod config;
pub mod html;
pub mod indexer;
pub mod lemmatizer;
pub mod model;
pub mod search;
pub mod stats;
pub mod store;

pub use config::AppConfig;
pub use indexer::PageIndexer;
pub use lemmatizer::Lemmatizer;
pub use model::{Field, Lemma, LemmaId, NewPage, Page, PageId, Posting, Site, SiteId, SiteStatus};
pub use search::{Hit, ResultMap, SearchSystem};
pub use store::IndexStore;

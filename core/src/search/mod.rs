//! Query side of the index: per-site candidate search, snippets, and the
//! orchestrator that merges sites into one relevance-normalised result set.

pub mod engine;
pub mod response;
pub mod snippet;

pub use engine::{Candidate, QueryEngine, SELECTIVITY_CUTOFF};
pub use response::{SearchItem, SearchResponse};

use crate::lemmatizer::Lemmatizer;
use crate::model::{Site, SiteId};
use crate::store::IndexStore;
use anyhow::Result;
use rayon::prelude::*;
use serde::Serialize;
use std::collections::{BTreeSet, HashMap};
use std::sync::Arc;

#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize)]
pub struct Hit {
    pub site_id: SiteId,
    pub uri: String,
    pub title: String,
    pub snippet: String,
    /// Rank vector, absolute rank and relative rank, space separated.
    pub relevance: String,
}

/// Hit -> relative rank in (0, 1].
pub type ResultMap = HashMap<Hit, f32>;

pub struct SearchSystem {
    store: Arc<IndexStore>,
    lemmatizer: Lemmatizer,
}

impl SearchSystem {
    pub fn new(store: Arc<IndexStore>, lemmatizer: Lemmatizer) -> Self {
        Self { store, lemmatizer }
    }

    /// Search every site, or only the site rooted at `site_url`.
    pub fn find(&self, query: &str, site_url: Option<&str>) -> Result<ResultMap> {
        let sites = match site_url {
            Some(url) => self.find_site(url)?.into_iter().collect(),
            None => self.store.list_sites()?,
        };
        self.find_in(query, &sites)
    }

    /// Search one site by id.
    pub fn search(&self, query: &str, site_id: SiteId) -> Result<ResultMap> {
        let sites: Vec<Site> = self.store.get_site(site_id)?.into_iter().collect();
        self.find_in(query, &sites)
    }

    fn find_in(&self, query: &str, sites: &[Site]) -> Result<ResultMap> {
        let lemmas: BTreeSet<String> = self.lemmatizer.lemmatize(query).into_keys().collect();
        if lemmas.is_empty() || sites.is_empty() {
            return Ok(ResultMap::new());
        }
        let per_site = sites
            .par_iter()
            .map(|site| QueryEngine::new(&self.store, &self.lemmatizer).search_site(site.id, &lemmas))
            .collect::<Result<Vec<_>>>()?;
        let candidates: Vec<Candidate> = per_site.into_iter().flatten().collect();
        tracing::debug!(query, sites = sites.len(), hits = candidates.len(), "search finished");
        Ok(normalize(candidates))
    }

    fn find_site(&self, url: &str) -> Result<Option<Site>> {
        if let Some(site) = self.store.find_site_by_url(url)? {
            return Ok(Some(site));
        }
        self.store.find_site_by_url(&format!("{}/", url.trim_end_matches('/')))
    }
}

/// Divide every absolute rank by the largest one across all candidates.
pub fn normalize(candidates: Vec<Candidate>) -> ResultMap {
    let max = candidates.iter().map(|c| c.absolute).fold(0.0f32, f32::max);
    candidates
        .into_iter()
        .filter(|_| max > 0.0)
        .map(|c| {
            let relative = c.absolute / max;
            let mut parts: Vec<String> = c.ranks.iter().map(|r| r.to_string()).collect();
            parts.push(c.absolute.to_string());
            parts.push(relative.to_string());
            let hit = Hit {
                site_id: c.page.site_id,
                uri: c.page.path,
                title: c.title,
                snippet: c.snippet,
                relevance: parts.join(" "),
            };
            (hit, relative)
        })
        .collect()
}

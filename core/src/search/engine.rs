use super::snippet::build_snippet;
use crate::html::extract_title;
use crate::lemmatizer::Lemmatizer;
use crate::model::{Lemma, Page, PageId, SiteId};
use crate::store::IndexStore;
use anyhow::Result;
use std::collections::{BTreeMap, BTreeSet, HashMap};

/// A lemma whose postings cover more than this share of a site's pages does
/// not narrow the candidate set.
pub const SELECTIVITY_CUTOFF: f64 = 0.4;

/// A page matching the query on one site, before relevance normalisation.
#[derive(Debug, Clone)]
pub struct Candidate {
    pub page: Page,
    /// One rank per non-skipped query lemma, in rarest-first order.
    pub ranks: Vec<f32>,
    pub absolute: f32,
    pub title: String,
    pub snippet: String,
}

/// Per-site search over the index store.
pub struct QueryEngine<'a> {
    store: &'a IndexStore,
    lemmatizer: &'a Lemmatizer,
}

impl<'a> QueryEngine<'a> {
    pub fn new(store: &'a IndexStore, lemmatizer: &'a Lemmatizer) -> Self {
        Self { store, lemmatizer }
    }

    /// Resolve every query lemma on the site, rarest first. `None` when any of
    /// them is missing from the site's vocabulary.
    pub fn resolve(&self, site_id: SiteId, query: &BTreeSet<String>) -> Result<Option<Vec<Lemma>>> {
        let mut lemmas = Vec::with_capacity(query.len());
        for text in query {
            match self.store.get_lemma(site_id, text)? {
                Some(lemma) => lemmas.push(lemma),
                None => return Ok(None),
            }
        }
        lemmas.sort_by_key(|l| l.frequency);
        Ok(Some(lemmas))
    }

    /// Intersect postings of the resolved lemmas. The rarest lemma seeds the
    /// candidates; later lemmas present on too many pages are skipped.
    pub fn candidate_ranks(&self, site_id: SiteId, lemmas: &[Lemma]) -> Result<BTreeMap<PageId, Vec<f32>>> {
        let Some((first, rest)) = lemmas.split_first() else {
            return Ok(BTreeMap::new());
        };
        let ids: Vec<_> = lemmas.iter().map(|l| l.id).collect();
        let mut postings = self.store.postings_for_lemmas(&ids)?;
        let threshold = SELECTIVITY_CUTOFF * self.store.count_pages(site_id)? as f64;

        let mut candidates: BTreeMap<PageId, Vec<f32>> = postings
            .remove(&first.id)
            .unwrap_or_default()
            .into_iter()
            .map(|p| (p.page_id, vec![p.rank]))
            .collect();

        for lemma in rest {
            let list = postings.remove(&lemma.id).unwrap_or_default();
            if list.len() as f64 > threshold {
                tracing::debug!(lemma = %lemma.lemma, pages = list.len(), "lemma too common, skipped");
                continue;
            }
            let by_page: HashMap<PageId, f32> = list.iter().map(|p| (p.page_id, p.rank)).collect();
            candidates = candidates
                .into_iter()
                .filter_map(|(page, mut ranks)| {
                    let rank = by_page.get(&page)?;
                    ranks.push(*rank);
                    Some((page, ranks))
                })
                .collect();
        }
        Ok(candidates)
    }

    /// Candidates for `query` on one site, each with title and snippet.
    /// Pages without a snippet covering every query lemma are dropped.
    pub fn search_site(&self, site_id: SiteId, query: &BTreeSet<String>) -> Result<Vec<Candidate>> {
        let Some(lemmas) = self.resolve(site_id, query)? else {
            return Ok(vec![]);
        };
        let lemma_texts: Vec<String> = lemmas.iter().map(|l| l.lemma.clone()).collect();
        let mut out = Vec::new();
        for (page_id, ranks) in self.candidate_ranks(site_id, &lemmas)? {
            let Some(page) = self.store.get_page(page_id)? else { continue };
            let snippet = build_snippet(self.lemmatizer, &page.content, &lemma_texts);
            if snippet.is_empty() {
                continue;
            }
            out.push(Candidate {
                absolute: ranks.iter().sum(),
                title: extract_title(&page.content),
                snippet,
                ranks,
                page,
            });
        }
        Ok(out)
    }
}

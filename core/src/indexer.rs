use crate::html::{parse_selector, select_text};
use crate::lemmatizer::Lemmatizer;
use crate::model::{Field, NewPage, Page};
use crate::store::IndexStore;
use anyhow::{bail, Result};
use scraper::Html;
use std::collections::BTreeMap;
use std::sync::Arc;

/// Computes field-weighted lemma ranks for a page and commits them.
pub struct PageIndexer {
    store: Arc<IndexStore>,
    lemmatizer: Lemmatizer,
    fields: Vec<Field>,
}

impl PageIndexer {
    pub fn new(store: Arc<IndexStore>, lemmatizer: Lemmatizer, fields: Vec<Field>) -> Result<Self> {
        for field in &fields {
            if !(field.weight > 0.0) {
                bail!("field {:?} must have a positive weight", field.name);
            }
            parse_selector(&field.selector)?;
        }
        Ok(Self { store, lemmatizer, fields })
    }

    pub fn store(&self) -> &Arc<IndexStore> {
        &self.store
    }

    pub fn lemmatizer(&self) -> &Lemmatizer {
        &self.lemmatizer
    }

    /// rank[lemma] = sum over fields of weight * occurrences in that field.
    pub fn compute_ranks(&self, content: &str) -> Result<BTreeMap<String, f32>> {
        let doc = Html::parse_document(content);
        let mut ranks: BTreeMap<String, f32> = BTreeMap::new();
        for field in &self.fields {
            let selector = parse_selector(&field.selector)?;
            let text = select_text(&doc, &selector);
            for (lemma, count) in self.lemmatizer.lemmatize(&text) {
                *ranks.entry(lemma).or_insert(0.0) += field.weight * count as f32;
            }
        }
        Ok(ranks)
    }

    /// Index a stored page. Returns the number of postings written; pages
    /// with an error status or no content are skipped.
    pub fn index(&self, page: &Page) -> Result<usize> {
        if !page.is_indexable() {
            tracing::debug!(path = %page.path, code = page.code, "page not indexable");
            return Ok(0);
        }
        let ranks = self.compute_ranks(&page.content)?;
        if ranks.is_empty() {
            return Ok(0);
        }
        let written = self.store.commit_page_lemmas(page.site_id, page.id, &ranks)?;
        tracing::debug!(path = %page.path, lemmas = written, "page indexed");
        Ok(written)
    }

    /// Store a fetched page in place of any earlier page at its path and index
    /// it. Ranks are computed before the store's index lock is taken.
    pub fn store_page(&self, page: NewPage) -> Result<(Page, usize)> {
        let ranks = if page.is_indexable() { self.compute_ranks(&page.content)? } else { BTreeMap::new() };
        let (page, written) = self.store.replace_page(page, &ranks)?;
        tracing::debug!(path = %page.path, code = page.code, lemmas = written, "page stored");
        Ok((page, written))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::model::{NewPage, SiteStatus};

    fn indexer() -> PageIndexer {
        let store = Arc::new(IndexStore::temporary().unwrap());
        PageIndexer::new(store, Lemmatizer::russian(), crate::config::default_fields()).unwrap()
    }

    #[test]
    fn weights_fields() {
        let idx = indexer();
        let ranks = idx
            .compute_ranks("<html><head><title>Кошка</title></head><body>кошка и собака</body></html>")
            .unwrap();
        let cat = idx.lemmatizer().lemmatize("кошка").into_keys().next().unwrap();
        let dog = idx.lemmatizer().lemmatize("собака").into_keys().next().unwrap();
        assert!((ranks[&cat] - 1.8).abs() < 1e-6);
        assert!((ranks[&dog] - 0.8).abs() < 1e-6);
        assert_eq!(ranks.len(), 2);
    }

    #[test]
    fn skips_error_pages() {
        let idx = indexer();
        let site = idx.store().create_site("https://a.test/", "A", SiteStatus::Indexing).unwrap();
        let page = idx
            .store()
            .insert_page(NewPage { site_id: site.id, path: "/gone".into(), code: 404, content: "<title>Кошка</title>".into() })
            .unwrap();
        assert_eq!(idx.index(&page).unwrap(), 0);
        assert_eq!(idx.store().count_lemmas(site.id).unwrap(), 0);
    }

    #[test]
    fn store_page_replaces_previous_version() {
        let idx = indexer();
        let site = idx.store().create_site("https://a.test/", "A", SiteStatus::Indexed).unwrap();
        let page = |content: &str| NewPage { site_id: site.id, path: "/a".into(), code: 200, content: content.into() };
        let (first, _) = idx.store_page(page("<body>кошка и дом</body>")).unwrap();
        let (second, written) = idx.store_page(page("<body>собака</body>")).unwrap();

        assert_eq!(written, 1);
        assert!(idx.store().get_page(first.id).unwrap().is_none());
        assert_eq!(idx.store().find_page(site.id, "/a").unwrap().unwrap().id, second.id);
        assert_eq!(idx.store().count_lemmas(site.id).unwrap(), 1);
        assert!(idx.store().frequency_mismatches(site.id).unwrap().is_empty());

        let (gone, written) =
            idx.store_page(NewPage { site_id: site.id, path: "/a".into(), code: 404, content: "<body>собака</body>".into() }).unwrap();
        assert_eq!(written, 0);
        assert_eq!(gone.code, 404);
        assert_eq!(idx.store().count_pages(site.id).unwrap(), 1);
        assert_eq!(idx.store().count_lemmas(site.id).unwrap(), 0);
    }

    #[test]
    fn rejects_bad_fields() {
        let store = Arc::new(IndexStore::temporary().unwrap());
        assert!(PageIndexer::new(store.clone(), Lemmatizer::russian(), vec![Field::new("x", "p", 0.0)]).is_err());
        assert!(PageIndexer::new(store, Lemmatizer::russian(), vec![Field::new("x", "[[", 1.0)]).is_err());
    }
}

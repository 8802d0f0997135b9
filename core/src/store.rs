use crate::model::{now_rfc3339, Lemma, LemmaId, NewPage, Page, PageId, Posting, Site, SiteId, SiteStatus};
use anyhow::{anyhow, Context, Result};
use parking_lot::Mutex;
use serde::de::DeserializeOwned;
use serde::Serialize;
use std::collections::{BTreeMap, HashMap};
use std::path::Path;

/// Persistent inverted index over sled.
///
/// Trees and their keys (ids are big-endian so prefix scans group rows):
/// - `sites`:       site_id -> Site
/// - `site_urls`:   url -> site_id
/// - `pages`:       page_id -> Page
/// - `page_paths`:  site_id ++ path -> page_id
/// - `lemmas`:      lemma_id -> Lemma
/// - `lemma_texts`: site_id ++ text -> lemma_id
/// - `postings`:    lemma_id ++ page_id -> rank
/// - `page_lemmas`: page_id ++ lemma_id -> ()
pub struct IndexStore {
    db: sled::Db,
    sites: sled::Tree,
    site_urls: sled::Tree,
    pages: sled::Tree,
    page_paths: sled::Tree,
    lemmas: sled::Tree,
    lemma_texts: sled::Tree,
    postings: sled::Tree,
    page_lemmas: sled::Tree,
    /// Serializes every mutation of lemma frequencies and postings, along with
    /// page replacement and site creation.
    index_lock: Mutex<()>,
}

impl IndexStore {
    pub fn open<P: AsRef<Path>>(path: P) -> Result<Self> {
        let path = path.as_ref();
        let db = sled::open(path).with_context(|| format!("opening store at {}", path.display()))?;
        Self::from_db(db)
    }

    /// In-memory store that disappears when dropped.
    pub fn temporary() -> Result<Self> {
        Self::from_db(sled::Config::new().temporary(true).open()?)
    }

    fn from_db(db: sled::Db) -> Result<Self> {
        Ok(Self {
            sites: db.open_tree("sites")?,
            site_urls: db.open_tree("site_urls")?,
            pages: db.open_tree("pages")?,
            page_paths: db.open_tree("page_paths")?,
            lemmas: db.open_tree("lemmas")?,
            lemma_texts: db.open_tree("lemma_texts")?,
            postings: db.open_tree("postings")?,
            page_lemmas: db.open_tree("page_lemmas")?,
            db,
            index_lock: Mutex::new(()),
        })
    }

    pub fn flush(&self) -> Result<()> {
        self.db.flush()?;
        Ok(())
    }

    // --- sites ---

    pub fn create_site(&self, url: &str, name: &str, status: SiteStatus) -> Result<Site> {
        let site = Site {
            id: self.db.generate_id()?,
            url: url.to_string(),
            name: name.to_string(),
            status,
            status_time: now_rfc3339(),
            last_error: None,
        };
        self.sites.insert(id_key(site.id), encode(&site)?)?;
        self.site_urls.insert(url.as_bytes(), id_key(site.id).to_vec())?;
        Ok(site)
    }

    pub fn get_site(&self, id: SiteId) -> Result<Option<Site>> {
        self.sites.get(id_key(id))?.map(|v| decode(&v)).transpose()
    }

    pub fn find_site_by_url(&self, url: &str) -> Result<Option<Site>> {
        match self.site_urls.get(url.as_bytes())? {
            Some(id) => self.get_site(read_id(&id)?),
            None => Ok(None),
        }
    }

    pub fn list_sites(&self) -> Result<Vec<Site>> {
        self.sites.iter().values().map(|v| decode(&v?)).collect()
    }

    pub fn update_site_status(&self, id: SiteId, status: SiteStatus, last_error: Option<String>) -> Result<Site> {
        let mut site = self.get_site(id)?.ok_or_else(|| anyhow!("site {id} not found"))?;
        site.status = status;
        site.last_error = last_error;
        site.status_time = now_rfc3339();
        self.sites.insert(id_key(id), encode(&site)?)?;
        Ok(site)
    }

    /// The site stored for `url`, created with `status` if there is none.
    pub fn ensure_site(&self, url: &str, name: &str, status: SiteStatus) -> Result<Site> {
        let _guard = self.index_lock.lock();
        match self.find_site_by_url(url)? {
            Some(site) => Ok(site),
            None => self.create_site(url, name, status),
        }
    }

    /// Get the site for `url` with every page, lemma and posting removed and
    /// its status set to `status`, creating it if needed.
    pub fn reset_site(&self, url: &str, name: &str, status: SiteStatus) -> Result<Site> {
        let _guard = self.index_lock.lock();
        let Some(existing) = self.find_site_by_url(url)? else {
            return self.create_site(url, name, status);
        };
        for page_id in self.page_ids_for_site(existing.id)? {
            for lemma_id in self.lemma_ids_for_page(page_id)? {
                self.postings.remove(pair_key(lemma_id, page_id))?;
            }
            self.remove_page_rows(page_id)?;
        }
        for entry in self.lemma_texts.scan_prefix(id_key(existing.id)) {
            let (key, id) = entry?;
            self.lemmas.remove(id)?;
            self.lemma_texts.remove(key)?;
        }
        let site = Site { name: name.to_string(), last_error: None, status, status_time: now_rfc3339(), ..existing };
        self.sites.insert(id_key(site.id), encode(&site)?)?;
        Ok(site)
    }

    // --- pages ---

    pub fn insert_page(&self, page: NewPage) -> Result<Page> {
        let page = Page {
            id: self.db.generate_id()?,
            site_id: page.site_id,
            path: page.path,
            code: page.code,
            content: page.content,
        };
        self.pages.insert(id_key(page.id), encode(&page)?)?;
        self.page_paths.insert(path_key(page.site_id, &page.path), id_key(page.id).to_vec())?;
        Ok(page)
    }

    pub fn get_page(&self, id: PageId) -> Result<Option<Page>> {
        self.pages.get(id_key(id))?.map(|v| decode(&v)).transpose()
    }

    pub fn find_page(&self, site_id: SiteId, path: &str) -> Result<Option<Page>> {
        match self.page_paths.get(path_key(site_id, path))? {
            Some(id) => self.get_page(read_id(&id)?),
            None => Ok(None),
        }
    }

    pub fn count_pages(&self, site_id: SiteId) -> Result<usize> {
        Ok(self.page_paths.scan_prefix(id_key(site_id)).count())
    }

    pub fn count_all_pages(&self) -> usize {
        self.pages.len()
    }

    pub fn pages_for_site(&self, site_id: SiteId) -> Result<Vec<Page>> {
        let mut pages = Vec::new();
        for id in self.page_ids_for_site(site_id)? {
            if let Some(page) = self.get_page(id)? {
                pages.push(page);
            }
        }
        Ok(pages)
    }

    /// Delete a page with its postings, decrementing the frequency of every
    /// lemma it held. Lemmas left with no page are dropped.
    pub fn delete_page(&self, page_id: PageId) -> Result<()> {
        let _guard = self.index_lock.lock();
        self.unindex_page(page_id)
    }

    /// Store `page` in place of any page at the same site and path, then
    /// record `ranks` for it. The lookup, the removal of the previous page and
    /// its postings, the insert and the commit happen under one index lock, so
    /// a path never holds more than one page.
    pub fn replace_page(&self, page: NewPage, ranks: &BTreeMap<String, f32>) -> Result<(Page, usize)> {
        let _guard = self.index_lock.lock();
        if let Some(id) = self.page_paths.get(path_key(page.site_id, &page.path))? {
            self.unindex_page(read_id(&id)?)?;
        }
        let page = self.insert_page(page)?;
        let postings = if ranks.is_empty() { 0 } else { self.add_page_lemmas(page.site_id, page.id, ranks)? };
        Ok((page, postings))
    }

    fn unindex_page(&self, page_id: PageId) -> Result<()> {
        let lemma_ids = self.lemma_ids_for_page(page_id)?;
        self.decrement_frequencies(&lemma_ids)?;
        for lemma_id in &lemma_ids {
            self.postings.remove(pair_key(*lemma_id, page_id))?;
        }
        self.remove_page_rows(page_id)
    }

    fn remove_page_rows(&self, page_id: PageId) -> Result<()> {
        for key in self.page_lemmas.scan_prefix(id_key(page_id)).keys() {
            self.page_lemmas.remove(key?)?;
        }
        if let Some(bytes) = self.pages.remove(id_key(page_id))? {
            let page: Page = decode(&bytes)?;
            self.page_paths.remove(path_key(page.site_id, &page.path))?;
        }
        Ok(())
    }

    fn page_ids_for_site(&self, site_id: SiteId) -> Result<Vec<PageId>> {
        self.page_paths.scan_prefix(id_key(site_id)).values().map(|v| read_id(&v?)).collect()
    }

    // --- lemmas ---

    pub fn get_lemma(&self, site_id: SiteId, text: &str) -> Result<Option<Lemma>> {
        match self.lemma_texts.get(path_key(site_id, text))? {
            Some(id) => self.get_lemma_by_id(read_id(&id)?),
            None => Ok(None),
        }
    }

    pub fn get_lemma_by_id(&self, id: LemmaId) -> Result<Option<Lemma>> {
        self.lemmas.get(id_key(id))?.map(|v| decode(&v)).transpose()
    }

    pub fn list_lemmas(&self, site_id: SiteId) -> Result<Vec<Lemma>> {
        let mut lemmas = Vec::new();
        for id in self.lemma_texts.scan_prefix(id_key(site_id)).values() {
            if let Some(lemma) = self.get_lemma_by_id(read_id(&id?)?)? {
                lemmas.push(lemma);
            }
        }
        Ok(lemmas)
    }

    pub fn count_lemmas(&self, site_id: SiteId) -> Result<usize> {
        Ok(self.lemma_texts.scan_prefix(id_key(site_id)).count())
    }

    pub fn count_all_lemmas(&self) -> usize {
        self.lemmas.len()
    }

    fn save_lemmas(&self, lemmas: &[Lemma]) -> Result<()> {
        for lemma in lemmas {
            self.lemmas.insert(id_key(lemma.id), encode(lemma)?)?;
            self.lemma_texts.insert(path_key(lemma.site_id, &lemma.lemma), id_key(lemma.id).to_vec())?;
        }
        Ok(())
    }

    fn decrement_frequencies(&self, ids: &[LemmaId]) -> Result<()> {
        for id in ids {
            let Some(mut lemma) = self.get_lemma_by_id(*id)? else { continue };
            lemma.frequency = lemma.frequency.saturating_sub(1);
            if lemma.frequency == 0 {
                self.lemmas.remove(id_key(lemma.id))?;
                self.lemma_texts.remove(path_key(lemma.site_id, &lemma.lemma))?;
            } else {
                self.lemmas.insert(id_key(lemma.id), encode(&lemma)?)?;
            }
        }
        Ok(())
    }

    // --- postings ---

    /// Record one page's lemma ranks as a single index mutation: every lemma
    /// is fetched or created for the page's site, its frequency grows by one,
    /// and a fresh posting with the page's rank is written.
    pub fn commit_page_lemmas(&self, site_id: SiteId, page_id: PageId, ranks: &BTreeMap<String, f32>) -> Result<usize> {
        let _guard = self.index_lock.lock();
        self.add_page_lemmas(site_id, page_id, ranks)
    }

    fn add_page_lemmas(&self, site_id: SiteId, page_id: PageId, ranks: &BTreeMap<String, f32>) -> Result<usize> {
        let mut touched = Vec::with_capacity(ranks.len());
        for text in ranks.keys() {
            let lemma = match self.get_lemma(site_id, text)? {
                Some(mut lemma) => {
                    lemma.frequency += 1;
                    lemma
                }
                None => Lemma { id: self.db.generate_id()?, site_id, lemma: text.clone(), frequency: 1 },
            };
            touched.push(lemma);
        }
        self.save_lemmas(&touched)?;
        let postings: Vec<Posting> = touched
            .iter()
            .map(|lemma| Posting { page_id, lemma_id: lemma.id, rank: ranks[&lemma.lemma] })
            .collect();
        self.insert_postings(&postings)?;
        Ok(postings.len())
    }

    fn insert_postings(&self, postings: &[Posting]) -> Result<()> {
        for p in postings {
            self.postings.insert(pair_key(p.lemma_id, p.page_id), p.rank.to_be_bytes().to_vec())?;
            self.page_lemmas.insert(pair_key(p.page_id, p.lemma_id), Vec::<u8>::new())?;
        }
        Ok(())
    }

    pub fn postings_for_lemma(&self, lemma_id: LemmaId) -> Result<Vec<Posting>> {
        let mut out = Vec::new();
        for entry in self.postings.scan_prefix(id_key(lemma_id)) {
            let (key, value) = entry?;
            let page_id = read_id(&key[8..])?;
            let rank = f32::from_be_bytes(value.as_ref().try_into().context("corrupt posting rank")?);
            out.push(Posting { page_id, lemma_id, rank });
        }
        Ok(out)
    }

    pub fn postings_for_lemmas(&self, ids: &[LemmaId]) -> Result<HashMap<LemmaId, Vec<Posting>>> {
        ids.iter().map(|id| Ok((*id, self.postings_for_lemma(*id)?))).collect()
    }

    pub fn lemma_ids_for_page(&self, page_id: PageId) -> Result<Vec<LemmaId>> {
        self.page_lemmas.scan_prefix(id_key(page_id)).keys().map(|k| read_id(&k?[8..])).collect()
    }

    /// Lemmas whose stored frequency differs from the number of pages holding
    /// a posting for them, as (lemma, counted pages).
    pub fn frequency_mismatches(&self, site_id: SiteId) -> Result<Vec<(Lemma, usize)>> {
        let mut out = Vec::new();
        for lemma in self.list_lemmas(site_id)? {
            let pages = self.postings.scan_prefix(id_key(lemma.id)).count();
            if pages != lemma.frequency as usize {
                out.push((lemma, pages));
            }
        }
        Ok(out)
    }
}

fn id_key(id: u64) -> [u8; 8] {
    id.to_be_bytes()
}

fn pair_key(a: u64, b: u64) -> [u8; 16] {
    let mut key = [0u8; 16];
    key[..8].copy_from_slice(&a.to_be_bytes());
    key[8..].copy_from_slice(&b.to_be_bytes());
    key
}

fn path_key(id: u64, text: &str) -> Vec<u8> {
    let mut key = id.to_be_bytes().to_vec();
    key.extend_from_slice(text.as_bytes());
    key
}

fn read_id(bytes: &[u8]) -> Result<u64> {
    let arr: [u8; 8] = bytes.try_into().context("corrupt id key")?;
    Ok(u64::from_be_bytes(arr))
}

fn encode<T: Serialize>(value: &T) -> Result<Vec<u8>> {
    Ok(bincode::serialize(value)?)
}

fn decode<T: DeserializeOwned>(bytes: &[u8]) -> Result<T> {
    Ok(bincode::deserialize(bytes)?)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn ranks(pairs: &[(&str, f32)]) -> BTreeMap<String, f32> {
        pairs.iter().map(|(k, v)| (k.to_string(), *v)).collect()
    }

    fn page(store: &IndexStore, site: SiteId, path: &str) -> Page {
        store
            .insert_page(NewPage { site_id: site, path: path.into(), code: 200, content: "<p>x</p>".into() })
            .unwrap()
    }

    #[test]
    fn frequency_counts_pages_not_occurrences() {
        let store = IndexStore::temporary().unwrap();
        let site = store.create_site("https://a.test/", "A", SiteStatus::Indexing).unwrap();
        let p1 = page(&store, site.id, "/1");
        let p2 = page(&store, site.id, "/2");
        store.commit_page_lemmas(site.id, p1.id, &ranks(&[("кошк", 5.0)])).unwrap();
        store.commit_page_lemmas(site.id, p2.id, &ranks(&[("кошк", 0.8), ("собак", 1.0)])).unwrap();

        let cat = store.get_lemma(site.id, "кошк").unwrap().unwrap();
        assert_eq!(cat.frequency, 2);
        assert_eq!(store.postings_for_lemma(cat.id).unwrap().len(), 2);
        assert!(store.frequency_mismatches(site.id).unwrap().is_empty());
    }

    #[test]
    fn delete_page_cascades() {
        let store = IndexStore::temporary().unwrap();
        let site = store.create_site("https://a.test/", "A", SiteStatus::Indexing).unwrap();
        let p1 = page(&store, site.id, "/1");
        let p2 = page(&store, site.id, "/2");
        store.commit_page_lemmas(site.id, p1.id, &ranks(&[("кошк", 1.0), ("дом", 1.0)])).unwrap();
        store.commit_page_lemmas(site.id, p2.id, &ranks(&[("кошк", 1.0)])).unwrap();

        store.delete_page(p1.id).unwrap();
        assert!(store.find_page(site.id, "/1").unwrap().is_none());
        assert_eq!(store.get_lemma(site.id, "кошк").unwrap().unwrap().frequency, 1);
        assert!(store.get_lemma(site.id, "дом").unwrap().is_none());
        assert!(store.lemma_ids_for_page(p1.id).unwrap().is_empty());
        assert_eq!(store.count_pages(site.id).unwrap(), 1);
    }

    #[test]
    fn lemmas_are_scoped_per_site() {
        let store = IndexStore::temporary().unwrap();
        let a = store.create_site("https://a.test/", "A", SiteStatus::Indexing).unwrap();
        let b = store.create_site("https://b.test/", "B", SiteStatus::Indexing).unwrap();
        let pa = page(&store, a.id, "/");
        let pb = page(&store, b.id, "/");
        store.commit_page_lemmas(a.id, pa.id, &ranks(&[("кошк", 1.0)])).unwrap();
        store.commit_page_lemmas(b.id, pb.id, &ranks(&[("кошк", 1.0)])).unwrap();
        assert_eq!(store.get_lemma(a.id, "кошк").unwrap().unwrap().frequency, 1);
        assert_eq!(store.count_lemmas(b.id).unwrap(), 1);
        assert_eq!(store.count_all_lemmas(), 2);
    }

    #[test]
    fn ensure_site_keeps_existing_row() {
        let store = IndexStore::temporary().unwrap();
        let created = store.ensure_site("https://a.test/", "A", SiteStatus::Indexed).unwrap();
        let again = store.ensure_site("https://a.test/", "renamed", SiteStatus::Failed).unwrap();
        assert_eq!(again.id, created.id);
        assert_eq!(again.status, SiteStatus::Indexed);
        assert_eq!(store.list_sites().unwrap().len(), 1);
    }

    #[test]
    fn reset_site_clears_index() {
        let store = IndexStore::temporary().unwrap();
        let site = store.create_site("https://a.test/", "A", SiteStatus::Indexed).unwrap();
        let p = page(&store, site.id, "/");
        store.commit_page_lemmas(site.id, p.id, &ranks(&[("кошк", 1.0)])).unwrap();

        let reset = store.reset_site("https://a.test/", "A2", SiteStatus::Indexing).unwrap();
        assert_eq!(reset.id, site.id);
        assert_eq!(reset.status, SiteStatus::Indexing);
        assert_eq!(reset.name, "A2");
        assert_eq!(store.count_pages(site.id).unwrap(), 0);
        assert_eq!(store.count_lemmas(site.id).unwrap(), 0);
        assert_eq!(store.list_sites().unwrap().len(), 1);
    }

    #[test]
    fn replace_page_keeps_one_page_per_path() {
        let store = std::sync::Arc::new(IndexStore::temporary().unwrap());
        let site = store.create_site("https://a.test/", "A", SiteStatus::Indexed).unwrap();
        let other = page(&store, site.id, "/other");
        store.commit_page_lemmas(site.id, other.id, &ranks(&[("кошк", 1.0)])).unwrap();

        let site_id = site.id;
        let handles: Vec<_> = (0..8)
            .map(|i| {
                let store = store.clone();
                std::thread::spawn(move || {
                    for round in 0..20 {
                        let new = NewPage { site_id, path: "/a".into(), code: 200, content: format!("{i}:{round}") };
                        store.replace_page(new, &ranks(&[("кошк", 1.0), ("дом", 0.8)])).unwrap();
                    }
                })
            })
            .collect();
        for h in handles {
            h.join().unwrap();
        }

        assert_eq!(store.count_pages(site.id).unwrap(), 2);
        assert_eq!(store.count_all_pages(), 2);
        assert_eq!(store.get_lemma(site.id, "кошк").unwrap().unwrap().frequency, 2);
        assert_eq!(store.get_lemma(site.id, "дом").unwrap().unwrap().frequency, 1);
        assert!(store.frequency_mismatches(site.id).unwrap().is_empty());
    }

    #[test]
    fn replace_page_of_unknown_path_inserts() {
        let store = IndexStore::temporary().unwrap();
        let site = store.create_site("https://a.test/", "A", SiteStatus::Indexed).unwrap();
        let new = NewPage { site_id: site.id, path: "/new".into(), code: 404, content: String::new() };
        let (stored, postings) = store.replace_page(new, &BTreeMap::new()).unwrap();
        assert_eq!(postings, 0);
        assert_eq!(store.find_page(site.id, "/new").unwrap().unwrap().id, stored.id);
        assert_eq!(store.count_lemmas(site.id).unwrap(), 0);
    }

    #[test]
    fn reopens_persisted_store() {
        let dir = tempfile::tempdir().unwrap();
        let id = {
            let store = IndexStore::open(dir.path()).unwrap();
            let site = store.create_site("https://a.test/", "A", SiteStatus::Indexed).unwrap();
            store.flush().unwrap();
            site.id
        };
        let store = IndexStore::open(dir.path()).unwrap();
        assert_eq!(store.get_site(id).unwrap().unwrap().name, "A");
        assert_eq!(store.find_site_by_url("https://a.test/").unwrap().unwrap().id, id);
    }
}

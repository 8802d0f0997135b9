//! Per-site crawl: a bounded pool of fetch tasks fed from a frontier of
//! discovered links, deduplicated through a visited set shared by every task
//! of the crawl and stopped through a cancellation token.

use crate::fetch::{Fetched, Fetcher};
use crate::links::{extract_links, is_eligible, page_path};
use anyhow::{Context, Result};
use dashmap::DashSet;
use sitesearch_core::{IndexStore, NewPage, Page, PageIndexer, Site, SiteId, SiteStatus};
use std::collections::VecDeque;
use std::sync::Arc;
use tokio::task::JoinSet;
use tokio_util::sync::CancellationToken;
use url::Url;

pub const ROOT_UNAVAILABLE: &str = "Ошибка индексации: главная страница сайта недоступна.";

/// Everything a crawl task needs, shared by all sites of a session.
pub struct CrawlContext {
    pub store: Arc<IndexStore>,
    pub indexer: Arc<PageIndexer>,
    pub fetcher: Fetcher,
    /// Fetch tasks in flight per site.
    pub concurrency: usize,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum CrawlOutcome {
    /// Every reachable page was visited; holds the visited URLs.
    Completed(Vec<String>),
    /// The root page could not be fetched; the site is marked FAILED.
    RootUnavailable,
    Cancelled,
}

/// Crawl one site from its root, persisting and indexing every eligible page.
pub async fn crawl_site(ctx: Arc<CrawlContext>, site: &Site, cancel: &CancellationToken) -> Result<CrawlOutcome> {
    let root = Url::parse(&site.url).with_context(|| format!("bad site url {}", site.url))?;
    if cancel.is_cancelled() {
        return Ok(CrawlOutcome::Cancelled);
    }
    let visited: Arc<DashSet<String>> = Arc::new(DashSet::new());
    visited.insert(root.to_string());

    let fetched = match ctx.fetcher.fetch_root(&root).await {
        Ok(fetched) => fetched,
        Err(e) => {
            tracing::warn!(site = %site.url, error = %e, "root page unavailable");
            ctx.store.update_site_status(site.id, SiteStatus::Failed, Some(ROOT_UNAVAILABLE.to_string()))?;
            return Ok(CrawlOutcome::RootUnavailable);
        }
    };
    let links = persist(ctx.clone(), site.id, root.clone(), root.clone(), fetched).await?;
    let mut frontier: VecDeque<Url> = claim(links, &root, &visited, cancel).into();

    let mut tasks = JoinSet::new();
    loop {
        if cancel.is_cancelled() {
            break;
        }
        while tasks.len() < ctx.concurrency.max(1) {
            let Some(url) = frontier.pop_front() else { break };
            tasks.spawn(visit(ctx.clone(), site.id, root.clone(), url, visited.clone(), cancel.clone()));
        }
        match tasks.join_next().await {
            None => break,
            Some(Ok(Ok(found))) => frontier.extend(found),
            Some(Ok(Err(e))) => tracing::warn!(site = %site.url, error = %e, "page task failed"),
            Some(Err(e)) => tracing::warn!(site = %site.url, error = %e, "page task panicked"),
        }
    }

    if cancel.is_cancelled() {
        while tasks.join_next().await.is_some() {}
        tracing::info!(site = %site.url, visited = visited.len(), "crawl cancelled");
        return Ok(CrawlOutcome::Cancelled);
    }
    let urls: Vec<String> = visited.iter().map(|u| u.key().clone()).collect();
    tracing::info!(site = %site.url, pages = urls.len(), "crawl finished");
    Ok(CrawlOutcome::Completed(urls))
}

/// Fetch one page and return the links it newly claimed for the crawl.
async fn visit(
    ctx: Arc<CrawlContext>,
    site_id: SiteId,
    root: Url,
    url: Url,
    visited: Arc<DashSet<String>>,
    cancel: CancellationToken,
) -> Result<Vec<Url>> {
    if cancel.is_cancelled() {
        return Ok(vec![]);
    }
    let fetched = ctx.fetcher.fetch(&url).await;
    let links = persist(ctx, site_id, root.clone(), url, fetched).await?;
    Ok(claim(links, &root, &visited, &cancel))
}

/// Keep eligible links not seen before. Inserting into `visited` is the gate:
/// the first task to insert a URL owns it.
fn claim(links: Vec<Url>, root: &Url, visited: &DashSet<String>, cancel: &CancellationToken) -> Vec<Url> {
    let mut out = Vec::new();
    for link in links {
        if cancel.is_cancelled() {
            return vec![];
        }
        if is_eligible(&link, root) && visited.insert(link.to_string()) {
            out.push(link);
        }
    }
    out
}

/// Store and index a fetched page, returning the links found in it.
async fn persist(ctx: Arc<CrawlContext>, site_id: SiteId, root: Url, url: Url, fetched: Fetched) -> Result<Vec<Url>> {
    tokio::task::spawn_blocking(move || {
        let links = if fetched.content.is_empty() { vec![] } else { extract_links(&url, &fetched.content) };
        let page = NewPage { site_id, path: page_path(&url, &root), code: fetched.code, content: fetched.content };
        let (page, postings) = ctx.indexer.store_page(page)?;
        tracing::debug!(%url, code = page.code, postings, links = links.len(), "page stored");
        Ok::<_, anyhow::Error>(links)
    })
    .await?
}

/// Fetch one URL again and replace its page: the previous page, its postings
/// and its share of lemma frequencies are removed as the new one is indexed.
pub async fn reindex_page(ctx: Arc<CrawlContext>, site: &Site, url: Url) -> Result<Page> {
    let root = Url::parse(&site.url).with_context(|| format!("bad site url {}", site.url))?;
    let fetched = ctx.fetcher.fetch(&url).await;
    let site_id = site.id;
    tokio::task::spawn_blocking(move || {
        let path = page_path(&url, &root);
        let (page, postings) = ctx.indexer.store_page(NewPage { site_id, path, code: fetched.code, content: fetched.content })?;
        tracing::info!(%url, code = page.code, postings, "page re-indexed");
        Ok::<_, anyhow::Error>(page)
    })
    .await?
}

use crate::fetch::Fetcher;
use crate::scheduler::{crawl_site, reindex_page, CrawlContext, CrawlOutcome};
use parking_lot::Mutex;
use sitesearch_core::search::SearchResponse;
use sitesearch_core::stats::Statistics;
use sitesearch_core::{AppConfig, IndexStore, Lemmatizer, Page, PageIndexer, SearchSystem, Site, SiteStatus};
use std::sync::Arc;
use thiserror::Error;
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;
use tokio_util::task::TaskTracker;
use url::Url;

pub const INDEXING_STOPPED: &str = "Индексация приостановлена";

/// Failures a caller of the command surface can observe.
#[derive(Debug, Error)]
pub enum ControlError {
    #[error("Индексация уже запущена")]
    AlreadyRunning,
    #[error("Индексация не запущена")]
    NotRunning,
    #[error("Задан пустой поисковый запрос")]
    EmptyQuery,
    #[error("Приостановите индексацию или дождитесь её завершения")]
    IndexingInProgress,
    #[error("Данная страница находится за пределами сайтов, указанных в конфигурационном файле")]
    OutsideConfiguredSites,
    #[error("Внутренняя ошибка сервера: {0}")]
    Internal(#[from] anyhow::Error),
}

struct CrawlSession {
    cancel: CancellationToken,
    tracker: TaskTracker,
}

/// Start/stop crawling, re-index single pages, search and report statistics
/// over one index store.
pub struct Controller {
    config: AppConfig,
    store: Arc<IndexStore>,
    crawl: Arc<CrawlContext>,
    search: SearchSystem,
    session: Mutex<Option<CrawlSession>>,
    /// Serializes start and stop so a stop finishes marking sites first.
    commands: tokio::sync::Mutex<()>,
}

impl Controller {
    pub fn new(config: AppConfig, store: Arc<IndexStore>) -> anyhow::Result<Self> {
        let lemmatizer = Lemmatizer::russian();
        let indexer = PageIndexer::new(store.clone(), lemmatizer.clone(), config.fields.clone())?;
        let crawl = Arc::new(CrawlContext {
            store: store.clone(),
            indexer: Arc::new(indexer),
            fetcher: Fetcher::new(&config.crawler)?,
            concurrency: config.crawler.concurrency,
        });
        Ok(Self {
            search: SearchSystem::new(store.clone(), lemmatizer),
            config,
            store,
            crawl,
            session: Mutex::new(None),
            commands: tokio::sync::Mutex::new(()),
        })
    }

    pub fn config(&self) -> &AppConfig {
        &self.config
    }

    pub fn store(&self) -> &Arc<IndexStore> {
        &self.store
    }

    /// True while any site task of the current crawl is still running.
    pub fn is_indexing(&self) -> bool {
        self.session.lock().as_ref().is_some_and(|s| !s.tracker.is_empty())
    }

    /// Reset every configured site to INDEXING and crawl them concurrently.
    pub async fn start_indexing(&self) -> Result<(), ControlError> {
        let _cmd = self.commands.lock().await;
        if self.is_indexing() {
            return Err(ControlError::AlreadyRunning);
        }
        let cancel = CancellationToken::new();
        let tracker = TaskTracker::new();
        let sites = self
            .config
            .sites
            .iter()
            .map(|entry| self.store.reset_site(&entry.url, &entry.name, SiteStatus::Indexing))
            .collect::<anyhow::Result<Vec<_>>>()?;
        for site in sites {
            tracker.spawn(run_site(self.crawl.clone(), site, cancel.clone()));
        }
        tracker.close();
        *self.session.lock() = Some(CrawlSession { cancel, tracker });
        tracing::info!(sites = self.config.sites.len(), "indexing started");
        Ok(())
    }

    /// Cancel the running crawl, wait for its tasks to drain, then mark every
    /// site still INDEXING as FAILED.
    pub async fn stop_indexing(&self) -> Result<(), ControlError> {
        let _cmd = self.commands.lock().await;
        let (cancel, tracker) = match self.session.lock().as_ref() {
            Some(s) if !s.tracker.is_empty() => (s.cancel.clone(), s.tracker.clone()),
            _ => return Err(ControlError::NotRunning),
        };
        cancel.cancel();
        tracker.wait().await;
        for site in self.store.list_sites()? {
            if !site.status.is_terminal() {
                self.store.update_site_status(site.id, SiteStatus::Failed, Some(INDEXING_STOPPED.to_string()))?;
            }
        }
        tracing::info!("indexing stopped");
        Ok(())
    }

    /// Resolves once the current crawl, if any, has finished.
    pub async fn wait_for_crawl(&self) {
        let tracker = self.session.lock().as_ref().map(|s| s.tracker.clone());
        if let Some(tracker) = tracker {
            tracker.wait().await;
        }
    }

    /// Re-fetch and re-index one page of a configured site in the background.
    pub fn index_page(&self, url: &str) -> Result<JoinHandle<anyhow::Result<Page>>, ControlError> {
        let url = Url::parse(url.trim()).map_err(|_| ControlError::OutsideConfiguredSites)?;
        let entry = self.config.site_for_url(url.as_str()).ok_or(ControlError::OutsideConfiguredSites)?;
        let site = self.store.ensure_site(&entry.url, &entry.name, SiteStatus::Indexed)?;
        let ctx = self.crawl.clone();
        Ok(tokio::spawn(async move { reindex_page(ctx, &site, url).await }))
    }

    /// Ranked hits for `query`, best first, cut to `[offset, offset + limit)`.
    pub fn search(
        &self,
        query: &str,
        site: Option<&str>,
        offset: usize,
        limit: Option<usize>,
    ) -> Result<SearchResponse, ControlError> {
        if query.trim().is_empty() {
            return Err(ControlError::EmptyQuery);
        }
        if self.is_indexing() {
            return Err(ControlError::IndexingInProgress);
        }
        let results = self.search.find(query, site.filter(|s| !s.trim().is_empty()))?;
        let sites = self.store.list_sites()?;
        let limit = limit.filter(|l| *l > 0).unwrap_or(self.config.limit);
        Ok(SearchResponse::paginate(&results, &sites, offset, limit))
    }

    pub fn statistics(&self) -> Result<Statistics, ControlError> {
        Ok(Statistics::collect(&self.store, self.is_indexing())?)
    }
}

async fn run_site(ctx: Arc<CrawlContext>, site: Site, cancel: CancellationToken) {
    let status = match crawl_site(ctx.clone(), &site, &cancel).await {
        Ok(CrawlOutcome::Completed(_)) => (SiteStatus::Indexed, None),
        Ok(_) => return,
        Err(e) => {
            tracing::error!(site = %site.url, error = %e, "crawl failed");
            (SiteStatus::Failed, Some(e.to_string()))
        }
    };
    if let Err(e) = ctx.store.update_site_status(site.id, status.0, status.1) {
        tracing::error!(site = %site.url, error = %e, "status update failed");
    }
}

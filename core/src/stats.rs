use crate::model::SiteStatus;
use crate::store::IndexStore;
use anyhow::Result;
use serde::Serialize;

#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct TotalStatistics {
    pub sites: usize,
    pub pages: usize,
    pub lemmas: usize,
    pub is_indexing: bool,
}

#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct SiteStatistics {
    pub url: String,
    pub name: String,
    pub status: SiteStatus,
    pub status_time: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
    pub pages: usize,
    pub lemmas: usize,
}

#[derive(Debug, Clone, Serialize)]
pub struct Statistics {
    pub total: TotalStatistics,
    pub detailed: Vec<SiteStatistics>,
}

impl Statistics {
    pub fn collect(store: &IndexStore, is_indexing: bool) -> Result<Self> {
        let sites = store.list_sites()?;
        let mut detailed = Vec::with_capacity(sites.len());
        for site in &sites {
            detailed.push(SiteStatistics {
                url: site.url.clone(),
                name: site.name.clone(),
                status: site.status,
                status_time: site.status_time.clone(),
                error: site.last_error.clone(),
                pages: store.count_pages(site.id)?,
                lemmas: store.count_lemmas(site.id)?,
            });
        }
        Ok(Self {
            total: TotalStatistics {
                sites: sites.len(),
                pages: store.count_all_pages(),
                lemmas: store.count_all_lemmas(),
                is_indexing,
            },
            detailed,
        })
    }
}

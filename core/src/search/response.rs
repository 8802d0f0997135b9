use super::ResultMap;
use crate::model::Site;
use serde::Serialize;
use std::cmp::Ordering;

#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct SearchItem {
    pub site: String,
    pub site_name: String,
    pub uri: String,
    pub title: String,
    pub snippet: String,
    pub relevance: f32,
}

#[derive(Debug, Clone, Serialize)]
pub struct SearchResponse {
    pub result: bool,
    /// Total hits before pagination.
    pub count: usize,
    pub data: Vec<SearchItem>,
}

impl SearchResponse {
    /// Sort by relevance, best first, and cut the `[offset, offset + limit)` window.
    pub fn paginate(results: &ResultMap, sites: &[Site], offset: usize, limit: usize) -> Self {
        let mut sorted: Vec<_> = results.iter().collect();
        sorted.sort_by(|(a, ra), (b, rb)| {
            rb.partial_cmp(ra).unwrap_or(Ordering::Equal).then_with(|| a.uri.cmp(&b.uri))
        });
        let data = sorted
            .into_iter()
            .skip(offset)
            .take(limit)
            .filter_map(|(hit, relevance)| {
                let site = sites.iter().find(|s| s.id == hit.site_id)?;
                Some(SearchItem {
                    site: site.url.trim_end_matches('/').to_string(),
                    site_name: site.name.clone(),
                    uri: hit.uri.clone(),
                    title: hit.title.clone(),
                    snippet: hit.snippet.clone(),
                    relevance: *relevance,
                })
            })
            .collect();
        Self { result: true, count: results.len(), data }
    }
}

use serde::{Deserialize, Serialize};
use std::fmt;
use time::format_description::well_known::Rfc3339;

pub type SiteId = u64;
pub type PageId = u64;
pub type LemmaId = u64;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum SiteStatus {
    Indexing,
    Indexed,
    Failed,
}

impl SiteStatus {
    /// INDEXED and FAILED are terminal; INDEXING is the only in-progress state.
    pub fn is_terminal(self) -> bool {
        !matches!(self, SiteStatus::Indexing)
    }
}

impl fmt::Display for SiteStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            SiteStatus::Indexing => "INDEXING",
            SiteStatus::Indexed => "INDEXED",
            SiteStatus::Failed => "FAILED",
        };
        f.write_str(s)
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Site {
    pub id: SiteId,
    /// Root URL, always ending in `/`.
    pub url: String,
    pub name: String,
    pub status: SiteStatus,
    /// RFC 3339 timestamp of the last status change.
    pub status_time: String,
    pub last_error: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Page {
    pub id: PageId,
    pub site_id: SiteId,
    /// Root-relative path, always starting with `/`.
    pub path: String,
    /// HTTP status code, 0 when the request never got a response.
    pub code: u16,
    /// Raw HTML, empty when the fetch failed.
    pub content: String,
}

impl Page {
    /// Pages answered with 4xx/5xx or without content are stored but never indexed.
    pub fn is_indexable(&self) -> bool {
        indexable(self.code, &self.content)
    }
}

/// A page about to be stored; the store assigns the id.
#[derive(Debug, Clone)]
pub struct NewPage {
    pub site_id: SiteId,
    pub path: String,
    pub code: u16,
    pub content: String,
}

impl NewPage {
    pub fn is_indexable(&self) -> bool {
        indexable(self.code, &self.content)
    }
}

fn indexable(code: u16, content: &str) -> bool {
    !content.is_empty() && !matches!(code / 100, 4 | 5)
}

/// Weighted content region of a page, selected with a CSS selector.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Field {
    pub name: String,
    pub selector: String,
    pub weight: f32,
}

impl Field {
    pub fn new(name: &str, selector: &str, weight: f32) -> Self {
        Self { name: name.to_string(), selector: selector.to_string(), weight }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Lemma {
    pub id: LemmaId,
    pub site_id: SiteId,
    pub lemma: String,
    /// Number of distinct pages of the site holding a posting for this lemma.
    pub frequency: u32,
}

#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct Posting {
    pub page_id: PageId,
    pub lemma_id: LemmaId,
    pub rank: f32,
}

pub fn now_rfc3339() -> String {
    time::OffsetDateTime::now_utc().format(&Rfc3339).unwrap_or_default()
}

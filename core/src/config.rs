use crate::html::parse_selector;
use crate::model::Field;
use anyhow::{bail, Context, Result};
use serde::{Deserialize, Serialize};
use std::fs::File;
use std::io::BufReader;
use std::path::Path;
use url::Url;

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SiteEntry {
    pub url: String,
    pub name: String,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CrawlerSettings {
    /// Concurrent fetches per site.
    #[serde(default = "default_concurrency")]
    pub concurrency: usize,
    #[serde(default = "default_user_agent")]
    pub user_agent: String,
    #[serde(default)]
    pub referrer: Option<String>,
    #[serde(default = "default_timeout_secs")]
    pub timeout_secs: u64,
}

impl Default for CrawlerSettings {
    fn default() -> Self {
        Self {
            concurrency: default_concurrency(),
            user_agent: default_user_agent(),
            referrer: None,
            timeout_secs: default_timeout_secs(),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AppConfig {
    pub sites: Vec<SiteEntry>,
    /// Default number of hits per result page.
    #[serde(default = "default_limit")]
    pub limit: usize,
    #[serde(default = "default_fields")]
    pub fields: Vec<Field>,
    #[serde(default)]
    pub crawler: CrawlerSettings,
}

fn default_concurrency() -> usize { 8 }
fn default_user_agent() -> String { "sitesearch-bot/0.1".to_string() }
fn default_timeout_secs() -> u64 { 12 }
fn default_limit() -> usize { 20 }

pub fn default_fields() -> Vec<Field> {
    vec![Field::new("title", "title", 1.0), Field::new("body", "body", 0.8)]
}

impl AppConfig {
    pub fn load<P: AsRef<Path>>(path: P) -> Result<Self> {
        let path = path.as_ref();
        let f = File::open(path).with_context(|| format!("opening config {}", path.display()))?;
        let cfg: AppConfig = serde_json::from_reader(BufReader::new(f))
            .with_context(|| format!("parsing config {}", path.display()))?;
        cfg.validated()
    }

    pub fn from_json(json: &str) -> Result<Self> {
        let cfg: AppConfig = serde_json::from_str(json)?;
        cfg.validated()
    }

    /// Checks invariants and normalises root URLs: parsed, so scheme and
    /// host are lowercase, and ending with `/`.
    pub fn validated(mut self) -> Result<Self> {
        if self.sites.is_empty() {
            bail!("config lists no sites");
        }
        for site in &mut self.sites {
            let raw = url_with_slash(site.url.trim());
            let url = Url::parse(&raw).with_context(|| format!("bad site url {raw:?}"))?;
            if !matches!(url.scheme(), "http" | "https") {
                bail!("site url {raw:?} must be http(s)");
            }
            site.url = url.to_string();
        }
        for field in &self.fields {
            if !(field.weight > 0.0) {
                bail!("field {:?} must have a positive weight", field.name);
            }
            parse_selector(&field.selector)?;
        }
        if self.crawler.concurrency == 0 {
            self.crawler.concurrency = 1;
        }
        Ok(self)
    }

    /// The configured site whose root URL prefixes `url`.
    pub fn site_for_url(&self, url: &str) -> Option<&SiteEntry> {
        self.sites.iter().find(|s| url.starts_with(&s.url) || url_with_slash(url) == s.url)
    }
}

fn url_with_slash(url: &str) -> String {
    if url.ends_with('/') { url.to_string() } else { format!("{url}/") }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn fills_defaults_and_normalises_urls() {
        let cfg = AppConfig::from_json(r#"{"sites":[{"url":"https://a.test","name":"A"}]}"#).unwrap();
        assert_eq!(cfg.sites[0].url, "https://a.test/");
        assert_eq!(cfg.limit, 20);
        assert_eq!(cfg.fields, default_fields());
        assert_eq!(cfg.crawler.concurrency, 8);
    }

    #[test]
    fn finds_site_for_url() {
        let cfg = AppConfig::from_json(
            r#"{"sites":[{"url":"https://a.test/","name":"A"},{"url":"https://b.test/docs/","name":"B"}]}"#,
        )
        .unwrap();
        assert_eq!(cfg.site_for_url("https://b.test/docs/x.html").unwrap().name, "B");
        assert_eq!(cfg.site_for_url("https://a.test").unwrap().name, "A");
        assert!(cfg.site_for_url("https://c.test/").is_none());
    }

    #[test]
    fn matches_sites_configured_with_uppercase_hosts() {
        let cfg = AppConfig::from_json(r#"{"sites":[{"url":"HTTPS://Shop.A.Test/Docs","name":"A"}]}"#).unwrap();
        assert_eq!(cfg.sites[0].url, "https://shop.a.test/Docs/");
        let page = Url::parse("https://SHOP.a.test/Docs/x.html").unwrap();
        assert_eq!(cfg.site_for_url(page.as_str()).unwrap().name, "A");
        assert!(AppConfig::from_json(r#"{"sites":[{"url":"ftp://a.test/","name":"A"}]}"#).is_err());
        assert!(AppConfig::from_json(r#"{"sites":[{"url":"not a url","name":"A"}]}"#).is_err());
    }

    #[test]
    fn rejects_empty_sites() {
        assert!(AppConfig::from_json(r#"{"sites":[]}"#).is_err());
    }
}

use anyhow::{bail, Result};
use reqwest::{header, Client, Url};
use sitesearch_core::config::CrawlerSettings;
use std::time::Duration;

/// Bodies larger than this are recorded without content.
const MAX_BODY_BYTES: usize = 4 * 1024 * 1024;

/// Outcome of one GET: status code (0 when no response arrived) and the
/// HTML body, empty unless the response was a successful HTML document.
#[derive(Debug, Clone, Default)]
pub struct Fetched {
    pub code: u16,
    pub content: String,
}

#[derive(Clone)]
pub struct Fetcher {
    client: Client,
}

impl Fetcher {
    pub fn new(settings: &CrawlerSettings) -> Result<Self> {
        let mut headers = header::HeaderMap::new();
        if let Some(referrer) = &settings.referrer {
            headers.insert(header::REFERER, header::HeaderValue::from_str(referrer)?);
        }
        let client = Client::builder()
            .user_agent(settings.user_agent.clone())
            .default_headers(headers)
            .redirect(reqwest::redirect::Policy::limited(5))
            .timeout(Duration::from_secs(settings.timeout_secs))
            .build()?;
        Ok(Self { client })
    }

    /// Fetch a site root. Network errors and non-2xx answers are errors.
    pub async fn fetch_root(&self, url: &Url) -> Result<Fetched> {
        let resp = self.client.get(url.clone()).send().await?;
        if !resp.status().is_success() {
            bail!("{url} answered {}", resp.status());
        }
        read_body(resp).await
    }

    /// Fetch any other page. Failures become a page with the observed status
    /// (or 0) and no content.
    pub async fn fetch(&self, url: &Url) -> Fetched {
        let resp = match self.client.get(url.clone()).send().await {
            Ok(resp) => resp,
            Err(e) => {
                tracing::debug!(%url, error = %e, "fetch failed");
                return Fetched { code: e.status().map_or(0, |s| s.as_u16()), content: String::new() };
            }
        };
        if !resp.status().is_success() {
            tracing::debug!(%url, status = resp.status().as_u16(), "non-success status");
            return Fetched { code: resp.status().as_u16(), content: String::new() };
        }
        let code = resp.status().as_u16();
        read_body(resp).await.unwrap_or_else(|e| {
            tracing::debug!(%url, error = %e, "reading body failed");
            Fetched { code, content: String::new() }
        })
    }
}

async fn read_body(resp: reqwest::Response) -> Result<Fetched> {
    let code = resp.status().as_u16();
    let is_html = resp
        .headers()
        .get(header::CONTENT_TYPE)
        .and_then(|v| v.to_str().ok())
        .map_or(true, |v| v.starts_with("text/html"));
    if !is_html {
        return Ok(Fetched { code, content: String::new() });
    }
    let bytes = resp.bytes().await?;
    if bytes.len() > MAX_BODY_BYTES {
        return Ok(Fetched { code, content: String::new() });
    }
    Ok(Fetched { code, content: String::from_utf8_lossy(&bytes).into_owned() })
}

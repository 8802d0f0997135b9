use lazy_static::lazy_static;
use scraper::{Html, Selector};
use url::Url;

lazy_static! {
    static ref ANCHOR: Selector = Selector::parse("a[href]").expect("valid anchor selector");
}

/// Absolute http(s) targets of every `<a href>` in `html`, resolved against `base`.
pub fn extract_links(base: &Url, html: &str) -> Vec<Url> {
    let doc = Html::parse_document(html);
    doc.select(&ANCHOR)
        .filter_map(|a| a.value().attr("href"))
        .filter_map(|href| base.join(href.trim()).ok())
        .filter(|u| matches!(u.scheme(), "http" | "https"))
        .collect()
}

/// A link is crawled when it lies under the site root, carries no fragment,
/// and names a document: `.html`, or a last segment without a dot.
pub fn is_eligible(url: &Url, root: &Url) -> bool {
    let s = url.as_str();
    if !s.starts_with(root.as_str()) || s.contains('#') {
        return false;
    }
    let last = url.path().rsplit('/').next().unwrap_or("");
    last.ends_with(".html") || !last.contains('.')
}

/// Root-relative path of `url`, always starting with `/`.
pub fn page_path(url: &Url, root: &Url) -> String {
    let rest = url.as_str().strip_prefix(root.as_str()).unwrap_or_else(|| url.path());
    format!("/{}", rest.trim_start_matches('/'))
}

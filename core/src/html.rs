use anyhow::{anyhow, Result};
use lazy_static::lazy_static;
use regex::Regex;
use scraper::{Html, Selector};

lazy_static! {
    static ref SPACES: Regex = Regex::new(r"\s+").expect("valid regex");
    static ref TAG: Regex = Regex::new(r"<[^>]*>").expect("valid regex");
    static ref SEL_TITLE: Selector = Selector::parse("title").expect("valid selector");
    static ref SEL_TITLED: Selector = Selector::parse("[title]").expect("valid selector");
}

pub fn parse_selector(selector: &str) -> Result<Selector> {
    Selector::parse(selector).map_err(|e| anyhow!("invalid selector {selector:?}: {e}"))
}

/// Text of every element matching `selector`, joined by single spaces.
pub fn select_text(doc: &Html, selector: &Selector) -> String {
    let parts: Vec<String> = doc
        .select(selector)
        .map(|el| el.text().collect::<Vec<_>>().join(" "))
        .collect();
    squash_whitespace(&parts.join(" "))
}

/// `<title>` text, falling back to the first `title="..."` attribute.
pub fn extract_title(content: &str) -> String {
    let doc = Html::parse_document(content);
    if let Some(title) = doc.select(&SEL_TITLE).next() {
        let text = squash_whitespace(&title.text().collect::<String>());
        if !text.is_empty() {
            return text;
        }
    }
    doc.select(&SEL_TITLED)
        .filter_map(|el| el.value().attr("title"))
        .map(squash_whitespace)
        .find(|t| !t.is_empty())
        .unwrap_or_default()
}

/// Remove markup, keeping text between tags.
pub fn strip_tags(fragment: &str) -> String {
    TAG.replace_all(fragment, " ").into_owned()
}

pub fn squash_whitespace(text: &str) -> String {
    SPACES.replace_all(text.trim(), " ").into_owned()
}

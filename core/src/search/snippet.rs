use crate::html::strip_tags;
use crate::lemmatizer::Lemmatizer;
use std::collections::{BTreeSet, HashSet};

const OPEN: &str = "<b>";
const CLOSE: &str = "</b>";
const SEPARATOR: &str = "<br>";

/// Highlighted fragments of `content`, each holding a surface form of every
/// lemma in `query`, deduplicated and joined with `<br>`. Empty when no
/// fragment covers the whole query.
pub fn build_snippet(lemmatizer: &Lemmatizer, content: &str, query: &[String]) -> String {
    if query.is_empty() {
        return String::new();
    }
    let found = lemmatizer.lemma_forms(content);
    let mut wanted: Vec<Vec<String>> = Vec::with_capacity(query.len());
    for lemma in query {
        let Some(forms) = found.get(lemma) else {
            return String::new();
        };
        let mut forms: Vec<String> = forms.iter().cloned().collect();
        forms.sort_by(|a, b| b.len().cmp(&a.len()).then_with(|| a.cmp(b)));
        wanted.push(forms);
    }
    let all_forms: HashSet<&str> = wanted.iter().flatten().map(String::as_str).collect();

    let doc = highlight(lemmatizer, content, &all_forms);
    let mut fragments = BTreeSet::new();
    for (start, word) in lemmatizer.word_spans(&doc) {
        if !all_forms.contains(word) {
            continue;
        }
        let from = window_start(&doc, start);
        let to = window_end(&doc, start + word.len());
        let fragment = &doc[from..to];
        if !fragments.contains(fragment) && covers_query(lemmatizer, fragment, &wanted) {
            fragments.insert(fragment.to_string());
        }
    }
    fragments.into_iter().collect::<Vec<_>>().join(SEPARATOR)
}

/// Wrap every whole-word occurrence of a form in bold markers.
fn highlight(lemmatizer: &Lemmatizer, content: &str, forms: &HashSet<&str>) -> String {
    let mut out = String::with_capacity(content.len() + 64);
    let mut last = 0;
    for (start, word) in lemmatizer.word_spans(content) {
        if forms.contains(word) {
            out.push_str(&content[last..start]);
            out.push_str(OPEN);
            out.push_str(word);
            out.push_str(CLOSE);
            last = start + word.len();
        }
    }
    out.push_str(&content[last..]);
    out
}

/// Walk left until a quote or a tag that is not a bold marker.
fn window_start(doc: &str, mut i: usize) -> usize {
    let b = doc.as_bytes();
    while i > 0 {
        match b[i - 1] {
            b'>' if b[..i].ends_with(OPEN.as_bytes()) => i -= OPEN.len(),
            b'>' if b[..i].ends_with(CLOSE.as_bytes()) => i -= CLOSE.len(),
            b'>' | b'"' => break,
            _ => i -= 1,
        }
    }
    i
}

/// Walk right until a quote or a tag that is not a bold marker.
fn window_end(doc: &str, mut i: usize) -> usize {
    let b = doc.as_bytes();
    while i < b.len() {
        match b[i] {
            b'<' if b[i..].starts_with(OPEN.as_bytes()) => i += OPEN.len(),
            b'<' if b[i..].starts_with(CLOSE.as_bytes()) => i += CLOSE.len(),
            b'<' | b'"' => break,
            _ => i += 1,
        }
    }
    i
}

fn covers_query(lemmatizer: &Lemmatizer, fragment: &str, wanted: &[Vec<String>]) -> bool {
    let text = strip_tags(fragment);
    let words: HashSet<&str> = lemmatizer.words(&text).collect();
    wanted.iter().all(|forms| forms.iter().any(|f| words.contains(f.as_str())))
}

#[cfg(test)]
mod tests {
    use super::*;

    fn lemma(l: &Lemmatizer, word: &str) -> String {
        l.lemmatize(word).into_keys().next().unwrap()
    }

    #[test]
    fn bolds_every_form_of_the_query() {
        let l = Lemmatizer::russian();
        let html = "<html><body><p>Кошка ловит мышь, а кошки спят.</p></body></html>";
        let snippet = build_snippet(&l, html, &[lemma(&l, "кошка")]);
        assert_eq!(snippet, "<b>Кошка</b> ловит мышь, а <b>кошки</b> спят.");
    }

    #[test]
    fn drops_fragments_missing_a_lemma() {
        let l = Lemmatizer::russian();
        let html = "<body><p>кошка спит</p><p>собака лает</p><p>кошка и собака</p></body>";
        let snippet = build_snippet(&l, html, &[lemma(&l, "кошка"), lemma(&l, "собака")]);
        assert_eq!(snippet, "<b>кошка</b> и <b>собака</b>");
    }

    #[test]
    fn empty_when_lemma_absent() {
        let l = Lemmatizer::russian();
        let snippet = build_snippet(&l, "<p>кошка</p>", &[lemma(&l, "собака")]);
        assert!(snippet.is_empty());
    }

    #[test]
    fn quotes_bound_the_window() {
        let l = Lemmatizer::russian();
        let html = r#"<p>он сказал "кошка пришла" и ушел</p>"#;
        let snippet = build_snippet(&l, html, &[lemma(&l, "кошка")]);
        assert_eq!(snippet, "<b>кошка</b> пришла");
    }

    #[test]
    fn deduplicates_fragments() {
        let l = Lemmatizer::russian();
        let html = "<p>кошка и кошка</p>";
        let snippet = build_snippet(&l, html, &[lemma(&l, "кошка")]);
        assert_eq!(snippet, "<b>кошка</b> и <b>кошка</b>");
    }
}

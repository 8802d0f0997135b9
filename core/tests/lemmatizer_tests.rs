use sitesearch_core::lemmatizer::{Lemmatizer, Morphology, PartOfSpeech};
use std::sync::Arc;

#[test]
fn it_normalizes_case_and_yo() {
    let l = Lemmatizer::russian();
    let a = l.lemmatize("ЁЖИК");
    let b = l.lemmatize("ежик");
    assert_eq!(a, b);
    assert_eq!(a.len(), 1);
}

#[test]
fn it_filters_function_words() {
    let l = Lemmatizer::russian();
    let counts = l.lemmatize("Кошка и собака, но не мышь");
    assert_eq!(counts.len(), 3);
    assert_eq!(counts.values().sum::<usize>(), 3);
}

#[test]
fn it_treats_other_scripts_as_separators() {
    let l = Lemmatizer::russian();
    let words: Vec<&str> = l.words("cat-кошка42собака!").collect();
    assert_eq!(words, vec!["кошка", "собака"]);
    let spans: Vec<(usize, &str)> = l.word_spans("ab кот").collect();
    assert_eq!(spans, vec![(3, "кот")]);
}

struct Upper;

impl Morphology for Upper {
    fn is_word_char(&self, c: char) -> bool { c.is_ascii_alphabetic() }
    fn part_of_speech(&self, word: &str) -> PartOfSpeech {
        if word == "the" { PartOfSpeech::Particle } else { PartOfSpeech::Significant }
    }
    fn normal_forms(&self, word: &str) -> Vec<String> { vec![word.to_uppercase()] }
}

#[test]
fn it_accepts_other_morphologies() {
    let l = Lemmatizer::new(Arc::new(Upper));
    let counts = l.lemmatize("the Cat the cat");
    assert_eq!(counts.get("CAT"), Some(&2));
    assert_eq!(counts.len(), 1);
}

#[test]
fn it_is_shareable_across_threads() {
    let l = Lemmatizer::russian();
    let handles: Vec<_> = (0..4)
        .map(|_| {
            let l = l.clone();
            std::thread::spawn(move || l.lemmatize("кошки и собаки"))
        })
        .collect();
    let first = l.lemmatize("кошки и собаки");
    for h in handles {
        assert_eq!(h.join().unwrap(), first);
    }
}

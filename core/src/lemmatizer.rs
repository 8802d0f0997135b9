use lazy_static::lazy_static;
use rust_stemmers::{Algorithm, Stemmer};
use std::collections::{BTreeMap, BTreeSet, HashMap};
use std::sync::Arc;
use unicode_normalization::UnicodeNormalization;

/// Grammatical class of a word, as far as the lemmatizer cares.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PartOfSpeech {
    Conjunction,
    Preposition,
    Particle,
    Interjection,
    Significant,
}

impl PartOfSpeech {
    pub fn is_function_word(self) -> bool {
        !matches!(self, PartOfSpeech::Significant)
    }
}

/// Morphological dictionary for one natural language.
///
/// Implementations receive words already lowercased and restricted to the
/// language alphabet.
pub trait Morphology: Send + Sync {
    /// True for characters that can appear inside a word of this language.
    fn is_word_char(&self, c: char) -> bool;

    fn part_of_speech(&self, word: &str) -> PartOfSpeech;

    /// Base forms of `word`. Homonyms may yield more than one.
    fn normal_forms(&self, word: &str) -> Vec<String>;
}

lazy_static! {
    static ref RUSSIAN_STEMMER: Stemmer = Stemmer::create(Algorithm::Russian);
    static ref RUSSIAN_FUNCTION_WORDS: HashMap<&'static str, PartOfSpeech> = {
        use PartOfSpeech::*;
        let mut m = HashMap::new();
        let prepositions: &[&str] = &[
            "без","безо","в","во","вне","для","до","за","из","изо","к","ко","между",
            "на","над","надо","о","об","обо","около","от","ото","перед","передо","по","под","подо",
            "при","про","ради","с","со","сквозь","среди","у","через","чрез","вокруг","возле","мимо",
            "против","вдоль","после","кроме","вместо","внутри","сверх","путем","благодаря",
        ];
        let conjunctions: &[&str] = &[
            "и","а","но","да","или","либо","то","что","чтобы","чтоб","как","будто","словно",
            "если","хотя","хоть","пока","когда","потому","поэтому","зато","однако","тоже","также",
            "ибо","дабы","ежели","коли","раз","нежели","причем","притом","итак","затем","ни",
        ];
        let particles: &[&str] = &[
            "не","бы","б","ли","ль","же","ж","ведь","вот","вон","даже","уже","уж","лишь","только",
            "разве","неужели","именно","почти","ка","таки","де","мол","дескать","пусть",
            "пускай","давай","давайте","ну","еще","ещё","авось",
        ];
        let interjections: &[&str] = &[
            "ах","ох","эх","ой","ай","увы","ура","эй","ого","ага","ух","фу","тьфу","ау","браво",
            "алло","ахти","батюшки","ишь","цыц","тсс","чу",
        ];
        for w in prepositions { m.insert(*w, Preposition); }
        for w in conjunctions { m.entry(*w).or_insert(Conjunction); }
        for w in particles { m.entry(*w).or_insert(Particle); }
        for w in interjections { m.entry(*w).or_insert(Interjection); }
        m
    };
}

/// Russian morphology: function words come from a tagged dictionary, base
/// forms from the Snowball Russian stemmer.
#[derive(Debug, Default, Clone, Copy)]
pub struct RussianMorphology;

impl Morphology for RussianMorphology {
    fn is_word_char(&self, c: char) -> bool {
        matches!(c, 'а'..='я' | 'А'..='Я' | 'ё' | 'Ё')
    }

    fn part_of_speech(&self, word: &str) -> PartOfSpeech {
        RUSSIAN_FUNCTION_WORDS.get(word).copied().unwrap_or(PartOfSpeech::Significant)
    }

    fn normal_forms(&self, word: &str) -> Vec<String> {
        let stem = RUSSIAN_STEMMER.stem(&word.replace('ё', "е")).into_owned();
        if stem.is_empty() { vec![] } else { vec![stem] }
    }
}

/// Turns text into base forms. Pure and shareable across threads; the only
/// state is the read-only morphology.
#[derive(Clone)]
pub struct Lemmatizer {
    morphology: Arc<dyn Morphology>,
}

impl Default for Lemmatizer {
    fn default() -> Self { Self::russian() }
}

impl Lemmatizer {
    pub fn new(morphology: Arc<dyn Morphology>) -> Self {
        Self { morphology }
    }

    pub fn russian() -> Self {
        Self::new(Arc::new(RussianMorphology))
    }

    /// Base form -> number of occurrences. Characters outside the alphabet
    /// separate words; function words are dropped.
    pub fn lemmatize(&self, text: &str) -> BTreeMap<String, usize> {
        let mut counts = BTreeMap::new();
        for word in self.words(text) {
            let lower = normalize(word);
            for form in self.significant_forms(&lower) {
                *counts.entry(form).or_insert(0) += 1;
            }
        }
        counts
    }

    /// Base form -> every distinct surface form of it found in `text`,
    /// with the surface forms kept exactly as written.
    pub fn lemma_forms(&self, text: &str) -> BTreeMap<String, BTreeSet<String>> {
        let mut forms: BTreeMap<String, BTreeSet<String>> = BTreeMap::new();
        for word in self.words(text) {
            let lower = normalize(word);
            for form in self.significant_forms(&lower) {
                forms.entry(form).or_default().insert(word.to_string());
            }
        }
        forms
    }

    /// Maximal runs of alphabet characters, as slices of `text`.
    pub fn words<'a>(&'a self, text: &'a str) -> impl Iterator<Item = &'a str> + 'a {
        self.word_spans(text).map(|(_, word)| word)
    }

    /// Like [`Lemmatizer::words`], with the byte offset of each word.
    pub fn word_spans<'a>(&'a self, text: &'a str) -> impl Iterator<Item = (usize, &'a str)> + 'a {
        let mut chars = text.char_indices().peekable();
        std::iter::from_fn(move || {
            while chars.next_if(|&(_, c)| !self.morphology.is_word_char(c)).is_some() {}
            let &(start, _) = chars.peek()?;
            let mut end = start;
            while let Some((i, c)) = chars.next_if(|&(_, c)| self.morphology.is_word_char(c)) {
                end = i + c.len_utf8();
            }
            Some((start, &text[start..end]))
        })
    }

    fn significant_forms(&self, lower: &str) -> Vec<String> {
        if self.morphology.part_of_speech(lower).is_function_word() {
            return vec![];
        }
        self.morphology.normal_forms(lower)
    }
}

fn normalize(word: &str) -> String {
    word.nfkc().collect::<String>().to_lowercase()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn counts_inflected_forms_together() {
        let l = Lemmatizer::russian();
        let counts = l.lemmatize("Кошка видит кошку, кошки спят");
        let base = l.lemmatize("кошка");
        let key = base.keys().next().unwrap();
        assert_eq!(counts.get(key), Some(&3));
    }

    #[test]
    fn skips_function_words_and_foreign_text() {
        let l = Lemmatizer::russian();
        let counts = l.lemmatize("и в на cat 123 не");
        assert!(counts.is_empty());
    }

    #[test]
    fn keeps_surface_forms_as_written() {
        let l = Lemmatizer::russian();
        let forms = l.lemma_forms("Собака и собаки");
        assert_eq!(forms.len(), 1);
        let surface = forms.values().next().unwrap();
        assert!(surface.contains("Собака"));
        assert!(surface.contains("собаки"));
    }
}

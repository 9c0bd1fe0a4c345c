use std::collections::HashSet;
use unicode_normalization::UnicodeNormalization;

use crate::config::{AnalysisConfig, StopwordConfig};
use crate::tokenizer::{Language, Tokenizer};
use crate::TermPosition;

/// Particles, copulas, pronouns and conjunctions that carry little meaning on their own.
pub const DEFAULT_KOREAN_STOPWORDS: &[&str] = &[
    "이", "그", "저", "것", "의", "가", "을", "를", "에", "에서", "로", "으로",
    "은", "는", "이다", "있다", "하다", "되다", "수", "등", "및", "또는",
    "그리고", "하지만", "그러나", "따라서", "그래서",
];

pub const DEFAULT_ENGLISH_STOPWORDS: &[&str] = &[
    "a", "an", "and", "are", "as", "at", "be", "but", "by", "for", "from", "has", "have",
    "he", "if", "in", "into", "is", "it", "its", "of", "on", "or", "that", "the", "their",
    "there", "these", "they", "this", "those", "to", "was", "were", "will", "with",
];

/// Drops stopwords and too-short terms while keeping the survivors' positions.
#[derive(Debug, Clone)]
pub struct StopwordFilter {
    korean: HashSet<String>,
    english: HashSet<String>,
    min_len_hangul: usize,
    min_len_latin: usize,
}

impl StopwordFilter {
    pub fn new(config: &StopwordConfig) -> Self {
        Self {
            korean: config.korean.iter().map(|w| normalize(w)).collect(),
            english: config.english.iter().map(|w| normalize(w)).collect(),
            min_len_hangul: config.min_len_hangul,
            min_len_latin: config.min_len_latin,
        }
    }

    pub fn is_stopword(&self, term: &str) -> bool {
        match Language::of_term(term) {
            Language::Korean => self.korean.contains(term),
            Language::English => self.english.contains(term),
        }
    }

    fn keeps(&self, term: &str) -> bool {
        if term.chars().all(|c| c.is_numeric()) {
            return true;
        }
        if self.is_stopword(term) {
            return false;
        }
        let min = match Language::of_term(term) {
            Language::Korean => self.min_len_hangul,
            Language::English => self.min_len_latin,
        };
        term.chars().count() >= min
    }

    pub fn filter(&self, terms: Vec<TermPosition>) -> Vec<TermPosition> {
        terms.into_iter().filter(|(t, _)| self.keeps(t)).collect()
    }
}

impl Default for StopwordFilter {
    fn default() -> Self { Self::new(&StopwordConfig::default()) }
}

/// Same folding the tokenizer applies to a single word.
fn normalize(word: &str) -> String {
    word.trim().nfkc().collect::<String>().to_lowercase()
}

/// Tokenizer and stopword filter as one unit, so documents and queries are
/// always normalized identically.
#[derive(Debug, Clone, Default)]
pub struct Analyzer {
    tokenizer: Tokenizer,
    filter: StopwordFilter,
}

impl Analyzer {
    pub fn new(config: &AnalysisConfig) -> Self {
        Self { tokenizer: Tokenizer::new(config.tokenizer.clone()), filter: StopwordFilter::new(&config.stopwords) }
    }

    pub fn analyze(&self, text: &str, language_hint: Option<Language>) -> Vec<TermPosition> {
        self.filter.filter(self.tokenizer.tokenize(text, language_hint))
    }

    pub fn tokenizer(&self) -> &Tokenizer { &self.tokenizer }
    pub fn stopwords(&self) -> &StopwordFilter { &self.filter }
}

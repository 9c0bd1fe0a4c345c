use lazy_static::lazy_static;
use rust_stemmers::{Algorithm, Stemmer};
use serde::{Deserialize, Serialize};
use unicode_normalization::UnicodeNormalization;

use crate::config::{KoreanSegmentation, TokenizerConfig};
use crate::TermPosition;

lazy_static! {
    static ref STEMMER: Stemmer = Stemmer::create(Algorithm::English);
}

/// Trailing particles and copulas, longest first so the longest match wins.
const PARTICLES: &[&str] = &[
    "에서는", "에게서", "으로는", "입니다", "이라고",
    "까지", "부터", "에서", "에게", "으로", "처럼", "보다", "이다", "이며", "하고", "에는",
    "은", "는", "이", "가", "을", "를", "에", "의", "로", "와", "과", "도", "만",
];

/// Syllables that must remain after stripping a particle.
const MIN_STEM_SYLLABLES: usize = 2;

const RUNS_ONLY: KoreanSegmentation = KoreanSegmentation { emit_runs: true, strip_particles: false, bigrams: false };

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Language {
    Korean,
    English,
}

impl Language {
    /// Language a normalized term belongs to, judged by its first character.
    pub fn of_term(term: &str) -> Language {
        match term.chars().next() {
            Some(c) if is_hangul(c) => Language::Korean,
            _ => Language::English,
        }
    }
}

pub fn is_hangul(c: char) -> bool {
    matches!(c,
        '\u{AC00}'..='\u{D7A3}' // syllables
        | '\u{1100}'..='\u{11FF}' // jamo
        | '\u{3130}'..='\u{318F}' // compatibility jamo
        | '\u{A960}'..='\u{A97F}' // jamo extended-A
        | '\u{D7B0}'..='\u{D7FF}' // jamo extended-B
    )
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum CharClass {
    Hangul,
    Word,
    Separator,
}

impl CharClass {
    fn of(c: char) -> Self {
        if is_hangul(c) {
            CharClass::Hangul
        } else if c.is_alphanumeric() {
            CharClass::Word
        } else {
            CharClass::Separator
        }
    }
}

/// Splits text into normalized terms, each tagged with its emission position.
#[derive(Debug, Clone, Default)]
pub struct Tokenizer {
    config: TokenizerConfig,
}

impl Tokenizer {
    pub fn new(config: TokenizerConfig) -> Self { Self { config } }

    pub fn config(&self) -> &TokenizerConfig { &self.config }

    /// NFKC-normalizes `text` and emits `(term, position)` pairs.
    ///
    /// Runs of letters/digits become one lower-cased term. Hangul runs are
    /// segmented per [`KoreanSegmentation`]; an English hint keeps them whole.
    /// Everything else separates terms and is dropped.
    pub fn tokenize(&self, text: &str, language_hint: Option<Language>) -> Vec<TermPosition> {
        let normalized: String = text.nfkc().collect();
        let mut out = Vec::new();
        let mut run = String::new();
        let mut run_class = CharClass::Separator;
        for c in normalized.chars() {
            let class = CharClass::of(c);
            if class != run_class {
                self.flush(&run, run_class, language_hint, &mut out);
                run.clear();
                run_class = class;
            }
            if class != CharClass::Separator {
                run.push(c);
            }
        }
        self.flush(&run, run_class, language_hint, &mut out);
        out
    }

    fn flush(&self, run: &str, class: CharClass, hint: Option<Language>, out: &mut Vec<TermPosition>) {
        if run.is_empty() {
            return;
        }
        match class {
            CharClass::Word => {
                let lower = run.to_lowercase();
                let term = if self.config.stem_english && lower.chars().all(|c| c.is_ascii_alphabetic()) {
                    STEMMER.stem(&lower).into_owned()
                } else {
                    lower
                };
                push(out, term);
            }
            CharClass::Hangul => {
                let seg = match hint {
                    Some(Language::English) => &RUNS_ONLY,
                    _ => &self.config.korean,
                };
                segment_hangul(run, seg, out);
            }
            CharClass::Separator => {}
        }
    }
}

fn push(out: &mut Vec<TermPosition>, term: String) {
    let pos = out.len();
    out.push((term, pos));
}

fn segment_hangul(run: &str, seg: &KoreanSegmentation, out: &mut Vec<TermPosition>) {
    let syllables: Vec<char> = run.chars().collect();
    let start = out.len();
    let mut whole: Vec<String> = Vec::with_capacity(2);
    if seg.emit_runs {
        whole.push(run.to_string());
        push(out, run.to_string());
    }
    if seg.strip_particles {
        if let Some(stem) = strip_particle(run, syllables.len()) {
            if !whole.contains(&stem) {
                whole.push(stem.clone());
                push(out, stem);
            }
        }
    }
    if seg.bigrams && syllables.len() >= 2 {
        for pair in syllables.windows(2) {
            let bigram: String = pair.iter().collect();
            if !whole.contains(&bigram) {
                push(out, bigram);
            }
        }
    }
    if out.len() == start {
        push(out, run.to_string());
    }
}

/// Longest trailing particle removal, keeping at least two syllables.
fn strip_particle(run: &str, syllables: usize) -> Option<String> {
    PARTICLES.iter().find_map(|p| {
        let n = p.chars().count();
        if syllables >= n + MIN_STEM_SYLLABLES && run.ends_with(p) {
            Some(run[..run.len() - p.len()].to_string())
        } else {
            None
        }
    })
}

/// Tokenize with the default configuration and no language hint.
pub fn tokenize(text: &str) -> Vec<TermPosition> {
    Tokenizer::default().tokenize(text, None)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn terms(t: &[TermPosition]) -> Vec<&str> {
        t.iter().map(|(w, _)| w.as_str()).collect()
    }

    #[test]
    fn empty_and_blank_input() {
        assert!(tokenize("").is_empty());
        assert!(tokenize("  \t\n ").is_empty());
        assert!(tokenize("\u{0}\u{7}--!!").is_empty());
    }

    #[test]
    fn latin_is_case_folded_and_split_on_punctuation() {
        let t = tokenize("Project-Meeting, TOMORROW!");
        assert_eq!(terms(&t), vec!["project", "meeting", "tomorrow"]);
        assert_eq!(t.iter().map(|(_, p)| *p).collect::<Vec<_>>(), vec![0, 1, 2]);
    }

    #[test]
    fn mixed_alphanumerics_stay_whole() {
        assert_eq!(terms(&tokenize("rev2024b v1.2")), vec!["rev2024b", "v1", "2"]);
    }

    #[test]
    fn hangul_run_particle_and_bigrams() {
        let t = tokenize("일정은");
        assert_eq!(terms(&t), vec!["일정은", "일정", "정은"]);
    }

    #[test]
    fn two_syllable_run_is_not_duplicated() {
        assert_eq!(terms(&tokenize("회의")), vec!["회의"]);
    }

    #[test]
    fn copula_is_stripped_by_longest_match() {
        let t = tokenize("내일입니다");
        assert!(terms(&t).contains(&"내일"));
        assert!(!terms(&t).contains(&"내일입니"));
    }

    #[test]
    fn script_change_splits_terms() {
        assert_eq!(terms(&tokenize("서울2024")), vec!["서울", "2024"]);
    }

    #[test]
    fn english_hint_keeps_hangul_runs_whole() {
        let t = Tokenizer::default().tokenize("일정은 meeting", Some(Language::English));
        assert_eq!(terms(&t), vec!["일정은", "meeting"]);
    }

    #[test]
    fn stemming_is_opt_in() {
        let tk = Tokenizer::new(TokenizerConfig { stem_english: true, ..Default::default() });
        assert_eq!(terms(&tk.tokenize("Running", None)), vec!["run"]);
        assert_eq!(terms(&tokenize("Running")), vec!["running"]);
    }

    #[test]
    fn fullwidth_forms_normalize() {
        assert_eq!(terms(&tokenize("ＡＢＣ")), vec!["abc"]);
    }
}

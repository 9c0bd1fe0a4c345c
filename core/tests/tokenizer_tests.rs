use docsearch::config::TokenizerConfig;
use docsearch::tokenizer::tokenize;
use docsearch::{Analyzer, Language, SearchConfig, Tokenizer};

fn words(terms: Vec<(String, usize)>) -> Vec<String> { terms.into_iter().map(|(w, _)| w).collect() }

#[test]
fn it_filters_stopwords_and_keeps_positions() {
    let terms = Analyzer::default().analyze("The quick brown fox and the lazy dog", None);
    let ws: Vec<&str> = terms.iter().map(|(w, _)| w.as_str()).collect();
    assert!(!ws.contains(&"the"));
    assert!(!ws.contains(&"and"));
    assert!(terms.contains(&("quick".to_string(), 1)));
    assert!(terms.contains(&("lazy".to_string(), 6)));
}

#[test]
fn it_stems_when_enabled() {
    let config = SearchConfig {
        tokenizer: TokenizerConfig { stem_english: true, ..TokenizerConfig::default() },
        ..SearchConfig::default()
    };
    let ws = words(Analyzer::new(&config.analysis()).analyze("Running RUNS", None));
    assert_eq!(ws, vec!["run", "run"]);
}

#[test]
fn korean_particles_and_bigrams() {
    let ws = words(Analyzer::default().analyze("회의 일정은 내일입니다", None));
    assert!(ws.contains(&"회의".to_string()));
    assert!(ws.contains(&"일정".to_string()));
    assert!(ws.contains(&"일정은".to_string()));
    assert!(ws.contains(&"내일".to_string()));
}

#[test]
fn mixed_script_splits_at_boundary() {
    let ws = words(tokenize("Q3보고서 draft"));
    assert_eq!(ws[0], "q3");
    assert!(ws.contains(&"보고서".to_string()));
    assert_eq!(ws.last().map(String::as_str), Some("draft"));
}

#[test]
fn english_hint_keeps_hangul_whole() {
    let tok = Tokenizer::new(TokenizerConfig::default());
    assert_eq!(words(tok.tokenize("일정은", Some(Language::English))), vec!["일정은"]);
}

#[test]
fn positions_strictly_increase() {
    let terms = tokenize("회의 일정은 내일입니다 and the project meeting");
    assert!(terms.windows(2).all(|w| w[0].1 < w[1].1));
}

use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};
use std::fs::File;
use std::io::BufReader;
use std::path::Path;

use crate::error::IndexError;
use crate::stopwords::{DEFAULT_ENGLISH_STOPWORDS, DEFAULT_KOREAN_STOPWORDS};

/// Everything the engine can be tuned with, supplied once at
/// [`IndexManager`](crate::IndexManager) construction.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct SearchConfig {
    pub tokenizer: TokenizerConfig,
    pub stopwords: StopwordConfig,
    pub scoring: ScoringConfig,
    /// Snippet width in characters.
    pub snippet_window: usize,
    /// Result count used when a search does not ask for one.
    pub top_k: usize,
    /// Size of the extraction/tokenization worker pool.
    pub workers: usize,
}

impl Default for SearchConfig {
    fn default() -> Self {
        Self {
            tokenizer: TokenizerConfig::default(),
            stopwords: StopwordConfig::default(),
            scoring: ScoringConfig::default(),
            snippet_window: 150,
            top_k: 50,
            workers: 4,
        }
    }
}

impl SearchConfig {
    pub fn from_json_file<P: AsRef<Path>>(path: P) -> Result<Self> {
        let path = path.as_ref();
        let f = File::open(path).with_context(|| format!("opening config {}", path.display()))?;
        let config: SearchConfig = serde_json::from_reader(BufReader::new(f))
            .with_context(|| format!("parsing config {}", path.display()))?;
        config.validate()?;
        Ok(config)
    }

    pub fn validate(&self) -> Result<(), IndexError> {
        if self.snippet_window == 0 {
            return Err(IndexError::InvalidConfig("snippet_window must be positive".into()));
        }
        if self.top_k == 0 {
            return Err(IndexError::InvalidConfig("top_k must be positive".into()));
        }
        if self.workers == 0 {
            return Err(IndexError::InvalidConfig("workers must be positive".into()));
        }
        if self.scoring.proximity_boost < 0.0 || !self.scoring.proximity_boost.is_finite() {
            return Err(IndexError::InvalidConfig("proximity_boost must be a non-negative number".into()));
        }
        let k = &self.tokenizer.korean;
        if !(k.emit_runs || k.strip_particles || k.bigrams) {
            return Err(IndexError::InvalidConfig("korean segmentation must emit at least one kind of term".into()));
        }
        Ok(())
    }

    /// The part of the configuration that decides which terms a text produces.
    /// A stored index is only reusable under an identical analysis config.
    pub fn analysis(&self) -> AnalysisConfig {
        AnalysisConfig { tokenizer: self.tokenizer.clone(), stopwords: self.stopwords.clone() }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AnalysisConfig {
    pub tokenizer: TokenizerConfig,
    pub stopwords: StopwordConfig,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct TokenizerConfig {
    pub korean: KoreanSegmentation,
    /// Reduce English words to their Snowball stem.
    pub stem_english: bool,
}

/// How contiguous Hangul syllable runs are split into terms.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct KoreanSegmentation {
    /// Emit the whole run (`일정은`).
    pub emit_runs: bool,
    /// Emit the run with its trailing particle removed (`일정`).
    pub strip_particles: bool,
    /// Emit overlapping syllable bigrams (`일정`, `정은`).
    pub bigrams: bool,
}

impl Default for KoreanSegmentation {
    fn default() -> Self { Self { emit_runs: true, strip_particles: true, bigrams: true } }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct StopwordConfig {
    pub korean: Vec<String>,
    pub english: Vec<String>,
    /// Minimum length, in characters, of a Hangul term.
    pub min_len_hangul: usize,
    /// Minimum length, in characters, of any other term.
    pub min_len_latin: usize,
}

impl Default for StopwordConfig {
    fn default() -> Self {
        Self {
            korean: DEFAULT_KOREAN_STOPWORDS.iter().map(|s| s.to_string()).collect(),
            english: DEFAULT_ENGLISH_STOPWORDS.iter().map(|s| s.to_string()).collect(),
            min_len_hangul: 1,
            min_len_latin: 2,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum IdfMode {
    /// `ln(N / (1 + df))`
    Standard,
    /// `ln(1 + N / (1 + df))`
    Smoothed,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ScoringConfig {
    pub idf: IdfMode,
    /// Largest position gap between consecutive query terms that still earns a bonus.
    pub proximity_window: usize,
    /// Bonus for two query terms at adjacent positions; shrinks linearly with the gap.
    pub proximity_boost: f64,
}

impl Default for ScoringConfig {
    fn default() -> Self { Self { idf: IdfMode::Smoothed, proximity_window: 4, proximity_boost: 0.25 } }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;

    #[test]
    fn defaults_are_valid() {
        SearchConfig::default().validate().unwrap();
    }

    #[test]
    fn partial_json_fills_defaults() {
        let mut f = tempfile::NamedTempFile::new().unwrap();
        write!(f, r#"{{"top_k": 5, "scoring": {{"idf": "standard"}}}}"#).unwrap();
        let cfg = SearchConfig::from_json_file(f.path()).unwrap();
        assert_eq!(cfg.top_k, 5);
        assert_eq!(cfg.scoring.idf, IdfMode::Standard);
        assert_eq!(cfg.scoring.proximity_window, 4);
        assert_eq!(cfg.snippet_window, 150);
        assert!(cfg.stopwords.english.iter().any(|w| w == "the"));
    }

    #[test]
    fn rejects_zero_window() {
        let cfg = SearchConfig { snippet_window: 0, ..SearchConfig::default() };
        assert!(matches!(cfg.validate(), Err(IndexError::InvalidConfig(_))));
    }

    #[test]
    fn rejects_segmentation_that_emits_nothing() {
        let mut cfg = SearchConfig::default();
        cfg.tokenizer.korean = KoreanSegmentation { emit_runs: false, strip_particles: false, bigrams: false };
        assert!(cfg.validate().is_err());
    }
}

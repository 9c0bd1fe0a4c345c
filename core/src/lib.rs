//! In-memory full-text search over a mixed Korean/English document corpus.
//!
//! Text flows through [`Analyzer`] (tokenizer + stopword filter) into an
//! [`InvertedIndex`]; queries take the same path and are ranked by
//! [`QueryEngine`], then excerpted by [`Highlighter`]. [`IndexManager`] owns
//! the whole lifecycle and is the entry point for callers.

pub mod config;
pub mod error;
pub mod highlight;
pub mod index;
pub mod manager;
pub mod persist;
pub mod query;
pub mod source;
pub mod stopwords;
pub mod tokenizer;

use serde::{Deserialize, Serialize};
use std::collections::BTreeSet;
use std::path::Path;
use std::time::SystemTime;

pub use config::SearchConfig;
pub use error::{IndexError, Result};
pub use highlight::{Highlighter, Snippet};
pub use index::{InvertedIndex, Posting, PostingList};
pub use manager::{IndexEvent, IndexFailure, IndexManager, IndexReport, IndexStats, ManagerState, Progress, RebuildHandle};
pub use query::{QueryEngine, ScoredDocument};
pub use source::{DocumentKind, ExtractionError, FailedExtraction, TextSource};
pub use stopwords::{Analyzer, StopwordFilter};
pub use tokenizer::{Language, Tokenizer};

/// Stable identifier of a document, usually the file path it was extracted from.
pub type DocId = String;

/// A term and the position it was emitted at.
pub type TermPosition = (String, usize);

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Document {
    pub id: DocId,
    pub path: String,
    pub text: String,
    pub last_modified: Option<SystemTime>,
}

impl Document {
    pub fn new(id: impl Into<DocId>, text: impl Into<String>) -> Self {
        let id = id.into();
        Self { path: id.clone(), id, text: text.into(), last_modified: None }
    }

    pub fn with_path(mut self, path: impl Into<String>) -> Self {
        self.path = path.into();
        self
    }

    pub fn with_last_modified(mut self, at: SystemTime) -> Self {
        self.last_modified = Some(at);
        self
    }

    /// File name component of `path`, falling back to the whole path.
    pub fn file_name(&self) -> &str {
        Path::new(&self.path).file_name().and_then(|s| s.to_str()).unwrap_or(&self.path)
    }

    pub fn kind(&self) -> DocumentKind { DocumentKind::from_path(&self.path) }
}

/// One ranked hit, ready for a presentation layer.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SearchResult {
    pub document_id: DocId,
    pub path: String,
    pub score: f64,
    pub matched_terms: BTreeSet<String>,
    pub snippet: String,
    /// Byte ranges of `snippet` that matched a query term.
    pub match_spans: Vec<(usize, usize)>,
}

impl SearchResult {
    /// The snippet with every matched span wrapped in `open`/`close`.
    pub fn render(&self, open: &str, close: &str) -> String {
        Snippet { text: self.snippet.clone(), spans: self.match_spans.clone(), ..Snippet::default() }.render(open, close)
    }
}

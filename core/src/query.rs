use std::collections::{BTreeSet, HashMap, HashSet};

use crate::config::{IdfMode, ScoringConfig};
use crate::error::{IndexError, Result};
use crate::index::InvertedIndex;
use crate::{DocId, TermPosition};

/// A ranked candidate before snippets are attached.
#[derive(Debug, Clone, PartialEq)]
pub struct ScoredDocument {
    pub document_id: DocId,
    pub score: f64,
    pub matched_terms: BTreeSet<String>,
}

#[derive(Default)]
struct Accumulator<'a> {
    score: f64,
    matched: Vec<&'a str>,
    positions: HashMap<&'a str, &'a [usize]>,
}

/// TF-IDF ranking over an [`InvertedIndex`] with a proximity bonus.
#[derive(Debug, Clone, Default)]
pub struct QueryEngine {
    config: ScoringConfig,
}

impl QueryEngine {
    pub fn new(config: ScoringConfig) -> Self { Self { config } }

    fn idf(&self, total_docs: usize, doc_freq: usize) -> f64 {
        let ratio = total_docs as f64 / (1.0 + doc_freq as f64);
        match self.config.idf {
            IdfMode::Standard => ratio.ln(),
            IdfMode::Smoothed => (1.0 + ratio).ln(),
        }
    }

    /// Rank documents matching any of the analyzed query `terms`, best first.
    ///
    /// Documents matching more distinct terms come first, then higher score,
    /// then lower id. An empty term list yields no results.
    pub fn rank(&self, index: &InvertedIndex, terms: &[TermPosition], top_k: usize) -> Result<Vec<ScoredDocument>> {
        let mut seen = HashSet::new();
        let query: Vec<&str> = terms.iter().map(|(t, _)| t.as_str()).filter(|t| seen.insert(*t)).collect();
        if query.is_empty() || top_k == 0 {
            return Ok(Vec::new());
        }

        let n = index.document_count();
        let mut acc: HashMap<&str, Accumulator> = HashMap::new();
        for &term in &query {
            let Some(list) = index.lookup(term) else { continue };
            let idf = self.idf(n, list.len());
            for posting in list.iter() {
                let id = posting.document_id.as_str();
                let len = index.document_length(id).ok_or_else(|| {
                    IndexError::IndexCorruption(format!("term `{term}` references unknown document `{id}`"))
                })?;
                if len == 0 {
                    return Err(IndexError::IndexCorruption(format!("document `{id}` has postings but zero length")));
                }
                let tf = posting.term_frequency as f64 / len as f64;
                let entry = acc.entry(id).or_default();
                entry.score += tf * idf;
                entry.matched.push(term);
                entry.positions.insert(term, posting.positions.as_slice());
            }
        }

        let mut ranked: Vec<(usize, ScoredDocument)> = acc
            .into_iter()
            .map(|(id, a)| {
                let bonus = self.proximity_bonus(&query, &a.positions);
                let doc = ScoredDocument {
                    document_id: id.to_string(),
                    score: a.score + bonus,
                    matched_terms: a.matched.iter().map(|t| t.to_string()).collect(),
                };
                (a.matched.len(), doc)
            })
            .collect();
        ranked.sort_by(|(ma, a), (mb, b)| {
            mb.cmp(ma)
                .then_with(|| b.score.total_cmp(&a.score))
                .then_with(|| a.document_id.cmp(&b.document_id))
        });
        ranked.truncate(top_k);
        tracing::debug!(terms = query.len(), hits = ranked.len(), "ranked query");
        Ok(ranked.into_iter().map(|(_, d)| d).collect())
    }

    /// Reward consecutive query terms that occur close together, in order.
    fn proximity_bonus(&self, query: &[&str], positions: &HashMap<&str, &[usize]>) -> f64 {
        let window = self.config.proximity_window;
        if window == 0 || self.config.proximity_boost == 0.0 {
            return 0.0;
        }
        query
            .windows(2)
            .filter_map(|pair| {
                let a = positions.get(pair[0])?;
                let b = positions.get(pair[1])?;
                let gap = min_forward_gap(a, b)?;
                (gap <= window).then(|| self.config.proximity_boost * (window + 1 - gap) as f64 / window as f64)
            })
            .sum()
    }
}

/// Smallest `b - a` over `b > a`, both lists ascending.
fn min_forward_gap(a: &[usize], b: &[usize]) -> Option<usize> {
    let mut best: Option<usize> = None;
    let mut j = 0;
    for &pa in a {
        while j < b.len() && b[j] <= pa {
            j += 1;
        }
        if j == b.len() {
            break;
        }
        let gap = b[j] - pa;
        best = Some(best.map_or(gap, |g| g.min(gap)));
    }
    best
}

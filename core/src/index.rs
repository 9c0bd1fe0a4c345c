use serde::{Deserialize, Serialize};
use std::collections::btree_map;
use std::collections::{BTreeMap, HashMap};

use crate::error::{IndexError, Result};
use crate::{DocId, TermPosition};

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Posting {
    pub document_id: DocId,
    pub term_frequency: u32,
    /// Ascending term positions within the document.
    pub positions: Vec<usize>,
}

/// All postings of a single term, keyed by document.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct PostingList {
    postings: BTreeMap<DocId, Posting>,
}

impl PostingList {
    pub fn get(&self, id: &str) -> Option<&Posting> { self.postings.get(id) }
    pub fn contains(&self, id: &str) -> bool { self.postings.contains_key(id) }
    pub fn len(&self) -> usize { self.postings.len() }
    pub fn is_empty(&self) -> bool { self.postings.is_empty() }
    pub fn iter(&self) -> btree_map::Values<'_, DocId, Posting> { self.postings.values() }
}

/// Term → postings map with per-document lengths.
///
/// Documents are added whole and removed whole; updating one means removing
/// it first. A reverse map of each document's vocabulary keeps removal
/// proportional to the document rather than the dictionary.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct InvertedIndex {
    postings: HashMap<String, PostingList>,
    doc_lengths: HashMap<DocId, usize>,
    doc_terms: HashMap<DocId, Vec<String>>,
    num_docs: usize,
}

impl InvertedIndex {
    pub fn new() -> Self { Self::default() }

    /// Index `terms` under `id`. Fails without touching the index if `id` is present.
    pub fn add_document(&mut self, id: &str, terms: &[TermPosition]) -> Result<()> {
        if self.doc_lengths.contains_key(id) {
            return Err(IndexError::DuplicateDocument(id.to_string()));
        }
        let mut grouped: BTreeMap<&str, Vec<usize>> = BTreeMap::new();
        for (term, pos) in terms {
            grouped.entry(term.as_str()).or_default().push(*pos);
        }
        let mut vocabulary = Vec::with_capacity(grouped.len());
        for (term, mut positions) in grouped {
            positions.sort_unstable();
            let posting = Posting {
                document_id: id.to_string(),
                term_frequency: positions.len() as u32,
                positions,
            };
            self.postings.entry(term.to_string()).or_default().postings.insert(id.to_string(), posting);
            vocabulary.push(term.to_string());
        }
        self.doc_lengths.insert(id.to_string(), terms.len());
        self.doc_terms.insert(id.to_string(), vocabulary);
        self.num_docs += 1;
        Ok(())
    }

    /// Remove every posting of `id`. Returns false if it was not indexed.
    pub fn remove_document(&mut self, id: &str) -> bool {
        if self.doc_lengths.remove(id).is_none() {
            return false;
        }
        for term in self.doc_terms.remove(id).unwrap_or_default() {
            if let Some(list) = self.postings.get_mut(&term) {
                list.postings.remove(id);
                if list.is_empty() {
                    self.postings.remove(&term);
                }
            }
        }
        self.num_docs -= 1;
        true
    }

    pub fn lookup(&self, term: &str) -> Option<&PostingList> { self.postings.get(term) }

    pub fn document_count(&self) -> usize { self.num_docs }

    pub fn document_length(&self, id: &str) -> Option<usize> { self.doc_lengths.get(id).copied() }

    pub fn contains(&self, id: &str) -> bool { self.doc_lengths.contains_key(id) }

    /// Number of distinct terms.
    pub fn term_count(&self) -> usize { self.postings.len() }

    pub fn total_tokens(&self) -> usize { self.doc_lengths.values().sum() }

    pub fn document_ids(&self) -> impl Iterator<Item = &DocId> { self.doc_lengths.keys() }

    /// Walk the whole structure and report the first inconsistency found.
    pub fn check_invariants(&self) -> Result<()> {
        if self.num_docs != self.doc_lengths.len() {
            return Err(corruption(format!(
                "document counter is {} but {} lengths are recorded",
                self.num_docs,
                self.doc_lengths.len()
            )));
        }
        for (term, list) in &self.postings {
            if list.is_empty() {
                return Err(corruption(format!("term `{term}` has an empty posting list")));
            }
            for (id, posting) in &list.postings {
                if !self.doc_lengths.contains_key(id) {
                    return Err(corruption(format!("term `{term}` references unknown document `{id}`")));
                }
                if posting.document_id != *id {
                    return Err(corruption(format!("posting under `{id}` claims document `{}`", posting.document_id)));
                }
                if posting.term_frequency as usize != posting.positions.len() {
                    return Err(corruption(format!("term `{term}` in `{id}`: frequency does not match positions")));
                }
            }
        }
        for (id, vocabulary) in &self.doc_terms {
            if !self.doc_lengths.contains_key(id) {
                return Err(corruption(format!("vocabulary kept for unknown document `{id}`")));
            }
            for term in vocabulary {
                if !self.postings.get(term).is_some_and(|l| l.contains(id)) {
                    return Err(corruption(format!("document `{id}` lists term `{term}` without a posting")));
                }
            }
        }
        Ok(())
    }
}

fn corruption(msg: String) -> IndexError {
    tracing::error!(%msg, "inverted index invariant violated");
    IndexError::IndexCorruption(msg)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::tokenizer::tokenize;

    #[test]
    fn term_frequency_and_positions() {
        let mut idx = InvertedIndex::new();
        idx.add_document("C", &tokenize("apple apple banana")).unwrap();
        assert_eq!(idx.document_length("C"), Some(3));
        let p = idx.lookup("apple").unwrap().get("C").unwrap();
        assert_eq!(p.term_frequency, 2);
        assert_eq!(p.positions, vec![0, 1]);
        idx.check_invariants().unwrap();
    }

    #[test]
    fn duplicate_add_is_rejected_and_harmless() {
        let mut idx = InvertedIndex::new();
        idx.add_document("a", &tokenize("one two")).unwrap();
        let err = idx.add_document("a", &tokenize("three")).unwrap_err();
        assert!(matches!(err, IndexError::DuplicateDocument(id) if id == "a"));
        assert!(idx.lookup("three").is_none());
        assert_eq!(idx.document_count(), 1);
    }

    #[test]
    fn removal_prunes_empty_terms() {
        let mut idx = InvertedIndex::new();
        idx.add_document("a", &tokenize("shared alpha")).unwrap();
        idx.add_document("b", &tokenize("shared beta")).unwrap();
        assert!(idx.remove_document("a"));
        assert!(idx.lookup("alpha").is_none());
        assert!(!idx.lookup("shared").unwrap().contains("a"));
        assert_eq!(idx.term_count(), 2);
        assert!(!idx.remove_document("a"));
        idx.check_invariants().unwrap();
    }

    #[test]
    fn empty_document_is_counted() {
        let mut idx = InvertedIndex::new();
        idx.add_document("blank", &[]).unwrap();
        assert_eq!(idx.document_count(), 1);
        assert_eq!(idx.document_length("blank"), Some(0));
        assert_eq!(idx.term_count(), 0);
    }

    #[test]
    fn detects_dangling_posting() {
        let mut idx = InvertedIndex::new();
        idx.add_document("a", &tokenize("alpha")).unwrap();
        idx.doc_lengths.remove("a");
        idx.num_docs = 0;
        assert!(matches!(idx.check_invariants(), Err(IndexError::IndexCorruption(_))));
    }
}

use crossbeam_channel::{unbounded, Receiver, Sender};
use parking_lot::{Mutex, RwLock};
use rayon::prelude::*;
use rayon::{ThreadPool, ThreadPoolBuilder};
use serde::{Deserialize, Serialize};
use std::collections::{BTreeMap, HashMap};
use std::path::Path;
use std::sync::atomic::{AtomicBool, AtomicU64, AtomicUsize, Ordering};
use std::sync::Arc;
use std::thread::JoinHandle;
use tokio_util::sync::CancellationToken;

use crate::config::SearchConfig;
use crate::error::{IndexError, Result};
use crate::highlight::{Highlighter, Snippet};
use crate::index::InvertedIndex;
use crate::persist::Snapshot;
use crate::query::{QueryEngine, ScoredDocument};
use crate::source::{DocumentKind, TextSource};
use crate::stopwords::Analyzer;
use crate::{DocId, Document, SearchResult, TermPosition};

const SNIPPET_SEPARATOR: &str = " ... ";

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ManagerState {
    Idle,
    Indexing,
    Rebuilding,
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct Progress {
    pub processed: usize,
    pub total: usize,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct IndexFailure {
    pub document_id: DocId,
    pub reason: String,
}

/// Outcome of a batch or rebuild. Per-document failures never abort the run.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct IndexReport {
    pub generation: u64,
    pub indexed: usize,
    pub failures: Vec<IndexFailure>,
    /// A newer rebuild took over before this one could be applied.
    pub superseded: bool,
}

#[derive(Debug, Clone, PartialEq)]
pub enum IndexEvent {
    Started { generation: u64, total: usize },
    Progress { generation: u64, processed: usize, total: usize },
    DocumentFailed { generation: u64, failure: IndexFailure },
    Finished { generation: u64, indexed: usize, failed: usize },
    Superseded { generation: u64 },
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct IndexStats {
    pub documents: usize,
    pub terms: usize,
    pub total_tokens: usize,
    pub average_length: f64,
    pub by_kind: BTreeMap<DocumentKind, usize>,
}

struct Prepared {
    doc: Arc<Document>,
    terms: Vec<TermPosition>,
}

enum JournalOp {
    Upsert(Arc<Document>, Vec<TermPosition>),
    Remove(DocId),
}

/// Incremental changes made while a rebuild is computing its fresh index.
struct Journal {
    generation: u64,
    ops: Vec<JournalOp>,
}

/// The index together with the texts it was built from, behind one lock.
#[derive(Default)]
struct Catalog {
    index: InvertedIndex,
    documents: HashMap<DocId, Arc<Document>>,
    journal: Option<Journal>,
}

impl Catalog {
    fn upsert(&mut self, doc: Arc<Document>, terms: &[TermPosition]) -> Result<()> {
        self.index.remove_document(&doc.id);
        self.index.add_document(&doc.id, terms)?;
        self.documents.insert(doc.id.clone(), doc);
        Ok(())
    }

    fn remove(&mut self, id: &str) -> bool {
        let indexed = self.index.remove_document(id);
        self.documents.remove(id).is_some() || indexed
    }

    /// Drop `id` after its new version could not be read.
    fn evict(&mut self, id: &str) -> bool {
        self.record(|| JournalOp::Remove(id.to_string()));
        self.remove(id)
    }

    fn record(&mut self, op: impl FnOnce() -> JournalOp) {
        if let Some(journal) = self.journal.as_mut() {
            journal.ops.push(op());
        }
    }

    fn apply(&mut self, op: JournalOp) -> Result<()> {
        match op {
            JournalOp::Upsert(doc, terms) => self.upsert(doc, &terms),
            JournalOp::Remove(id) => {
                self.remove(&id);
                Ok(())
            }
        }
    }

    fn check(&self) -> Result<()> {
        self.index.check_invariants()?;
        if self.documents.len() != self.index.document_count() {
            return Err(IndexError::IndexCorruption(format!(
                "{} stored documents but {} indexed",
                self.documents.len(),
                self.index.document_count()
            )));
        }
        if let Some(id) = self.documents.keys().find(|id| !self.index.contains(id)) {
            return Err(IndexError::IndexCorruption(format!("stored document `{id}` is not indexed")));
        }
        Ok(())
    }
}

struct Active<'a>(&'a AtomicUsize);

impl<'a> Active<'a> {
    fn enter(counter: &'a AtomicUsize) -> Self {
        counter.fetch_add(1, Ordering::SeqCst);
        Active(counter)
    }
}

impl Drop for Active<'_> {
    fn drop(&mut self) { self.0.fetch_sub(1, Ordering::SeqCst); }
}

struct Inner {
    config: SearchConfig,
    analyzer: Analyzer,
    engine: QueryEngine,
    highlighter: Highlighter,
    pool: ThreadPool,
    catalog: RwLock<Catalog>,
    generation: AtomicU64,
    active_rebuilds: AtomicUsize,
    active_updates: AtomicUsize,
    processed: AtomicUsize,
    total: AtomicUsize,
    failures: Mutex<Vec<IndexFailure>>,
    rebuild_token: Mutex<Option<CancellationToken>>,
    subscribers: Mutex<Vec<Sender<IndexEvent>>>,
    recovering: AtomicBool,
}

impl Inner {
    fn publish(&self, event: IndexEvent) {
        self.subscribers.lock().retain(|tx| tx.send(event.clone()).is_ok());
    }

    fn begin_progress(&self, total: usize) {
        self.processed.store(0, Ordering::SeqCst);
        self.total.store(total, Ordering::SeqCst);
    }

    fn prepare(&self, source: &dyn TextSource) -> std::result::Result<Prepared, IndexFailure> {
        let text = source.extract().map_err(|e| IndexFailure { document_id: source.id().to_string(), reason: e.to_string() })?;
        let terms = self.analyzer.analyze(&text, source.language_hint());
        let doc = Document {
            id: source.id().to_string(),
            path: source.path().to_string(),
            text,
            last_modified: source.last_modified(),
        };
        Ok(Prepared { doc: Arc::new(doc), terms })
    }

    /// Extract and analyze on the worker pool, outside any lock. Input order is kept.
    fn prepare_all(
        &self,
        generation: u64,
        sources: &[Arc<dyn TextSource>],
        token: Option<&CancellationToken>,
        track_progress: bool,
    ) -> Vec<std::result::Result<Prepared, IndexFailure>> {
        let total = sources.len();
        let done = AtomicUsize::new(0);
        self.pool.install(|| {
            sources
                .par_iter()
                .filter_map(|source| {
                    if token.is_some_and(|t| t.is_cancelled()) {
                        return None;
                    }
                    let item = self.prepare(&**source);
                    if let Err(failure) = &item {
                        tracing::warn!(document_id = %failure.document_id, reason = %failure.reason, "skipping document");
                        self.publish(IndexEvent::DocumentFailed { generation, failure: failure.clone() });
                    }
                    let processed = done.fetch_add(1, Ordering::SeqCst) + 1;
                    if track_progress {
                        self.processed.fetch_add(1, Ordering::SeqCst);
                    }
                    self.publish(IndexEvent::Progress { generation, processed, total });
                    Some(item)
                })
                .collect()
        })
    }

    fn run_rebuild(&self, generation: u64, sources: Vec<Arc<dyn TextSource>>, token: &CancellationToken) -> IndexReport {
        let total = sources.len();
        self.begin_progress(total);
        self.failures.lock().clear();
        self.publish(IndexEvent::Started { generation, total });
        tracing::info!(generation, total, "rebuild started");

        let prepared = self.prepare_all(generation, &sources, Some(token), true);
        if token.is_cancelled() {
            return self.superseded(generation);
        }

        let mut fresh = Catalog::default();
        let mut report = IndexReport { generation, ..IndexReport::default() };
        for item in prepared {
            match item {
                Ok(p) => {
                    let id = p.doc.id.clone();
                    if let Err(e) = fresh.upsert(p.doc, &p.terms) {
                        report.failures.push(IndexFailure { document_id: id, reason: e.to_string() });
                    }
                }
                Err(failure) => report.failures.push(failure),
            }
        }

        {
            let mut catalog = self.catalog.write();
            if token.is_cancelled() || self.generation.load(Ordering::SeqCst) != generation {
                drop(catalog);
                return self.superseded(generation);
            }
            if let Some(journal) = catalog.journal.take().filter(|j| j.generation == generation) {
                let replayed = journal.ops.len();
                for op in journal.ops {
                    if let Err(e) = fresh.apply(op) {
                        tracing::error!(error = %e, "failed to replay journaled update");
                    }
                }
                tracing::debug!(generation, replayed, "replayed updates made during rebuild");
            }
            *catalog = fresh;
            report.indexed = catalog.documents.len();
        }
        {
            let mut current = self.rebuild_token.lock();
            if current.as_ref().is_some_and(|t| !t.is_cancelled() && self.generation.load(Ordering::SeqCst) == generation) {
                *current = None;
            }
        }
        self.recovering.store(false, Ordering::SeqCst);
        self.failures.lock().extend(report.failures.iter().cloned());
        self.publish(IndexEvent::Finished { generation, indexed: report.indexed, failed: report.failures.len() });
        tracing::info!(generation, indexed = report.indexed, failed = report.failures.len(), "rebuild finished");
        report
    }

    fn superseded(&self, generation: u64) -> IndexReport {
        {
            let mut catalog = self.catalog.write();
            if catalog.journal.as_ref().is_some_and(|j| j.generation == generation) {
                catalog.journal = None;
            }
        }
        self.recovering.store(false, Ordering::SeqCst);
        tracing::info!(generation, "rebuild superseded, discarding its work");
        self.publish(IndexEvent::Superseded { generation });
        IndexReport { generation, superseded: true, ..IndexReport::default() }
    }
}

/// A background rebuild. Dropping the handle detaches it.
pub struct RebuildHandle {
    generation: u64,
    token: CancellationToken,
    join: JoinHandle<IndexReport>,
}

impl RebuildHandle {
    pub fn generation(&self) -> u64 { self.generation }

    /// Abandon the rebuild; the live index is left as it was.
    pub fn cancel(&self) { self.token.cancel(); }

    pub fn is_finished(&self) -> bool { self.join.is_finished() }

    pub fn wait(self) -> IndexReport {
        let generation = self.generation;
        self.join.join().unwrap_or_else(|_| IndexReport {
            generation,
            failures: vec![IndexFailure { document_id: String::new(), reason: "rebuild worker panicked".into() }],
            ..IndexReport::default()
        })
    }
}

/// Owns the index for its whole lifetime: incremental updates, background
/// rebuilds, and the query path.
///
/// Searches run under a read lock and never observe a half-indexed document.
/// Extraction and tokenization happen outside the lock; only the structural
/// change takes the write lock.
#[derive(Clone)]
pub struct IndexManager {
    inner: Arc<Inner>,
}

impl IndexManager {
    pub fn new(config: SearchConfig) -> Result<Self> {
        config.validate()?;
        let pool = ThreadPoolBuilder::new()
            .num_threads(config.workers)
            .thread_name(|i| format!("indexer-{i}"))
            .build()
            .map_err(|e| IndexError::InvalidConfig(format!("worker pool: {e}")))?;
        let inner = Inner {
            analyzer: Analyzer::new(&config.analysis()),
            engine: QueryEngine::new(config.scoring.clone()),
            highlighter: Highlighter::new(config.snippet_window),
            pool,
            catalog: RwLock::new(Catalog::default()),
            generation: AtomicU64::new(0),
            active_rebuilds: AtomicUsize::new(0),
            active_updates: AtomicUsize::new(0),
            processed: AtomicUsize::new(0),
            total: AtomicUsize::new(0),
            failures: Mutex::new(Vec::new()),
            rebuild_token: Mutex::new(None),
            subscribers: Mutex::new(Vec::new()),
            recovering: AtomicBool::new(false),
            config,
        };
        Ok(Self { inner: Arc::new(inner) })
    }

    /// Restore from a persisted snapshot. Snapshots built with other analysis
    /// settings, or failing the consistency check, are re-indexed from their
    /// stored documents.
    pub fn from_snapshot(config: SearchConfig, snapshot: Snapshot) -> Result<Self> {
        let manager = Self::new(config)?;
        let Snapshot { analysis, documents, index } = snapshot;
        let catalog = Catalog {
            index,
            documents: documents.iter().map(|d| (d.id.clone(), Arc::new(d.clone()))).collect(),
            journal: None,
        };
        let reason = if analysis != manager.inner.config.analysis() {
            Some("analysis settings changed".to_string())
        } else {
            catalog.check().err().map(|e| e.to_string())
        };
        match reason {
            None => {
                tracing::info!(documents = catalog.documents.len(), "restored index snapshot");
                *manager.inner.catalog.write() = catalog;
            }
            Some(reason) => {
                tracing::warn!(%reason, documents = documents.len(), "re-indexing stored documents");
                let sources = documents.into_iter().map(|d| Arc::new(d) as Arc<dyn TextSource>).collect();
                manager.index_batch(sources);
            }
        }
        Ok(manager)
    }

    pub fn config(&self) -> &SearchConfig { &self.inner.config }

    pub fn analyzer(&self) -> &Analyzer { &self.inner.analyzer }

    /// Index `doc`, replacing any earlier version with the same id.
    pub fn index_document(&self, doc: Document) -> Result<()> {
        let _active = Active::enter(&self.inner.active_updates);
        let terms = self.inner.analyzer.analyze(&doc.text, None);
        self.apply(Prepared { doc: Arc::new(doc), terms })
    }

    /// Extract and index one source. An extraction failure is recorded and returned.
    pub fn index_source(&self, source: &dyn TextSource) -> Result<()> {
        let _active = Active::enter(&self.inner.active_updates);
        match self.inner.prepare(source) {
            Ok(prepared) => self.apply(prepared),
            Err(failure) => {
                tracing::warn!(document_id = %failure.document_id, reason = %failure.reason, "skipping document");
                let err = IndexError::ExtractionFailure { id: failure.document_id.clone(), reason: failure.reason.clone() };
                if self.inner.catalog.write().evict(&failure.document_id) {
                    tracing::info!(document_id = %failure.document_id, "dropped stale version");
                }
                self.inner.failures.lock().push(failure);
                Err(err)
            }
        }
    }

    fn apply(&self, prepared: Prepared) -> Result<()> {
        let Prepared { doc, terms } = prepared;
        let mut catalog = self.inner.catalog.write();
        catalog.record(|| JournalOp::Upsert(Arc::clone(&doc), terms.clone()));
        tracing::debug!(document_id = %doc.id, terms = terms.len(), "indexing document");
        catalog.upsert(doc, &terms)
    }

    /// Index many sources on the worker pool, continuing past failures.
    pub fn index_batch(&self, sources: Vec<Arc<dyn TextSource>>) -> IndexReport {
        let _active = Active::enter(&self.inner.active_updates);
        let generation = self.inner.generation.load(Ordering::SeqCst);
        let total = sources.len();
        // A running rebuild owns the progress counters.
        let track = self.inner.active_rebuilds.load(Ordering::SeqCst) == 0;
        if track {
            self.inner.begin_progress(total);
        }
        self.inner.publish(IndexEvent::Started { generation, total });

        let prepared = self.inner.prepare_all(generation, &sources, None, track);
        let mut report = IndexReport { generation, ..IndexReport::default() };
        {
            let mut catalog = self.inner.catalog.write();
            for item in prepared {
                match item {
                    Ok(Prepared { doc, terms }) => {
                        catalog.record(|| JournalOp::Upsert(Arc::clone(&doc), terms.clone()));
                        let id = doc.id.clone();
                        match catalog.upsert(doc, &terms) {
                            Ok(()) => report.indexed += 1,
                            Err(e) => report.failures.push(IndexFailure { document_id: id, reason: e.to_string() }),
                        }
                    }
                    Err(failure) => {
                        catalog.evict(&failure.document_id);
                        report.failures.push(failure);
                    }
                }
            }
        }
        self.inner.failures.lock().extend(report.failures.iter().cloned());
        self.inner.publish(IndexEvent::Finished { generation, indexed: report.indexed, failed: report.failures.len() });
        tracing::info!(indexed = report.indexed, failed = report.failures.len(), "batch indexed");
        report
    }

    /// Rebuild the whole index from `sources` in the background.
    ///
    /// A rebuild started later supersedes this one. Updates made through
    /// this manager while it runs are replayed onto the fresh index before
    /// it replaces the live one.
    pub fn rebuild(&self, sources: Vec<Arc<dyn TextSource>>) -> Result<RebuildHandle> {
        let generation = self.inner.generation.fetch_add(1, Ordering::SeqCst) + 1;
        let token = CancellationToken::new();
        if let Some(previous) = self.inner.rebuild_token.lock().replace(token.clone()) {
            previous.cancel();
            tracing::info!(generation, "superseding in-flight rebuild");
        }
        self.inner.catalog.write().journal = Some(Journal { generation, ops: Vec::new() });
        self.inner.active_rebuilds.fetch_add(1, Ordering::SeqCst);

        let inner = Arc::clone(&self.inner);
        let thread_token = token.clone();
        let spawned = std::thread::Builder::new().name(format!("index-rebuild-{generation}")).spawn(move || {
            let _active = Active(&inner.active_rebuilds);
            inner.run_rebuild(generation, sources, &thread_token)
        });
        match spawned {
            Ok(join) => Ok(RebuildHandle { generation, token, join }),
            Err(e) => {
                self.inner.active_rebuilds.fetch_sub(1, Ordering::SeqCst);
                Err(e.into())
            }
        }
    }

    /// Returns whether the document was indexed. Removing twice is harmless.
    pub fn remove_document(&self, id: &str) -> bool {
        let mut catalog = self.inner.catalog.write();
        catalog.record(|| JournalOp::Remove(id.to_string()));
        let removed = catalog.remove(id);
        tracing::debug!(document_id = id, removed, "removed document");
        removed
    }

    /// Ranked, highlighted results. `top_k = None` uses the configured default.
    pub fn search(&self, query: &str, top_k: Option<usize>) -> Result<Vec<SearchResult>> {
        let top_k = top_k.unwrap_or(self.inner.config.top_k);
        let terms = self.inner.analyzer.analyze(query, None);
        if terms.is_empty() {
            return Ok(Vec::new());
        }
        let hits = match self.rank(&terms, top_k) {
            Err(e @ IndexError::IndexCorruption(_)) => {
                self.schedule_recovery();
                return Err(e);
            }
            other => other?,
        };
        Ok(hits.into_iter().map(|(scored, doc)| self.to_result(scored, &doc)).collect())
    }

    fn rank(&self, terms: &[TermPosition], top_k: usize) -> Result<Vec<(ScoredDocument, Arc<Document>)>> {
        let catalog = self.inner.catalog.read();
        if catalog.documents.is_empty() && self.state() == ManagerState::Rebuilding {
            return Err(IndexError::IndexUnavailable);
        }
        let ranked = self.inner.engine.rank(&catalog.index, terms, top_k)?;
        ranked
            .into_iter()
            .map(|scored| {
                let doc = catalog.documents.get(&scored.document_id).cloned().ok_or_else(|| {
                    IndexError::IndexCorruption(format!("ranked document `{}` has no stored text", scored.document_id))
                })?;
                Ok((scored, doc))
            })
            .collect()
    }

    fn to_result(&self, scored: ScoredDocument, doc: &Document) -> SearchResult {
        let terms: Vec<&str> = scored.matched_terms.iter().map(String::as_str).collect();
        let snippet = Snippet::join(self.inner.highlighter.highlight(&doc.text, &terms), SNIPPET_SEPARATOR);
        SearchResult {
            document_id: scored.document_id,
            path: doc.path.clone(),
            score: scored.score,
            matched_terms: scored.matched_terms,
            snippet: snippet.text,
            match_spans: snippet.spans,
        }
    }

    /// Match `query` against file names only; a prefix match outranks a substring match.
    pub fn search_by_filename(&self, query: &str, top_k: Option<usize>) -> Vec<SearchResult> {
        let needle = query.trim().to_lowercase();
        if needle.is_empty() {
            return Vec::new();
        }
        let top_k = top_k.unwrap_or(self.inner.config.top_k);
        let catalog = self.inner.catalog.read();
        let mut hits: Vec<SearchResult> = catalog
            .documents
            .values()
            .filter_map(|doc| {
                let name = doc.file_name();
                let stem = Path::new(name).file_stem().and_then(|s| s.to_str()).unwrap_or(name).to_lowercase();
                if !stem.contains(&needle) {
                    return None;
                }
                let snippet = Snippet::join(self.inner.highlighter.highlight(name, &[needle.as_str()]), SNIPPET_SEPARATOR);
                Some(SearchResult {
                    document_id: doc.id.clone(),
                    path: doc.path.clone(),
                    score: if stem.starts_with(&needle) { 2.0 } else { 1.0 },
                    matched_terms: [needle.clone()].into_iter().collect(),
                    snippet: snippet.text,
                    match_spans: snippet.spans,
                })
            })
            .collect();
        hits.sort_by(|a, b| b.score.total_cmp(&a.score).then_with(|| a.document_id.cmp(&b.document_id)));
        hits.truncate(top_k);
        hits
    }

    fn schedule_recovery(&self) {
        if self.inner.recovering.swap(true, Ordering::SeqCst) {
            return;
        }
        let sources: Vec<Arc<dyn TextSource>> =
            self.inner.catalog.read().documents.values().map(|d| Arc::clone(d) as Arc<dyn TextSource>).collect();
        tracing::error!(documents = sources.len(), "index corruption detected, rebuilding from stored documents");
        if let Err(e) = self.rebuild(sources) {
            self.inner.recovering.store(false, Ordering::SeqCst);
            tracing::error!(error = %e, "could not start recovery rebuild");
        }
    }

    pub fn state(&self) -> ManagerState {
        if self.inner.active_rebuilds.load(Ordering::SeqCst) > 0 {
            ManagerState::Rebuilding
        } else if self.inner.active_updates.load(Ordering::SeqCst) > 0 {
            ManagerState::Indexing
        } else {
            ManagerState::Idle
        }
    }

    pub fn progress(&self) -> Progress {
        Progress {
            processed: self.inner.processed.load(Ordering::SeqCst),
            total: self.inner.total.load(Ordering::SeqCst),
        }
    }

    /// Failures recorded since the last rebuild started.
    pub fn failures(&self) -> Vec<IndexFailure> { self.inner.failures.lock().clone() }

    /// Progress and completion events for every later batch or rebuild.
    pub fn subscribe(&self) -> Receiver<IndexEvent> {
        let (tx, rx) = unbounded();
        self.inner.subscribers.lock().push(tx);
        rx
    }

    pub fn document(&self, id: &str) -> Option<Arc<Document>> { self.inner.catalog.read().documents.get(id).cloned() }

    pub fn document_count(&self) -> usize { self.inner.catalog.read().index.document_count() }

    pub fn document_ids(&self) -> Vec<DocId> { self.inner.catalog.read().documents.keys().cloned().collect() }

    pub fn statistics(&self) -> IndexStats {
        let catalog = self.inner.catalog.read();
        let documents = catalog.index.document_count();
        let total_tokens = catalog.index.total_tokens();
        let mut by_kind = BTreeMap::new();
        for doc in catalog.documents.values() {
            *by_kind.entry(doc.kind()).or_insert(0) += 1;
        }
        IndexStats {
            documents,
            terms: catalog.index.term_count(),
            total_tokens,
            average_length: if documents == 0 { 0.0 } else { total_tokens as f64 / documents as f64 },
            by_kind,
        }
    }

    /// Run the full consistency check on the live index.
    pub fn verify(&self) -> Result<()> { self.inner.catalog.read().check() }

    /// Drop every document and abandon any rebuild in flight.
    pub fn clear(&self) {
        if let Some(token) = self.inner.rebuild_token.lock().take() {
            token.cancel();
        }
        *self.inner.catalog.write() = Catalog::default();
        self.inner.failures.lock().clear();
        tracing::info!("index cleared");
    }

    /// Copy of the live state suitable for [`persist::save_snapshot`](crate::persist::save_snapshot).
    pub fn snapshot(&self) -> Snapshot {
        let catalog = self.inner.catalog.read();
        let mut documents: Vec<Document> = catalog.documents.values().map(|d| Document::clone(d)).collect();
        documents.sort_by(|a, b| a.id.cmp(&b.id));
        Snapshot { analysis: self.inner.config.analysis(), documents, index: catalog.index.clone() }
    }

    /// Cancel background work and stop publishing events.
    pub fn shutdown(&self) {
        if let Some(token) = self.inner.rebuild_token.lock().take() {
            token.cancel();
        }
        self.inner.subscribers.lock().clear();
        tracing::info!("index manager shut down");
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::source::FailedExtraction;

    fn manager() -> IndexManager { IndexManager::new(SearchConfig { workers: 2, ..SearchConfig::default() }).unwrap() }

    #[test]
    fn reindex_replaces_old_terms() {
        let m = manager();
        m.index_document(Document::new("a", "old contents")).unwrap();
        m.index_document(Document::new("a", "new contents")).unwrap();
        assert!(m.search("old", None).unwrap().is_empty());
        assert_eq!(m.search("new", None).unwrap()[0].document_id, "a");
        assert_eq!(m.document_count(), 1);
        m.verify().unwrap();
    }

    #[test]
    fn extraction_failure_is_recorded() {
        let m = manager();
        let err = m.index_source(&FailedExtraction::new("bad.pdf", "encrypted")).unwrap_err();
        assert!(matches!(err, IndexError::ExtractionFailure { ref id, .. } if id == "bad.pdf"));
        assert_eq!(m.failures().len(), 1);
        assert_eq!(m.document_count(), 0);
        assert_eq!(m.state(), ManagerState::Idle);
    }

    #[test]
    fn failed_batch_reextraction_drops_stale_text() {
        let m = manager();
        m.index_document(Document::new("a.pdf", "confidential draft")).unwrap();
        let report = m.index_batch(vec![Arc::new(FailedExtraction::new("a.pdf", "corrupt")) as Arc<dyn TextSource>]);
        assert_eq!(report.failures.len(), 1);
        assert!(m.search("confidential", None).unwrap().is_empty());
        assert!(m.document("a.pdf").is_none());
        m.verify().unwrap();
    }

    #[test]
    fn failed_source_reextraction_drops_stale_text() {
        let m = manager();
        m.index_document(Document::new("a.pdf", "confidential draft")).unwrap();
        assert!(m.index_source(&FailedExtraction::new("a.pdf", "corrupt")).is_err());
        assert!(m.search("draft", None).unwrap().is_empty());
        assert_eq!(m.document_count(), 0);
        m.verify().unwrap();
    }

    #[test]
    fn empty_query_is_not_an_error() {
        let m = manager();
        m.index_document(Document::new("a", "text")).unwrap();
        assert!(m.search("   the  ", None).unwrap().is_empty());
    }

    #[test]
    fn filename_search_prefers_prefix() {
        let m = manager();
        m.index_document(Document::new("1", "x").with_path("docs/budget_2024.pdf")).unwrap();
        m.index_document(Document::new("2", "x").with_path("docs/annual_budget.pdf")).unwrap();
        let hits = m.search_by_filename("Budget", None);
        assert_eq!(hits.iter().map(|h| h.document_id.as_str()).collect::<Vec<_>>(), vec!["1", "2"]);
        assert_eq!(hits[0].snippet, "budget_2024.pdf");
        assert_eq!(hits[0].match_spans, vec![(0, 6)]);
    }

    #[test]
    fn statistics_group_by_kind() {
        let m = manager();
        m.index_document(Document::new("a.pdf", "alpha beta")).unwrap();
        m.index_document(Document::new("b.txt", "gamma")).unwrap();
        let stats = m.statistics();
        assert_eq!(stats.documents, 2);
        assert_eq!(stats.total_tokens, 3);
        assert_eq!(stats.by_kind.get(&DocumentKind::Pdf), Some(&1));
        assert_eq!(stats.by_kind.get(&DocumentKind::Text), Some(&1));
    }
}

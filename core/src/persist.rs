use anyhow::{bail, Context, Result};
use serde::{Deserialize, Serialize};
use std::fs::{create_dir_all, rename, File};
use std::io::{BufReader, BufWriter, Read, Write};
use std::path::{Path, PathBuf};

use crate::config::AnalysisConfig;
use crate::index::InvertedIndex;
use crate::Document;

pub const FORMAT_VERSION: u32 = 1;

/// Everything needed to resume searching without re-reading the source files.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Snapshot {
    /// Analysis settings the index was built with.
    pub analysis: AnalysisConfig,
    pub documents: Vec<Document>,
    pub index: InvertedIndex,
}

#[derive(Debug, Serialize, Deserialize)]
pub struct MetaFile {
    pub num_docs: usize,
    pub num_terms: usize,
    pub created_at: String,
    pub version: u32,
}

pub struct IndexPaths {
    pub root: PathBuf,
}

impl IndexPaths {
    pub fn new<P: AsRef<Path>>(root: P) -> Self {
        Self { root: root.as_ref().to_path_buf() }
    }
    fn snapshot(&self) -> PathBuf { self.root.join("snapshot.bin") }
    fn meta(&self) -> PathBuf { self.root.join("meta.json") }

    pub fn exists(&self) -> bool { self.snapshot().is_file() && self.meta().is_file() }
}

/// Write the snapshot to a temporary file and move it into place, then the meta file.
pub fn save_snapshot(paths: &IndexPaths, snapshot: &Snapshot, created_at: String) -> Result<()> {
    create_dir_all(&paths.root)?;
    let tmp = paths.root.join("snapshot.bin.tmp");
    {
        let mut w = BufWriter::new(File::create(&tmp)?);
        bincode::serialize_into(&mut w, snapshot)?;
        w.flush()?;
    }
    rename(&tmp, paths.snapshot())?;
    let meta = MetaFile {
        num_docs: snapshot.index.document_count(),
        num_terms: snapshot.index.term_count(),
        created_at,
        version: FORMAT_VERSION,
    };
    save_meta(paths, &meta)?;
    tracing::info!(root = %paths.root.display(), num_docs = meta.num_docs, num_terms = meta.num_terms, "snapshot saved");
    Ok(())
}

pub fn load_snapshot(paths: &IndexPaths) -> Result<Snapshot> {
    let meta = load_meta(paths)?;
    if meta.version != FORMAT_VERSION {
        bail!("snapshot format version {} is not supported (expected {})", meta.version, FORMAT_VERSION);
    }
    let f = File::open(paths.snapshot()).with_context(|| format!("opening {}", paths.snapshot().display()))?;
    let snapshot: Snapshot = bincode::deserialize_from(BufReader::new(f))?;
    Ok(snapshot)
}

pub fn save_meta(paths: &IndexPaths, meta: &MetaFile) -> Result<()> {
    create_dir_all(&paths.root)?;
    let mut f = File::create(paths.meta())?;
    let json = serde_json::to_string_pretty(meta)?;
    f.write_all(json.as_bytes())?;
    Ok(())
}

pub fn load_meta(paths: &IndexPaths) -> Result<MetaFile> {
    let mut f = File::open(paths.meta()).with_context(|| format!("opening {}", paths.meta().display()))?;
    let mut buf = String::new();
    f.read_to_string(&mut buf)?;
    let meta: MetaFile = serde_json::from_str(&buf)?;
    Ok(meta)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::stopwords::Analyzer;
    use crate::SearchConfig;
    use tempfile::tempdir;

    #[test]
    fn snapshot_round_trip_keeps_postings() {
        let dir = tempdir().unwrap();
        let paths = IndexPaths::new(dir.path());
        let config = SearchConfig::default();
        let analyzer = Analyzer::new(&config.analysis());
        let doc = Document::new("a.txt", "project meeting tomorrow");
        let mut index = InvertedIndex::new();
        index.add_document(&doc.id, &analyzer.analyze(&doc.text, None)).unwrap();
        let snap = Snapshot { analysis: config.analysis(), documents: vec![doc.clone()], index };

        save_snapshot(&paths, &snap, "2024-01-01T00:00:00Z".into()).unwrap();
        assert!(paths.exists());
        let loaded = load_snapshot(&paths).unwrap();
        assert_eq!(loaded.documents, vec![doc]);
        assert!(loaded.index.lookup("meeting").unwrap().contains("a.txt"));
        assert_eq!(load_meta(&paths).unwrap().num_docs, 1);
    }

    #[test]
    fn rejects_unknown_version() {
        let dir = tempdir().unwrap();
        let paths = IndexPaths::new(dir.path());
        save_meta(&paths, &MetaFile { num_docs: 0, num_terms: 0, created_at: String::new(), version: 99 }).unwrap();
        assert!(load_snapshot(&paths).is_err());
    }
}

use anyhow::{bail, Result};
use clap::{Parser, Subcommand};
use docsearch::persist::{load_meta, load_snapshot, save_snapshot, IndexPaths};
use docsearch::{DocId, Document, DocumentKind, ExtractionError, IndexManager, IndexReport, SearchConfig, TextSource};
use serde::Deserialize;
use tracing_subscriber::{fmt, EnvFilter};
use walkdir::WalkDir;

use std::collections::HashSet;
use std::fs::{self, File};
use std::io::{BufRead, BufReader};
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::SystemTime;

const MB: u64 = 1024 * 1024;

#[derive(Debug, Deserialize)]
struct InputDoc {
    id: String,
    body: String,
    #[serde(default)]
    title: Option<String>,
    #[serde(default)]
    path: Option<String>,
}

#[derive(Parser)]
#[command(name = "indexer")]
#[command(about = "Build, refresh and query a persisted document index", long_about = None)]
struct Cli {
    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Index a folder of files or JSON/JSONL records
    Build {
        /// Input path (file or directory)
        #[arg(long)]
        input: String,
        /// Output index directory
        #[arg(long)]
        output: String,
        /// Search configuration (JSON)
        #[arg(long)]
        config: Option<String>,
        /// Ignore any existing snapshot and index everything again
        #[arg(long, default_value_t = false)]
        full: bool,
        /// Files above this size are reported as failures
        #[arg(long, default_value_t = 50)]
        max_file_size_mb: u64,
    },
    /// Run a query against a saved index
    Search {
        #[arg(long)]
        index: String,
        #[arg(long)]
        query: String,
        #[arg(short, long, default_value_t = 10)]
        k: usize,
        #[arg(long)]
        config: Option<String>,
    },
    /// Print index statistics
    Stats {
        #[arg(long)]
        index: String,
        #[arg(long)]
        config: Option<String>,
    },
}

/// A file on disk, read on the worker pool when the index asks for it.
struct FileSource {
    id: String,
    path: PathBuf,
    modified: Option<SystemTime>,
    size: u64,
    limit_mb: u64,
}

impl TextSource for FileSource {
    fn id(&self) -> &str { &self.id }

    fn last_modified(&self) -> Option<SystemTime> { self.modified }

    fn extract(&self) -> Result<String, ExtractionError> {
        if self.size > self.limit_mb * MB {
            return Err(ExtractionError::TooLarge { size_mb: self.size / MB, limit_mb: self.limit_mb });
        }
        match DocumentKind::from_path(&self.path) {
            DocumentKind::Text => fs::read_to_string(&self.path).map_err(|e| ExtractionError::Unreadable(e.to_string())),
            kind => Err(ExtractionError::Unsupported(kind)),
        }
    }
}

fn main() -> Result<()> {
    fmt().with_env_filter(EnvFilter::from_default_env()).init();
    let cli = Cli::parse();

    match cli.command {
        Commands::Build { input, output, config, full, max_file_size_mb } => {
            build_index(Path::new(&input), Path::new(&output), load_config(config.as_deref())?, full, max_file_size_mb)
                .map(|_| ())
        }
        Commands::Search { index, query, k, config } => search_index(&index, &query, k, load_config(config.as_deref())?),
        Commands::Stats { index, config } => print_stats(&index, load_config(config.as_deref())?),
    }
}

fn load_config(path: Option<&str>) -> Result<SearchConfig> {
    match path {
        Some(p) => SearchConfig::from_json_file(p),
        None => Ok(SearchConfig::default()),
    }
}

fn open_index(paths: &IndexPaths, config: SearchConfig) -> Result<IndexManager> {
    Ok(IndexManager::from_snapshot(config, load_snapshot(paths)?)?)
}

fn build_index(input: &Path, output: &Path, config: SearchConfig, full: bool, limit_mb: u64) -> Result<IndexReport> {
    let paths = IndexPaths::new(output);
    let manager = if !full && paths.exists() {
        tracing::info!(output = %output.display(), "refreshing existing index");
        open_index(&paths, config)?
    } else {
        IndexManager::new(config)?
    };

    let sources = collect_sources(input, limit_mb)?;
    let (changed, removed) = plan_update(&manager, &sources);
    tracing::info!(found = sources.len(), changed = changed.len(), removed = removed.len(), "scanned input");
    for id in &removed {
        manager.remove_document(id);
    }
    let report = manager.index_batch(changed);
    for failure in &report.failures {
        tracing::warn!(document_id = %failure.document_id, reason = %failure.reason, "not indexed");
    }

    let created_at = time::OffsetDateTime::now_utc()
        .format(&time::format_description::well_known::Rfc3339)
        .unwrap_or_default();
    save_snapshot(&paths, &manager.snapshot(), created_at)?;
    tracing::info!(output = %output.display(), indexed = report.indexed, failed = report.failures.len(), "index build complete");
    Ok(report)
}

/// Sources that are new or modified since the snapshot, and stored ids no longer present.
fn plan_update(manager: &IndexManager, sources: &[Arc<dyn TextSource>]) -> (Vec<Arc<dyn TextSource>>, Vec<DocId>) {
    let seen: HashSet<&str> = sources.iter().map(|s| s.id()).collect();
    let removed = manager.document_ids().into_iter().filter(|id| !seen.contains(id.as_str())).collect();
    let changed = sources
        .iter()
        .filter(|s| match (manager.document(s.id()), s.last_modified()) {
            (Some(doc), Some(modified)) => doc.last_modified != Some(modified),
            _ => true,
        })
        .cloned()
        .collect();
    (changed, removed)
}

fn collect_sources(input: &Path, limit_mb: u64) -> Result<Vec<Arc<dyn TextSource>>> {
    let mut files: Vec<PathBuf> = Vec::new();
    if input.is_dir() {
        for entry in WalkDir::new(input).into_iter().filter_map(|e| e.ok()) {
            if entry.path().is_file() {
                files.push(entry.path().to_path_buf());
            }
        }
    } else if input.is_file() {
        files.push(input.to_path_buf());
    } else {
        bail!("input {} does not exist", input.display());
    }
    files.sort();

    let mut sources: Vec<Arc<dyn TextSource>> = Vec::with_capacity(files.len());
    for file in files {
        let meta = fs::metadata(&file)?;
        let modified = meta.modified().ok();
        match file.extension().and_then(|s| s.to_str()) {
            Some("jsonl") => sources.extend(records(read_jsonl(&file)?, modified)),
            Some("json") => sources.extend(records(read_json(&file)?, modified)),
            _ if DocumentKind::from_path(&file) == DocumentKind::Excel => {
                tracing::debug!(path = %file.display(), "skipping spreadsheet");
            }
            _ => sources.push(Arc::new(FileSource {
                id: file.to_string_lossy().into_owned(),
                path: file,
                modified,
                size: meta.len(),
                limit_mb,
            })),
        }
    }
    Ok(sources)
}

fn records(docs: Vec<InputDoc>, modified: Option<SystemTime>) -> impl Iterator<Item = Arc<dyn TextSource>> {
    docs.into_iter().map(move |d| {
        let path = d.path.or(d.title).unwrap_or_else(|| d.id.clone());
        let mut doc = Document::new(d.id, d.body).with_path(path);
        doc.last_modified = modified;
        Arc::new(doc) as Arc<dyn TextSource>
    })
}

fn read_jsonl(file: &Path) -> Result<Vec<InputDoc>> {
    let reader = BufReader::new(File::open(file)?);
    let mut docs = Vec::new();
    for line in reader.lines() {
        let line = line?;
        if line.trim().is_empty() { continue; }
        docs.push(serde_json::from_str(&line)?);
    }
    Ok(docs)
}

fn read_json(file: &Path) -> Result<Vec<InputDoc>> {
    let json: serde_json::Value = serde_json::from_reader(BufReader::new(File::open(file)?))?;
    Ok(match json {
        serde_json::Value::Array(arr) => arr.into_iter().map(serde_json::from_value).collect::<Result<_, _>>()?,
        serde_json::Value::Object(_) => vec![serde_json::from_value(json)?],
        _ => Vec::new(),
    })
}

fn search_index(index: &str, query: &str, k: usize, config: SearchConfig) -> Result<()> {
    let manager = open_index(&IndexPaths::new(index), config)?;
    let results = manager.search(query, Some(k))?;
    if results.is_empty() {
        println!("no results for {query:?}");
    }
    for (rank, hit) in results.iter().enumerate() {
        println!("{}. {} (score {:.4})", rank + 1, hit.path, hit.score);
        println!("   {}", hit.render("**", "**"));
    }
    Ok(())
}

fn stats_json(index: &str, config: SearchConfig) -> Result<serde_json::Value> {
    let paths = IndexPaths::new(index);
    let meta = load_meta(&paths)?;
    let manager = open_index(&paths, config)?;
    Ok(serde_json::json!({ "meta": meta, "stats": manager.statistics() }))
}

fn print_stats(index: &str, config: SearchConfig) -> Result<()> {
    println!("{}", serde_json::to_string_pretty(&stats_json(index, config)?)?);
    Ok(())
}

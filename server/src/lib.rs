use anyhow::Result;
use axum::{
    extract::{Path, Query, State},
    http::{HeaderMap, HeaderValue, StatusCode},
    routing::{get, post},
    Json, Router,
};
use docsearch::persist::{load_snapshot, save_snapshot, IndexPaths};
use docsearch::{Document, IndexError, IndexManager, IndexReport, IndexStats, SearchConfig, SearchResult, TextSource};
use parking_lot::Mutex;
use serde::{Deserialize, Serialize};
use std::path::PathBuf;
use std::sync::Arc;
use tower_http::cors::{AllowOrigin, Any, CorsLayer};
use tower_http::trace::TraceLayer;

type ApiError = (StatusCode, String);

#[derive(Deserialize)]
pub struct SearchParams {
    pub q: String,
    #[serde(default = "default_k")]
    pub k: usize,
}
fn default_k() -> usize { 10 }

#[derive(Serialize)]
pub struct SearchResponse {
    pub query: String,
    pub took_s: f64,
    pub total_hits: usize,
    pub results: Vec<SearchHit>,
}

#[derive(Serialize)]
pub struct SearchHit {
    pub doc_id: String,
    pub path: String,
    pub score: f64,
    pub matched_terms: Vec<String>,
    /// Snippet with matches wrapped in `<em>`.
    pub snippet: String,
    /// The plain snippet that `match_spans` index into.
    pub snippet_text: String,
    /// Byte ranges of the matches within `snippet_text`.
    pub match_spans: Vec<(usize, usize)>,
}

impl From<SearchResult> for SearchHit {
    fn from(r: SearchResult) -> Self {
        let snippet = r.render("<em>", "</em>");
        Self {
            doc_id: r.document_id,
            path: r.path,
            score: r.score,
            matched_terms: r.matched_terms.into_iter().collect(),
            snippet,
            snippet_text: r.snippet,
            match_spans: r.match_spans,
        }
    }
}

#[derive(Deserialize)]
pub struct BatchDoc {
    pub id: String,
    pub body: String,
    #[serde(default)]
    pub path: Option<String>,
}

impl From<BatchDoc> for Document {
    fn from(d: BatchDoc) -> Self {
        let path = d.path.unwrap_or_else(|| d.id.clone());
        Document::new(d.id, d.body).with_path(path)
    }
}

#[derive(Deserialize)]
pub struct RemoveRequest {
    pub ids: Vec<String>,
}

#[derive(Deserialize, Default)]
pub struct RebuildRequest {
    /// Replacement corpus; the stored documents are reused when absent.
    #[serde(default)]
    pub documents: Option<Vec<BatchDoc>>,
}

#[derive(Clone)]
pub struct AppState {
    pub manager: IndexManager,
    pub index_paths_root: PathBuf,
    pub admin_token: Option<String>,
    commit_lock: Arc<Mutex<()>>,
}

impl AppState {
    pub fn new(manager: IndexManager, index_dir: impl Into<PathBuf>, admin_token: Option<String>) -> Self {
        Self { manager, index_paths_root: index_dir.into(), admin_token, commit_lock: Arc::new(Mutex::new(())) }
    }
}

/// Restore the index saved under `index_dir`, or start with an empty one.
pub fn open_manager(index_dir: &str, config: SearchConfig) -> Result<IndexManager> {
    let paths = IndexPaths::new(index_dir);
    if paths.exists() {
        return Ok(IndexManager::from_snapshot(config, load_snapshot(&paths)?)?);
    }
    tracing::warn!(index_dir, "no saved index found, starting empty");
    Ok(IndexManager::new(config)?)
}

/// Open the index saved under `index_dir` and serve it.
pub fn build_app(index_dir: String, config: SearchConfig) -> Result<Router> {
    let manager = open_manager(&index_dir, config)?;
    let admin_token = std::env::var("ADMIN_TOKEN").ok();
    Ok(router(AppState::new(manager, index_dir, admin_token)))
}

pub fn router(state: AppState) -> Router {
    Router::new()
        .route("/health", get(|| async { "ok" }))
        .route("/search", get(search_handler))
        .route("/search/filename", get(filename_handler))
        .route("/doc/:doc_id", get(doc_handler))
        .route("/progress", get(progress_handler))
        .route("/stats", get(stats_handler))
        .route("/index/batch", post(index_batch))
        .route("/index/remove", post(index_remove))
        .route("/index/rebuild", post(index_rebuild))
        .route("/index/commit", post(index_commit))
        .with_state(state)
        .layer(TraceLayer::new_for_http())
        .layer(cors_layer())
}

/// Origins from `CORS_ALLOW_ORIGIN` (comma-separated); any origin when unset.
fn cors_layer() -> CorsLayer {
    let base = CorsLayer::new().allow_methods(Any).allow_headers(Any);
    let origins: Vec<HeaderValue> = std::env::var("CORS_ALLOW_ORIGIN")
        .unwrap_or_default()
        .split(',')
        .map(str::trim)
        .filter(|s| !s.is_empty())
        .filter_map(|s| s.parse().ok())
        .collect();
    if origins.is_empty() {
        base.allow_origin(Any)
    } else {
        base.allow_origin(AllowOrigin::list(origins))
    }
}

fn index_error(e: IndexError) -> ApiError {
    let status = match e {
        IndexError::IndexUnavailable => StatusCode::SERVICE_UNAVAILABLE,
        _ => StatusCode::INTERNAL_SERVER_ERROR,
    };
    (status, e.to_string())
}

/// Run blocking index work off the async executor.
async fn blocking<T, F>(f: F) -> Result<T, ApiError>
where
    F: FnOnce() -> T + Send + 'static,
    T: Send + 'static,
{
    tokio::task::spawn_blocking(f).await.map_err(|e| (StatusCode::INTERNAL_SERVER_ERROR, e.to_string()))
}

pub async fn search_handler(State(state): State<AppState>, Query(params): Query<SearchParams>) -> Result<Json<SearchResponse>, ApiError> {
    let start = std::time::Instant::now();
    let k = params.k.clamp(1, 100);
    let manager = state.manager.clone();
    let q = params.q.clone();
    let results = blocking(move || manager.search(&q, Some(k))).await?.map_err(index_error)?;
    tracing::debug!(query = %params.q, hits = results.len(), "search");
    Ok(Json(SearchResponse {
        query: params.q,
        took_s: start.elapsed().as_secs_f64(),
        total_hits: results.len(),
        results: results.into_iter().map(SearchHit::from).collect(),
    }))
}

pub async fn filename_handler(State(state): State<AppState>, Query(params): Query<SearchParams>) -> Json<SearchResponse> {
    let start = std::time::Instant::now();
    let results = state.manager.search_by_filename(&params.q, Some(params.k.clamp(1, 100)));
    Json(SearchResponse {
        query: params.q,
        took_s: start.elapsed().as_secs_f64(),
        total_hits: results.len(),
        results: results.into_iter().map(SearchHit::from).collect(),
    })
}

pub async fn doc_handler(State(state): State<AppState>, Path(doc_id): Path<String>) -> Result<Json<serde_json::Value>, ApiError> {
    let doc = state.manager.document(&doc_id).ok_or((StatusCode::NOT_FOUND, format!("no document `{doc_id}`")))?;
    Ok(Json(serde_json::json!({
        "doc_id": doc.id,
        "path": doc.path,
        "kind": doc.kind(),
        "text": doc.text,
    })))
}

async fn progress_handler(State(state): State<AppState>) -> Json<serde_json::Value> {
    let m = &state.manager;
    let progress = m.progress();
    Json(serde_json::json!({
        "state": m.state(),
        "processed": progress.processed,
        "total": progress.total,
        "failures": m.failures(),
    }))
}

async fn stats_handler(State(state): State<AppState>) -> Json<IndexStats> { Json(state.manager.statistics()) }

// --- Admin endpoints ---
async fn index_batch(State(state): State<AppState>, headers: HeaderMap, Json(docs): Json<Vec<BatchDoc>>) -> Result<Json<IndexReport>, ApiError> {
    authorize(&state, &headers)?;
    let sources: Vec<Arc<dyn TextSource>> = docs.into_iter().map(|d| Arc::new(Document::from(d)) as Arc<dyn TextSource>).collect();
    let manager = state.manager.clone();
    Ok(Json(blocking(move || manager.index_batch(sources)).await?))
}

async fn index_remove(State(state): State<AppState>, headers: HeaderMap, Json(req): Json<RemoveRequest>) -> Result<Json<serde_json::Value>, ApiError> {
    authorize(&state, &headers)?;
    let removed = req.ids.iter().filter(|id| state.manager.remove_document(id)).count();
    Ok(Json(serde_json::json!({ "removed": removed })))
}

async fn index_rebuild(
    State(state): State<AppState>,
    headers: HeaderMap,
    body: Option<Json<RebuildRequest>>,
) -> Result<(StatusCode, Json<serde_json::Value>), ApiError> {
    authorize(&state, &headers)?;
    let request = body.map(|Json(r)| r).unwrap_or_default();
    let sources: Vec<Arc<dyn TextSource>> = match request.documents {
        Some(docs) => docs.into_iter().map(|d| Arc::new(Document::from(d)) as Arc<dyn TextSource>).collect(),
        None => state.manager.snapshot().documents.into_iter().map(|d| Arc::new(d) as Arc<dyn TextSource>).collect(),
    };
    let total = sources.len();
    let handle = state.manager.rebuild(sources).map_err(index_error)?;
    tracing::info!(generation = handle.generation(), total, "rebuild requested");
    Ok((StatusCode::ACCEPTED, Json(serde_json::json!({ "generation": handle.generation(), "total": total }))))
}

async fn index_commit(State(state): State<AppState>, headers: HeaderMap) -> Result<Json<serde_json::Value>, ApiError> {
    authorize(&state, &headers)?;
    let internal = |e: anyhow::Error| (StatusCode::INTERNAL_SERVER_ERROR, e.to_string());
    let created_at = time::OffsetDateTime::now_utc()
        .format(&time::format_description::well_known::Rfc3339)
        .unwrap_or_default();
    let s = state.clone();
    let stamp = created_at.clone();
    let num_docs = blocking(move || {
        let _guard = s.commit_lock.lock();
        let snapshot = s.manager.snapshot();
        let num_docs = snapshot.documents.len();
        save_snapshot(&IndexPaths::new(&s.index_paths_root), &snapshot, stamp).map(|_| num_docs)
    })
    .await?
    .map_err(internal)?;
    Ok(Json(serde_json::json!({ "num_docs": num_docs, "created_at": created_at })))
}

fn authorize(state: &AppState, headers: &HeaderMap) -> Result<(), ApiError> {
    let Some(required) = state.admin_token.as_deref() else {
        return Err((StatusCode::UNAUTHORIZED, "admin endpoints disabled: ADMIN_TOKEN not set".into()));
    };
    match headers.get("X-ADMIN-TOKEN").and_then(|v| v.to_str().ok()) {
        Some(provided) if provided == required => Ok(()),
        _ => Err((StatusCode::UNAUTHORIZED, "invalid admin token".into())),
    }
}

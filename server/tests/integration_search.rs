use axum::body::Body;
use axum::http::{Request, StatusCode};
use axum::Router;
use docsearch::persist::{save_snapshot, IndexPaths};
use docsearch::{Document, IndexManager, SearchConfig};
use http_body_util::BodyExt;
use serde_json::Value;
use server::{router, AppState};
use tempfile::tempdir;
use tower::ServiceExt;

const TOKEN: &str = "secret";

fn tiny_manager() -> IndexManager {
    let m = IndexManager::new(SearchConfig::default()).unwrap();
    m.index_document(Document::new("doc0", "Rust is great. rust systems programming.").with_path("notes/rust_guide.txt")).unwrap();
    m.index_document(Document::new("doc1", "Learning rust slowly, with many other words here.")).unwrap();
    m.index_document(Document::new("ko", "회의 일정은 내일입니다")).unwrap();
    m
}

fn app(dir: &std::path::Path) -> Router { router(AppState::new(tiny_manager(), dir, Some(TOKEN.into()))) }

async fn send(app: Router, req: Request<Body>) -> (StatusCode, Value) {
    let resp = app.oneshot(req).await.unwrap();
    let status = resp.status();
    let body = resp.into_body().collect().await.unwrap().to_bytes();
    (status, serde_json::from_slice(&body).unwrap_or(Value::Null))
}

async fn get(app: Router, uri: &str) -> (StatusCode, Value) { send(app, Request::get(uri).body(Body::empty()).unwrap()).await }

fn admin_post(uri: &str, body: Value) -> Request<Body> {
    Request::post(uri)
        .header("content-type", "application/json")
        .header("X-ADMIN-TOKEN", TOKEN)
        .body(Body::from(body.to_string()))
        .unwrap()
}

#[tokio::test]
async fn search_returns_ranked_results() {
    let dir = tempdir().unwrap();
    let (status, json) = get(app(dir.path()), "/search?q=rust&k=2").await;
    assert_eq!(status, StatusCode::OK);
    let arr = json["results"].as_array().unwrap();
    assert_eq!(arr.len(), 2);
    assert_eq!(arr[0]["doc_id"], "doc0");
    assert_eq!(arr[1]["doc_id"], "doc1");
    assert!(arr[0]["snippet"].as_str().unwrap().contains("<em>Rust</em>"));
}

#[tokio::test]
async fn korean_partial_query() {
    let dir = tempdir().unwrap();
    let q = "/search?q=%EC%9D%BC%EC%A0%95"; // 일정
    let (status, json) = get(app(dir.path()), q).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(json["total_hits"], 1);
    assert_eq!(json["results"][0]["snippet"], "회의 <em>일정</em>은 내일입니다");
}

#[tokio::test]
async fn hits_carry_plain_snippet_and_spans() {
    let dir = tempdir().unwrap();
    let (_, json) = get(app(dir.path()), "/search?q=%EC%9D%BC%EC%A0%95").await;
    let hit = &json["results"][0];
    let text = hit["snippet_text"].as_str().unwrap();
    assert_eq!(text, "회의 일정은 내일입니다");
    let span = hit["match_spans"][0].as_array().unwrap();
    let (s, e) = (span[0].as_u64().unwrap() as usize, span[1].as_u64().unwrap() as usize);
    assert_eq!(&text[s..e], "일정");
}

#[tokio::test]
async fn filename_search_and_documents() {
    let dir = tempdir().unwrap();
    let (_, json) = get(app(dir.path()), "/search/filename?q=rust").await;
    assert_eq!(json["results"][0]["doc_id"], "doc0");
    assert_eq!(json["results"][0]["snippet"], "<em>rust</em>_guide.txt");

    let (status, json) = get(app(dir.path()), "/doc/doc0").await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(json["kind"], "text");
    let (status, _) = get(app(dir.path()), "/doc/missing").await;
    assert_eq!(status, StatusCode::NOT_FOUND);
}

#[tokio::test]
async fn stats_and_progress() {
    let dir = tempdir().unwrap();
    let (_, stats) = get(app(dir.path()), "/stats").await;
    assert_eq!(stats["documents"], 3);
    let (_, progress) = get(app(dir.path()), "/progress").await;
    assert_eq!(progress["state"], "idle");
}

#[tokio::test]
async fn admin_requires_token() {
    let dir = tempdir().unwrap();
    let req = Request::post("/index/commit").body(Body::empty()).unwrap();
    let (status, _) = send(app(dir.path()), req).await;
    assert_eq!(status, StatusCode::UNAUTHORIZED);
}

#[tokio::test]
async fn batch_remove_and_commit() {
    let dir = tempdir().unwrap();
    let app = app(dir.path());

    let docs = serde_json::json!([{ "id": "new", "body": "quarterly budget review" }]);
    let (status, report) = send(app.clone(), admin_post("/index/batch", docs)).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(report["indexed"], 1);
    let (_, json) = get(app.clone(), "/search?q=budget").await;
    assert_eq!(json["results"][0]["doc_id"], "new");

    let (_, removed) = send(app.clone(), admin_post("/index/remove", serde_json::json!({ "ids": ["doc1", "nope"] }))).await;
    assert_eq!(removed["removed"], 1);

    let (status, committed) = send(app.clone(), admin_post("/index/commit", Value::Null)).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(committed["num_docs"], 3);
    assert!(IndexPaths::new(dir.path()).exists());
}

#[tokio::test]
async fn rebuild_is_accepted() {
    let dir = tempdir().unwrap();
    let body = serde_json::json!({ "documents": [{ "id": "only", "body": "fresh corpus" }] });
    let (status, json) = send(app(dir.path()), admin_post("/index/rebuild", body)).await;
    assert_eq!(status, StatusCode::ACCEPTED);
    assert_eq!(json["total"], 1);
}

#[tokio::test]
async fn build_app_loads_saved_index() {
    let dir = tempdir().unwrap();
    save_snapshot(&IndexPaths::new(dir.path()), &tiny_manager().snapshot(), "2024-01-01T00:00:00Z".into()).unwrap();
    let app = server::build_app(dir.path().to_string_lossy().to_string(), SearchConfig::default()).unwrap();
    let (_, json) = get(app, "/search?q=programming").await;
    assert_eq!(json["results"][0]["doc_id"], "doc0");
}

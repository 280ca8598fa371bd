// tests/api_http.rs
//
// HTTP-level tests for the public API Router without opening sockets.
// We exercise the router directly via tower::ServiceExt::oneshot.

use std::sync::Arc;

use serde_json::json;
use serde_json::Value as Json;
use shuttle_axum::axum::{
    body::{self, Body},
    http::{Request, StatusCode},
    Router,
};
use tower::ServiceExt as _; // for `oneshot`

use threatwire::analyze::ArticleAnalyzer;
use threatwire::api::{self, AppState};
use threatwire::budget::BudgetGovernor;
use threatwire::config::{AppConfig, ModelCatalog};
use threatwire::inference::MockInference;
use threatwire::metrics::Metrics;
use threatwire::telemetry::{spawn_pump, DynObservability, NullSink};

const BODY_LIMIT: usize = 1024 * 1024;

fn test_app(cfg: AppConfig) -> (Router, Arc<BudgetGovernor>) {
    let mock = Arc::new(MockInference::new(&cfg.tiers));
    let governor = Arc::new(BudgetGovernor::new(&cfg.tiers, &cfg.budget));
    let (queue, _pump) = spawn_pump(NullSink, 16);
    let events: DynObservability = Arc::new(queue);
    let analyzer = ArticleAnalyzer::new(&cfg, mock.clone(), mock, governor.clone(), events);
    let router = api::create_router(AppState::new(Arc::new(analyzer)), &Metrics::detached());
    (router, governor)
}

async fn send(app: Router, req: Request<Body>) -> (StatusCode, Json) {
    let resp = app.oneshot(req).await.expect("oneshot");
    let status = resp.status();
    let bytes = body::to_bytes(resp.into_body(), BODY_LIMIT).await.expect("read body");
    let v = serde_json::from_slice(&bytes).unwrap_or(Json::Null);
    (status, v)
}

fn post(uri: &str, payload: Json) -> Request<Body> {
    Request::builder()
        .method("POST")
        .uri(uri)
        .header("content-type", "application/json")
        .body(Body::from(payload.to_string()))
        .expect("build POST")
}

fn get(uri: &str) -> Request<Body> {
    Request::builder()
        .method("GET")
        .uri(uri)
        .body(Body::empty())
        .expect("build GET")
}

#[tokio::test]
async fn health_returns_ok() {
    let (app, _) = test_app(AppConfig::default());
    let resp = app.oneshot(get("/health")).await.unwrap();
    assert_eq!(resp.status(), StatusCode::OK);
    let bytes = body::to_bytes(resp.into_body(), BODY_LIMIT).await.unwrap();
    assert_eq!(String::from_utf8(bytes.to_vec()).unwrap().trim(), "OK");
}

#[tokio::test]
async fn analyze_returns_structured_result() {
    let (app, governor) = test_app(AppConfig::default());
    let payload = json!({
        "id": "https://news.example/a",
        "title": "Mock article",
        "content": "Nothing to see."
    });

    let (status, v) = send(app, post("/analyze", payload)).await;
    assert_eq!(status, StatusCode::OK, "body: {v}");
    for key in ["tldr", "key_points", "category", "severity", "iocs", "strategy"] {
        assert!(v.get(key).is_some(), "missing '{key}' in {v}");
    }
    assert_eq!(v["strategy"], "baseline");
    assert_eq!(v["severity"], "info");
    assert!(governor.daily_total() > 0.0);
}

#[tokio::test]
async fn analyze_refused_when_budget_exhausted() {
    let mut cfg = AppConfig::default();
    cfg.budget.daily_limit = 10.0;
    let (app, governor) = test_app(cfg);
    governor.record(&ModelCatalog::default().large, 1_000_000, 0);

    let (status, v) = send(app, post("/analyze", json!({ "id": "x", "content": "y" }))).await;
    assert_eq!(status, StatusCode::TOO_MANY_REQUESTS);
    assert!(v["error"].as_str().unwrap_or_default().contains("budget"));
}

#[tokio::test]
async fn embed_returns_baseline_vector() {
    let (app, _) = test_app(AppConfig::default());
    let (status, v) = send(app, post("/embed", json!({ "text": "ransomware in hospitals" }))).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(v["dimensions"], 1024);
    assert_eq!(v["vector"].as_array().map(Vec::len), Some(1024));
    assert_eq!(v["model"], ModelCatalog::default().embedding_baseline);
}

#[tokio::test]
async fn embed_blank_text_is_bad_gateway() {
    let (app, _) = test_app(AppConfig::default());
    let (status, _) = send(app, post("/embed", json!({ "text": "  " }))).await;
    assert_eq!(status, StatusCode::BAD_GATEWAY);
}

#[tokio::test]
async fn trends_always_returns_text() {
    let (app, _) = test_app(AppConfig::default());
    let (status, v) = send(app, post("/trends", json!({ "articles": [] }))).await;
    assert_eq!(status, StatusCode::OK);
    assert!(!v["summary"].as_str().unwrap_or_default().is_empty());
}

#[tokio::test]
async fn budget_reports_summary_and_breakdown() {
    let (app, governor) = test_app(AppConfig::default());
    governor.record("@cf/meta/llama-3.2-1b-instruct", 1000, 200);

    let (status, v) = send(app, get("/budget")).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(v["status"], "OK");
    assert_eq!(v["used"], 6);
    assert_eq!(v["daily_limit"], 10_000);
    assert_eq!(v["breakdown"][0]["model"], "@cf/meta/llama-3.2-1b-instruct");
}

#[tokio::test]
async fn capacity_uses_query_parameter() {
    let (app, _) = test_app(AppConfig::default());
    let (status, v) = send(app.clone(), get("/budget/capacity?units_per_article=100")).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(v["remaining_articles"], 100);

    let (_, v) = send(app, get("/budget/capacity?units_per_article=0")).await;
    assert_eq!(v["remaining_articles"], u64::from(u32::MAX));
}

#[tokio::test]
async fn metrics_route_is_mounted() {
    let (app, _) = test_app(AppConfig::default());
    let resp = app.oneshot(get("/metrics")).await.unwrap();
    assert_eq!(resp.status(), StatusCode::OK);
}

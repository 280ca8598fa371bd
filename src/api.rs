// src/api.rs
//! Thin HTTP surface over `ArticleAnalyzer` and the budget governor.

use std::sync::Arc;
use std::time::Duration;

use serde::{Deserialize, Serialize};
use serde_json::json;
use shuttle_axum::axum::{
    extract::{Query, State},
    http::StatusCode,
    response::{IntoResponse, Response},
    routing::{get, post},
    Json, Router,
};
use tracing::info;

use crate::analyze::{AnalysisResult, Article, ArticleAnalyzer};
use crate::budget::{BudgetSummary, ModelBreakdown};
use crate::metrics::Metrics;
use crate::telemetry::anon_id;

/// Typical baseline article: ~1500 prompt and ~400 completion tokens on the large tier.
pub const ESTIMATED_UNITS_PER_ARTICLE: f64 = 120.0;

#[derive(Clone)]
pub struct AppState {
    pub analyzer: Arc<ArticleAnalyzer>,
}

impl AppState {
    pub fn new(analyzer: Arc<ArticleAnalyzer>) -> Self {
        Self { analyzer }
    }
}

pub fn create_router(state: AppState, metrics: &Metrics) -> Router {
    Router::new()
        .route("/health", get(|| async { "OK" }))
        .route("/analyze", post(analyze))
        .route("/embed", post(embed))
        .route("/trends", post(trends))
        .route("/budget", get(budget))
        .route("/budget/capacity", get(capacity))
        .with_state(state)
        .merge(metrics.router())
}

fn error(status: StatusCode, message: &str) -> Response {
    (status, Json(json!({ "error": message }))).into_response()
}

async fn analyze(State(state): State<AppState>, Json(article): Json<Article>) -> Response {
    let analyzer = &state.analyzer;
    if !analyzer.can_afford(ESTIMATED_UNITS_PER_ARTICLE) {
        info!(target: "budget", id = %anon_id(&article.id), "analysis refused, daily budget exhausted");
        return error(StatusCode::TOO_MANY_REQUESTS, "daily compute budget exhausted");
    }
    let deadline = Duration::from_millis(analyzer.limits().request_deadline_ms);
    match analyzer.analyze_within(&article, deadline).await {
        Some(result) => Json::<AnalysisResult>(result).into_response(),
        None => error(StatusCode::BAD_GATEWAY, "analysis unavailable"),
    }
}

#[derive(Deserialize)]
struct EmbedReq {
    text: String,
}

#[derive(Serialize)]
struct EmbedResp {
    model: String,
    dimensions: usize,
    vector: Vec<f32>,
}

async fn embed(State(state): State<AppState>, Json(body): Json<EmbedReq>) -> Response {
    let analyzer = &state.analyzer;
    match analyzer.embed(&body.text).await {
        Some(vector) => Json(EmbedResp {
            model: analyzer.embedding_model().to_string(),
            dimensions: vector.len(),
            vector,
        })
        .into_response(),
        None => error(StatusCode::BAD_GATEWAY, "embedding unavailable"),
    }
}

#[derive(Deserialize)]
struct TrendsReq {
    articles: Vec<Article>,
    #[serde(default)]
    summaries: Vec<String>,
}

#[derive(Serialize)]
struct TrendsResp {
    summary: String,
}

async fn trends(State(state): State<AppState>, Json(body): Json<TrendsReq>) -> Json<TrendsResp> {
    let summary = state
        .analyzer
        .summarize_trends(&body.articles, &body.summaries)
        .await;
    Json(TrendsResp { summary })
}

#[derive(Serialize)]
struct BudgetResp {
    #[serde(flatten)]
    summary: BudgetSummary,
    breakdown: Vec<ModelBreakdown>,
}

async fn budget(State(state): State<AppState>) -> Json<BudgetResp> {
    let governor = state.analyzer.governor();
    Json(BudgetResp {
        summary: governor.summary(),
        breakdown: governor.breakdown(),
    })
}

#[derive(Deserialize)]
struct CapacityQuery {
    units_per_article: Option<f64>,
}

#[derive(Serialize)]
struct CapacityResp {
    units_per_article: f64,
    remaining_articles: u64,
}

async fn capacity(
    State(state): State<AppState>,
    Query(q): Query<CapacityQuery>,
) -> Json<CapacityResp> {
    let units = q.units_per_article.unwrap_or(ESTIMATED_UNITS_PER_ARTICLE);
    Json(CapacityResp {
        units_per_article: units,
        remaining_articles: state.analyzer.governor().remaining_capacity(units),
    })
}

// src/analyze/mod.rs
//! Article analysis entry point: `analyze`, `embed`, `summarize_trends`,
//! `semantic_search`. Hides mode selection and owns the embedding path.

pub mod decoder;
pub mod iocs;
pub mod prompts;
pub mod router;
pub mod search;
pub mod types;

use std::sync::Arc;
use std::time::Duration;

use tracing::{debug, warn};

use crate::budget::{BudgetGovernor, BudgetStatus};
use crate::config::{find_tier, AppConfig, DeploymentConfig, DeploymentMode, LimitsConfig, ModelCatalog, ModelTier};
use crate::inference::{
    DynEmbeddings, DynInference, InferenceOptions, MeteredEmbeddings, MeteredInference,
};
use crate::telemetry::{anon_id, DynObservability, Event};

// Re-export convenient types.
pub use crate::analyze::decoder::{decode_reply, validate_response};
pub use crate::analyze::router::{CanaryDraw, FixedDraw, Plan, RandomDraw, StrategyRouter};
pub use crate::analyze::search::{InMemoryIndex, SearchHit, VectorIndex};
pub use crate::analyze::types::{AnalysisResult, Article, Category, IocBundle, Severity, Strategy};

/// Returned by `summarize_trends` when the model call fails.
pub const TRENDS_FALLBACK: &str = "Unable to generate trend summary at this time.";
/// Returned by `summarize_trends` when there is nothing to summarize.
pub const TRENDS_EMPTY: &str = "No recent articles to summarize.";

pub const ANALYSIS_TIMEOUT: &str = "analysis_timeout";
pub const EMBEDDING_FAILURE: &str = "embedding_failure";
pub const TRENDS_FAILURE: &str = "trends_failure";

pub struct ArticleAnalyzer {
    router: StrategyRouter,
    inference: DynInference,
    embeddings: DynEmbeddings,
    governor: Arc<BudgetGovernor>,
    events: DynObservability,
    deployment: DeploymentConfig,
    models: ModelCatalog,
    tiers: Vec<ModelTier>,
    limits: LimitsConfig,
    options: InferenceOptions,
}

impl ArticleAnalyzer {
    /// Both clients are wrapped so every successful call is charged to `governor`.
    pub fn new(
        cfg: &AppConfig,
        inference: DynInference,
        embeddings: DynEmbeddings,
        governor: Arc<BudgetGovernor>,
        events: DynObservability,
    ) -> Self {
        let inference: DynInference = Arc::new(MeteredInference::new(inference, governor.clone()));
        let embeddings: DynEmbeddings =
            Arc::new(MeteredEmbeddings::new(embeddings, governor.clone()));
        let options = InferenceOptions::default()
            .with_timeout(Duration::from_millis(cfg.limits.call_timeout_ms));
        let router = StrategyRouter::new(inference.clone(), cfg.models.clone(), events.clone())
            .with_options(options.clone());
        Self {
            router,
            inference,
            embeddings,
            governor,
            events,
            deployment: cfg.deployment,
            models: cfg.models.clone(),
            tiers: cfg.tiers.clone(),
            limits: cfg.limits.clone(),
            options,
        }
    }

    pub fn with_canary_draw(mut self, draw: Arc<dyn CanaryDraw>) -> Self {
        self.router = self.router.with_canary_draw(draw);
        self
    }

    pub fn deployment(&self) -> DeploymentConfig {
        self.deployment
    }

    pub fn governor(&self) -> &Arc<BudgetGovernor> {
        &self.governor
    }

    pub fn limits(&self) -> &LimitsConfig {
        &self.limits
    }

    /// Caller policy hook: is there room for at least one more article today?
    pub fn can_afford(&self, units_per_article: f64) -> bool {
        self.governor.remaining_capacity(units_per_article) > 0
    }

    /// `None` means "not analyzed yet"; never treat it as benign.
    pub async fn analyze(&self, article: &Article) -> Option<AnalysisResult> {
        let budget = self.governor.summary();
        if budget.status == BudgetStatus::Critical {
            warn!(
                target: "analysis",
                used = budget.used,
                limit = budget.daily_limit,
                "dispatching with critical budget"
            );
        }
        let cfg = self.deployment;
        self.router.route(article, &cfg).await
    }

    /// `analyze` with a caller deadline; in-flight calls are abandoned on expiry.
    pub async fn analyze_within(&self, article: &Article, deadline: Duration) -> Option<AnalysisResult> {
        match tokio::time::timeout(deadline, self.analyze(article)).await {
            Ok(out) => out,
            Err(_) => {
                warn!(target: "analysis", id = %anon_id(&article.id), ?deadline, "analysis deadline expired");
                self.events.emit(
                    Event::new(article.id.clone())
                        .tag(ANALYSIS_TIMEOUT)
                        .metric(deadline.as_millis() as f64),
                );
                None
            }
        }
    }

    /// Embedding tier for the configured mode. Only tiered mode uses the
    /// small tier; canary and shadow stay on the baseline tier so stored
    /// vectors keep one length.
    pub fn embedding_model(&self) -> &str {
        match self.deployment.mode {
            DeploymentMode::Tiered => &self.models.embedding_tiered,
            _ => &self.models.embedding_baseline,
        }
    }

    /// Fixed-length vector for `text`, or `None` on any failure.
    pub async fn embed(&self, text: &str) -> Option<Vec<f32>> {
        let input = prompts::truncate_chars(text.trim(), self.limits.embed_max_chars);
        if input.is_empty() {
            return None;
        }
        let model = self.embedding_model();
        let expected = find_tier(&self.tiers, model).and_then(|t| t.dimensions);
        let texts = vec![input.to_string()];

        let call = self.embeddings.embed(model, &texts, &self.options);
        let failure = match tokio::time::timeout(self.options.timeout, call).await {
            Err(_) => "timeout".to_string(),
            Ok(Err(e)) => e.kind().to_string(),
            Ok(Ok(reply)) => match reply.vectors.into_iter().next() {
                Some(v) if !v.is_empty() && expected.map_or(true, |d| d == v.len()) => {
                    return Some(v)
                }
                Some(v) => format!("dimensions:{}", v.len()),
                None => "empty".to_string(),
            },
        };
        debug!(target: "analysis", model, failure = %failure, "embedding failed");
        self.events
            .emit(Event::new(model).tag(EMBEDDING_FAILURE).tag(failure).metric(1.0));
        None
    }

    /// Large-tier trend summary. Always returns displayable text.
    pub async fn summarize_trends(&self, articles: &[Article], summaries: &[String]) -> String {
        if articles.is_empty() {
            return TRENDS_EMPTY.to_string();
        }
        let request =
            prompts::trends_request(articles, summaries, self.limits.trends_max_articles);
        let options = self.options.clone().with_max_tokens(512);
        let call = self.inference.run(&self.models.large, &request, &options);
        let failure = match tokio::time::timeout(options.timeout, call).await {
            Err(_) => "timeout",
            Ok(Err(e)) => e.kind(),
            Ok(Ok(reply)) => match decoder::reply_text(&reply.response) {
                Some(text) => return text,
                None => "empty",
            },
        };
        warn!(target: "analysis", failure, "trend summary failed");
        self.events.emit(
            Event::new(self.models.large.clone())
                .tag(TRENDS_FAILURE)
                .tag(failure)
                .metric(articles.len() as f64),
        );
        TRENDS_FALLBACK.to_string()
    }

    /// Embed `query` and look it up in `index`. Empty on any failure.
    pub async fn semantic_search(
        &self,
        query: &str,
        index: &dyn VectorIndex,
        top_k: usize,
    ) -> Vec<SearchHit> {
        let Some(vector) = self.embed(query).await else {
            return Vec::new();
        };
        match index.query(&vector, top_k).await {
            Ok(hits) => hits,
            Err(e) => {
                warn!(target: "analysis", error = %e, "vector index query failed");
                Vec::new()
            }
        }
    }
}

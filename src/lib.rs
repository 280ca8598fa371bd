// src/lib.rs
// Public library surface for the binary and integration tests.

pub mod analyze;
pub mod api;
pub mod budget;
pub mod config;
pub mod inference;
pub mod metrics;
pub mod telemetry;

// ---- Re-exports for stable public API ----
pub use crate::analyze::{AnalysisResult, Article, ArticleAnalyzer, Category, Severity, Strategy};
pub use crate::api::create_router;
pub use crate::budget::{BudgetGovernor, BudgetStatus, BudgetSummary};
pub use crate::config::{AppConfig, DeploymentConfig, DeploymentMode};

use std::sync::Arc;

use tracing::info;

use crate::inference::{DynEmbeddings, DynInference, MockInference, WorkersAiClient};

/// Env switch for the deterministic mock provider (`AI_TEST_MODE=mock`).
pub const ENV_AI_TEST_MODE: &str = "AI_TEST_MODE";

pub fn mock_mode() -> bool {
    std::env::var(ENV_AI_TEST_MODE)
        .map(|v| v.eq_ignore_ascii_case("mock"))
        .unwrap_or(false)
}

/// Text and embedding clients for `cfg`: the mock in mock mode (or with
/// `provider = "mock"`), Workers AI otherwise.
pub fn build_clients(cfg: &AppConfig) -> anyhow::Result<(DynInference, DynEmbeddings)> {
    if mock_mode() || cfg.inference.provider == "mock" {
        info!(target: "inference", "using deterministic mock client");
        let mock = Arc::new(MockInference::new(&cfg.tiers));
        let inference: DynInference = mock.clone();
        let embeddings: DynEmbeddings = mock;
        return Ok((inference, embeddings));
    }
    let client = Arc::new(WorkersAiClient::new(&cfg.inference)?);
    info!(
        target: "inference",
        provider = %cfg.inference.provider,
        base_url = %cfg.inference.base_url,
        "inference client ready"
    );
    let inference: DynInference = client.clone();
    let embeddings: DynEmbeddings = client;
    Ok((inference, embeddings))
}

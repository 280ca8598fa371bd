//! threatwire service entrypoint.
//! Boots the Axum HTTP server: config, inference clients, budget governor,
//! telemetry pump, and the analysis façade.

use std::sync::Arc;

use anyhow::Context;
use shuttle_axum::ShuttleAxum;
use tracing::info;
use tracing_subscriber::{fmt, prelude::*, EnvFilter};

use threatwire::analyze::ArticleAnalyzer;
use threatwire::api::{self, AppState};
use threatwire::budget::BudgetGovernor;
use threatwire::config::AppConfig;
use threatwire::metrics::Metrics;
use threatwire::telemetry::{spawn_pump, DynObservability, TracingSink};

/// JSON logs when `LOG_FORMAT=json`, compact otherwise.
fn init_tracing() {
    let filter =
        EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("threatwire=info,warn"));

    let json = std::env::var("LOG_FORMAT")
        .map(|v| v.eq_ignore_ascii_case("json"))
        .unwrap_or(false);

    let registry = tracing_subscriber::registry().with(filter);
    // Shuttle may already have installed a subscriber.
    let _ = if json {
        registry.with(fmt::layer().json()).try_init()
    } else {
        registry.with(fmt::layer().compact()).try_init()
    };
}

#[shuttle_runtime::main]
async fn axum() -> ShuttleAxum {
    // Load .env in local/dev; no-op in prod environments.
    let _ = dotenvy::dotenv();

    init_tracing();

    let cfg = AppConfig::load_default().context("loading analysis config")?;
    info!(
        mode = %cfg.deployment.mode,
        canary_percent = cfg.deployment.canary_percent,
        daily_limit = cfg.budget.daily_limit,
        "analysis config loaded"
    );

    let metrics = Metrics::init(cfg.budget.daily_limit);

    let (inference, embeddings) = threatwire::build_clients(&cfg)?;
    let governor = Arc::new(BudgetGovernor::new(&cfg.tiers, &cfg.budget));
    // The pump task lives for the whole process.
    let (queue, _pump) = spawn_pump(TracingSink, cfg.telemetry.queue_capacity);
    let events: DynObservability = Arc::new(queue);

    let analyzer = ArticleAnalyzer::new(&cfg, inference, embeddings, governor, events);
    let router = api::create_router(AppState::new(Arc::new(analyzer)), &metrics);

    Ok(router.into())
}

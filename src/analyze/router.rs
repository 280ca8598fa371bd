// src/analyze/router.rs
//! # Strategy Router
//! Picks and runs one analysis strategy per call.
//!
//! The decision is re-evaluated on every call from the `DeploymentConfig`
//! passed in:
//! - baseline: one large-tier call for the full analysis
//! - tiered: classifier + extractor calls joined all-or-nothing
//! - canary: per-call draw in [0,100); below `canary_percent` runs tiered
//! - shadow: baseline is returned, tiered runs alongside for comparison only
//!
//! Any terminal failure yields `None` plus one fire-and-forget event.

use std::collections::BTreeSet;
use std::sync::Arc;

use metrics::counter;
use rand::Rng;
use serde::de::DeserializeOwned;
use serde_json::Value;
use tracing::{debug, info, warn};

use crate::analyze::decoder::{decode_reply, validate_response};
use crate::analyze::prompts::{
    baseline_request, classifier_request, extractor_request, BASELINE_REQUIRED,
    CLASSIFIER_REQUIRED, EXTRACTOR_REQUIRED,
};
use crate::analyze::types::{
    AnalysisResult, Article, Classification, Extraction, FullAnalysis, Strategy,
};
use crate::config::{DeploymentConfig, DeploymentMode, ModelCatalog};
use crate::inference::{DynInference, InferenceOptions, InferenceRequest};
use crate::telemetry::{anon_id, DynObservability, Event};

pub const BASELINE_FAILURE: &str = "baseline_analysis_failure";
pub const TIERED_FAILURE: &str = "tiered_analysis_failure";
pub const SHADOW_COMPARISON: &str = "shadow_comparison";

/// Uniform integer in [0, 100) for the canary split.
pub trait CanaryDraw: Send + Sync {
    fn draw(&self) -> u8;
}

#[derive(Debug, Default, Clone, Copy)]
pub struct RandomDraw;

impl CanaryDraw for RandomDraw {
    fn draw(&self) -> u8 {
        rand::rng().random_range(0..100)
    }
}

/// Always returns the same value; pins the canary branch in tests.
#[derive(Debug, Clone, Copy)]
pub struct FixedDraw(pub u8);

impl CanaryDraw for FixedDraw {
    fn draw(&self) -> u8 {
        self.0
    }
}

/// What one call will execute, after the canary draw.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Plan {
    Baseline,
    Tiered,
    /// Baseline returned, tiered compared.
    Shadow,
}

/// Why a sub-call produced no usable result.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum CallFailure {
    Upstream(&'static str),
    Timeout,
    Undecodable,
    Invalid,
}

impl CallFailure {
    fn label(&self) -> &'static str {
        match self {
            CallFailure::Upstream(kind) => *kind,
            CallFailure::Timeout => "timeout",
            CallFailure::Undecodable => "undecodable",
            CallFailure::Invalid => "invalid",
        }
    }
}

/// A failed strategy branch: which strategy, which role, and why.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct BranchFailure {
    pub strategy: Strategy,
    pub role: &'static str,
    pub cause: CallFailure,
}

impl BranchFailure {
    pub fn reason_tag(&self) -> &'static str {
        match self.strategy {
            Strategy::Baseline => BASELINE_FAILURE,
            Strategy::Tiered => TIERED_FAILURE,
        }
    }

    fn detail(&self) -> String {
        format!("{}:{}", self.role, self.cause.label())
    }
}

type BranchResult = Result<AnalysisResult, BranchFailure>;

#[derive(Clone)]
pub struct StrategyRouter {
    inference: DynInference,
    models: Arc<ModelCatalog>,
    events: DynObservability,
    draw: Arc<dyn CanaryDraw>,
    options: InferenceOptions,
}

impl StrategyRouter {
    pub fn new(inference: DynInference, models: ModelCatalog, events: DynObservability) -> Self {
        Self {
            inference,
            models: Arc::new(models),
            events,
            draw: Arc::new(RandomDraw),
            options: InferenceOptions::default(),
        }
    }

    pub fn with_canary_draw(mut self, draw: Arc<dyn CanaryDraw>) -> Self {
        self.draw = draw;
        self
    }

    pub fn with_options(mut self, options: InferenceOptions) -> Self {
        self.options = options;
        self
    }

    /// Decide what to execute for one call. Canary draws once per call.
    pub fn select(&self, cfg: &DeploymentConfig) -> Plan {
        match cfg.mode {
            DeploymentMode::Baseline => Plan::Baseline,
            DeploymentMode::Tiered => Plan::Tiered,
            DeploymentMode::Shadow => Plan::Shadow,
            DeploymentMode::Canary => {
                if self.draw.draw() < cfg.canary_percent {
                    Plan::Tiered
                } else {
                    Plan::Baseline
                }
            }
        }
    }

    /// Analyze one article under `cfg`. `None` means "no analysis, retry later".
    pub async fn route(&self, article: &Article, cfg: &DeploymentConfig) -> Option<AnalysisResult> {
        let plan = self.select(cfg);
        debug!(target: "analysis", id = %anon_id(&article.id), mode = %cfg.mode, ?plan, "routing");

        let outcome = match plan {
            Plan::Baseline => self.run_baseline(article).await,
            Plan::Tiered => self.run_tiered(article).await,
            Plan::Shadow => self.run_shadow(article, cfg.validation_logging).await,
        };

        match outcome {
            Ok(result) => {
                counter!("analysis_requests_total", "strategy" => result.strategy.as_str())
                    .increment(1);
                Some(result)
            }
            Err(failure) => {
                self.report_failure(article, &failure);
                None
            }
        }
    }

    /// One large-tier call for the whole analysis. No internal retry.
    pub async fn run_baseline(&self, article: &Article) -> BranchResult {
        let full: FullAnalysis = self
            .call_typed(&self.models.large, baseline_request(article), &BASELINE_REQUIRED)
            .await
            .map_err(|cause| BranchFailure {
                strategy: Strategy::Baseline,
                role: "large",
                cause,
            })?;
        Ok(AnalysisResult::assemble(
            full.classification,
            full.extraction,
            Strategy::Baseline,
        ))
    }

    /// Classifier and extractor run concurrently; the first failure abandons
    /// the other call and fails the branch.
    pub async fn run_tiered(&self, article: &Article) -> BranchResult {
        let classify = async {
            self.call_typed::<Classification>(
                &self.models.classifier,
                classifier_request(article),
                &CLASSIFIER_REQUIRED,
            )
            .await
            .map_err(|cause| BranchFailure {
                strategy: Strategy::Tiered,
                role: "classifier",
                cause,
            })
        };
        let extract = async {
            self.call_typed::<Extraction>(
                &self.models.extractor,
                extractor_request(article),
                &EXTRACTOR_REQUIRED,
            )
            .await
            .map_err(|cause| BranchFailure {
                strategy: Strategy::Tiered,
                role: "extractor",
                cause,
            })
        };
        let (classification, extraction) = tokio::try_join!(classify, extract)?;
        Ok(AnalysisResult::assemble(
            classification,
            extraction,
            Strategy::Tiered,
        ))
    }

    /// Baseline is awaited and returned; tiered runs on its own task and is
    /// only looked at afterwards, for the comparison event.
    async fn run_shadow(&self, article: &Article, validation_logging: bool) -> BranchResult {
        let shadow_router = self.clone();
        let shadow_article = article.clone();
        let shadow =
            tokio::spawn(async move { shadow_router.run_tiered(&shadow_article).await });

        let primary = self.run_baseline(article).await;

        if validation_logging {
            let events = self.events.clone();
            let key = article.id.clone();
            let baseline = primary.as_ref().ok().cloned();
            tokio::spawn(async move {
                let tiered = match shadow.await {
                    Ok(Ok(r)) => Some(r),
                    _ => None,
                };
                let cmp = ShadowComparison::compare(baseline.as_ref(), tiered.as_ref());
                info!(
                    target: "analysis",
                    id = %anon_id(&key),
                    disagreements = ?cmp.disagreements,
                    baseline_ok = cmp.baseline_ok,
                    tiered_ok = cmp.tiered_ok,
                    "shadow comparison"
                );
                events.emit(cmp.into_event(&key, baseline.as_ref(), tiered.as_ref()));
            });
        }
        // Without validation logging the shadow task finishes detached and its result is dropped.

        primary
    }

    async fn call_typed<T: DeserializeOwned>(
        &self,
        model: &str,
        request: InferenceRequest,
        required: &[&str],
    ) -> Result<T, CallFailure> {
        let call = self.inference.run(model, &request, &self.options);
        let reply = match tokio::time::timeout(self.options.timeout, call).await {
            Err(_) => return Err(CallFailure::Timeout),
            Ok(Err(e)) => {
                debug!(target: "analysis", model, error = %e, "inference call failed");
                return Err(match e {
                    crate::inference::InferenceError::Timeout(_) => CallFailure::Timeout,
                    other => CallFailure::Upstream(other.kind()),
                });
            }
            Ok(Ok(reply)) => reply,
        };
        let value = decode_reply(&reply.response, None).ok_or(CallFailure::Undecodable)?;
        if !validate_response(&value, required) {
            return Err(CallFailure::Invalid);
        }
        serde_json::from_value(value).map_err(|e| {
            debug!(target: "analysis", model, error = %e, "reply did not match expected shape");
            CallFailure::Invalid
        })
    }

    fn report_failure(&self, article: &Article, failure: &BranchFailure) {
        let reason = failure.reason_tag();
        warn!(
            target: "analysis",
            id = %anon_id(&article.id),
            reason,
            detail = %failure.detail(),
            "analysis failed"
        );
        counter!("analysis_failures_total", "reason" => reason).increment(1);
        self.events.emit(
            Event::new(article.id.clone())
                .tag(reason)
                .tag(failure.detail())
                .metric(1.0),
        );
    }
}

/// Field-level agreement between the baseline and shadow (tiered) results.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ShadowComparison {
    pub baseline_ok: bool,
    pub tiered_ok: bool,
    pub agreed: Vec<&'static str>,
    pub disagreements: Vec<&'static str>,
}

impl ShadowComparison {
    pub fn compare(baseline: Option<&AnalysisResult>, tiered: Option<&AnalysisResult>) -> Self {
        let mut agreed = Vec::new();
        let mut disagreements = Vec::new();
        if let (Some(b), Some(t)) = (baseline, tiered) {
            let checks: [(&'static str, bool); 6] = [
                ("category", b.category == t.category),
                ("severity", b.severity == t.severity),
                (
                    "threat_actors",
                    lowercase_set(&b.threat_actors) == lowercase_set(&t.threat_actors),
                ),
                (
                    "affected_sectors",
                    lowercase_set(&b.affected_sectors) == lowercase_set(&t.affected_sectors),
                ),
                ("key_points", b.key_points.len() == t.key_points.len()),
                ("iocs", b.iocs == t.iocs),
            ];
            for (field, same) in checks {
                if same {
                    agreed.push(field);
                } else {
                    disagreements.push(field);
                }
            }
        }
        Self {
            baseline_ok: baseline.is_some(),
            tiered_ok: tiered.is_some(),
            agreed,
            disagreements,
        }
    }

    /// Tags: kind, branch outcomes, disagreeing fields, both results as JSON.
    /// Metrics: `[agreed, disagreed, baseline_ok, tiered_ok]`.
    pub fn into_event(
        self,
        key: &str,
        baseline: Option<&AnalysisResult>,
        tiered: Option<&AnalysisResult>,
    ) -> Event {
        let as_json = |r: Option<&AnalysisResult>| {
            r.and_then(|r| serde_json::to_string(r).ok())
                .unwrap_or_else(|| Value::Null.to_string())
        };
        Event::new(key)
            .tag(SHADOW_COMPARISON)
            .tag(format!("baseline:{}", outcome(self.baseline_ok)))
            .tag(format!("tiered:{}", outcome(self.tiered_ok)))
            .tag(format!("disagree:{}", self.disagreements.join(",")))
            .tag(as_json(baseline))
            .tag(as_json(tiered))
            .metric(self.agreed.len() as f64)
            .metric(self.disagreements.len() as f64)
            .metric(if self.baseline_ok { 1.0 } else { 0.0 })
            .metric(if self.tiered_ok { 1.0 } else { 0.0 })
    }
}

fn outcome(ok: bool) -> &'static str {
    if ok {
        "ok"
    } else {
        "failed"
    }
}

fn lowercase_set(items: &[String]) -> BTreeSet<String> {
    items.iter().map(|s| s.to_ascii_lowercase()).collect()
}

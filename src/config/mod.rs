// src/config/mod.rs
//! Application configuration: `config/analysis.toml` plus env overrides.

pub mod deployment;
pub mod models;

use anyhow::{anyhow, Context, Result};
use serde::{Deserialize, Serialize};
use std::fs;
use std::path::{Path, PathBuf};

pub use deployment::{DeploymentConfig, DeploymentMode};
pub use models::{default_tiers, find_tier, ModelCatalog, ModelTier, TierShape};

pub const DEFAULT_CONFIG_PATH: &str = "config/analysis.toml";
pub const ENV_CONFIG_PATH: &str = "ANALYSIS_CONFIG_PATH";
pub const ENV_MODE: &str = "ANALYSIS_MODE";
pub const ENV_CANARY_PERCENT: &str = "CANARY_PERCENT";
pub const ENV_VALIDATION_LOGGING: &str = "VALIDATION_LOGGING";
pub const ENV_DAILY_LIMIT: &str = "DAILY_UNIT_LIMIT";
pub const ENV_API_TOKEN: &str = "INFERENCE_API_TOKEN";

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct BudgetConfig {
    #[serde(default = "default_daily_limit")]
    pub daily_limit: f64,
    #[serde(default = "default_warning_percent")]
    pub warning_percent: f64,
    #[serde(default = "default_critical_percent")]
    pub critical_percent: f64,
}

fn default_daily_limit() -> f64 {
    10_000.0
}
fn default_warning_percent() -> f64 {
    80.0
}
fn default_critical_percent() -> f64 {
    95.0
}

impl Default for BudgetConfig {
    fn default() -> Self {
        Self {
            daily_limit: default_daily_limit(),
            warning_percent: default_warning_percent(),
            critical_percent: default_critical_percent(),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LimitsConfig {
    /// Character budget for embedding input.
    #[serde(default = "default_embed_max_chars")]
    pub embed_max_chars: usize,
    /// Max articles folded into one trend summary prompt.
    #[serde(default = "default_trends_max_articles")]
    pub trends_max_articles: usize,
    /// Per inference call.
    #[serde(default = "default_call_timeout_ms")]
    pub call_timeout_ms: u64,
    /// Whole-analysis deadline used by the HTTP surface.
    #[serde(default = "default_request_deadline_ms")]
    pub request_deadline_ms: u64,
}

fn default_embed_max_chars() -> usize {
    2_000
}
fn default_trends_max_articles() -> usize {
    40
}
fn default_call_timeout_ms() -> u64 {
    20_000
}
fn default_request_deadline_ms() -> u64 {
    45_000
}

impl Default for LimitsConfig {
    fn default() -> Self {
        Self {
            embed_max_chars: default_embed_max_chars(),
            trends_max_articles: default_trends_max_articles(),
            call_timeout_ms: default_call_timeout_ms(),
            request_deadline_ms: default_request_deadline_ms(),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct InferenceConfig {
    /// "workers-ai" | "mock"
    #[serde(default = "default_provider")]
    pub provider: String,
    #[serde(default)]
    pub account_id: String,
    /// "ENV" means: read from INFERENCE_API_TOKEN
    #[serde(default = "default_api_token")]
    pub api_token: String,
    #[serde(default = "default_base_url")]
    pub base_url: String,
}

fn default_provider() -> String {
    "workers-ai".to_string()
}
fn default_api_token() -> String {
    "ENV".to_string()
}
fn default_base_url() -> String {
    "https://api.cloudflare.com/client/v4".to_string()
}

impl Default for InferenceConfig {
    fn default() -> Self {
        Self {
            provider: default_provider(),
            account_id: String::new(),
            api_token: default_api_token(),
            base_url: default_base_url(),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TelemetryConfig {
    #[serde(default = "default_queue_capacity")]
    pub queue_capacity: usize,
}

fn default_queue_capacity() -> usize {
    256
}

impl Default for TelemetryConfig {
    fn default() -> Self {
        Self {
            queue_capacity: default_queue_capacity(),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AppConfig {
    #[serde(default)]
    pub deployment: DeploymentConfig,
    #[serde(default)]
    pub budget: BudgetConfig,
    #[serde(default)]
    pub models: ModelCatalog,
    #[serde(default = "default_tiers")]
    pub tiers: Vec<ModelTier>,
    #[serde(default)]
    pub limits: LimitsConfig,
    #[serde(default)]
    pub inference: InferenceConfig,
    #[serde(default)]
    pub telemetry: TelemetryConfig,
}

impl Default for AppConfig {
    fn default() -> Self {
        Self {
            deployment: DeploymentConfig::default(),
            budget: BudgetConfig::default(),
            models: ModelCatalog::default(),
            tiers: default_tiers(),
            limits: LimitsConfig::default(),
            inference: InferenceConfig::default(),
            telemetry: TelemetryConfig::default(),
        }
    }
}

impl AppConfig {
    /// Parse a TOML document, then sanitize. Env overrides are not applied here.
    pub fn from_toml_str(s: &str) -> Result<Self> {
        let mut cfg: AppConfig = toml::from_str(s).context("parsing analysis config")?;
        if cfg.tiers.is_empty() {
            cfg.tiers = default_tiers();
        }
        cfg.sanitize();
        Ok(cfg)
    }

    pub fn load_from_file<P: AsRef<Path>>(path: P) -> Result<Self> {
        let path = path.as_ref();
        let data = fs::read_to_string(path)
            .with_context(|| format!("reading analysis config from {}", path.display()))?;
        let mut cfg = Self::from_toml_str(&data)?;
        cfg.apply_env_overrides()?;
        Ok(cfg)
    }

    /// 1) $ANALYSIS_CONFIG_PATH (must exist)
    /// 2) config/analysis.toml
    /// 3) built-in defaults
    pub fn load_default() -> Result<Self> {
        if let Ok(p) = std::env::var(ENV_CONFIG_PATH) {
            let pb = PathBuf::from(p);
            if !pb.exists() {
                return Err(anyhow!("{ENV_CONFIG_PATH} points to non-existent path"));
            }
            return Self::load_from_file(&pb);
        }
        let default_p = PathBuf::from(DEFAULT_CONFIG_PATH);
        if default_p.exists() {
            return Self::load_from_file(&default_p);
        }
        let mut cfg = Self::default();
        cfg.apply_env_overrides()?;
        Ok(cfg)
    }

    pub fn apply_env_overrides(&mut self) -> Result<()> {
        if let Ok(mode) = std::env::var(ENV_MODE) {
            self.deployment.mode = mode.parse()?;
        }
        if let Ok(raw) = std::env::var(ENV_CANARY_PERCENT) {
            let pct: u32 = raw
                .trim()
                .parse()
                .with_context(|| format!("{ENV_CANARY_PERCENT} is not an integer: {raw}"))?;
            self.deployment.canary_percent = pct.min(100) as u8;
        }
        if let Ok(raw) = std::env::var(ENV_VALIDATION_LOGGING) {
            self.deployment.validation_logging = parse_flag(&raw);
        }
        if let Ok(raw) = std::env::var(ENV_DAILY_LIMIT) {
            self.budget.daily_limit = raw
                .trim()
                .parse()
                .with_context(|| format!("{ENV_DAILY_LIMIT} is not a number: {raw}"))?;
        }
        if self.inference.api_token.trim().eq_ignore_ascii_case("env") {
            self.inference.api_token = std::env::var(ENV_API_TOKEN).unwrap_or_default();
        }
        self.sanitize();
        Ok(())
    }

    fn sanitize(&mut self) {
        self.deployment.sanitize();
        self.inference.provider = self.inference.provider.to_ascii_lowercase();
        if !(self.budget.daily_limit.is_finite() && self.budget.daily_limit >= 0.0) {
            self.budget.daily_limit = default_daily_limit();
        }
        if self.budget.warning_percent > self.budget.critical_percent {
            std::mem::swap(
                &mut self.budget.warning_percent,
                &mut self.budget.critical_percent,
            );
        }
        if self.limits.embed_max_chars == 0 {
            self.limits.embed_max_chars = default_embed_max_chars();
        }
    }
}

fn parse_flag(raw: &str) -> bool {
    matches!(
        raw.trim().to_ascii_lowercase().as_str(),
        "1" | "true" | "yes" | "on"
    )
}

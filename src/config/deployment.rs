// src/config/deployment.rs
//! Deployment mode selection: which analysis strategy the router runs.

use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

/// Process-wide analysis mode.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Default)]
#[serde(rename_all = "lowercase")]
pub enum DeploymentMode {
    /// One call to the large generalist tier.
    #[default]
    Baseline,
    /// Classifier + extractor tiers, run concurrently.
    Tiered,
    /// Per-call random split between tiered and baseline.
    Canary,
    /// Baseline is returned; tiered runs alongside for comparison only.
    Shadow,
}

impl DeploymentMode {
    pub fn as_str(&self) -> &'static str {
        match self {
            DeploymentMode::Baseline => "baseline",
            DeploymentMode::Tiered => "tiered",
            DeploymentMode::Canary => "canary",
            DeploymentMode::Shadow => "shadow",
        }
    }
}

impl fmt::Display for DeploymentMode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for DeploymentMode {
    type Err = anyhow::Error;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "baseline" => Ok(DeploymentMode::Baseline),
            "tiered" => Ok(DeploymentMode::Tiered),
            "canary" => Ok(DeploymentMode::Canary),
            "shadow" => Ok(DeploymentMode::Shadow),
            other => anyhow::bail!("unknown analysis mode: {other}"),
        }
    }
}

/// Read at the start of every call and never mutated mid-call.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct DeploymentConfig {
    #[serde(default)]
    pub mode: DeploymentMode,
    /// 0–100; only consulted in canary mode.
    #[serde(default = "default_canary_percent")]
    pub canary_percent: u8,
    /// Only consulted in shadow mode.
    #[serde(default)]
    pub validation_logging: bool,
}

fn default_canary_percent() -> u8 {
    10
}

impl Default for DeploymentConfig {
    fn default() -> Self {
        Self {
            mode: DeploymentMode::Baseline,
            canary_percent: default_canary_percent(),
            validation_logging: false,
        }
    }
}

impl DeploymentConfig {
    pub fn new(mode: DeploymentMode) -> Self {
        Self {
            mode,
            ..Self::default()
        }
    }

    pub fn with_canary_percent(mut self, percent: u8) -> Self {
        self.canary_percent = percent.min(100);
        self
    }

    pub fn with_validation_logging(mut self, on: bool) -> Self {
        self.validation_logging = on;
        self
    }

    /// Clamp out-of-range values loaded from files or env.
    pub(crate) fn sanitize(&mut self) {
        if self.canary_percent > 100 {
            self.canary_percent = 100;
        }
    }
}

//! Deterministic mock provider for local runs (`AI_TEST_MODE=mock`) and tests.

use std::collections::HashMap;

use async_trait::async_trait;
use serde_json::{json, Value};
use sha2::{Digest, Sha256};

use super::{
    approx_tokens, EmbeddingClient, EmbeddingReply, InferenceClient, InferenceError,
    InferenceOptions, InferenceReply, InferenceRequest, TokenUsage,
};
use crate::config::ModelTier;

/// Returns one fixed, complete analysis for every text call and a stable
/// hash-derived vector for every embedding call.
#[derive(Clone)]
pub struct MockInference {
    fixed: Value,
    dimensions: HashMap<String, usize>,
}

impl MockInference {
    pub fn new(tiers: &[ModelTier]) -> Self {
        let dimensions = tiers
            .iter()
            .filter_map(|t| t.dimensions.map(|d| (t.id.clone(), d)))
            .collect();
        Self {
            fixed: json!({
                "tldr": "Neutral summary (mock)",
                "category": "other",
                "severity": "info",
                "key_points": ["Mock analysis; no model was called."],
                "affected_sectors": [],
                "threat_actors": [],
                "iocs": {}
            }),
            dimensions,
        }
    }

    pub fn with_fixed(mut self, fixed: Value) -> Self {
        self.fixed = fixed;
        self
    }
}

#[async_trait]
impl InferenceClient for MockInference {
    async fn run(
        &self,
        _model: &str,
        request: &InferenceRequest,
        _options: &InferenceOptions,
    ) -> Result<InferenceReply, InferenceError> {
        let out = self.fixed.clone();
        let usage = TokenUsage::new(
            approx_tokens(&request.prompt_text()),
            approx_tokens(&out.to_string()),
        );
        Ok(InferenceReply::new(out).with_usage(usage))
    }

    fn provider_name(&self) -> &'static str {
        "mock"
    }
}

#[async_trait]
impl EmbeddingClient for MockInference {
    async fn embed(
        &self,
        model: &str,
        texts: &[String],
        _options: &InferenceOptions,
    ) -> Result<EmbeddingReply, InferenceError> {
        let dims = *self
            .dimensions
            .get(model)
            .ok_or_else(|| InferenceError::Unavailable(format!("no embedding tier {model}")))?;
        let vectors = texts.iter().map(|t| hash_vector(t, dims)).collect();
        let tokens = texts.iter().map(|t| approx_tokens(t)).sum();
        Ok(EmbeddingReply {
            vectors,
            usage: Some(TokenUsage::new(tokens, 0)),
        })
    }
}

/// Stretch a SHA-256 digest over `dims` values in [-1, 1].
fn hash_vector(text: &str, dims: usize) -> Vec<f32> {
    let digest = Sha256::digest(text.as_bytes());
    (0..dims)
        .map(|i| (digest[i % digest.len()] as f32 / 127.5) - 1.0)
        .collect()
}

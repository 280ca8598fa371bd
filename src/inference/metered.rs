//! Metering wrappers: charge the budget governor after every successful call.
//!
//! This is the only path that mutates the usage ledger. Failed calls are not
//! charged. When the provider omits usage, tokens are estimated from text length.

use std::sync::Arc;
use std::time::Instant;

use async_trait::async_trait;
use metrics::{counter, histogram};
use serde_json::Value;
use tracing::debug;

use super::{
    approx_tokens, EmbeddingClient, EmbeddingReply, InferenceClient, InferenceError,
    InferenceOptions, InferenceReply, InferenceRequest,
};
use crate::budget::BudgetGovernor;

pub struct MeteredInference<C> {
    inner: C,
    governor: Arc<BudgetGovernor>,
}

impl<C: InferenceClient> MeteredInference<C> {
    pub fn new(inner: C, governor: Arc<BudgetGovernor>) -> Self {
        Self { inner, governor }
    }
}

#[async_trait]
impl<C: InferenceClient> InferenceClient for MeteredInference<C> {
    async fn run(
        &self,
        model: &str,
        request: &InferenceRequest,
        options: &InferenceOptions,
    ) -> Result<InferenceReply, InferenceError> {
        let started = Instant::now();
        let out = self.inner.run(model, request, options).await;
        histogram!("inference_latency_ms").record(started.elapsed().as_secs_f64() * 1000.0);

        match &out {
            Ok(reply) => {
                let (input, output) = match reply.usage {
                    Some(u) => (u.prompt_tokens, u.completion_tokens),
                    None => (
                        approx_tokens(&request.prompt_text()),
                        approx_tokens(&reply_text(&reply.response)),
                    ),
                };
                let units = self.governor.record(model, input as i64, output as i64);
                debug!(target: "inference", model, input, output, units, "charged call");
                counter!("inference_calls_total", "model" => model.to_string(), "outcome" => "ok")
                    .increment(1);
            }
            Err(e) => {
                counter!("inference_calls_total", "model" => model.to_string(), "outcome" => e.kind())
                    .increment(1);
            }
        }
        out
    }

    fn provider_name(&self) -> &'static str {
        self.inner.provider_name()
    }
}

pub struct MeteredEmbeddings<C> {
    inner: C,
    governor: Arc<BudgetGovernor>,
}

impl<C: EmbeddingClient> MeteredEmbeddings<C> {
    pub fn new(inner: C, governor: Arc<BudgetGovernor>) -> Self {
        Self { inner, governor }
    }
}

#[async_trait]
impl<C: EmbeddingClient> EmbeddingClient for MeteredEmbeddings<C> {
    async fn embed(
        &self,
        model: &str,
        texts: &[String],
        options: &InferenceOptions,
    ) -> Result<EmbeddingReply, InferenceError> {
        let out = self.inner.embed(model, texts, options).await;
        match &out {
            Ok(reply) => {
                let input = reply
                    .usage
                    .map(|u| u.prompt_tokens)
                    .unwrap_or_else(|| texts.iter().map(|t| approx_tokens(t)).sum());
                self.governor.record(model, input as i64, 0);
                counter!("inference_calls_total", "model" => model.to_string(), "outcome" => "ok")
                    .increment(1);
            }
            Err(e) => {
                counter!("inference_calls_total", "model" => model.to_string(), "outcome" => e.kind())
                    .increment(1);
            }
        }
        out
    }
}

fn reply_text(v: &Value) -> String {
    match v {
        Value::String(s) => s.clone(),
        other => other.to_string(),
    }
}

//! Workers-AI style REST client: `POST {base}/accounts/{account}/ai/run/{model}`.
//! Requires an account id and API token (see `[inference]` in the config).

use std::time::Duration;

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use serde_json::Value;

use super::{
    ChatMessage, EmbeddingClient, EmbeddingReply, InferenceClient, InferenceError,
    InferenceOptions, InferenceReply, InferenceRequest, TokenUsage,
};
use crate::config::InferenceConfig;

pub struct WorkersAiClient {
    http: reqwest::Client,
    base_url: String,
    account_id: String,
    api_token: String,
}

impl WorkersAiClient {
    pub fn new(cfg: &InferenceConfig) -> Result<Self, InferenceError> {
        let http = reqwest::Client::builder()
            .user_agent(concat!("threatwire/", env!("CARGO_PKG_VERSION")))
            .connect_timeout(Duration::from_secs(4))
            .build()
            .map_err(|e| InferenceError::Transport(e.to_string()))?;
        Ok(Self {
            http,
            base_url: cfg.base_url.trim_end_matches('/').to_string(),
            account_id: cfg.account_id.clone(),
            api_token: cfg.api_token.clone(),
        })
    }

    fn run_url(&self, model: &str) -> String {
        format!(
            "{}/accounts/{}/ai/run/{}",
            self.base_url, self.account_id, model
        )
    }

    async fn post<B: Serialize + ?Sized>(
        &self,
        model: &str,
        body: &B,
        timeout: Duration,
    ) -> Result<Value, InferenceError> {
        if self.api_token.is_empty() || self.account_id.is_empty() {
            return Err(InferenceError::MissingCredentials);
        }
        let resp = self
            .http
            .post(self.run_url(model))
            .bearer_auth(&self.api_token)
            .timeout(timeout)
            .json(body)
            .send()
            .await
            .map_err(|e| {
                if e.is_timeout() {
                    InferenceError::Timeout(timeout)
                } else {
                    InferenceError::from(e)
                }
            })?;

        let status = resp.status();
        if !status.is_success() {
            let body = resp.text().await.unwrap_or_default();
            return Err(InferenceError::Status {
                status: status.as_u16(),
                body: truncate(&body, 300),
            });
        }
        let envelope: Envelope = resp.json().await?;
        envelope.into_result()
    }
}

#[derive(Deserialize)]
struct Envelope {
    #[serde(default)]
    result: Option<Value>,
    #[serde(default = "default_success")]
    success: bool,
    #[serde(default)]
    errors: Vec<Value>,
}

fn default_success() -> bool {
    true
}

impl Envelope {
    fn into_result(self) -> Result<Value, InferenceError> {
        if !self.success {
            let msg = self
                .errors
                .iter()
                .map(|e| e.get("message").and_then(Value::as_str).unwrap_or("?"))
                .collect::<Vec<_>>()
                .join("; ");
            return Err(InferenceError::Unavailable(msg));
        }
        self.result
            .ok_or_else(|| InferenceError::Decode("envelope without result".into()))
    }
}

#[derive(Serialize)]
struct RunBody<'a> {
    messages: &'a [ChatMessage],
    max_tokens: u32,
    temperature: f32,
    #[serde(skip_serializing_if = "Option::is_none")]
    response_format: Option<&'a Value>,
}

#[derive(Serialize)]
struct EmbedBody<'a> {
    text: &'a [String],
}

/// Split a text-generation `result` into the model output and usage.
pub(crate) fn parse_run_result(mut result: Value) -> InferenceReply {
    let usage = result
        .get("usage")
        .and_then(|u| serde_json::from_value::<TokenUsage>(u.clone()).ok());
    let response = match result.get_mut("response") {
        Some(v) => v.take(),
        // Some tiers return the payload directly.
        None => result,
    };
    InferenceReply { response, usage }
}

pub(crate) fn parse_embed_result(result: Value) -> Result<EmbeddingReply, InferenceError> {
    #[derive(Deserialize)]
    struct EmbedResult {
        data: Vec<Vec<f32>>,
        #[serde(default)]
        usage: Option<TokenUsage>,
    }
    let parsed: EmbedResult =
        serde_json::from_value(result).map_err(|e| InferenceError::Decode(e.to_string()))?;
    Ok(EmbeddingReply {
        vectors: parsed.data,
        usage: parsed.usage,
    })
}

#[async_trait]
impl InferenceClient for WorkersAiClient {
    async fn run(
        &self,
        model: &str,
        request: &InferenceRequest,
        options: &InferenceOptions,
    ) -> Result<InferenceReply, InferenceError> {
        let body = RunBody {
            messages: &request.messages,
            max_tokens: options.max_tokens,
            temperature: options.temperature,
            response_format: request.response_format.as_ref(),
        };
        let result = self.post(model, &body, options.timeout).await?;
        Ok(parse_run_result(result))
    }

    fn provider_name(&self) -> &'static str {
        "workers-ai"
    }
}

#[async_trait]
impl EmbeddingClient for WorkersAiClient {
    async fn embed(
        &self,
        model: &str,
        texts: &[String],
        options: &InferenceOptions,
    ) -> Result<EmbeddingReply, InferenceError> {
        let result = self
            .post(model, &EmbedBody { text: texts }, options.timeout)
            .await?;
        parse_embed_result(result)
    }
}

fn truncate(s: &str, max: usize) -> String {
    s.chars().take(max).collect()
}

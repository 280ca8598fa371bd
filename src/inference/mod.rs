//! Inference capability surface.
//!
//! The analysis core only sees these traits. Concrete clients live in
//! submodules: `workers_ai` (HTTP), `mock` (deterministic, for local runs and
//! tests) and `metered` (wraps any client and charges the budget governor).

pub mod metered;
pub mod mock;
pub mod workers_ai;

use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use serde_json::Value;

pub use metered::{MeteredEmbeddings, MeteredInference};
pub use mock::MockInference;
pub use workers_ai::WorkersAiClient;

/// Role in a chat conversation.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "lowercase")]
pub enum Role {
    System,
    User,
    Assistant,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct ChatMessage {
    pub role: Role,
    pub content: String,
}

impl ChatMessage {
    pub fn system(content: impl Into<String>) -> Self {
        Self {
            role: Role::System,
            content: content.into(),
        }
    }

    pub fn user(content: impl Into<String>) -> Self {
        Self {
            role: Role::User,
            content: content.into(),
        }
    }
}

/// Body of one inference call.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct InferenceRequest {
    pub messages: Vec<ChatMessage>,
    /// JSON-schema style response format, when the tier supports structured output.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub response_format: Option<Value>,
}

impl InferenceRequest {
    pub fn chat(system: impl Into<String>, user: impl Into<String>) -> Self {
        Self {
            messages: vec![ChatMessage::system(system), ChatMessage::user(user)],
            response_format: None,
        }
    }

    pub fn with_response_format(mut self, format: Value) -> Self {
        self.response_format = Some(format);
        self
    }

    /// Concatenated message text, used for token estimates.
    pub fn prompt_text(&self) -> String {
        let mut out = String::new();
        for m in &self.messages {
            out.push_str(&m.content);
            out.push('\n');
        }
        out
    }
}

/// Per-call knobs.
#[derive(Debug, Clone, PartialEq)]
pub struct InferenceOptions {
    pub max_tokens: u32,
    pub temperature: f32,
    pub timeout: Duration,
}

impl Default for InferenceOptions {
    fn default() -> Self {
        Self {
            max_tokens: 1024,
            temperature: 0.1,
            timeout: Duration::from_secs(20),
        }
    }
}

impl InferenceOptions {
    pub fn with_max_tokens(mut self, n: u32) -> Self {
        self.max_tokens = n;
        self
    }

    pub fn with_timeout(mut self, timeout: Duration) -> Self {
        self.timeout = timeout;
        self
    }
}

/// Token usage reported by the provider (if any).
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Default)]
pub struct TokenUsage {
    #[serde(default)]
    pub prompt_tokens: u64,
    #[serde(default)]
    pub completion_tokens: u64,
}

impl TokenUsage {
    pub fn new(prompt_tokens: u64, completion_tokens: u64) -> Self {
        Self {
            prompt_tokens,
            completion_tokens,
        }
    }
}

/// Opaque reply: whatever the model produced, plus usage when reported.
#[derive(Debug, Clone, PartialEq)]
pub struct InferenceReply {
    pub response: Value,
    pub usage: Option<TokenUsage>,
}

impl InferenceReply {
    pub fn new(response: Value) -> Self {
        Self {
            response,
            usage: None,
        }
    }

    pub fn with_usage(mut self, usage: TokenUsage) -> Self {
        self.usage = Some(usage);
        self
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct EmbeddingReply {
    pub vectors: Vec<Vec<f32>>,
    pub usage: Option<TokenUsage>,
}

#[derive(Debug, thiserror::Error)]
pub enum InferenceError {
    #[error("transport error: {0}")]
    Transport(String),
    #[error("upstream returned HTTP {status}: {body}")]
    Status { status: u16, body: String },
    #[error("inference call timed out after {0:?}")]
    Timeout(Duration),
    #[error("could not decode upstream reply: {0}")]
    Decode(String),
    #[error("inference credentials are not configured")]
    MissingCredentials,
    #[error("inference unavailable: {0}")]
    Unavailable(String),
}

impl InferenceError {
    /// Short label for metrics.
    pub fn kind(&self) -> &'static str {
        match self {
            InferenceError::Transport(_) => "transport",
            InferenceError::Status { .. } => "status",
            InferenceError::Timeout(_) => "timeout",
            InferenceError::Decode(_) => "decode",
            InferenceError::MissingCredentials => "credentials",
            InferenceError::Unavailable(_) => "unavailable",
        }
    }
}

impl From<reqwest::Error> for InferenceError {
    fn from(e: reqwest::Error) -> Self {
        if e.is_timeout() {
            InferenceError::Timeout(Duration::ZERO)
        } else if e.is_decode() {
            InferenceError::Decode(e.to_string())
        } else {
            InferenceError::Transport(e.to_string())
        }
    }
}

/// Text/extraction inference. Errors mean "no result"; callers do not classify them.
#[async_trait]
pub trait InferenceClient: Send + Sync {
    async fn run(
        &self,
        model: &str,
        request: &InferenceRequest,
        options: &InferenceOptions,
    ) -> Result<InferenceReply, InferenceError>;

    /// Provider name for diagnostics.
    fn provider_name(&self) -> &'static str;
}

/// Embedding inference: one vector per input text.
#[async_trait]
pub trait EmbeddingClient: Send + Sync {
    async fn embed(
        &self,
        model: &str,
        texts: &[String],
        options: &InferenceOptions,
    ) -> Result<EmbeddingReply, InferenceError>;
}

pub type DynInference = Arc<dyn InferenceClient>;
pub type DynEmbeddings = Arc<dyn EmbeddingClient>;

#[async_trait]
impl<T: InferenceClient + ?Sized> InferenceClient for Arc<T> {
    async fn run(
        &self,
        model: &str,
        request: &InferenceRequest,
        options: &InferenceOptions,
    ) -> Result<InferenceReply, InferenceError> {
        (**self).run(model, request, options).await
    }

    fn provider_name(&self) -> &'static str {
        (**self).provider_name()
    }
}

#[async_trait]
impl<T: EmbeddingClient + ?Sized> EmbeddingClient for Arc<T> {
    async fn embed(
        &self,
        model: &str,
        texts: &[String],
        options: &InferenceOptions,
    ) -> Result<EmbeddingReply, InferenceError> {
        (**self).embed(model, texts, options).await
    }
}

/// Rough token estimate (~4 chars/token) for providers that omit usage.
pub fn approx_tokens(s: &str) -> u64 {
    (s.chars().count() as u64 + 3) / 4
}

// tests/common/mod.rs
//
// Shared test doubles: scripted inference/embedding clients and an event recorder.
#![allow(dead_code)]

use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use parking_lot::Mutex;
use serde_json::{json, Value};

use threatwire::inference::{
    EmbeddingClient, EmbeddingReply, InferenceClient, InferenceError, InferenceOptions,
    InferenceReply, InferenceRequest, TokenUsage,
};
use threatwire::telemetry::{Event, ObservabilityClient};

/// What a scripted model does when called.
#[derive(Debug, Clone)]
pub enum Step {
    Reply(Value),
    ReplyWithUsage(Value, TokenUsage),
    /// Sleep first (tokio time), then reply.
    Slow(Duration, Value),
    Fail(u16),
}

/// Per-model scripted replies. Unscripted models fail as unavailable.
#[derive(Default)]
pub struct ScriptedInference {
    steps: Mutex<HashMap<String, Step>>,
    calls: Mutex<Vec<String>>,
}

impl ScriptedInference {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn on(self, model: &str, step: Step) -> Self {
        self.steps.lock().insert(model.to_string(), step);
        self
    }

    pub fn calls(&self) -> Vec<String> {
        self.calls.lock().clone()
    }

    pub fn calls_to(&self, model: &str) -> usize {
        self.calls.lock().iter().filter(|m| *m == model).count()
    }
}

#[async_trait]
impl InferenceClient for ScriptedInference {
    async fn run(
        &self,
        model: &str,
        _request: &InferenceRequest,
        _options: &InferenceOptions,
    ) -> Result<InferenceReply, InferenceError> {
        self.calls.lock().push(model.to_string());
        let step = self.steps.lock().get(model).cloned();
        match step {
            Some(Step::Reply(v)) => Ok(InferenceReply::new(v)),
            Some(Step::ReplyWithUsage(v, usage)) => Ok(InferenceReply::new(v).with_usage(usage)),
            Some(Step::Slow(d, v)) => {
                tokio::time::sleep(d).await;
                Ok(InferenceReply::new(v))
            }
            Some(Step::Fail(status)) => Err(InferenceError::Status {
                status,
                body: "scripted failure".into(),
            }),
            None => Err(InferenceError::Unavailable(format!("no script for {model}"))),
        }
    }

    fn provider_name(&self) -> &'static str {
        "scripted"
    }
}

/// Returns a constant vector of `dimensions[model]` length per input text.
#[derive(Default)]
pub struct ScriptedEmbeddings {
    dimensions: HashMap<String, usize>,
    calls: Mutex<Vec<(String, Vec<String>)>>,
}

impl ScriptedEmbeddings {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_model(mut self, model: &str, dims: usize) -> Self {
        self.dimensions.insert(model.to_string(), dims);
        self
    }

    pub fn calls(&self) -> Vec<(String, Vec<String>)> {
        self.calls.lock().clone()
    }
}

#[async_trait]
impl EmbeddingClient for ScriptedEmbeddings {
    async fn embed(
        &self,
        model: &str,
        texts: &[String],
        _options: &InferenceOptions,
    ) -> Result<EmbeddingReply, InferenceError> {
        self.calls.lock().push((model.to_string(), texts.to_vec()));
        let Some(&dims) = self.dimensions.get(model) else {
            return Err(InferenceError::Unavailable(format!("no embedding model {model}")));
        };
        Ok(EmbeddingReply {
            vectors: texts.iter().map(|_| vec![0.5; dims]).collect(),
            usage: Some(TokenUsage::new(texts.len() as u64 * 10, 0)),
        })
    }
}

/// Collects emitted events in order.
#[derive(Default)]
pub struct RecordingEvents {
    events: Mutex<Vec<Event>>,
}

impl RecordingEvents {
    pub fn new() -> Arc<Self> {
        Arc::new(Self::default())
    }

    pub fn events(&self) -> Vec<Event> {
        self.events.lock().clone()
    }

    pub fn with_reason(&self, reason: &str) -> Vec<Event> {
        self.events
            .lock()
            .iter()
            .filter(|e| e.reason() == Some(reason))
            .cloned()
            .collect()
    }

    /// Poll until `n` events with `reason` arrived (spawned emitters), or give up.
    pub async fn wait_for(&self, reason: &str, n: usize) -> Vec<Event> {
        for _ in 0..200 {
            let got = self.with_reason(reason);
            if got.len() >= n {
                return got;
            }
            tokio::time::sleep(Duration::from_millis(5)).await;
        }
        self.with_reason(reason)
    }
}

impl ObservabilityClient for RecordingEvents {
    fn emit(&self, event: Event) {
        self.events.lock().push(event);
    }
}

pub fn full_analysis() -> Value {
    json!({
        "tldr": "LockBit hit a hospital chain.",
        "category": "ransomware",
        "severity": "high",
        "key_points": ["Encryption of EHR systems", "Ransom note references LockBit 3.0"],
        "affected_sectors": ["Healthcare"],
        "threat_actors": ["LockBit"],
        "iocs": { "ips": ["203.0.113[.]7"], "cves": ["cve-2023-4966"] }
    })
}

pub fn classification() -> Value {
    json!({
        "category": "ransomware",
        "severity": "critical",
        "tldr": "Hospital chain hit by ransomware.",
        "affected_sectors": ["healthcare"],
        "threat_actors": ["LockBit"]
    })
}

pub fn extraction() -> Value {
    json!({
        "key_points": ["EHR systems encrypted"],
        "iocs": { "ips": ["203.0.113.7"] }
    })
}

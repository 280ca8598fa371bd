//! # Telemetry
//! Fire-and-forget observability events.
//!
//! `emit` never blocks and never fails the caller: events go onto a bounded
//! queue and are dropped (and counted) when the queue is full or closed. A pump
//! task drains the queue into an `EventSink`.

use std::sync::Arc;

use async_trait::async_trait;
use metrics::counter;
use serde::Serialize;
use tokio::sync::mpsc;
use tokio::task::JoinHandle;
use tracing::{debug, info, warn};

/// One observability data point.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Event {
    pub tags: Vec<String>,
    pub metrics: Vec<f64>,
    pub partition_key: String,
}

impl Event {
    pub fn new(partition_key: impl Into<String>) -> Self {
        Self {
            tags: Vec::new(),
            metrics: Vec::new(),
            partition_key: partition_key.into(),
        }
    }

    pub fn tag(mut self, tag: impl Into<String>) -> Self {
        self.tags.push(tag.into());
        self
    }

    pub fn metric(mut self, value: f64) -> Self {
        self.metrics.push(value);
        self
    }

    /// First tag, by convention the event reason.
    pub fn reason(&self) -> Option<&str> {
        self.tags.first().map(String::as_str)
    }
}

/// Short, stable SHA-256 prefix so identifiers never show up raw in logs.
pub fn anon_id(text: &str) -> String {
    use sha2::{Digest, Sha256};
    let digest = Sha256::digest(text.as_bytes());
    let mut out = String::with_capacity(12);
    for b in digest.iter().take(6) {
        use std::fmt::Write as _;
        let _ = write!(&mut out, "{:02x}", b);
    }
    out
}

/// What the analysis core emits into.
pub trait ObservabilityClient: Send + Sync {
    fn emit(&self, event: Event);
}

pub type DynObservability = Arc<dyn ObservabilityClient>;

/// Where drained events end up.
#[async_trait]
pub trait EventSink: Send + Sync + 'static {
    async fn deliver(&self, event: Event) -> anyhow::Result<()>;
    fn name(&self) -> &'static str;
}

/// Writes events to the `telemetry` tracing target.
#[derive(Debug, Default, Clone, Copy)]
pub struct TracingSink;

#[async_trait]
impl EventSink for TracingSink {
    async fn deliver(&self, event: Event) -> anyhow::Result<()> {
        info!(
            target: "telemetry",
            partition = %event.partition_key,
            tags = ?event.tags,
            metrics = ?event.metrics,
            "event"
        );
        Ok(())
    }

    fn name(&self) -> &'static str {
        "tracing"
    }
}

/// Discards everything.
#[derive(Debug, Default, Clone, Copy)]
pub struct NullSink;

#[async_trait]
impl EventSink for NullSink {
    async fn deliver(&self, _event: Event) -> anyhow::Result<()> {
        Ok(())
    }

    fn name(&self) -> &'static str {
        "null"
    }
}

/// Sending half of the bounded event queue.
#[derive(Debug, Clone)]
pub struct EventQueue {
    tx: mpsc::Sender<Event>,
}

impl EventQueue {
    /// Queue without a pump; the caller owns the receiver.
    pub fn bounded(capacity: usize) -> (Self, mpsc::Receiver<Event>) {
        let (tx, rx) = mpsc::channel(capacity.max(1));
        (Self { tx }, rx)
    }
}

impl ObservabilityClient for EventQueue {
    fn emit(&self, event: Event) {
        if let Err(e) = self.tx.try_send(event) {
            let why = match e {
                mpsc::error::TrySendError::Full(_) => "full",
                mpsc::error::TrySendError::Closed(_) => "closed",
            };
            counter!("telemetry_events_dropped_total", "cause" => why).increment(1);
            debug!(target: "telemetry", cause = why, "event dropped");
        }
    }
}

/// Spawn the drain task. Sink failures are logged and swallowed.
pub fn spawn_pump<S: EventSink>(sink: S, capacity: usize) -> (EventQueue, JoinHandle<()>) {
    let (queue, mut rx) = EventQueue::bounded(capacity);
    let handle = tokio::spawn(async move {
        while let Some(event) = rx.recv().await {
            if let Err(e) = sink.deliver(event).await {
                warn!(target: "telemetry", sink = sink.name(), error = %e, "sink delivery failed");
            }
        }
        debug!(target: "telemetry", sink = sink.name(), "event pump stopped");
    });
    (queue, handle)
}

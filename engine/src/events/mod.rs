//! Structured interaction events
//!
//! The task loop reports its progress as `LogEvent`s handed to a `LogSink`.
//! Emission is fire-and-forget: a sink must never block the loop or fail it.
//! This is separate from diagnostic logging, which goes through `tracing`.

pub mod http;

pub use http::HttpLogSink;

use crate::config::TelemetryConfig;
use chrono::{DateTime, Utc};
use sdk::AgentError;
use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::sync::{Arc, Mutex};
use tracing::{info, warn};

/// Kind of a log event
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum LogEventKind {
    InteractionStart,
    PlanNextActions,
    PlanFinalResponse,
    ExecuteAction,
    InteractionComplete,
    InteractionFailed,
}

impl LogEventKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::InteractionStart => "interaction_start",
            Self::PlanNextActions => "plan_next_actions",
            Self::PlanFinalResponse => "plan_final_response",
            Self::ExecuteAction => "execute_action",
            Self::InteractionComplete => "interaction_complete",
            Self::InteractionFailed => "interaction_failed",
        }
    }
}

/// Outcome carried by an event
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum EventStatus {
    Started,
    Success,
    Error,
}

/// Token and cost usage attached to an event
#[derive(Debug, Clone, Copy, Default, PartialEq, Serialize, Deserialize)]
pub struct EventUsage {
    pub prompt_tokens: u64,
    pub completion_tokens: u64,
    pub cost_cents: f64,
}

/// One structured event
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct LogEvent {
    pub kind: LogEventKind,
    pub session_id: String,
    pub interaction_id: String,
    pub timestamp: DateTime<Utc>,

    /// Execution round the event belongs to
    pub step: u32,

    pub status: EventStatus,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub duration_ms: Option<u64>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub usage: Option<EventUsage>,

    /// Kind-specific payload
    #[serde(default)]
    pub data: Value,
}

impl LogEvent {
    /// Create an event stamped with the current time
    pub fn new(
        kind: LogEventKind,
        session_id: impl Into<String>,
        interaction_id: impl Into<String>,
    ) -> Self {
        Self {
            kind,
            session_id: session_id.into(),
            interaction_id: interaction_id.into(),
            timestamp: Utc::now(),
            step: 0,
            status: EventStatus::Success,
            duration_ms: None,
            usage: None,
            data: Value::Null,
        }
    }

    pub fn step(mut self, step: u32) -> Self {
        self.step = step;
        self
    }

    pub fn status(mut self, status: EventStatus) -> Self {
        self.status = status;
        self
    }

    pub fn duration_ms(mut self, duration_ms: u64) -> Self {
        self.duration_ms = Some(duration_ms);
        self
    }

    pub fn usage(mut self, usage: EventUsage) -> Self {
        self.usage = Some(usage);
        self
    }

    pub fn data(mut self, data: Value) -> Self {
        self.data = data;
        self
    }
}

/// Receiver of structured events
///
/// `emit` is synchronous and must return promptly without failing.
pub trait LogSink: Send + Sync {
    fn emit(&self, event: LogEvent);
}

/// Discards every event
#[derive(Debug, Default, Clone, Copy)]
pub struct NullSink;

impl LogSink for NullSink {
    fn emit(&self, _event: LogEvent) {}
}

/// Writes events to the `tracing` subscriber
#[derive(Debug, Default, Clone, Copy)]
pub struct TracingSink;

impl LogSink for TracingSink {
    fn emit(&self, event: LogEvent) {
        let payload = serde_json::to_string(&event.data).unwrap_or_default();
        match event.status {
            EventStatus::Error => warn!(
                target: "taskloop::events",
                "{} [{}] step {}: {}",
                event.kind.as_str(),
                event.interaction_id,
                event.step,
                payload
            ),
            _ => info!(
                target: "taskloop::events",
                "{} [{}] step {}: {}",
                event.kind.as_str(),
                event.interaction_id,
                event.step,
                payload
            ),
        }
    }
}

/// Keeps every event in memory
#[derive(Debug, Default)]
pub struct MemorySink {
    events: Mutex<Vec<LogEvent>>,
}

impl MemorySink {
    pub fn new() -> Self {
        Self::default()
    }

    /// Snapshot of the recorded events
    pub fn events(&self) -> Vec<LogEvent> {
        self.lock().clone()
    }

    /// Kinds of the recorded events, in emission order
    pub fn kinds(&self) -> Vec<LogEventKind> {
        self.lock().iter().map(|e| e.kind).collect()
    }

    /// Recorded events of one kind
    pub fn of_kind(&self, kind: LogEventKind) -> Vec<LogEvent> {
        self.lock()
            .iter()
            .filter(|e| e.kind == kind)
            .cloned()
            .collect()
    }

    pub fn clear(&self) {
        self.lock().clear();
    }

    fn lock(&self) -> std::sync::MutexGuard<'_, Vec<LogEvent>> {
        self.events
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner())
    }
}

impl LogSink for MemorySink {
    fn emit(&self, event: LogEvent) {
        self.lock().push(event);
    }
}

impl<T: LogSink + ?Sized> LogSink for Arc<T> {
    fn emit(&self, event: LogEvent) {
        (**self).emit(event)
    }
}

/// Build the sink described by the telemetry configuration.
///
/// With an endpoint this spawns the HTTP delivery worker, so it must be
/// called from inside a tokio runtime. Without one, events go to `tracing`.
pub fn sink_from_config(config: &TelemetryConfig) -> Result<Arc<dyn LogSink>, AgentError> {
    match &config.endpoint {
        Some(_) => Ok(Arc::new(HttpLogSink::from_config(config)?)),
        None => Ok(Arc::new(TracingSink)),
    }
}

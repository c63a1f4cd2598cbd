//! 调度反馈：以类型化事件报告重试、轮换与终态结果。
//!
//! Dispatch events.
//!
//! Every progress notice the dispatcher logs (retry scheduled, credential
//! rotated, cycle completed, terminal outcome) is also emitted as a
//! [`DispatchEvent`] into an [`EventSink`]. Sinks are best-effort: a failing
//! sink never fails the call.

use crate::Result;
use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use std::sync::{Arc, RwLock};
use std::time::{SystemTime, UNIX_EPOCH};

fn timestamp() -> f64 {
    SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .map(|d| d.as_secs_f64())
        .unwrap_or(0.0)
}

/// Typed dispatch events.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum DispatchEvent {
    /// One remote attempt is about to be submitted.
    AttemptStarted {
        request_id: String,
        credential_index: usize,
        attempt: usize,
        timestamp: f64,
    },
    /// A transient failure; the dispatcher will back off then rotate.
    RetryScheduled {
        request_id: String,
        credential_index: usize,
        error_kind: String,
        sleep_ms: u64,
        timestamp: f64,
    },
    /// The active credential changed.
    Rotated {
        request_id: String,
        from_index: usize,
        to_index: usize,
        timestamp: f64,
    },
    /// Rotation wrapped back to the credential the call started with.
    CycleCompleted {
        request_id: String,
        starting_index: usize,
        timestamp: f64,
    },
    /// The model stopped at its output-token limit.
    Truncated {
        request_id: String,
        credential_index: usize,
        timestamp: f64,
    },
    Succeeded {
        request_id: String,
        credential_index: usize,
        attempts: usize,
        timestamp: f64,
    },
    Failed {
        request_id: String,
        credential_index: usize,
        attempts: usize,
        error_kind: String,
        timestamp: f64,
    },
}

impl DispatchEvent {
    pub fn attempt_started(request_id: &str, credential_index: usize, attempt: usize) -> Self {
        DispatchEvent::AttemptStarted {
            request_id: request_id.to_string(),
            credential_index,
            attempt,
            timestamp: timestamp(),
        }
    }

    pub fn retry_scheduled(
        request_id: &str,
        credential_index: usize,
        error_kind: &str,
        sleep_ms: u64,
    ) -> Self {
        DispatchEvent::RetryScheduled {
            request_id: request_id.to_string(),
            credential_index,
            error_kind: error_kind.to_string(),
            sleep_ms,
            timestamp: timestamp(),
        }
    }

    pub fn rotated(request_id: &str, from_index: usize, to_index: usize) -> Self {
        DispatchEvent::Rotated {
            request_id: request_id.to_string(),
            from_index,
            to_index,
            timestamp: timestamp(),
        }
    }

    pub fn cycle_completed(request_id: &str, starting_index: usize) -> Self {
        DispatchEvent::CycleCompleted {
            request_id: request_id.to_string(),
            starting_index,
            timestamp: timestamp(),
        }
    }

    pub fn truncated(request_id: &str, credential_index: usize) -> Self {
        DispatchEvent::Truncated {
            request_id: request_id.to_string(),
            credential_index,
            timestamp: timestamp(),
        }
    }

    pub fn succeeded(request_id: &str, credential_index: usize, attempts: usize) -> Self {
        DispatchEvent::Succeeded {
            request_id: request_id.to_string(),
            credential_index,
            attempts,
            timestamp: timestamp(),
        }
    }

    pub fn failed(
        request_id: &str,
        credential_index: usize,
        attempts: usize,
        error_kind: &str,
    ) -> Self {
        DispatchEvent::Failed {
            request_id: request_id.to_string(),
            credential_index,
            attempts,
            error_kind: error_kind.to_string(),
            timestamp: timestamp(),
        }
    }

    pub fn request_id(&self) -> &str {
        match self {
            DispatchEvent::AttemptStarted { request_id, .. }
            | DispatchEvent::RetryScheduled { request_id, .. }
            | DispatchEvent::Rotated { request_id, .. }
            | DispatchEvent::CycleCompleted { request_id, .. }
            | DispatchEvent::Truncated { request_id, .. }
            | DispatchEvent::Succeeded { request_id, .. }
            | DispatchEvent::Failed { request_id, .. } => request_id,
        }
    }

    /// Snake-case event name, matching the serialized `type` tag.
    pub fn name(&self) -> &'static str {
        match self {
            DispatchEvent::AttemptStarted { .. } => "attempt_started",
            DispatchEvent::RetryScheduled { .. } => "retry_scheduled",
            DispatchEvent::Rotated { .. } => "rotated",
            DispatchEvent::CycleCompleted { .. } => "cycle_completed",
            DispatchEvent::Truncated { .. } => "truncated",
            DispatchEvent::Succeeded { .. } => "succeeded",
            DispatchEvent::Failed { .. } => "failed",
        }
    }
}

/// Event sink trait.
#[async_trait]
pub trait EventSink: Send + Sync {
    async fn report(&self, event: DispatchEvent) -> Result<()>;
    async fn report_batch(&self, events: Vec<DispatchEvent>) -> Result<()> {
        for e in events {
            self.report(e).await?;
        }
        Ok(())
    }
}

/// No-op sink (the default).
pub struct NoopEventSink;

#[async_trait]
impl EventSink for NoopEventSink {
    async fn report(&self, _: DispatchEvent) -> Result<()> {
        Ok(())
    }
}

/// Returns a no-op event sink.
pub fn noop_sink() -> Arc<dyn EventSink> {
    Arc::new(NoopEventSink)
}

/// In-memory sink for testing.
#[derive(Default)]
pub struct InMemoryEventSink {
    events: RwLock<Vec<DispatchEvent>>,
}

impl InMemoryEventSink {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn events(&self) -> Vec<DispatchEvent> {
        self.events.read().unwrap_or_else(|e| e.into_inner()).clone()
    }

    /// Names of recorded events, in order.
    pub fn names(&self) -> Vec<&'static str> {
        self.events
            .read()
            .unwrap_or_else(|e| e.into_inner())
            .iter()
            .map(DispatchEvent::name)
            .collect()
    }

    pub fn count(&self, name: &str) -> usize {
        self.names().into_iter().filter(|n| *n == name).count()
    }

    pub fn clear(&self) {
        self.events.write().unwrap_or_else(|e| e.into_inner()).clear();
    }

    pub fn len(&self) -> usize {
        self.events.read().unwrap_or_else(|e| e.into_inner()).len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

#[async_trait]
impl EventSink for InMemoryEventSink {
    async fn report(&self, event: DispatchEvent) -> Result<()> {
        self.events
            .write()
            .unwrap_or_else(|e| e.into_inner())
            .push(event);
        Ok(())
    }
}

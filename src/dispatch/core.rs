use crate::client::ClientSlot;
use crate::credentials::CredentialStore;
use crate::feedback::{DispatchEvent, EventSink};
use crate::resilience::BoundedExecutor;
use crate::types::response::UsageMetadata;
use crate::types::FinishReason;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::Semaphore;
use tracing::debug;

use super::config::DispatchConfig;

/// Rate-limited, multi-credential call orchestrator.
///
/// Owns the key pool, the live client bound to the current key, and the
/// bounded executor every remote attempt runs on. One caller drives it
/// (`&mut self`); rotation and retry are strictly serialized.
pub struct Dispatcher {
    pub(crate) config: DispatchConfig,
    pub(crate) store: CredentialStore,
    pub(crate) slot: ClientSlot,
    pub(crate) executor: Option<BoundedExecutor>,
    /// Execution permit shared by every executor this dispatcher creates.
    pub(crate) call_slot: Arc<Semaphore>,
    pub(crate) events: Arc<dyn EventSink>,
}

/// Per-call overrides of the process defaults.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct CallOptions {
    pub sleep_on_retry: Option<Duration>,
    pub timeout: Option<Duration>,
}

impl CallOptions {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_sleep_on_retry(mut self, sleep: Duration) -> Self {
        self.sleep_on_retry = Some(sleep);
        self
    }

    pub fn with_timeout(mut self, timeout: Duration) -> Self {
        self.timeout = Some(timeout);
        self
    }
}

/// Successful call result with dispatch metadata.
#[derive(Debug, Clone)]
pub struct DispatchResponse {
    /// Response text; empty when the response carried none.
    pub text: String,
    pub finish_reason: Option<FinishReason>,
    /// The model stopped at its output-token limit.
    pub truncated: bool,
    /// Credential that produced the response.
    pub credential_index: usize,
    pub attempts: usize,
    pub request_id: String,
    pub usage: Option<UsageMetadata>,
}

impl Dispatcher {
    pub fn config(&self) -> &DispatchConfig {
        &self.config
    }

    pub fn credentials(&self) -> &CredentialStore {
        &self.store
    }

    /// Index of the credential the next call starts with.
    pub fn current_index(&self) -> usize {
        self.store.current_index()
    }

    pub fn credential_count(&self) -> usize {
        self.store.len()
    }

    /// Detached tasks still running on the executor (always 0 under `Cancel`).
    pub fn detached_tasks(&self) -> usize {
        self.executor
            .as_ref()
            .map(BoundedExecutor::detached_count)
            .unwrap_or(0)
    }

    /// Best-effort event emission; sink failures are logged and dropped.
    pub(crate) async fn emit(&self, event: DispatchEvent) {
        let name = event.name();
        if let Err(e) = self.events.report(event).await {
            debug!(event = name, error = %e, "event sink rejected dispatch event");
        }
    }
}

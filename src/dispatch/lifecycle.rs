//! 资源生命周期：幂等的启动与关闭。
//!
//! Resource lifecycle: idempotent startup and shutdown.

use crate::resilience::BoundedExecutor;
use crate::Result;
use tracing::info;

use super::core::Dispatcher;

impl Dispatcher {
    /// Load credentials, build the client, create the executor.
    ///
    /// Each stage short-circuits on failure and completed stages are not
    /// redone, so calling this again after a failure (or after success) is
    /// safe. Must be called inside a Tokio runtime.
    pub fn startup(&mut self) -> Result<()> {
        self.store.load()?;
        self.slot.ensure_client(&self.store)?;

        if self.executor.is_none() {
            self.executor = Some(BoundedExecutor::with_slot(
                self.config.executor_config(),
                self.call_slot.clone(),
            )?);
            info!(
                credentials = self.store.len(),
                credential_index = self.store.current_index(),
                timeout_secs = self.config.timeout.as_secs(),
                "dispatcher started"
            );
        }
        Ok(())
    }

    /// Stop accepting calls and cancel any attempt still running in the
    /// background. Does not wait for the cancellation to complete; a later
    /// call waits for the slot instead.
    ///
    /// The credential index and live client survive; a later
    /// [`startup`](Self::startup) only recreates the executor.
    pub fn shutdown(&mut self) {
        if let Some(mut executor) = self.executor.take() {
            let detached = executor.detached_count();
            executor.shutdown();
            info!(detached, "dispatcher shut down");
        }
    }

    pub fn is_started(&self) -> bool {
        self.executor
            .as_ref()
            .map(|e| !e.is_closed())
            .unwrap_or(false)
    }
}

//! Single-slot executor that bounds every call by a wall-clock timeout.
//!
//! Tasks run one at a time on a dedicated worker task. The caller waits for
//! the result up to the timeout and then gives up on it; what happens to the
//! task itself is governed by [`AbandonPolicy`].
//!
//! A task only runs while holding the executor's slot permit. Executors that
//! share a permit (see [`BoundedExecutor::with_slot`]) therefore never run two
//! tasks at once, even when one of them is a closed executor still unwinding
//! a detached task.

use crate::{Error, ErrorContext, Result};
use futures::future::BoxFuture;
use futures::FutureExt;
use std::future::Future;
use std::sync::atomic::{AtomicU8, AtomicUsize, Ordering};
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::{mpsc, oneshot, Semaphore};
use tokio_util::sync::CancellationToken;
use tracing::{debug, warn};

/// What happens to a task whose caller timed out.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum AbandonPolicy {
    /// Cancel the task at its next await point and free the slot.
    #[default]
    Cancel,
    /// Let the task run to completion in the background and discard its result.
    /// Bounded by `max_detached`.
    Detach,
}

impl AbandonPolicy {
    pub fn parse(s: &str) -> Option<Self> {
        match s.trim().to_ascii_lowercase().as_str() {
            "cancel" => Some(Self::Cancel),
            "detach" => Some(Self::Detach),
            _ => None,
        }
    }
}

#[derive(Debug, Clone)]
pub struct ExecutorConfig {
    pub abandon_policy: AbandonPolicy,
    /// Maximum detached tasks still running before new submissions are refused.
    pub max_detached: usize,
}

impl Default for ExecutorConfig {
    fn default() -> Self {
        Self {
            abandon_policy: AbandonPolicy::Cancel,
            max_detached: 1,
        }
    }
}

impl ExecutorConfig {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_abandon_policy(mut self, policy: AbandonPolicy) -> Self {
        self.abandon_policy = policy;
        self
    }

    pub fn with_max_detached(mut self, n: usize) -> Self {
        self.max_detached = n.max(1);
        self
    }
}

const RUNNING: u8 = 0;
const FINISHED: u8 = 1;
const ABANDONED: u8 = 2;

struct Job {
    fut: BoxFuture<'static, ()>,
    cancel: CancellationToken,
}

/// Long-lived single-concurrency execution slot.
pub struct BoundedExecutor {
    tx: Option<mpsc::Sender<Job>>,
    config: ExecutorConfig,
    detached: Arc<AtomicUsize>,
    closed: CancellationToken,
}

impl BoundedExecutor {
    /// Spawn the worker on the current Tokio runtime with a private slot.
    pub fn new(config: ExecutorConfig) -> Result<Self> {
        Self::with_slot(config, Arc::new(Semaphore::new(1)))
    }

    /// Spawn the worker with a slot permit shared with other executors.
    pub fn with_slot(config: ExecutorConfig, slot: Arc<Semaphore>) -> Result<Self> {
        let runtime = tokio::runtime::Handle::try_current().map_err(|e| {
            Error::runtime_with_context(
                format!("no Tokio runtime available: {}", e),
                ErrorContext::new().with_source("bounded_executor"),
            )
        })?;

        let (tx, rx) = mpsc::channel::<Job>(1);
        let closed = CancellationToken::new();
        runtime.spawn(worker(rx, slot, closed.clone()));
        debug!(policy = ?config.abandon_policy, "bounded executor started");

        Ok(Self {
            tx: Some(tx),
            config,
            detached: Arc::new(AtomicUsize::new(0)),
            closed,
        })
    }

    /// Run `task` on the slot, waiting at most `timeout` for its result.
    ///
    /// The timeout covers time spent queued behind a detached task as well as
    /// the task itself.
    pub async fn submit<T, F>(&self, task: F, timeout: Duration) -> Result<T>
    where
        T: Send + 'static,
        F: Future<Output = Result<T>> + Send + 'static,
    {
        let tx = self.tx.as_ref().ok_or(Error::ExecutorClosed)?;

        if self.config.abandon_policy == AbandonPolicy::Detach {
            let detached = self.detached.load(Ordering::SeqCst);
            if detached >= self.config.max_detached {
                return Err(Error::ExecutorSaturated { detached });
            }
        }

        let (res_tx, mut res_rx) = oneshot::channel::<Result<T>>();
        let state = Arc::new(AtomicU8::new(RUNNING));
        let cancel = CancellationToken::new();

        let job_state = state.clone();
        let detached = self.detached.clone();
        let fut = async move {
            let out = task.await;
            if job_state.swap(FINISHED, Ordering::SeqCst) == ABANDONED {
                let left = detached.fetch_sub(1, Ordering::SeqCst).saturating_sub(1);
                debug!(still_detached = left, "detached task finished; result discarded");
            }
            let _ = res_tx.send(out);
        }
        .boxed();

        let job = Job {
            fut,
            cancel: cancel.clone(),
        };

        let mut enqueued = false;
        let waited = tokio::time::timeout(timeout, async {
            tx.send(job).await.map_err(|_| Error::ExecutorClosed)?;
            enqueued = true;
            (&mut res_rx).await.map_err(|_| {
                Error::runtime_with_context(
                    "task dropped before producing a result",
                    ErrorContext::new().with_source("bounded_executor"),
                )
            })?
        })
        .await;

        let timed_out = || Error::Timeout {
            timeout,
            context: ErrorContext::new().with_source("bounded_executor"),
        };

        match waited {
            Ok(result) => result,
            // Never reached the worker; the dropped job cannot run.
            Err(_) if !enqueued => Err(timed_out()),
            Err(_) => {
                // The task may have finished in the instant the timer fired.
                if let Ok(result) = res_rx.try_recv() {
                    return result;
                }
                match self.config.abandon_policy {
                    AbandonPolicy::Cancel => cancel.cancel(),
                    AbandonPolicy::Detach => {
                        // Count first so the task can never decrement below zero.
                        let n = self.detached.fetch_add(1, Ordering::SeqCst) + 1;
                        let abandoned = state
                            .compare_exchange(RUNNING, ABANDONED, Ordering::SeqCst, Ordering::SeqCst)
                            .is_ok();
                        if abandoned {
                            warn!(detached = n, "task exceeded timeout; left running in background");
                        } else {
                            self.detached.fetch_sub(1, Ordering::SeqCst);
                        }
                    }
                }
                Err(timed_out())
            }
        }
    }

    /// Stop accepting submissions and cancel whatever task is still running,
    /// detached or not. Does not wait for the cancellation to land; the slot
    /// permit is released once the task has been dropped.
    pub fn shutdown(&mut self) {
        self.closed.cancel();
        if self.tx.take().is_some() {
            debug!("bounded executor closed");
        }
    }

    pub fn is_closed(&self) -> bool {
        self.tx.is_none()
    }

    /// Detached tasks still running.
    pub fn detached_count(&self) -> usize {
        self.detached.load(Ordering::SeqCst)
    }

    pub fn config(&self) -> &ExecutorConfig {
        &self.config
    }
}

impl Drop for BoundedExecutor {
    fn drop(&mut self) {
        self.closed.cancel();
    }
}

async fn worker(mut rx: mpsc::Receiver<Job>, slot: Arc<Semaphore>, closed: CancellationToken) {
    loop {
        let job = tokio::select! {
            biased;
            _ = closed.cancelled() => break,
            job = rx.recv() => match job {
                Some(job) => job,
                None => break,
            },
        };
        let _permit = tokio::select! {
            biased;
            _ = closed.cancelled() => break,
            permit = slot.clone().acquire_owned() => match permit {
                Ok(permit) => permit,
                Err(_) => break,
            },
        };
        // The job future is dropped at the end of this statement, before the
        // permit is released.
        tokio::select! {
            biased;
            _ = closed.cancelled() => {
                debug!("task cancelled by shutdown");
                break;
            }
            _ = job.cancel.cancelled() => {
                debug!("task cancelled after timeout");
            }
            _ = job.fut => {}
        }
    }
    debug!("bounded executor worker stopped");
}

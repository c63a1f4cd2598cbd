//! 调用执行逻辑：有界重试循环、凭据轮换与整轮耗尽检测。
//!
//! Call execution: bounded retry loop with credential rotation and
//! full-cycle detection.

use crate::client::ClientHandle;
use crate::feedback::DispatchEvent;
use crate::types::{CallConfig, FinishReason, GenerateContentResponse, GenerateRequest, Part};
use crate::{Error, ErrorContext, Result};
use std::sync::Arc;
use std::time::{Duration, Instant};
use tracing::{debug, error, info, warn};

use super::core::{CallOptions, DispatchResponse, Dispatcher};
use super::error_classification::{classify, Outcome};
use super::policy::{decide, CallAttemptContext, Decision};

/// How the attempt loop ended.
enum CallOutcome {
    Success(DispatchResponse),
    /// Every reachable credential was rate limited.
    Exhausted(Error),
    Fatal(Error),
}

impl Dispatcher {
    /// Run one call and return the response text (possibly empty).
    pub async fn execute(
        &mut self,
        model: &str,
        contents: Vec<Part>,
        config: impl Into<CallConfig>,
    ) -> Result<String> {
        self.execute_detailed(model, contents, config, CallOptions::default())
            .await
            .map(|r| r.text)
    }

    /// Run one call with per-call overrides, returning dispatch metadata.
    ///
    /// Rate-limit and transient failures are handled here: back off, rotate,
    /// retry, at most once per credential. Everything else propagates
    /// unchanged on the first occurrence.
    pub async fn execute_detailed(
        &mut self,
        model: &str,
        contents: Vec<Part>,
        config: impl Into<CallConfig>,
        options: CallOptions,
    ) -> Result<DispatchResponse> {
        if !self.is_started() {
            return Err(Error::ExecutorClosed);
        }

        let timeout = options.timeout.unwrap_or(self.config.timeout);
        if timeout.is_zero() {
            return Err(invalid("timeout must be greater than zero"));
        }
        let sleep_on_retry = options.sleep_on_retry.unwrap_or(self.config.sleep_on_retry);
        if model.trim().is_empty() {
            return Err(invalid("model identifier is empty"));
        }
        if contents.is_empty() {
            return Err(invalid("payload has no content parts"));
        }
        let generation = config.into().resolve()?;
        let request = Arc::new(GenerateRequest::new(model, contents).with_config(generation));

        let mut ctx = CallAttemptContext::new(self.store.current_index());
        debug!(
            request_id = %ctx.request_id,
            model = %request.model,
            starting_index = ctx.starting_index,
            credentials = self.store.len(),
            "dispatching call"
        );

        match self
            .run_attempts(&request, &mut ctx, timeout, sleep_on_retry)
            .await
        {
            CallOutcome::Success(response) => Ok(response),
            CallOutcome::Exhausted(err) => {
                error!(
                    request_id = %ctx.request_id,
                    attempts = ctx.attempts(),
                    error = %err,
                    "no credential could serve the call"
                );
                self.report_failure(&ctx, &err).await;
                Err(err)
            }
            CallOutcome::Fatal(err) => {
                error!(
                    request_id = %ctx.request_id,
                    credential_index = self.store.current_index(),
                    kind = err.kind(),
                    error = %err,
                    "call failed"
                );
                self.report_failure(&ctx, &err).await;
                Err(err)
            }
        }
    }

    async fn run_attempts(
        &mut self,
        request: &Arc<GenerateRequest>,
        ctx: &mut CallAttemptContext,
        timeout: Duration,
        sleep_on_retry: Duration,
    ) -> CallOutcome {
        let max_attempts = self.store.len();

        while ctx.attempts() < max_attempts {
            let index = self.store.current_index();
            let attempt = ctx.begin_attempt();
            let credential_ctx = ErrorContext::new()
                .with_credential(index, self.store.fingerprint(index))
                .with_request_id(ctx.request_id.clone());

            let handle = match self.slot.ensure_client(&self.store) {
                Ok(handle) => handle,
                Err(e) => return CallOutcome::Fatal(e.with_context(credential_ctx)),
            };

            self.emit(DispatchEvent::attempt_started(&ctx.request_id, index, attempt))
                .await;
            let started = Instant::now();
            let result = self.dispatch_once(handle, request.clone(), timeout).await;
            let outcome = classify(result);
            debug!(
                request_id = %ctx.request_id,
                credential_index = index,
                attempt,
                outcome = outcome.label(),
                duration_ms = started.elapsed().as_millis() as u64,
                "attempt finished"
            );

            let decision = decide(&outcome, self.store.can_rotate(), sleep_on_retry);
            let err = match outcome {
                Outcome::Success(response) => {
                    return CallOutcome::Success(self.finish(response, index, ctx).await)
                }
                Outcome::Blocked(e)
                | Outcome::TimedOut(e)
                | Outcome::RateLimited(e)
                | Outcome::Fatal(e)
                | Outcome::Unexpected(e) => e.with_context(credential_ctx),
            };

            let delay = match decision {
                Decision::Fail => return CallOutcome::Fatal(err),
                Decision::GiveUp => {
                    warn!(
                        request_id = %ctx.request_id,
                        credential_index = index,
                        error = %err,
                        "rate limited with a single credential; nothing to rotate to"
                    );
                    return CallOutcome::Exhausted(err);
                }
                Decision::Rotate { delay } => delay,
            };

            warn!(
                request_id = %ctx.request_id,
                credential_index = index,
                attempt,
                sleep_secs = delay.as_secs_f64(),
                retry_after_secs = err.retry_after().map(|d| d.as_secs_f64()),
                error = %err,
                "rate limited; retrying with the next credential"
            );
            self.emit(DispatchEvent::retry_scheduled(
                &ctx.request_id,
                index,
                err.kind(),
                delay.as_millis() as u64,
            ))
            .await;
            if !delay.is_zero() {
                tokio::time::sleep(delay).await;
            }

            self.slot.invalidate();
            let next = match self.store.rotate() {
                Ok(next) => next,
                Err(_) => return CallOutcome::Exhausted(err),
            };
            info!(
                request_id = %ctx.request_id,
                from = index,
                to = next,
                fingerprint = %self.store.fingerprint(next),
                "rotated credential"
            );
            self.emit(DispatchEvent::rotated(&ctx.request_id, index, next))
                .await;

            if next == ctx.starting_index {
                info!(request_id = %ctx.request_id, "completed a full credential cycle");
                self.emit(DispatchEvent::cycle_completed(
                    &ctx.request_id,
                    ctx.starting_index,
                ))
                .await;
            }
            if !ctx.record_rotation(next) {
                return CallOutcome::Exhausted(Error::CycleExhausted {
                    tried: ctx.tried(),
                    source: Box::new(err),
                });
            }
        }

        CallOutcome::Exhausted(Error::runtime_with_context(
            "attempt budget spent without a terminal outcome",
            ErrorContext::new()
                .with_request_id(ctx.request_id.clone())
                .with_source("dispatcher"),
        ))
    }

    async fn dispatch_once(
        &self,
        handle: ClientHandle,
        request: Arc<GenerateRequest>,
        timeout: Duration,
    ) -> Result<GenerateContentResponse> {
        let executor = self.executor.as_ref().ok_or(Error::ExecutorClosed)?;
        executor
            .submit(
                async move { handle.generate_content(&request).await },
                timeout,
            )
            .await
    }

    async fn finish(
        &self,
        response: GenerateContentResponse,
        index: usize,
        ctx: &CallAttemptContext,
    ) -> DispatchResponse {
        for candidate in response.abnormal_candidates() {
            warn!(
                request_id = %ctx.request_id,
                finish_reason = candidate
                    .finish_reason
                    .as_ref()
                    .map(FinishReason::as_str)
                    .unwrap_or("-"),
                finish_message = candidate.finish_message.as_deref().unwrap_or(""),
                "candidate finished abnormally"
            );
        }

        let finish_reason = response.finish_reason().cloned();
        let truncated = finish_reason == Some(FinishReason::MaxTokens);
        if truncated {
            warn!(
                request_id = %ctx.request_id,
                credential_index = index,
                "response truncated at the output token limit"
            );
            self.emit(DispatchEvent::truncated(&ctx.request_id, index))
                .await;
        }

        let text = response.text().unwrap_or_else(|| {
            warn!(
                request_id = %ctx.request_id,
                candidates = response.candidates.len(),
                "response carried no text; returning empty string"
            );
            String::new()
        });

        info!(
            request_id = %ctx.request_id,
            credential_index = index,
            attempts = ctx.attempts(),
            "call succeeded"
        );
        self.emit(DispatchEvent::succeeded(&ctx.request_id, index, ctx.attempts()))
            .await;

        DispatchResponse {
            text,
            finish_reason,
            truncated,
            credential_index: index,
            attempts: ctx.attempts(),
            request_id: ctx.request_id.clone(),
            usage: response.usage_metadata,
        }
    }

    async fn report_failure(&self, ctx: &CallAttemptContext, err: &Error) {
        self.emit(DispatchEvent::failed(
            &ctx.request_id,
            self.store.current_index(),
            ctx.attempts(),
            err.kind(),
        ))
        .await;
    }
}

fn invalid(message: &str) -> Error {
    Error::validation_with_context(message, ErrorContext::new().with_source("dispatcher"))
}

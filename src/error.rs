use crate::error_code::StandardErrorCode;
use crate::transport::TransportError;
use std::time::Duration;
use thiserror::Error;

/// HTTP status that always means "back off", whatever the body says.
pub(crate) const RATE_LIMIT_STATUS: u16 = 429;

/// Structured error context for diagnostics.
///
/// Terminal failures carry enough of this to identify which credential was
/// active and what kind of failure it was, without ever exposing the secret.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ErrorContext {
    /// Index of the credential in use when the error occurred
    pub credential_index: Option<usize>,
    /// Short fingerprint of that credential (never the secret itself)
    pub fingerprint: Option<String>,
    /// HTTP status code, if the error came from the remote service
    pub status_code: Option<u16>,
    /// Per-call correlation id
    pub request_id: Option<String>,
    /// Additional context about the error
    pub details: Option<String>,
    /// Source of the error (e.g., "credential_store", "gemini_http")
    pub source: Option<String>,
}

impl ErrorContext {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_credential(mut self, index: usize, fingerprint: impl Into<String>) -> Self {
        self.credential_index = Some(index);
        self.fingerprint = Some(fingerprint.into());
        self
    }

    pub fn with_status_code(mut self, status: u16) -> Self {
        self.status_code = Some(status);
        self
    }

    pub fn with_request_id(mut self, id: impl Into<String>) -> Self {
        self.request_id = Some(id.into());
        self
    }

    pub fn with_details(mut self, details: impl Into<String>) -> Self {
        self.details = Some(details.into());
        self
    }

    pub fn with_source(mut self, source: impl Into<String>) -> Self {
        self.source = Some(source.into());
        self
    }

    /// Fill unset fields from `other`; fields already set here win.
    fn merge(&mut self, other: ErrorContext) {
        if self.credential_index.is_none() {
            self.credential_index = other.credential_index;
        }
        if self.fingerprint.is_none() {
            self.fingerprint = other.fingerprint;
        }
        if self.status_code.is_none() {
            self.status_code = other.status_code;
        }
        if self.request_id.is_none() {
            self.request_id = other.request_id;
        }
        if self.details.is_none() {
            self.details = other.details;
        }
        if self.source.is_none() {
            self.source = other.source;
        }
    }
}

/// Unified error type for the dispatcher.
#[derive(Debug, Error)]
pub enum Error {
    /// No usable credential could be found.
    #[error("Configuration error: {message}{}", format_context(.context))]
    Configuration {
        message: String,
        context: ErrorContext,
    },

    /// A client handle could not be built for the current credential.
    #[error("Client initialization error: {message}{}", format_context(.context))]
    Initialization {
        message: String,
        context: ErrorContext,
    },

    /// The request was rejected before dispatch.
    #[error("Validation error: {message}{}", format_context(.context))]
    Validation {
        message: String,
        context: ErrorContext,
    },

    /// The call exceeded its wall-clock budget.
    #[error("Call timed out after {:.1}s{}", .timeout.as_secs_f64(), format_context(.context))]
    Timeout {
        timeout: Duration,
        context: ErrorContext,
    },

    /// The safety filter blocked the prompt.
    #[error("Prompt blocked: {reason}{}", format_context(.context))]
    Blocked {
        reason: String,
        message: Option<String>,
        context: ErrorContext,
    },

    /// The remote service answered with an error status.
    #[error("Remote error: HTTP {status} ({code}/{}): {message}{}", .code.name(), format_context(.context))]
    Remote {
        status: u16,
        code: StandardErrorCode,
        rpc_status: Option<String>,
        message: String,
        /// Server-suggested back-off from `Retry-After`. Logged with the
        /// failure; the retry pause itself is `sleep_on_retry`, since the next
        /// attempt goes to a different credential.
        retry_after_ms: Option<u32>,
        context: ErrorContext,
    },

    /// Every credential was tried within one call without success.
    #[error("Credential cycle exhausted after {tried} credential(s): {source}")]
    CycleExhausted {
        tried: usize,
        #[source]
        source: Box<Error>,
    },

    /// Rotation was requested but there is nothing to rotate to.
    #[error("Cannot rotate credentials: {available} credential(s) loaded")]
    CannotRotate { available: usize },

    /// The executor has been shut down.
    #[error("Executor closed: call startup() first")]
    ExecutorClosed,

    /// Too many timed-out tasks are still running in the background.
    #[error("Executor saturated: {detached} detached task(s) still running")]
    ExecutorSaturated { detached: usize },

    #[error("Network transport error: {0}")]
    Transport(#[from] TransportError),

    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Runtime error: {message}{}", format_context(.context))]
    Runtime {
        message: String,
        context: ErrorContext,
    },
}

// Helper function to format error context for display
fn format_context(ctx: &ErrorContext) -> String {
    let mut parts = Vec::new();
    if let Some(idx) = ctx.credential_index {
        match ctx.fingerprint {
            Some(ref fp) => parts.push(format!("credential: #{} ({})", idx, fp)),
            None => parts.push(format!("credential: #{}", idx)),
        }
    }
    if let Some(ref id) = ctx.request_id {
        parts.push(format!("request_id: {}", id));
    }
    if let Some(ref details) = ctx.details {
        parts.push(format!("details: {}", details));
    }
    if let Some(ref source) = ctx.source {
        parts.push(format!("source: {}", source));
    }
    if parts.is_empty() {
        String::new()
    } else {
        format!(" ({})", parts.join(", "))
    }
}

impl Error {
    /// Create a new runtime error
    pub fn runtime(msg: impl Into<String>) -> Self {
        Self::runtime_with_context(msg, ErrorContext::new())
    }

    pub fn runtime_with_context(msg: impl Into<String>, context: ErrorContext) -> Self {
        Error::Runtime {
            message: msg.into(),
            context,
        }
    }

    pub fn configuration_with_context(msg: impl Into<String>, context: ErrorContext) -> Self {
        Error::Configuration {
            message: msg.into(),
            context,
        }
    }

    pub fn initialization_with_context(msg: impl Into<String>, context: ErrorContext) -> Self {
        Error::Initialization {
            message: msg.into(),
            context,
        }
    }

    pub fn validation_with_context(msg: impl Into<String>, context: ErrorContext) -> Self {
        Error::Validation {
            message: msg.into(),
            context,
        }
    }

    /// Attach context to variants that carry one; other variants are returned unchanged.
    pub fn with_context(mut self, ctx: ErrorContext) -> Self {
        if let Some(existing) = self.context_mut() {
            existing.merge(ctx);
        }
        self
    }

    /// Extract error context if available
    pub fn context(&self) -> Option<&ErrorContext> {
        match self {
            Error::Configuration { context, .. }
            | Error::Initialization { context, .. }
            | Error::Validation { context, .. }
            | Error::Timeout { context, .. }
            | Error::Blocked { context, .. }
            | Error::Remote { context, .. }
            | Error::Runtime { context, .. } => Some(context),
            Error::CycleExhausted { source, .. } => source.context(),
            _ => None,
        }
    }

    fn context_mut(&mut self) -> Option<&mut ErrorContext> {
        match self {
            Error::Configuration { context, .. }
            | Error::Initialization { context, .. }
            | Error::Validation { context, .. }
            | Error::Timeout { context, .. }
            | Error::Blocked { context, .. }
            | Error::Remote { context, .. }
            | Error::Runtime { context, .. } => Some(context),
            _ => None,
        }
    }

    /// Standard code of a remote failure.
    pub fn standard_code(&self) -> Option<StandardErrorCode> {
        match self {
            Error::Remote { code, .. } => Some(*code),
            Error::CycleExhausted { source, .. } => source.standard_code(),
            _ => None,
        }
    }

    /// Remote quota or transient failure that warrants trying another key.
    pub fn is_rate_limited(&self) -> bool {
        match self {
            Error::Remote { status, code, .. } => {
                code.retryable() || *status == RATE_LIMIT_STATUS
            }
            _ => false,
        }
    }

    /// `Retry-After` hint of a remote failure, if the server sent one.
    pub fn retry_after(&self) -> Option<Duration> {
        match self {
            Error::Remote {
                retry_after_ms: Some(ms),
                ..
            } => Some(Duration::from_millis(u64::from(*ms))),
            _ => None,
        }
    }

    /// Short, stable name of the error kind, used in logs and dispatch events.
    pub fn kind(&self) -> &'static str {
        match self {
            Error::Configuration { .. } => "configuration",
            Error::Initialization { .. } => "initialization",
            Error::Validation { .. } => "validation",
            Error::Timeout { .. } => "timeout",
            Error::Blocked { .. } => "blocked",
            Error::Remote { .. } if self.is_rate_limited() => "rate_limited",
            Error::Remote { .. } => "remote",
            Error::CycleExhausted { .. } => "cycle_exhausted",
            Error::CannotRotate { .. } => "cannot_rotate",
            Error::ExecutorClosed => "executor_closed",
            Error::ExecutorSaturated { .. } => "executor_saturated",
            Error::Transport(_) => "transport",
            Error::Serialization(_) => "serialization",
            Error::Io(_) => "io",
            Error::Runtime { .. } => "runtime",
        }
    }
}

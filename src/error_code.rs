//! 标准错误码：将 HTTP 状态与 Google RPC 状态映射为可轮换/不可轮换的规范错误码。
//!
//! Standard error codes for remote inference failures.
//!
//! Gemini reports failures twice: once as an HTTP status and once as a Google
//! RPC status string inside the error body (`RESOURCE_EXHAUSTED`, `UNAVAILABLE`,
//! ...). Both are folded into a [`StandardErrorCode`], and the retry loop only
//! ever looks at the code.
//!
//! | Prefix | Category    | Description                          |
//! |--------|-------------|--------------------------------------|
//! | E1xxx  | client      | Request-side errors                  |
//! | E2xxx  | rate        | Rate limit and quota errors          |
//! | E3xxx  | server      | Provider-side errors                 |
//! | E4xxx  | operational | Cancellation                         |
//! | E9xxx  | unknown     | Catch-all / unclassified             |
//!
//! ## Example
//!
//! ```rust
//! use ai_lib_dispatch::error_code::StandardErrorCode;
//!
//! let code = StandardErrorCode::from_rpc_status("RESOURCE_EXHAUSTED").unwrap();
//! assert_eq!(code.code(), "E2002");
//! assert!(code.retryable());
//! assert_eq!(code.category(), "rate");
//! ```

use std::fmt;

/// Canonical error code for a failed remote call.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum StandardErrorCode {
    /// E1001: Malformed request, invalid parameters, or missing required fields
    InvalidRequest,
    /// E1002: Invalid, expired, or missing API key
    Authentication,
    /// E1003: Valid credentials but insufficient permissions
    PermissionDenied,
    /// E1004: Requested model or endpoint does not exist
    NotFound,
    /// E1005: Input exceeds context window or payload size limit
    RequestTooLarge,
    /// E2001: Request rate limit exceeded
    RateLimited,
    /// E2002: Per-key quota exhausted (Google `RESOURCE_EXHAUSTED`)
    QuotaExhausted,
    /// E3001: Internal server error on provider side
    ServerError,
    /// E3002: Provider service temporarily unavailable or overloaded
    Overloaded,
    /// E3003: Provider-side deadline exceeded
    DeadlineExceeded,
    /// E4001: Request was cancelled
    Cancelled,
    /// E9999: Error could not be classified
    Unknown,
}

impl StandardErrorCode {
    /// Returns the canonical code string (e.g., `"E1001"`).
    #[inline]
    pub fn code(&self) -> &'static str {
        match self {
            Self::InvalidRequest => "E1001",
            Self::Authentication => "E1002",
            Self::PermissionDenied => "E1003",
            Self::NotFound => "E1004",
            Self::RequestTooLarge => "E1005",
            Self::RateLimited => "E2001",
            Self::QuotaExhausted => "E2002",
            Self::ServerError => "E3001",
            Self::Overloaded => "E3002",
            Self::DeadlineExceeded => "E3003",
            Self::Cancelled => "E4001",
            Self::Unknown => "E9999",
        }
    }

    /// Returns the standard name (e.g., `"quota_exhausted"`).
    #[inline]
    pub fn name(&self) -> &'static str {
        match self {
            Self::InvalidRequest => "invalid_request",
            Self::Authentication => "authentication",
            Self::PermissionDenied => "permission_denied",
            Self::NotFound => "not_found",
            Self::RequestTooLarge => "request_too_large",
            Self::RateLimited => "rate_limited",
            Self::QuotaExhausted => "quota_exhausted",
            Self::ServerError => "server_error",
            Self::Overloaded => "overloaded",
            Self::DeadlineExceeded => "deadline_exceeded",
            Self::Cancelled => "cancelled",
            Self::Unknown => "unknown",
        }
    }

    /// Whether another credential may succeed where this one failed.
    ///
    /// Quota and rate errors are per key; server and deadline errors are
    /// transient. Everything else fails the same way on any key.
    #[inline]
    pub fn retryable(&self) -> bool {
        matches!(
            self,
            Self::RateLimited
                | Self::QuotaExhausted
                | Self::ServerError
                | Self::Overloaded
                | Self::DeadlineExceeded
        )
    }

    /// Returns the category: `"client"`, `"rate"`, `"server"`, `"operational"`, or `"unknown"`.
    #[inline]
    pub fn category(&self) -> &'static str {
        match self {
            Self::InvalidRequest
            | Self::Authentication
            | Self::PermissionDenied
            | Self::NotFound
            | Self::RequestTooLarge => "client",
            Self::RateLimited | Self::QuotaExhausted => "rate",
            Self::ServerError | Self::Overloaded | Self::DeadlineExceeded => "server",
            Self::Cancelled => "operational",
            Self::Unknown => "unknown",
        }
    }

    /// Maps a Google RPC status string (the `error.status` field of a Gemini
    /// error body) to a code.
    pub fn from_rpc_status(status: &str) -> Option<Self> {
        let code = match status {
            "INVALID_ARGUMENT" | "FAILED_PRECONDITION" | "OUT_OF_RANGE" => Self::InvalidRequest,
            "UNAUTHENTICATED" => Self::Authentication,
            "PERMISSION_DENIED" => Self::PermissionDenied,
            "NOT_FOUND" => Self::NotFound,
            "RESOURCE_EXHAUSTED" => Self::QuotaExhausted,
            "INTERNAL" | "UNKNOWN" | "DATA_LOSS" => Self::ServerError,
            "UNAVAILABLE" => Self::Overloaded,
            "DEADLINE_EXCEEDED" => Self::DeadlineExceeded,
            "CANCELLED" | "ABORTED" => Self::Cancelled,
            _ => return None,
        };
        Some(code)
    }

    /// Maps an HTTP status code to the most likely code.
    ///
    /// Any 5xx without a dedicated mapping is treated as a server error.
    pub fn from_http_status(status: u16) -> Self {
        match status {
            400 => Self::InvalidRequest,
            401 => Self::Authentication,
            403 => Self::PermissionDenied,
            404 => Self::NotFound,
            413 => Self::RequestTooLarge,
            429 => Self::RateLimited,
            499 => Self::Cancelled,
            503 => Self::Overloaded,
            504 => Self::DeadlineExceeded,
            500..=599 => Self::ServerError,
            _ => Self::Unknown,
        }
    }

    /// Resolves a remote failure, preferring the RPC status over the HTTP status.
    ///
    /// A 400 carrying `API_KEY_INVALID` in its body is still an authentication
    /// failure, so callers pass the RPC status when the body had one.
    pub fn resolve(http_status: u16, rpc_status: Option<&str>) -> Self {
        rpc_status
            .and_then(Self::from_rpc_status)
            .unwrap_or_else(|| Self::from_http_status(http_status))
    }
}

impl fmt::Display for StandardErrorCode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.code())
    }
}

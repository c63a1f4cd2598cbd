//! HTTP transport for the Gemini REST API.

pub mod http;

pub use http::{GeminiClientFactory, GeminiHttpClient, DEFAULT_BASE_URL};

#[derive(Debug, thiserror::Error)]
pub enum TransportError {
    #[error("HTTP error: {0}")]
    Http(#[from] reqwest::Error),
}

impl TransportError {
    /// Whether the request timed out at the HTTP layer.
    pub fn is_timeout(&self) -> bool {
        match self {
            TransportError::Http(e) => e.is_timeout(),
        }
    }
}

use crate::client::{ClientFactory, ClientHandle, ModelClient};
use crate::credentials::Credential;
use crate::error_code::StandardErrorCode;
use crate::types::{GenerateContentResponse, GenerateRequest};
use crate::{Error, ErrorContext, Result};
use async_trait::async_trait;
use reqwest::header::{HeaderMap, HeaderValue, CONTENT_TYPE};
use reqwest::Proxy;
use serde::Deserialize;
use std::env;
use std::sync::Arc;
use std::time::{Duration, Instant};
use tracing::{debug, info};
use url::Url;

use super::TransportError;

/// Public Gemini REST endpoint.
pub const DEFAULT_BASE_URL: &str = "https://generativelanguage.googleapis.com";

const API_KEY_HEADER: &str = "x-goog-api-key";

/// Gemini `generateContent` over HTTPS, bound to one API key.
pub struct GeminiHttpClient {
    client: reqwest::Client,
    base_url: Url,
    api_version: String,
    fingerprint: String,
}

impl GeminiHttpClient {
    pub fn new(credential: &Credential, base_url: &str) -> Result<Self> {
        let fingerprint = credential.fingerprint();
        let init_ctx = || ErrorContext::new().with_source("gemini_http");

        let base_url = Url::parse(base_url).map_err(|e| {
            Error::initialization_with_context(
                format!("invalid base URL '{}': {}", base_url, e),
                init_ctx(),
            )
        })?;

        // A key with control characters or non-ASCII bytes can never be sent.
        let mut key = HeaderValue::from_str(credential.expose()).map_err(|_| {
            Error::initialization_with_context(
                "credential is not a valid header value",
                init_ctx().with_details(fingerprint.clone()),
            )
        })?;
        key.set_sensitive(true);

        let mut headers = HeaderMap::new();
        headers.insert(API_KEY_HEADER, key);
        headers.insert(CONTENT_TYPE, HeaderValue::from_static("application/json"));

        // Minimal production-friendly defaults (env-overridable).
        let timeout_secs = env::var("AI_HTTP_TIMEOUT_SECS")
            .ok()
            .and_then(|s| s.parse::<u64>().ok())
            .unwrap_or(600);

        let mut builder = reqwest::Client::builder()
            .default_headers(headers)
            .timeout(Duration::from_secs(timeout_secs))
            .pool_idle_timeout(Some(Duration::from_secs(
                env::var("AI_HTTP_POOL_IDLE_TIMEOUT_SECS")
                    .ok()
                    .and_then(|s| s.parse::<u64>().ok())
                    .unwrap_or(90),
            )));

        if let Ok(proxy_url) = env::var("AI_PROXY_URL") {
            if let Ok(proxy) = Proxy::all(&proxy_url) {
                builder = builder.proxy(proxy);
            }
        }

        let client = builder.build().map_err(|e| {
            Error::initialization_with_context(
                format!("failed to build HTTP client: {}", e),
                init_ctx(),
            )
        })?;

        Ok(Self {
            client,
            base_url,
            api_version: "v1beta".to_string(),
            fingerprint,
        })
    }

    fn endpoint(&self, model: &str) -> Result<Url> {
        let model = model.strip_prefix("models/").unwrap_or(model);
        let raw = format!(
            "{}/{}/models/{}:generateContent",
            self.base_url.as_str().trim_end_matches('/'),
            self.api_version,
            model
        );
        Url::parse(&raw).map_err(|e| {
            Error::validation_with_context(
                format!("invalid model identifier '{}': {}", model, e),
                ErrorContext::new().with_source("gemini_http"),
            )
        })
    }

    /// Best-effort parsing of `Retry-After: <seconds>`.
    fn retry_after_ms(headers: &HeaderMap) -> Option<u32> {
        let raw = headers.get("retry-after")?.to_str().ok()?;
        let secs: u32 = raw.trim().parse().ok()?;
        Some(secs.saturating_mul(1000))
    }
}

/// Google error body: `{ "error": { "code": 429, "message": "...", "status": "RESOURCE_EXHAUSTED" } }`.
#[derive(Debug, Deserialize)]
struct ErrorEnvelope {
    error: ErrorBody,
}

#[derive(Debug, Deserialize)]
struct ErrorBody {
    #[serde(default)]
    message: Option<String>,
    #[serde(default)]
    status: Option<String>,
}

pub(crate) fn remote_error(status: u16, body: &str, retry_after_ms: Option<u32>) -> Error {
    let parsed: Option<ErrorBody> = serde_json::from_str::<ErrorEnvelope>(body)
        .ok()
        .map(|e| e.error);
    let rpc_status = parsed.as_ref().and_then(|b| b.status.clone());
    let message = parsed
        .and_then(|b| b.message)
        .unwrap_or_else(|| body.trim().to_string());
    let code = StandardErrorCode::resolve(status, rpc_status.as_deref());

    Error::Remote {
        status,
        code,
        rpc_status,
        message,
        retry_after_ms,
        context: ErrorContext::new()
            .with_status_code(status)
            .with_source("gemini_http"),
    }
}

#[async_trait]
impl ModelClient for GeminiHttpClient {
    async fn generate_content(&self, request: &GenerateRequest) -> Result<GenerateContentResponse> {
        let url = self.endpoint(&request.model)?;
        let body = request.to_body();
        let start = Instant::now();

        debug!(
            model = request.model.as_str(),
            fingerprint = self.fingerprint.as_str(),
            "sending generateContent request"
        );

        let resp = self
            .client
            .post(url)
            .json(&body)
            .send()
            .await
            .map_err(|e| Error::Transport(TransportError::Http(e)))?;

        let status = resp.status().as_u16();
        let headers = resp.headers().clone();
        let bytes = resp
            .bytes()
            .await
            .map_err(|e| Error::Transport(TransportError::Http(e)))?;

        if !(200..300).contains(&status) {
            let text = String::from_utf8_lossy(&bytes);
            let err = remote_error(status, &text, Self::retry_after_ms(&headers));
            info!(
                http_status = status,
                standard_code = err.standard_code().map(|c| c.code()).unwrap_or(""),
                model = request.model.as_str(),
                duration_ms = start.elapsed().as_millis() as u64,
                "generateContent request failed"
            );
            return Err(err);
        }

        let parsed: GenerateContentResponse = serde_json::from_slice(&bytes)?;
        debug!(
            http_status = status,
            duration_ms = start.elapsed().as_millis() as u64,
            candidates = parsed.candidates.len(),
            "generateContent request finished"
        );
        Ok(parsed)
    }
}

/// Builds a [`GeminiHttpClient`] per credential.
#[derive(Debug, Clone)]
pub struct GeminiClientFactory {
    base_url: String,
}

impl GeminiClientFactory {
    pub fn new(base_url: impl Into<String>) -> Self {
        Self {
            base_url: base_url.into(),
        }
    }
}

impl Default for GeminiClientFactory {
    fn default() -> Self {
        Self::new(DEFAULT_BASE_URL)
    }
}

impl ClientFactory for GeminiClientFactory {
    fn build(&self, credential: &Credential) -> Result<ClientHandle> {
        Ok(Arc::new(GeminiHttpClient::new(credential, &self.base_url)?))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn key(s: &str) -> Credential {
        Credential::new(s).unwrap()
    }

    #[test]
    fn endpoint_strips_models_prefix() {
        let c = GeminiHttpClient::new(&key("k"), "http://localhost:1234/").unwrap();
        assert_eq!(
            c.endpoint("models/gemini-2.5-pro").unwrap().as_str(),
            "http://localhost:1234/v1beta/models/gemini-2.5-pro:generateContent"
        );
        assert_eq!(
            c.endpoint("gemini-2.5-flash").unwrap().path(),
            "/v1beta/models/gemini-2.5-flash:generateContent"
        );
    }

    #[test]
    fn malformed_credential_fails_initialization() {
        let err = GeminiHttpClient::new(&key("bad\nkey"), DEFAULT_BASE_URL).err().unwrap();
        assert!(matches!(err, Error::Initialization { .. }));
        assert!(!err.to_string().contains("bad\nkey"));
    }

    #[test]
    fn invalid_base_url_fails_initialization() {
        let err = GeminiHttpClient::new(&key("k"), "not a url").err().unwrap();
        assert!(matches!(err, Error::Initialization { .. }));
    }

    #[test]
    fn remote_error_reads_google_error_body() {
        let body = r#"{"error":{"code":429,"message":"Quota exceeded","status":"RESOURCE_EXHAUSTED"}}"#;
        match remote_error(429, body, Some(5000)) {
            Error::Remote {
                code,
                message,
                rpc_status,
                retry_after_ms,
                ..
            } => {
                assert_eq!(code, StandardErrorCode::QuotaExhausted);
                assert_eq!(message, "Quota exceeded");
                assert_eq!(rpc_status.as_deref(), Some("RESOURCE_EXHAUSTED"));
                assert_eq!(retry_after_ms, Some(5000));
            }
            other => panic!("unexpected error: {other:?}"),
        }
    }

    #[test]
    fn remote_error_with_plain_body_uses_http_status() {
        match remote_error(502, "Bad Gateway\n", None) {
            Error::Remote { code, message, .. } => {
                assert_eq!(code, StandardErrorCode::ServerError);
                assert_eq!(message, "Bad Gateway");
            }
            other => panic!("unexpected error: {other:?}"),
        }
    }
}

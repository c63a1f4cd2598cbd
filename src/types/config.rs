//! Generation options accepted by the dispatcher.

use crate::{Error, ErrorContext, Result};
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};

/// Typed generation options.
///
/// Field names follow the snake_case convention used by the official SDKs, so
/// an untyped key/value mapping written for those SDKs converts directly.
/// Unknown keys are rejected rather than silently dropped.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct GenerateContentConfig {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub candidate_count: Option<u32>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub stop_sequences: Option<Vec<String>>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub max_output_tokens: Option<u32>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub temperature: Option<f32>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub top_p: Option<f32>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub top_k: Option<u32>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub response_mime_type: Option<String>,
    /// Sent as the top-level `systemInstruction`.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub system_instruction: Option<String>,
    /// Enable Google Search grounding.
    #[serde(default)]
    pub google_search: bool,
}

impl GenerateContentConfig {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_temperature(mut self, t: f32) -> Self {
        self.temperature = Some(t);
        self
    }

    pub fn with_max_output_tokens(mut self, n: u32) -> Self {
        self.max_output_tokens = Some(n);
        self
    }

    pub fn with_top_p(mut self, p: f32) -> Self {
        self.top_p = Some(p);
        self
    }

    pub fn with_top_k(mut self, k: u32) -> Self {
        self.top_k = Some(k);
        self
    }

    pub fn with_stop_sequences(mut self, stops: Vec<String>) -> Self {
        self.stop_sequences = Some(stops);
        self
    }

    pub fn with_system_instruction(mut self, text: impl Into<String>) -> Self {
        self.system_instruction = Some(text.into());
        self
    }

    pub fn with_google_search(mut self, enable: bool) -> Self {
        self.google_search = enable;
        self
    }
}

/// Config as handed in by the caller: typed, an untyped mapping, or absent.
#[derive(Debug, Clone, Default)]
pub enum CallConfig {
    #[default]
    Default,
    Typed(GenerateContentConfig),
    Untyped(Map<String, Value>),
}

impl CallConfig {
    /// Normalize into typed options.
    ///
    /// An untyped mapping that does not describe valid options fails with
    /// [`Error::Validation`] before anything is dispatched.
    pub fn resolve(self) -> Result<Option<GenerateContentConfig>> {
        match self {
            CallConfig::Default => Ok(None),
            CallConfig::Typed(cfg) => Ok(Some(cfg)),
            CallConfig::Untyped(map) => serde_json::from_value(Value::Object(map))
                .map(Some)
                .map_err(|e| {
                    Error::validation_with_context(
                        format!("invalid generation config: {}", e),
                        ErrorContext::new().with_source("call_config"),
                    )
                }),
        }
    }
}

impl From<GenerateContentConfig> for CallConfig {
    fn from(cfg: GenerateContentConfig) -> Self {
        CallConfig::Typed(cfg)
    }
}

impl From<Option<GenerateContentConfig>> for CallConfig {
    fn from(cfg: Option<GenerateContentConfig>) -> Self {
        cfg.map(CallConfig::Typed).unwrap_or_default()
    }
}

impl From<Map<String, Value>> for CallConfig {
    fn from(map: Map<String, Value>) -> Self {
        CallConfig::Untyped(map)
    }
}

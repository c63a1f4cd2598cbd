//! Wire body for `models/{model}:generateContent`.

use serde::Serialize;
use serde_json::Value;

use super::config::GenerateContentConfig;
use super::content::{Content, Part};

/// One logical request as seen by a [`ModelClient`](crate::client::ModelClient).
#[derive(Debug, Clone, PartialEq)]
pub struct GenerateRequest {
    pub model: String,
    pub contents: Vec<Part>,
    pub config: Option<GenerateContentConfig>,
}

impl GenerateRequest {
    pub fn new(model: impl Into<String>, contents: Vec<Part>) -> Self {
        Self {
            model: model.into(),
            contents,
            config: None,
        }
    }

    pub fn with_config(mut self, config: Option<GenerateContentConfig>) -> Self {
        self.config = config;
        self
    }

    /// Build the JSON body sent to the REST endpoint.
    pub fn to_body(&self) -> GenerateContentBody {
        let cfg = self.config.as_ref();
        let generation_config = cfg.and_then(WireGenerationConfig::from_config);
        let system_instruction = cfg
            .and_then(|c| c.system_instruction.as_ref())
            .map(|s| SystemInstruction {
                parts: vec![Part::text(s.clone())],
            });
        let tools = match cfg {
            Some(c) if c.google_search => Some(vec![serde_json::json!({ "googleSearch": {} })]),
            _ => None,
        };

        GenerateContentBody {
            contents: vec![Content::user(self.contents.clone())],
            generation_config,
            system_instruction,
            tools,
        }
    }
}

#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct GenerateContentBody {
    pub contents: Vec<Content>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub generation_config: Option<WireGenerationConfig>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub system_instruction: Option<SystemInstruction>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub tools: Option<Vec<Value>>,
}

#[derive(Debug, Clone, Serialize)]
pub struct SystemInstruction {
    pub parts: Vec<Part>,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct WireGenerationConfig {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub candidate_count: Option<u32>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub stop_sequences: Option<Vec<String>>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub max_output_tokens: Option<u32>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub temperature: Option<f32>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub top_p: Option<f32>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub top_k: Option<u32>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub response_mime_type: Option<String>,
}

impl WireGenerationConfig {
    /// `None` when no generation field is set, so the key is omitted entirely.
    fn from_config(cfg: &GenerateContentConfig) -> Option<Self> {
        let wire = Self {
            candidate_count: cfg.candidate_count,
            stop_sequences: cfg.stop_sequences.clone(),
            max_output_tokens: cfg.max_output_tokens,
            temperature: cfg.temperature,
            top_p: cfg.top_p,
            top_k: cfg.top_k,
            response_mime_type: cfg.response_mime_type.clone(),
        };
        (wire != Self::default()).then_some(wire)
    }
}

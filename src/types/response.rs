//! Response model for `generateContent`.
//!
//! Gemini: `{ candidates: [{ content: { parts: [{text}] }, finishReason }], promptFeedback, usageMetadata }`.
//! Only the fields the dispatcher inspects are modelled; everything else is ignored.

use serde::Deserialize;
use std::fmt;

#[derive(Debug, Clone, Default, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct GenerateContentResponse {
    #[serde(default)]
    pub candidates: Vec<Candidate>,
    #[serde(default)]
    pub prompt_feedback: Option<PromptFeedback>,
    #[serde(default)]
    pub usage_metadata: Option<UsageMetadata>,
    #[serde(default)]
    pub model_version: Option<String>,
}

#[derive(Debug, Clone, Default, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Candidate {
    #[serde(default)]
    pub content: Option<CandidateContent>,
    #[serde(default)]
    pub finish_reason: Option<FinishReason>,
    #[serde(default)]
    pub finish_message: Option<String>,
    #[serde(default)]
    pub index: Option<u32>,
}

#[derive(Debug, Clone, Default, Deserialize)]
pub struct CandidateContent {
    #[serde(default)]
    pub role: Option<String>,
    #[serde(default)]
    pub parts: Vec<ResponsePart>,
}

/// Response parts are read leniently: anything without `text` (function calls,
/// executable code, ...) is kept but contributes nothing to the text.
#[derive(Debug, Clone, Default, Deserialize)]
pub struct ResponsePart {
    #[serde(default)]
    pub text: Option<String>,
    #[serde(default)]
    pub thought: Option<bool>,
}

#[derive(Debug, Clone, Default, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PromptFeedback {
    #[serde(default)]
    pub block_reason: Option<BlockReason>,
    #[serde(default)]
    pub block_reason_message: Option<String>,
}

#[derive(Debug, Clone, Default, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct UsageMetadata {
    #[serde(default)]
    pub prompt_token_count: u64,
    #[serde(default)]
    pub candidates_token_count: u64,
    #[serde(default)]
    pub total_token_count: u64,
}

/// Why a candidate stopped generating.
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
#[serde(from = "String")]
pub enum FinishReason {
    Unspecified,
    Stop,
    MaxTokens,
    Safety,
    Recitation,
    Other(String),
}

impl From<String> for FinishReason {
    fn from(s: String) -> Self {
        match s.as_str() {
            "FINISH_REASON_UNSPECIFIED" => FinishReason::Unspecified,
            "STOP" => FinishReason::Stop,
            "MAX_TOKENS" => FinishReason::MaxTokens,
            "SAFETY" => FinishReason::Safety,
            "RECITATION" => FinishReason::Recitation,
            _ => FinishReason::Other(s),
        }
    }
}

impl FinishReason {
    pub fn as_str(&self) -> &str {
        match self {
            FinishReason::Unspecified => "FINISH_REASON_UNSPECIFIED",
            FinishReason::Stop => "STOP",
            FinishReason::MaxTokens => "MAX_TOKENS",
            FinishReason::Safety => "SAFETY",
            FinishReason::Recitation => "RECITATION",
            FinishReason::Other(s) => s,
        }
    }

    /// `STOP`, `MAX_TOKENS` and unspecified are normal completions.
    pub fn is_normal(&self) -> bool {
        matches!(
            self,
            FinishReason::Unspecified | FinishReason::Stop | FinishReason::MaxTokens
        )
    }
}

impl fmt::Display for FinishReason {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Why the prompt itself was rejected.
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
#[serde(from = "String")]
pub enum BlockReason {
    Unspecified,
    Safety,
    Other,
    Blocklist,
    ProhibitedContent,
    Unknown(String),
}

impl From<String> for BlockReason {
    fn from(s: String) -> Self {
        match s.as_str() {
            "BLOCK_REASON_UNSPECIFIED" => BlockReason::Unspecified,
            "SAFETY" => BlockReason::Safety,
            "OTHER" => BlockReason::Other,
            "BLOCKLIST" => BlockReason::Blocklist,
            "PROHIBITED_CONTENT" => BlockReason::ProhibitedContent,
            _ => BlockReason::Unknown(s),
        }
    }
}

impl BlockReason {
    pub fn as_str(&self) -> &str {
        match self {
            BlockReason::Unspecified => "BLOCK_REASON_UNSPECIFIED",
            BlockReason::Safety => "SAFETY",
            BlockReason::Other => "OTHER",
            BlockReason::Blocklist => "BLOCKLIST",
            BlockReason::ProhibitedContent => "PROHIBITED_CONTENT",
            BlockReason::Unknown(s) => s,
        }
    }
}

impl fmt::Display for BlockReason {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl GenerateContentResponse {
    /// Block reason, if the prompt was rejected by the safety filter.
    pub fn block_reason(&self) -> Option<&BlockReason> {
        self.prompt_feedback
            .as_ref()
            .and_then(|f| f.block_reason.as_ref())
            .filter(|r| **r != BlockReason::Unspecified)
    }

    /// Concatenated text of the first candidate, skipping thought parts.
    ///
    /// `None` when there is no candidate or the candidate has no text part.
    pub fn text(&self) -> Option<String> {
        let content = self.candidates.first()?.content.as_ref()?;
        let mut out: Option<String> = None;
        for part in &content.parts {
            if part.thought == Some(true) {
                continue;
            }
            if let Some(t) = &part.text {
                out.get_or_insert_with(String::new).push_str(t);
            }
        }
        out
    }

    /// Finish reason of the first candidate.
    pub fn finish_reason(&self) -> Option<&FinishReason> {
        self.candidates.first()?.finish_reason.as_ref()
    }

    /// Candidates that stopped for a reason other than a normal completion.
    pub fn abnormal_candidates(&self) -> impl Iterator<Item = &Candidate> {
        self.candidates.iter().filter(|c| {
            c.finish_reason
                .as_ref()
                .map(|r| !r.is_normal())
                .unwrap_or(false)
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn parse(v: serde_json::Value) -> GenerateContentResponse {
        serde_json::from_value(v).unwrap()
    }

    #[test]
    fn text_joins_parts_and_skips_thoughts() {
        let r = parse(json!({
            "candidates": [{
                "content": { "role": "model", "parts": [
                    { "text": "thinking...", "thought": true },
                    { "text": "Hello, " },
                    { "functionCall": { "name": "f" } },
                    { "text": "world" }
                ]},
                "finishReason": "STOP"
            }]
        }));
        assert_eq!(r.text().as_deref(), Some("Hello, world"));
        assert_eq!(r.finish_reason(), Some(&FinishReason::Stop));
    }

    #[test]
    fn no_candidates_means_no_text() {
        let r = parse(json!({ "usageMetadata": { "promptTokenCount": 3 } }));
        assert!(r.text().is_none());
        assert!(r.block_reason().is_none());
    }

    #[test]
    fn block_reason_is_detected() {
        let r = parse(json!({ "promptFeedback": { "blockReason": "SAFETY" } }));
        assert_eq!(r.block_reason(), Some(&BlockReason::Safety));
    }

    #[test]
    fn unspecified_block_reason_is_not_a_block() {
        let r = parse(json!({
            "promptFeedback": { "blockReason": "BLOCK_REASON_UNSPECIFIED" },
            "candidates": [{ "content": { "parts": [{ "text": "ok" }] } }]
        }));
        assert!(r.block_reason().is_none());
    }

    #[test]
    fn unknown_finish_reason_is_preserved() {
        let r = parse(json!({
            "candidates": [
                { "finishReason": "MAX_TOKENS" },
                { "finishReason": "MALFORMED_FUNCTION_CALL" }
            ]
        }));
        let abnormal: Vec<_> = r.abnormal_candidates().collect();
        assert_eq!(abnormal.len(), 1);
        assert_eq!(
            abnormal[0].finish_reason.as_ref().map(|f| f.as_str()),
            Some("MALFORMED_FUNCTION_CALL")
        );
    }
}

//! 类型模块：Gemini generateContent 的请求负载、生成配置与响应模型。
//!
//! # Types Module
//!
//! Strongly-typed request and response shapes for the Gemini `generateContent`
//! REST endpoint.
//!
//! | Type | Description |
//! |------|-------------|
//! | [`Part`] | One payload part (text or inline data) |
//! | [`GenerateContentConfig`] | Typed generation options |
//! | [`CallConfig`] | Typed, untyped, or absent config as handed in by a caller |
//! | [`GenerateRequest`] | Model + payload + config for one logical call |
//! | [`GenerateContentResponse`] | Parsed response with text / block / finish helpers |
//!
//! ## Example
//!
//! ```rust
//! use ai_lib_dispatch::types::{GenerateContentConfig, GenerateRequest, Part};
//!
//! let request = GenerateRequest::new("gemini-2.5-pro", vec![Part::text("Summarize this")])
//!     .with_config(Some(GenerateContentConfig::new().with_temperature(0.2)));
//! let body = serde_json::to_value(request.to_body()).unwrap();
//! assert_eq!(body["generationConfig"]["temperature"], serde_json::json!(0.2f32));
//! ```

pub mod config;
pub mod content;
pub mod request;
pub mod response;

pub use config::{CallConfig, GenerateContentConfig};
pub use content::{Blob, Content, Part};
pub use request::GenerateRequest;
pub use response::{BlockReason, FinishReason, GenerateContentResponse};

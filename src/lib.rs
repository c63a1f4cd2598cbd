//! # ai-lib-dispatch
//!
//! 面向 Gemini generateContent 的限流感知、多凭据调用编排器。
//!
//! Rate-limit aware, multi-credential call orchestrator for Google Gemini
//! `generateContent`.
//!
//! ## Overview
//!
//! Given a model identifier, a payload of content parts and an optional
//! generation config, [`Dispatcher`] returns the response text or fails with a
//! classified [`Error`]. It owns a pool of interchangeable API keys, bounds
//! every remote attempt by a wall-clock timeout, and rotates to the next key
//! when the service signals quota exhaustion or a transient failure, giving
//! up once every key has been tried within the call.
//!
//! ## Quick Start
//!
//! ```rust,no_run
//! use ai_lib_dispatch::{CallConfig, DispatcherBuilder, Part};
//!
//! #[tokio::main]
//! async fn main() -> ai_lib_dispatch::Result<()> {
//!     // Keys come from GEMINI_API_KEY="key-a|key-b" (or a .env file).
//!     let mut dispatcher = DispatcherBuilder::new().build()?;
//!     dispatcher.startup()?;
//!
//!     let text = dispatcher
//!         .execute("gemini-2.5-pro", vec![Part::text("Hello")], CallConfig::Default)
//!         .await?;
//!     println!("{}", text);
//!
//!     dispatcher.shutdown();
//!     Ok(())
//! }
//! ```
//!
//! ## Module Organization
//!
//! | Module | Description |
//! |--------|-------------|
//! | [`credentials`] | Key pool loading and rotation |
//! | [`client`] | Client seam and the slot binding it to the current key |
//! | [`resilience`] | Bounded single-slot executor |
//! | [`dispatch`] | Retry orchestration and lifecycle |
//! | [`transport`] | Gemini REST client |
//! | [`types`] | Request payload, generation config and response model |
//! | [`feedback`] | Dispatch events and sinks |
//! | [`error_code`] | Standard error codes |

pub mod client;
pub mod credentials;
pub mod dispatch;
pub mod error_code;
pub mod feedback;
pub mod resilience;
pub mod transport;
pub mod types;

// Re-export main types for convenience
pub use client::{ClientFactory, ClientHandle, ModelClient};
pub use credentials::{Credential, CredentialStore};
pub use dispatch::{CallOptions, DispatchConfig, DispatchResponse, Dispatcher, DispatcherBuilder};
pub use error_code::StandardErrorCode;
pub use feedback::{DispatchEvent, EventSink};
pub use resilience::AbandonPolicy;
pub use types::{
    CallConfig, FinishReason, GenerateContentConfig, GenerateContentResponse, GenerateRequest,
    Part,
};

/// Result type alias for the library
pub type Result<T> = std::result::Result<T, Error>;

/// Error type for the library
pub mod error;
pub use error::{Error, ErrorContext};

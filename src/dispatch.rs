//! 调度模块：凭据轮换、重试编排与资源生命周期。
//!
//! Dispatch module: the retry orchestrator.
//!
//! Implementation details are split into submodules under `src/dispatch/`.

pub mod builder;
pub mod config;
pub mod core;
mod error_classification;
mod execution;
mod lifecycle;
mod policy;

pub use builder::DispatcherBuilder;
pub use config::{DispatchConfig, DEFAULT_SLEEP_ON_RETRY, DEFAULT_TIMEOUT};
pub use core::{CallOptions, DispatchResponse, Dispatcher};

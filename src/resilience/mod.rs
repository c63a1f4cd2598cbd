//! 弹性模块：提供带超时约束的单槽执行器。
//!
//! # Resilience Primitives Module
//!
//! Every remote call runs inside a [`BoundedExecutor`](executor::BoundedExecutor):
//! a single long-lived slot that bounds the call by a wall-clock timeout and
//! decides what happens to work whose caller has given up.
//!
//! | Policy | Behavior after timeout |
//! |--------|------------------------|
//! | `Cancel` | Task is dropped at its next await point; slot is free at once |
//! | `Detach` | Task keeps running, result discarded; capped by `max_detached` |
//!
//! ```rust,no_run
//! use ai_lib_dispatch::resilience::executor::{BoundedExecutor, ExecutorConfig};
//! use std::time::Duration;
//!
//! # async fn run() -> ai_lib_dispatch::Result<()> {
//! let exec = BoundedExecutor::new(ExecutorConfig::default())?;
//! let answer = exec
//!     .submit(async { Ok(42) }, Duration::from_secs(300))
//!     .await?;
//! assert_eq!(answer, 42);
//! # Ok(())
//! # }
//! ```

pub mod executor;

pub use executor::{AbandonPolicy, BoundedExecutor, ExecutorConfig};

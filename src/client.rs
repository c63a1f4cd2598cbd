//! Client seam: the live connection used for one remote call, and the slot
//! that binds it to the currently selected credential.
//!
//! Implementation details are split into submodules under `src/client/`.

pub mod core;
pub mod lifecycle;

pub use core::{ClientFactory, ClientHandle, ModelClient};
pub use lifecycle::ClientSlot;

//! Binding between the current credential and its live client handle.

use crate::credentials::CredentialStore;
use crate::{Error, ErrorContext, Result};
use std::sync::Arc;
use tracing::{debug, warn};

use super::core::{ClientFactory, ClientHandle};

struct BoundClient {
    index: usize,
    handle: ClientHandle,
}

/// Holds at most one live handle, always bound to a specific credential index.
///
/// A handle is never carried across a rotation: [`invalidate`](Self::invalidate)
/// drops it and the next [`ensure_client`](Self::ensure_client) builds a fresh
/// one from whatever key is current.
pub struct ClientSlot {
    factory: Arc<dyn ClientFactory>,
    bound: Option<BoundClient>,
}

impl ClientSlot {
    pub fn new(factory: Arc<dyn ClientFactory>) -> Self {
        Self {
            factory,
            bound: None,
        }
    }

    /// Return the handle for the store's current credential, building it if needed.
    ///
    /// On failure nothing is installed, so a later call tries again.
    pub fn ensure_client(&mut self, store: &CredentialStore) -> Result<ClientHandle> {
        let index = store.current_index();
        if let Some(bound) = &self.bound {
            if bound.index == index {
                return Ok(bound.handle.clone());
            }
        }
        self.bound = None;

        let credential = store.current().ok_or_else(|| {
            Error::configuration_with_context(
                "credentials not loaded",
                ErrorContext::new().with_source("client_slot"),
            )
        })?;
        let ctx = ErrorContext::new().with_credential(index, credential.fingerprint());

        let handle = match self.factory.build(credential) {
            Ok(h) => h,
            Err(e) => {
                warn!(
                    credential_index = index,
                    fingerprint = %credential.fingerprint(),
                    error = %e,
                    "failed to initialize client"
                );
                let e = match e {
                    Error::Initialization { .. } => e,
                    other => Error::initialization_with_context(other.to_string(), ErrorContext::new()),
                };
                return Err(e.with_context(ctx.with_source("client_slot")));
            }
        };

        debug!(credential_index = index, "client initialized");
        self.bound = Some(BoundClient {
            index,
            handle: handle.clone(),
        });
        Ok(handle)
    }

    /// Drop the current handle, if any.
    pub fn invalidate(&mut self) {
        if let Some(bound) = self.bound.take() {
            debug!(credential_index = bound.index, "client invalidated");
        }
    }

    /// Index the live handle is bound to.
    pub fn bound_index(&self) -> Option<usize> {
        self.bound.as_ref().map(|b| b.index)
    }

    pub fn is_ready(&self) -> bool {
        self.bound.is_some()
    }
}

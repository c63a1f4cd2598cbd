use crate::credentials::Credential;
use crate::types::{GenerateContentResponse, GenerateRequest};
use crate::Result;
use async_trait::async_trait;
use std::sync::Arc;

/// A live connection to the inference service, bound to one credential.
///
/// Implementations must not retry or rotate on their own; a failed call is
/// reported as-is and the dispatcher decides what happens next.
#[async_trait]
pub trait ModelClient: Send + Sync {
    async fn generate_content(&self, request: &GenerateRequest) -> Result<GenerateContentResponse>;
}

/// Shared handle to a live client.
pub type ClientHandle = Arc<dyn ModelClient>;

/// Builds a client handle for a credential.
///
/// Construction failure (malformed key, HTTP setup error) must surface as
/// [`Error::Initialization`](crate::Error::Initialization).
pub trait ClientFactory: Send + Sync {
    fn build(&self, credential: &Credential) -> Result<ClientHandle>;
}

impl<F> ClientFactory for F
where
    F: Fn(&Credential) -> Result<ClientHandle> + Send + Sync,
{
    fn build(&self, credential: &Credential) -> Result<ClientHandle> {
        self(credential)
    }
}

use crate::client::{ClientFactory, ClientSlot};
use crate::credentials::CredentialStore;
use crate::feedback::EventSink;
use crate::resilience::AbandonPolicy;
use crate::transport::GeminiClientFactory;
use crate::{Error, ErrorContext, Result};
use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::Semaphore;

use super::config::DispatchConfig;
use super::core::Dispatcher;

/// Builder for creating dispatchers with custom configuration.
///
/// Starts from [`DispatchConfig::from_env`]; every setter overrides the env.
pub struct DispatcherBuilder {
    config: DispatchConfig,
    credentials: Option<Vec<String>>,
    factory: Option<Arc<dyn ClientFactory>>,
    events: Arc<dyn EventSink>,
}

impl Default for DispatcherBuilder {
    fn default() -> Self {
        Self::new()
    }
}

impl DispatcherBuilder {
    pub fn new() -> Self {
        Self::with_config(DispatchConfig::from_env())
    }

    /// Start from an explicit config, ignoring the environment.
    pub fn with_config(config: DispatchConfig) -> Self {
        Self {
            config,
            credentials: None,
            factory: None,
            events: crate::feedback::noop_sink(),
        }
    }

    /// Environment variable holding the `|`-separated keys.
    pub fn key_var(mut self, name: impl Into<String>) -> Self {
        self.config.key_var = name.into();
        self
    }

    pub fn dotenv_path(mut self, path: impl Into<PathBuf>) -> Self {
        self.config.dotenv_path = Some(path.into());
        self
    }

    /// Disable the dotenv fallback.
    pub fn no_dotenv(mut self) -> Self {
        self.config.dotenv_path = None;
        self
    }

    /// Use these keys instead of reading the environment.
    pub fn credentials<I, S>(mut self, keys: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.credentials = Some(keys.into_iter().map(Into::into).collect());
        self
    }

    /// Inject the client factory. Default builds HTTP clients against `base_url`.
    pub fn client_factory(mut self, factory: Arc<dyn ClientFactory>) -> Self {
        self.factory = Some(factory);
        self
    }

    /// Inject an event sink. Default is a no-op sink.
    pub fn event_sink(mut self, sink: Arc<dyn EventSink>) -> Self {
        self.events = sink;
        self
    }

    pub fn sleep_on_retry(mut self, sleep: Duration) -> Self {
        self.config.sleep_on_retry = sleep;
        self
    }

    pub fn timeout(mut self, timeout: Duration) -> Self {
        self.config.timeout = timeout;
        self
    }

    pub fn abandon_policy(mut self, policy: AbandonPolicy) -> Self {
        self.config.abandon_policy = policy;
        self
    }

    pub fn max_detached(mut self, n: usize) -> Self {
        self.config.max_detached = n.max(1);
        self
    }

    /// Override the Gemini endpoint (primarily for testing with mock servers).
    pub fn base_url(mut self, url: impl Into<String>) -> Self {
        self.config.base_url = url.into();
        self
    }

    /// Build the dispatcher. Nothing is loaded or spawned until
    /// [`Dispatcher::startup`].
    pub fn build(self) -> Result<Dispatcher> {
        if self.config.timeout.is_zero() {
            return Err(Error::validation_with_context(
                "timeout must be greater than zero",
                ErrorContext::new().with_source("dispatcher_builder"),
            ));
        }

        let store = match self.credentials {
            Some(keys) => CredentialStore::from_credentials(keys)?,
            None => CredentialStore::new(self.config.credential_source()),
        };
        let factory = self
            .factory
            .unwrap_or_else(|| Arc::new(GeminiClientFactory::new(self.config.base_url.clone())));

        Ok(Dispatcher {
            config: self.config,
            store,
            slot: ClientSlot::new(factory),
            executor: None,
            call_slot: Arc::new(Semaphore::new(1)),
            events: self.events,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn zero_timeout_is_rejected() {
        let err = DispatcherBuilder::with_config(DispatchConfig::default())
            .credentials(["a"])
            .timeout(Duration::ZERO)
            .build()
            .err()
            .unwrap();
        assert!(matches!(err, Error::Validation { .. }));
    }

    #[test]
    fn explicit_credentials_are_loaded_eagerly() {
        let d = DispatcherBuilder::with_config(DispatchConfig::default())
            .credentials(["a", " b ", "a"])
            .build()
            .unwrap();
        assert!(d.credentials().is_loaded());
        assert_eq!(d.credential_count(), 2);
        assert!(!d.is_started());
    }

    #[test]
    fn blank_credentials_fail_configuration() {
        let err = DispatcherBuilder::with_config(DispatchConfig::default())
            .credentials([" ", ""])
            .build()
            .err()
            .unwrap();
        assert!(matches!(err, Error::Configuration { .. }));
    }
}

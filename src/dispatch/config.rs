use crate::credentials::{CredentialSource, DEFAULT_DOTENV_PATH, DEFAULT_KEY_VAR};
use crate::resilience::{AbandonPolicy, ExecutorConfig};
use crate::transport::DEFAULT_BASE_URL;
use std::path::PathBuf;
use std::time::Duration;
use tracing::warn;

/// Default pause before rotating after a rate-limit signal.
pub const DEFAULT_SLEEP_ON_RETRY: Duration = Duration::from_secs(60);

/// Default wall-clock budget for one remote attempt.
pub const DEFAULT_TIMEOUT: Duration = Duration::from_secs(300);

/// Process-level dispatcher settings.
///
/// Env overrides (read by [`from_env`](Self::from_env)):
/// - `AI_LIB_DISPATCH_KEY_VAR` (default `GEMINI_API_KEY`)
/// - `AI_LIB_DISPATCH_DOTENV` (default `.env`; empty disables the fallback)
/// - `AI_LIB_RETRY_SLEEP_SECS` (float, default 60)
/// - `AI_LIB_ATTEMPT_TIMEOUT_SECS` (integer, default 300)
/// - `AI_LIB_ABANDON_POLICY` (`cancel` | `detach`, default `cancel`)
/// - `AI_LIB_MAX_DETACHED` (default 1)
/// - `AI_LIB_GEMINI_BASE_URL`
#[derive(Debug, Clone, PartialEq)]
pub struct DispatchConfig {
    pub key_var: String,
    pub dotenv_path: Option<PathBuf>,
    pub sleep_on_retry: Duration,
    pub timeout: Duration,
    pub abandon_policy: AbandonPolicy,
    pub max_detached: usize,
    pub base_url: String,
}

impl Default for DispatchConfig {
    fn default() -> Self {
        Self {
            key_var: DEFAULT_KEY_VAR.to_string(),
            dotenv_path: Some(PathBuf::from(DEFAULT_DOTENV_PATH)),
            sleep_on_retry: DEFAULT_SLEEP_ON_RETRY,
            timeout: DEFAULT_TIMEOUT,
            abandon_policy: AbandonPolicy::default(),
            max_detached: 1,
            base_url: DEFAULT_BASE_URL.to_string(),
        }
    }
}

impl DispatchConfig {
    /// Defaults with env overrides applied. Unparseable values are logged and
    /// ignored.
    pub fn from_env() -> Self {
        let mut cfg = Self::default();

        if let Some(var) = env_string("AI_LIB_DISPATCH_KEY_VAR") {
            cfg.key_var = var;
        }
        if let Ok(path) = std::env::var("AI_LIB_DISPATCH_DOTENV") {
            let path = path.trim();
            cfg.dotenv_path = if path.is_empty() {
                None
            } else {
                Some(PathBuf::from(path))
            };
        }
        if let Some(raw) = env_string("AI_LIB_RETRY_SLEEP_SECS") {
            match parse_secs_f64(&raw) {
                Some(d) => cfg.sleep_on_retry = d,
                None => ignored("AI_LIB_RETRY_SLEEP_SECS", &raw),
            }
        }
        if let Some(raw) = env_string("AI_LIB_ATTEMPT_TIMEOUT_SECS") {
            match raw.parse::<u64>().ok().filter(|s| *s > 0) {
                Some(secs) => cfg.timeout = Duration::from_secs(secs),
                None => ignored("AI_LIB_ATTEMPT_TIMEOUT_SECS", &raw),
            }
        }
        if let Some(raw) = env_string("AI_LIB_ABANDON_POLICY") {
            match AbandonPolicy::parse(&raw) {
                Some(policy) => cfg.abandon_policy = policy,
                None => ignored("AI_LIB_ABANDON_POLICY", &raw),
            }
        }
        if let Some(raw) = env_string("AI_LIB_MAX_DETACHED") {
            match raw.parse::<usize>() {
                Ok(n) => cfg.max_detached = n.max(1),
                Err(_) => ignored("AI_LIB_MAX_DETACHED", &raw),
            }
        }
        if let Some(url) = env_string("AI_LIB_GEMINI_BASE_URL") {
            cfg.base_url = url;
        }
        cfg
    }

    pub(crate) fn credential_source(&self) -> CredentialSource {
        let source = CredentialSource::new(self.key_var.clone());
        match &self.dotenv_path {
            Some(path) => source.with_dotenv_path(path.clone()),
            None => source,
        }
    }

    pub(crate) fn executor_config(&self) -> ExecutorConfig {
        ExecutorConfig::new()
            .with_abandon_policy(self.abandon_policy)
            .with_max_detached(self.max_detached)
    }
}

/// Non-negative seconds as a `Duration`; `None` for anything that does not fit.
fn parse_secs_f64(raw: &str) -> Option<Duration> {
    let secs = raw.trim().parse::<f64>().ok()?;
    if secs < 0.0 {
        return None;
    }
    Duration::try_from_secs_f64(secs).ok()
}

fn ignored(name: &str, value: &str) {
    warn!(variable = name, value, "ignoring invalid dispatcher setting");
}

fn env_string(name: &str) -> Option<String> {
    std::env::var(name)
        .ok()
        .map(|s| s.trim().to_string())
        .filter(|s| !s.is_empty())
}

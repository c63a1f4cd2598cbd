//! 凭据模块：管理可互换的 API 密钥池及其轮换。
//!
//! # Credentials Module
//!
//! An ordered, deduplicated pool of interchangeable API keys with a
//! current-selection index.
//!
//! Keys are read from a single environment variable holding one or more keys
//! separated by `|`. When the variable is absent or empty, the same variable is
//! looked up in a dotenv-style file. Once loaded, the list never changes; only
//! the index moves, and it wraps on rotation.
//!
//! ```rust
//! use ai_lib_dispatch::credentials::CredentialStore;
//!
//! let mut store = CredentialStore::from_credentials(["key-a", "key-b", "key-c"]).unwrap();
//! assert_eq!(store.current_index(), 0);
//! assert_eq!(store.rotate().unwrap(), 1);
//! assert_eq!(store.rotate().unwrap(), 2);
//! assert_eq!(store.rotate().unwrap(), 0);
//! ```

mod dotenv;

use crate::{Error, ErrorContext, Result};
use sha2::{Digest, Sha256};
use std::fmt;
use std::path::PathBuf;
use tracing::{debug, info};

/// Default environment variable holding the `|`-separated keys.
pub const DEFAULT_KEY_VAR: &str = "GEMINI_API_KEY";

/// Default dotenv fallback file, relative to the working directory.
pub const DEFAULT_DOTENV_PATH: &str = ".env";

/// A single API key.
///
/// `Debug` and `Display` print a short SHA-256 fingerprint, never the key.
#[derive(Clone, PartialEq, Eq, Hash)]
pub struct Credential(String);

impl Credential {
    /// Trim and wrap a key; blank input yields `None`.
    pub fn new(raw: &str) -> Option<Self> {
        let trimmed = raw.trim();
        if trimmed.is_empty() {
            None
        } else {
            Some(Self(trimmed.to_string()))
        }
    }

    /// The secret itself. Only transports should call this.
    pub fn expose(&self) -> &str {
        &self.0
    }

    /// `sha256:` followed by the first 8 hex digits of the key's digest.
    pub fn fingerprint(&self) -> String {
        let digest = Sha256::digest(self.0.as_bytes());
        let hex: String = digest.iter().take(4).map(|b| format!("{:02x}", b)).collect();
        format!("sha256:{}", hex)
    }
}

impl fmt::Debug for Credential {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "Credential({})", self.fingerprint())
    }
}

impl fmt::Display for Credential {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.fingerprint())
    }
}

/// Split a `|`-delimited string into keys: trimmed, blanks dropped, first
/// occurrence of each duplicate kept.
pub fn parse_credentials(raw: &str) -> Vec<Credential> {
    let mut out: Vec<Credential> = Vec::new();
    for c in raw.split('|').filter_map(Credential::new) {
        if !out.contains(&c) {
            out.push(c);
        }
    }
    out
}

/// Where keys are loaded from.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CredentialSource {
    pub env_var: String,
    /// Dotenv fallback; `None` disables the fallback.
    pub dotenv_path: Option<PathBuf>,
}

impl Default for CredentialSource {
    fn default() -> Self {
        Self {
            env_var: DEFAULT_KEY_VAR.to_string(),
            dotenv_path: Some(PathBuf::from(DEFAULT_DOTENV_PATH)),
        }
    }
}

impl CredentialSource {
    pub fn new(env_var: impl Into<String>) -> Self {
        Self {
            env_var: env_var.into(),
            dotenv_path: None,
        }
    }

    pub fn with_dotenv_path(mut self, path: impl Into<PathBuf>) -> Self {
        self.dotenv_path = Some(path.into());
        self
    }

    /// Raw delimited string from the environment, then the dotenv file.
    fn read_raw(&self) -> Result<Option<String>> {
        if let Ok(v) = std::env::var(&self.env_var) {
            if !v.trim().is_empty() {
                debug!(var = %self.env_var, "credentials found in environment");
                return Ok(Some(v));
            }
        }
        match &self.dotenv_path {
            Some(path) => {
                let v = dotenv::lookup(path, &self.env_var)?;
                if v.is_some() {
                    debug!(path = %path.display(), "credentials found in dotenv file");
                }
                Ok(v.filter(|s| !s.trim().is_empty()))
            }
            None => Ok(None),
        }
    }
}

/// Ordered key pool plus the index of the key currently in use.
#[derive(Debug, Clone)]
pub struct CredentialStore {
    source: CredentialSource,
    credentials: Vec<Credential>,
    current_index: usize,
}

impl CredentialStore {
    /// An unloaded store reading from `source` on [`load`](Self::load).
    pub fn new(source: CredentialSource) -> Self {
        Self {
            source,
            credentials: Vec::new(),
            current_index: 0,
        }
    }

    /// A store that is already loaded with the given keys.
    pub fn from_credentials<I, S>(keys: I) -> Result<Self>
    where
        I: IntoIterator<Item = S>,
        S: AsRef<str>,
    {
        let joined = keys
            .into_iter()
            .map(|k| k.as_ref().to_string())
            .collect::<Vec<_>>()
            .join("|");
        let credentials = parse_credentials(&joined);
        if credentials.is_empty() {
            return Err(Error::configuration_with_context(
                "no usable credential supplied",
                ErrorContext::new().with_source("credential_store"),
            ));
        }
        Ok(Self {
            source: CredentialSource::default(),
            credentials,
            current_index: 0,
        })
    }

    /// Load keys from the configured source.
    ///
    /// No-op when already loaded. Fails with [`Error::Configuration`] if no
    /// source yields a non-empty string or nothing usable remains after
    /// splitting and trimming.
    pub fn load(&mut self) -> Result<()> {
        if self.is_loaded() {
            return Ok(());
        }

        let raw = self.source.read_raw()?.ok_or_else(|| {
            let mut details = format!("variable {} not set", self.source.env_var);
            if let Some(p) = &self.source.dotenv_path {
                details.push_str(&format!(" in environment or {}", p.display()));
            }
            Error::configuration_with_context(
                "no API credentials found",
                ErrorContext::new()
                    .with_details(details)
                    .with_source("credential_store"),
            )
        })?;

        let credentials = parse_credentials(&raw);
        if credentials.is_empty() {
            return Err(Error::configuration_with_context(
                "credential variable is empty or malformed; separate multiple keys with '|'",
                ErrorContext::new()
                    .with_details(self.source.env_var.clone())
                    .with_source("credential_store"),
            ));
        }

        info!(count = credentials.len(), "API credentials loaded");
        self.credentials = credentials;
        self.current_index = 0;
        Ok(())
    }

    pub fn is_loaded(&self) -> bool {
        !self.credentials.is_empty()
    }

    pub fn len(&self) -> usize {
        self.credentials.len()
    }

    pub fn is_empty(&self) -> bool {
        self.credentials.is_empty()
    }

    pub fn current_index(&self) -> usize {
        self.current_index
    }

    pub fn current(&self) -> Option<&Credential> {
        self.credentials.get(self.current_index)
    }

    pub fn get(&self, index: usize) -> Option<&Credential> {
        self.credentials.get(index)
    }

    /// Fingerprint of the key at `index`, or `"-"` when out of range.
    pub fn fingerprint(&self, index: usize) -> String {
        self.get(index)
            .map(Credential::fingerprint)
            .unwrap_or_else(|| "-".to_string())
    }

    pub fn can_rotate(&self) -> bool {
        self.credentials.len() > 1
    }

    /// Advance to the next key, wrapping around. Returns the new index.
    ///
    /// With one key or none the index is left alone and
    /// [`Error::CannotRotate`] is returned.
    pub fn rotate(&mut self) -> Result<usize> {
        if !self.can_rotate() {
            return Err(Error::CannotRotate {
                available: self.credentials.len(),
            });
        }
        self.current_index = (self.current_index + 1) % self.credentials.len();
        Ok(self.current_index)
    }

    pub fn source(&self) -> &CredentialSource {
        &self.source
    }
}

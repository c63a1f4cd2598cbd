//! Cached dotenv lookups.
//!
//! Each file is parsed at most once per process. The process environment is
//! never modified; values are only read out of the parsed file.

use crate::{Error, ErrorContext, Result};
use once_cell::sync::Lazy;
use std::collections::HashMap;
use std::path::{Path, PathBuf};
use std::sync::{Arc, Mutex};
use tracing::debug;

type Vars = Arc<HashMap<String, String>>;

// `None` records a missing file so it is not probed again.
static CACHE: Lazy<Mutex<HashMap<PathBuf, Option<Vars>>>> =
    Lazy::new(|| Mutex::new(HashMap::new()));

/// Look up `key` in the dotenv file at `path`.
///
/// A missing file is not an error and yields `Ok(None)`.
pub(crate) fn lookup(path: &Path, key: &str) -> Result<Option<String>> {
    let vars = load_cached(path)?;
    Ok(vars.and_then(|v| v.get(key).cloned()))
}

fn load_cached(path: &Path) -> Result<Option<Vars>> {
    let mut cache = CACHE.lock().map_err(|_| {
        Error::runtime_with_context(
            "dotenv cache poisoned",
            ErrorContext::new().with_source("dotenv"),
        )
    })?;
    if let Some(entry) = cache.get(path) {
        return Ok(entry.clone());
    }
    let parsed = parse_file(path)?;
    cache.insert(path.to_path_buf(), parsed.clone());
    Ok(parsed)
}

fn parse_file(path: &Path) -> Result<Option<Vars>> {
    let iter = match dotenvy::from_path_iter(path) {
        Ok(iter) => iter,
        Err(e) if e.not_found() => {
            debug!(path = %path.display(), "dotenv file not found");
            return Ok(None);
        }
        Err(e) => return Err(dotenv_error(path, e)),
    };

    let mut vars = HashMap::new();
    for item in iter {
        let (k, v) = item.map_err(|e| dotenv_error(path, e))?;
        vars.insert(k, v);
    }
    debug!(path = %path.display(), entries = vars.len(), "dotenv file loaded");
    Ok(Some(Arc::new(vars)))
}

fn dotenv_error(path: &Path, e: dotenvy::Error) -> Error {
    Error::configuration_with_context(
        format!("failed to read dotenv file: {}", e),
        ErrorContext::new()
            .with_details(path.display().to_string())
            .with_source("dotenv"),
    )
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn missing_file_is_none() {
        let path = std::env::temp_dir().join(format!("missing-{}.env", uuid::Uuid::new_v4()));
        assert_eq!(lookup(&path, "ANY").unwrap(), None);
    }

    #[test]
    fn values_are_read_and_cached() {
        let path = std::env::temp_dir().join(format!("dispatch-{}.env", uuid::Uuid::new_v4()));
        std::fs::write(&path, "FIRST=a\nSECOND=\"b|c\"\n").unwrap();
        assert_eq!(lookup(&path, "SECOND").unwrap().as_deref(), Some("b|c"));

        // Later edits are not observed: the file was parsed once.
        std::fs::write(&path, "SECOND=changed\n").unwrap();
        assert_eq!(lookup(&path, "SECOND").unwrap().as_deref(), Some("b|c"));
        assert_eq!(lookup(&path, "FIRST").unwrap().as_deref(), Some("a"));
        let _ = std::fs::remove_file(&path);
    }
}

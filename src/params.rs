//! Parameter store — runtime ids, provider names and endpoint URLs looked up by name.
//!
//! The file is a JSON object keyed by parameter name. Values are either a
//! plain string or `{"value": "...", "secure": true}`:
//!
//! ```json
//! {
//!   "/monitoragent/agentcore/runtime-id": "monitor-abc123",
//!   "/monitoragent/agentcore/gateway/gateway_url": "https://gw.example/mcp",
//!   "/monitor-provider/token-url": { "value": "https://auth.example/oauth2/token", "secure": true }
//! }
//! ```
//!
//! Any parameter can be overridden through `A2A_PARAM_<NAME>`, where the
//! name has its leading `/` removed, `/` and `-` mapped to `_`, and is
//! uppercased.

use std::collections::BTreeMap;
use std::fmt;
use std::fs;
use std::path::{Path, PathBuf};
use std::sync::RwLock;

use serde::{Deserialize, Serialize};
use tracing::{debug, info};

use crate::error::AppError;

const ENV_PREFIX: &str = "A2A_PARAM_";

/// Name → value lookups used during startup and session initialization.
pub trait ParameterStore: Send + Sync {
    /// A missing parameter is a [`AppError::Config`].
    fn get(&self, name: &str) -> Result<String, AppError>;

    fn put(&self, name: &str, value: &str, secure: bool) -> Result<(), AppError>;
}

#[derive(Clone, Serialize, Deserialize)]
#[serde(untagged)]
enum Entry {
    Plain(String),
    Tagged {
        value: String,
        #[serde(default)]
        secure: bool,
    },
}

impl Entry {
    fn value(&self) -> &str {
        match self {
            Entry::Plain(v) => v,
            Entry::Tagged { value, .. } => value,
        }
    }

    fn is_secure(&self) -> bool {
        matches!(self, Entry::Tagged { secure: true, .. })
    }
}

/// JSON-file backed [`ParameterStore`]. `put` rewrites the file in place.
pub struct JsonFileParams {
    path: Option<PathBuf>,
    entries: RwLock<BTreeMap<String, Entry>>,
    overrides: BTreeMap<String, String>,
}

impl fmt::Debug for JsonFileParams {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let shown: BTreeMap<String, String> = self
            .entries
            .read()
            .map(|entries| {
                entries
                    .iter()
                    .map(|(k, e)| {
                        let v = if e.is_secure() { "<redacted>".to_string() } else { e.value().to_string() };
                        (k.clone(), v)
                    })
                    .collect()
            })
            .unwrap_or_default();
        f.debug_struct("JsonFileParams")
            .field("path", &self.path)
            .field("entries", &shown)
            .field("overrides", &self.overrides.keys().collect::<Vec<_>>())
            .finish()
    }
}

impl JsonFileParams {
    /// Open `path` (a missing file is an empty store) with overrides from the environment.
    pub fn open(path: &Path) -> Result<Self, AppError> {
        let overrides = std::env::vars()
            .filter(|(k, _)| k.starts_with(ENV_PREFIX))
            .collect();
        Self::open_with_overrides(path, overrides)
    }

    /// `overrides` is keyed by env var name (`A2A_PARAM_...`).
    pub fn open_with_overrides(
        path: &Path,
        overrides: BTreeMap<String, String>,
    ) -> Result<Self, AppError> {
        let entries = if path.exists() {
            let raw = fs::read_to_string(path)
                .map_err(|e| AppError::Config(format!("cannot read {}: {e}", path.display())))?;
            serde_json::from_str(&raw)
                .map_err(|e| AppError::Config(format!("parse error in {}: {e}", path.display())))?
        } else {
            debug!(path = %path.display(), "parameter file absent, starting empty");
            BTreeMap::new()
        };
        Ok(Self { path: Some(path.to_path_buf()), entries: RwLock::new(entries), overrides })
    }

    /// Store with no backing file. Used by tests.
    pub fn in_memory() -> Self {
        Self { path: None, entries: RwLock::new(BTreeMap::new()), overrides: BTreeMap::new() }
    }

    fn persist(&self, entries: &BTreeMap<String, Entry>) -> Result<(), AppError> {
        let Some(path) = &self.path else { return Ok(()) };
        if let Some(parent) = path.parent().filter(|p| !p.as_os_str().is_empty()) {
            fs::create_dir_all(parent)?;
        }
        let data = serde_json::to_string_pretty(entries)
            .map_err(|e| AppError::Internal(format!("serialise parameters: {e}")))?;
        let tmp = path.with_extension("json.tmp");
        fs::write(&tmp, data)?;
        fs::rename(&tmp, path)?;
        Ok(())
    }
}

/// `/monitoragent/agentcore/runtime-id` → `A2A_PARAM_MONITORAGENT_AGENTCORE_RUNTIME_ID`.
pub fn env_key(name: &str) -> String {
    let body: String = name
        .trim_start_matches('/')
        .chars()
        .map(|c| match c {
            '/' | '-' | '.' => '_',
            c => c.to_ascii_uppercase(),
        })
        .collect();
    format!("{ENV_PREFIX}{body}")
}

impl ParameterStore for JsonFileParams {
    fn get(&self, name: &str) -> Result<String, AppError> {
        if let Some(v) = self.overrides.get(&env_key(name)) {
            return Ok(v.clone());
        }
        let entries = self
            .entries
            .read()
            .map_err(|_| AppError::Internal("parameter store lock poisoned".into()))?;
        entries
            .get(name)
            .map(|e| e.value().to_string())
            .filter(|v| !v.is_empty())
            .ok_or_else(|| AppError::Config(format!("missing parameter '{name}'")))
    }

    fn put(&self, name: &str, value: &str, secure: bool) -> Result<(), AppError> {
        let mut entries = self
            .entries
            .write()
            .map_err(|_| AppError::Internal("parameter store lock poisoned".into()))?;
        let entry = if secure {
            Entry::Tagged { value: value.to_string(), secure: true }
        } else {
            Entry::Plain(value.to_string())
        };
        entries.insert(name.to_string(), entry);
        self.persist(&entries)?;
        info!(name, secure, "parameter stored");
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    #[test]
    fn env_key_mapping() {
        assert_eq!(
            env_key("/monitoragent/agentcore/gateway/gateway_url"),
            "A2A_PARAM_MONITORAGENT_AGENTCORE_GATEWAY_GATEWAY_URL"
        );
        assert_eq!(env_key("/host-agent/provider-name"), "A2A_PARAM_HOST_AGENT_PROVIDER_NAME");
    }

    #[test]
    fn missing_parameter_is_config_error() {
        let store = JsonFileParams::in_memory();
        assert!(matches!(store.get("/nope"), Err(AppError::Config(_))));
    }

    #[test]
    fn reads_plain_and_tagged_values() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("params.json");
        fs::write(
            &path,
            r#"{"/a": "one", "/b": {"value": "two", "secure": true}}"#,
        )
        .unwrap();
        let store = JsonFileParams::open_with_overrides(&path, BTreeMap::new()).unwrap();
        assert_eq!(store.get("/a").unwrap(), "one");
        assert_eq!(store.get("/b").unwrap(), "two");
    }

    #[test]
    fn put_persists_and_reloads() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("nested").join("params.json");
        let store = JsonFileParams::open_with_overrides(&path, BTreeMap::new()).unwrap();
        store.put("/svc/runtime-id", "rt-1", false).unwrap();
        store.put("/svc/secret", "hunter2", true).unwrap();

        let reopened = JsonFileParams::open_with_overrides(&path, BTreeMap::new()).unwrap();
        assert_eq!(reopened.get("/svc/runtime-id").unwrap(), "rt-1");
        assert_eq!(reopened.get("/svc/secret").unwrap(), "hunter2");
    }

    #[test]
    fn secure_values_redacted_in_debug() {
        let store = JsonFileParams::in_memory();
        store.put("/svc/secret", "hunter2", true).unwrap();
        store.put("/svc/url", "https://x", false).unwrap();
        let shown = format!("{store:?}");
        assert!(!shown.contains("hunter2"));
        assert!(shown.contains("https://x"));
    }

    #[test]
    fn env_override_wins() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("params.json");
        fs::write(&path, r#"{"/svc/runtime-id": "from-file"}"#).unwrap();
        let mut overrides = BTreeMap::new();
        overrides.insert("A2A_PARAM_SVC_RUNTIME_ID".to_string(), "from-env".to_string());
        let store = JsonFileParams::open_with_overrides(&path, overrides).unwrap();
        assert_eq!(store.get("/svc/runtime-id").unwrap(), "from-env");
    }
}

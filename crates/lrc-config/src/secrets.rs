//! Source API key resolution.
//!
//! # Contract
//! - Config stores only **env var NAMES** at `/sources/<i>/http/api_key_env`.
//! - Callers resolve once per run with [`resolve_source_keys`] and hand the
//!   result to the HTTP fetchers; nothing else reads the environment.
//! - `Debug` output **redacts** values.
//! - Errors name the env var, never its value.

use std::collections::BTreeMap;

use anyhow::{bail, Result};
use serde_json::Value;

/// Whether a named but unset key variable is an error.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum KeyEnforcement {
    /// Every source that names an `api_key_env` must have it set.
    Required,
    /// Unset variables resolve to `None`.
    Optional,
}

/// API keys per source name. Sources without an `api_key_env` are absent.
#[derive(Clone, Default)]
pub struct ResolvedSourceKeys {
    keys: BTreeMap<String, Option<String>>,
}

impl ResolvedSourceKeys {
    /// Key for `source`, if one was named and set.
    pub fn get(&self, source: &str) -> Option<&str> {
        self.keys.get(source).and_then(|k| k.as_deref())
    }

    pub fn sources(&self) -> impl Iterator<Item = &str> {
        self.keys.keys().map(String::as_str)
    }
}

impl std::fmt::Debug for ResolvedSourceKeys {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let mut m = f.debug_map();
        for (source, key) in &self.keys {
            m.entry(source, &key.as_ref().map(|_| "<REDACTED>"));
        }
        m.finish()
    }
}

/// Non-blank trimmed string at `pointer`.
fn read_str_at(v: &Value, pointer: &str) -> Option<String> {
    let s = v.pointer(pointer)?.as_str()?.trim();
    (!s.is_empty()).then(|| s.to_string())
}

/// `None` when unset or blank.
fn resolve_env(var_name: &str) -> Option<String> {
    match std::env::var(var_name) {
        Ok(v) if !v.trim().is_empty() => Some(v),
        _ => None,
    }
}

/// Resolve the API key of every configured source that names one.
pub fn resolve_source_keys(
    config_json: &Value,
    enforcement: KeyEnforcement,
) -> Result<ResolvedSourceKeys> {
    let mut keys = BTreeMap::new();
    let Some(sources) = config_json.pointer("/sources").and_then(Value::as_array) else {
        return Ok(ResolvedSourceKeys { keys });
    };

    for (i, source) in sources.iter().enumerate() {
        let Some(var) = read_str_at(source, "/http/api_key_env") else {
            continue;
        };
        let name = read_str_at(source, "/name").unwrap_or_else(|| format!("sources[{i}]"));
        let value = resolve_env(&var);
        if value.is_none() && enforcement == KeyEnforcement::Required {
            bail!(
                "SECRETS_MISSING source={}: required env var '{}' is not set or empty",
                name,
                var
            );
        }
        keys.insert(name, value);
    }

    Ok(ResolvedSourceKeys { keys })
}

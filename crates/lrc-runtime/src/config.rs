//! Typed view of the merged config document.
//!
//! `lrc-config` owns loading, hashing and linting; this module only
//! deserializes `/pass` and `/sources` and validates them.

use std::collections::HashSet;

use serde::Deserialize;
use serde_json::Value;

use crate::descriptor::{DescriptorError, SourceDescriptor};

pub const DEFAULT_MAX_CONCURRENCY: usize = 4;

fn default_max_concurrency() -> usize {
    DEFAULT_MAX_CONCURRENCY
}

/// Pass-wide options (`/pass`).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Deserialize)]
pub struct PassOptions {
    /// Report the full history instead of the new-vs-known difference.
    #[serde(default)]
    pub show_all: bool,
    /// Upper bound on concurrently running (account, category) fetches.
    #[serde(default = "default_max_concurrency")]
    pub max_concurrency: usize,
}

impl Default for PassOptions {
    fn default() -> Self {
        Self {
            show_all: false,
            max_concurrency: DEFAULT_MAX_CONCURRENCY,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
pub struct ReconcileConfig {
    #[serde(default)]
    pub pass: PassOptions,
    #[serde(default)]
    pub sources: Vec<SourceDescriptor>,
}

impl ReconcileConfig {
    /// Deserialize and validate. Any failure here is a configuration error
    /// and must stop the run before a single request is made.
    pub fn from_config_json(config_json: &Value) -> Result<Self, DescriptorError> {
        let cfg: ReconcileConfig = serde_json::from_value(config_json.clone())
            .map_err(|e| DescriptorError::Malformed(e.to_string()))?;
        cfg.validate()?;
        Ok(cfg)
    }

    pub fn validate(&self) -> Result<(), DescriptorError> {
        if self.pass.max_concurrency == 0 {
            return Err(DescriptorError::ZeroConcurrency);
        }
        let mut names = HashSet::new();
        for source in &self.sources {
            source.validate()?;
            if !names.insert(source.name.trim()) {
                return Err(DescriptorError::DuplicateSource {
                    source: source.name.trim().to_string(),
                });
            }
        }
        Ok(())
    }

    pub fn source(&self, name: &str) -> Option<&SourceDescriptor> {
        self.sources.iter().find(|s| s.name == name)
    }
}

//! # Dispatcher Configuration
//!
//! Settings that change how the dispatcher answers requests. Every field has
//! a default, so a partial YAML document or a handful of environment
//! variables is enough.
//!
//! ## Environment Variables
//!
//! | variable | default |
//! |---|---|
//! | `RESR_AUTO_OPTIONS` | `true` |
//! | `RESR_HEAD_FALLBACK` | `true` |
//! | `RESR_MAX_LOCATOR_DEPTH` | `32` |
//! | `RESR_REQUEST_ID_HEADER` | `x-request-id` |
//! | `RESR_ERROR_ENTITIES` | `true` |
//!
//! Unparsable values are ignored with a warning and the default is kept.
//!
//! ## YAML
//!
//! ```rust
//! use resrouter::config::DispatcherConfig;
//!
//! let config = DispatcherConfig::from_yaml_str("auto_options: false\nmax_locator_depth: 4\n").unwrap();
//! assert!(!config.auto_options);
//! assert_eq!(config.max_locator_depth, 4);
//! assert!(config.head_fallback);
//! ```

use std::env;
use std::path::Path;
use std::str::FromStr;

use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};
use tracing::warn;

/// Dispatcher behaviour switches.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct DispatcherConfig {
    /// Answer `OPTIONS` with `200` and `Allow` when no handler declares it.
    pub auto_options: bool,
    /// Serve `HEAD` with the `GET` handler and drop the body.
    pub head_fallback: bool,
    /// Longest sub-resource locator chain before the request fails with 500.
    pub max_locator_depth: usize,
    /// Header carrying the request id, read from requests and set on responses.
    pub request_id_header: String,
    /// Include a `text/plain` message in error responses.
    pub error_entities: bool,
}

impl Default for DispatcherConfig {
    fn default() -> Self {
        Self {
            auto_options: true,
            head_fallback: true,
            max_locator_depth: 32,
            request_id_header: "x-request-id".to_string(),
            error_entities: true,
        }
    }
}

fn env_value<T: FromStr>(name: &str) -> Option<T> {
    let raw = env::var(name).ok()?;
    match raw.trim().parse() {
        Ok(v) => Some(v),
        Err(_) => {
            warn!(variable = name, value = %raw, "ignoring invalid configuration value");
            None
        }
    }
}

fn env_bool(name: &str) -> Option<bool> {
    let raw = env::var(name).ok()?;
    match raw.trim().to_lowercase().as_str() {
        "1" | "true" | "yes" | "on" => Some(true),
        "0" | "false" | "no" | "off" => Some(false),
        _ => {
            warn!(variable = name, value = %raw, "ignoring invalid configuration value");
            None
        }
    }
}

impl DispatcherConfig {
    /// Defaults overridden by `RESR_*` environment variables.
    #[must_use]
    pub fn from_env() -> Self {
        Self::default().with_env_overrides()
    }

    /// Apply `RESR_*` environment variables on top of `self`.
    #[must_use]
    pub fn with_env_overrides(mut self) -> Self {
        if let Some(v) = env_bool("RESR_AUTO_OPTIONS") {
            self.auto_options = v;
        }
        if let Some(v) = env_bool("RESR_HEAD_FALLBACK") {
            self.head_fallback = v;
        }
        if let Some(v) = env_value("RESR_MAX_LOCATOR_DEPTH") {
            self.max_locator_depth = v;
        }
        if let Ok(v) = env::var("RESR_REQUEST_ID_HEADER") {
            if !v.trim().is_empty() {
                self.request_id_header = v.trim().to_ascii_lowercase();
            }
        }
        if let Some(v) = env_bool("RESR_ERROR_ENTITIES") {
            self.error_entities = v;
        }
        self
    }

    /// Parse a YAML document; missing fields take their defaults.
    ///
    /// # Errors
    ///
    /// Invalid YAML or a field of the wrong type.
    pub fn from_yaml_str(yaml: &str) -> Result<Self> {
        let config: Self =
            serde_yaml::from_str(yaml).context("Failed to parse dispatcher configuration")?;
        Ok(config.normalized())
    }

    /// Read and parse a YAML file.
    ///
    /// # Errors
    ///
    /// The file cannot be read or does not parse.
    pub fn from_file(path: impl AsRef<Path>) -> Result<Self> {
        let path = path.as_ref();
        let text = std::fs::read_to_string(path)
            .with_context(|| format!("Failed to read {}", path.display()))?;
        Self::from_yaml_str(&text).with_context(|| format!("Invalid configuration in {}", path.display()))
    }

    fn normalized(mut self) -> Self {
        self.request_id_header = self.request_id_header.trim().to_ascii_lowercase();
        if self.request_id_header.is_empty() {
            self.request_id_header = Self::default().request_id_header;
        }
        self
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_defaults() {
        let config = DispatcherConfig::default();
        assert!(config.auto_options);
        assert!(config.head_fallback);
        assert_eq!(config.max_locator_depth, 32);
        assert_eq!(config.request_id_header, "x-request-id");
        assert!(config.error_entities);
    }

    #[test]
    fn test_partial_yaml() {
        let config =
            DispatcherConfig::from_yaml_str("request_id_header: X-Trace-Id\nerror_entities: false\n")
                .unwrap();
        assert_eq!(config.request_id_header, "x-trace-id");
        assert!(!config.error_entities);
        assert!(config.auto_options);
    }

    #[test]
    fn test_bad_yaml_is_error() {
        assert!(DispatcherConfig::from_yaml_str("max_locator_depth: lots\n").is_err());
    }
}

//! TOML-based anchoring configuration.
//!
//! Stores run defaults including:
//! - Confidence threshold and default mode
//! - Gap finding buffer and minimum gap length
//! - Scoring grace period and hybrid top-K
//! - Scoring provider endpoint, concurrency and timeouts
//!
//! Configuration is stored at `~/.config/dayanchor/config.toml`.

use std::path::{Path, PathBuf};
use std::time::Duration;

use chrono::NaiveTime;
use serde::{Deserialize, Serialize};

use crate::coordinator::AnchoringMode;
use crate::error::{ConfigError, ConfigurationError};

/// Gap finding configuration.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct GapConfig {
    /// Free time kept next to every calendar event
    #[serde(default = "default_buffer_minutes")]
    pub buffer_minutes: i64,
    /// Gaps shorter than this are dropped
    #[serde(default = "default_min_gap_minutes")]
    pub min_gap_minutes: i64,
}

/// Scoring configuration.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct ScoringConfig {
    #[serde(default = "default_grace_minutes")]
    pub grace_minutes: i64,
    /// Pairs per task re-ranked by the provider in hybrid mode
    #[serde(default = "default_top_k")]
    pub top_k: usize,
}

/// Scoring provider configuration.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct ProviderConfig {
    #[serde(default = "default_base_url")]
    pub base_url: String,
    #[serde(default = "default_model")]
    pub model: String,
    /// Environment variable holding the API key; the key itself is never stored
    #[serde(default = "default_api_key_env")]
    pub api_key_env: String,
    #[serde(default = "default_max_concurrency")]
    pub max_concurrency: usize,
    #[serde(default = "default_pair_timeout_secs")]
    pub pair_timeout_secs: u64,
    #[serde(default = "default_holistic_timeout_secs")]
    pub holistic_timeout_secs: u64,
}

/// Anchoring configuration.
///
/// Serialized to/from TOML at `~/.config/dayanchor/config.toml`.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct AnchorConfig {
    #[serde(default = "default_confidence_threshold")]
    pub confidence_threshold: f64,
    #[serde(default)]
    pub default_mode: AnchoringMode,
    /// `HH:MM` start for standalone tasks without timing of their own
    #[serde(default = "default_start_time")]
    pub default_start_time: String,
    #[serde(default)]
    pub gaps: GapConfig,
    #[serde(default)]
    pub scoring: ScoringConfig,
    #[serde(default)]
    pub provider: ProviderConfig,
}

// Default functions
fn default_confidence_threshold() -> f64 {
    0.7
}
fn default_start_time() -> String {
    "09:00".into()
}
fn default_buffer_minutes() -> i64 {
    15
}
fn default_min_gap_minutes() -> i64 {
    5
}
fn default_grace_minutes() -> i64 {
    60
}
fn default_top_k() -> usize {
    3
}
fn default_base_url() -> String {
    "https://api.openai.com/v1".into()
}
fn default_model() -> String {
    "gpt-4o-mini".into()
}
fn default_api_key_env() -> String {
    "DAYANCHOR_API_KEY".into()
}
fn default_max_concurrency() -> usize {
    4
}
fn default_pair_timeout_secs() -> u64 {
    8
}
fn default_holistic_timeout_secs() -> u64 {
    25
}

impl Default for GapConfig {
    fn default() -> Self {
        Self {
            buffer_minutes: default_buffer_minutes(),
            min_gap_minutes: default_min_gap_minutes(),
        }
    }
}

impl Default for ScoringConfig {
    fn default() -> Self {
        Self {
            grace_minutes: default_grace_minutes(),
            top_k: default_top_k(),
        }
    }
}

impl Default for ProviderConfig {
    fn default() -> Self {
        Self {
            base_url: default_base_url(),
            model: default_model(),
            api_key_env: default_api_key_env(),
            max_concurrency: default_max_concurrency(),
            pair_timeout_secs: default_pair_timeout_secs(),
            holistic_timeout_secs: default_holistic_timeout_secs(),
        }
    }
}

impl ProviderConfig {
    pub fn pair_timeout(&self) -> Duration {
        Duration::from_secs(self.pair_timeout_secs)
    }

    pub fn holistic_timeout(&self) -> Duration {
        Duration::from_secs(self.holistic_timeout_secs)
    }
}

impl Default for AnchorConfig {
    fn default() -> Self {
        Self {
            confidence_threshold: default_confidence_threshold(),
            default_mode: AnchoringMode::default(),
            default_start_time: default_start_time(),
            gaps: GapConfig::default(),
            scoring: ScoringConfig::default(),
            provider: ProviderConfig::default(),
        }
    }
}

/// Returns the configuration directory, creating it if needed.
///
/// `DAYANCHOR_CONFIG_DIR` wins when set. Otherwise `~/.config/dayanchor`, or
/// `~/.config/dayanchor-dev` when `DAYANCHOR_ENV=dev`.
pub fn data_dir() -> Result<PathBuf, ConfigError> {
    let dir = match std::env::var_os("DAYANCHOR_CONFIG_DIR") {
        Some(dir) if !dir.is_empty() => PathBuf::from(dir),
        _ => {
            let base_dir = dirs::home_dir()
                .unwrap_or_else(|| PathBuf::from("."))
                .join(".config");
            let env = std::env::var("DAYANCHOR_ENV").unwrap_or_else(|_| "production".to_string());
            if env == "dev" {
                base_dir.join("dayanchor-dev")
            } else {
                base_dir.join("dayanchor")
            }
        }
    };

    std::fs::create_dir_all(&dir)
        .map_err(|e| ConfigError::DirectoryUnavailable(format!("{}: {e}", dir.display())))?;
    Ok(dir)
}

impl AnchorConfig {
    fn get_json_value_by_path<'a>(
        root: &'a serde_json::Value,
        key: &str,
    ) -> Option<&'a serde_json::Value> {
        if key.is_empty() {
            return None;
        }

        let mut current = root;
        for part in key.split('.') {
            current = current.get(part)?;
        }
        Some(current)
    }

    fn set_json_value_by_path(
        root: &mut serde_json::Value,
        key: &str,
        value: &str,
    ) -> Result<(), ConfigError> {
        let invalid = |message: String| ConfigError::InvalidValue {
            key: key.to_string(),
            message,
        };
        let mut parts = key.split('.').peekable();
        if key.is_empty() {
            return Err(ConfigError::UnknownKey(key.to_string()));
        }

        let mut current = root;
        while let Some(part) = parts.next() {
            let is_leaf = parts.peek().is_none();
            if is_leaf {
                let obj = current
                    .as_object_mut()
                    .ok_or_else(|| ConfigError::UnknownKey(key.to_string()))?;
                let existing = obj
                    .get(part)
                    .ok_or_else(|| ConfigError::UnknownKey(key.to_string()))?;

                let new_value = match existing {
                    serde_json::Value::Bool(_) => serde_json::Value::Bool(
                        value
                            .parse::<bool>()
                            .map_err(|e| invalid(e.to_string()))?,
                    ),
                    serde_json::Value::Number(_) => {
                        if let Ok(n) = value.parse::<u64>() {
                            serde_json::Value::Number(n.into())
                        } else if let Ok(n) = value.parse::<i64>() {
                            serde_json::Value::Number(n.into())
                        } else if let Ok(n) = value.parse::<f64>() {
                            serde_json::Number::from_f64(n)
                                .map(serde_json::Value::Number)
                                .ok_or_else(|| invalid(format!("cannot parse '{value}' as number")))?
                        } else {
                            return Err(invalid(format!("cannot parse '{value}' as number")));
                        }
                    }
                    serde_json::Value::Object(_) => {
                        return Err(ConfigError::UnknownKey(key.to_string()));
                    }
                    _ => serde_json::Value::String(value.into()),
                };

                obj.insert(part.to_string(), new_value);
                return Ok(());
            }

            current = current
                .get_mut(part)
                .ok_or_else(|| ConfigError::UnknownKey(key.to_string()))?;
        }

        Err(ConfigError::UnknownKey(key.to_string()))
    }

    pub fn path() -> Result<PathBuf, ConfigError> {
        Ok(data_dir()?.join("config.toml"))
    }

    /// Load from the default location, writing defaults when no file exists.
    ///
    /// # Errors
    ///
    /// Returns an error if the config file exists but cannot be parsed,
    /// or if the default config cannot be written to disk.
    pub fn load() -> Result<Self, ConfigError> {
        Self::load_from(&Self::path()?)
    }

    /// Load from `path`, writing defaults there when it does not exist.
    ///
    /// A file that parses but holds out-of-range values is rejected.
    pub fn load_from(path: &Path) -> Result<Self, ConfigError> {
        match std::fs::read_to_string(path) {
            Ok(content) => {
                let cfg: Self = toml::from_str(&content).map_err(|e| ConfigError::LoadFailed {
                    path: path.to_path_buf(),
                    message: e.to_string(),
                })?;
                cfg.validate()?;
                Ok(cfg)
            }
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => {
                let cfg = Self::default();
                cfg.save_to(path)?;
                Ok(cfg)
            }
            Err(e) => Err(ConfigError::LoadFailed {
                path: path.to_path_buf(),
                message: e.to_string(),
            }),
        }
    }

    /// Persist to the default location.
    ///
    /// # Errors
    ///
    /// Returns an error if the config cannot be serialized or written to disk.
    pub fn save(&self) -> Result<(), ConfigError> {
        self.save_to(&Self::path()?)
    }

    pub fn save_to(&self, path: &Path) -> Result<(), ConfigError> {
        let save_failed = |message: String| ConfigError::SaveFailed {
            path: path.to_path_buf(),
            message,
        };
        let content = toml::to_string_pretty(self).map_err(|e| save_failed(e.to_string()))?;
        std::fs::write(path, content).map_err(|e| save_failed(e.to_string()))
    }

    /// Load from disk, returning default on error.
    /// This is a convenience method that never fails.
    pub fn load_or_default() -> Self {
        Self::load().unwrap_or_default()
    }

    /// Get a config value as string by dot-separated key.
    pub fn get(&self, key: &str) -> Option<String> {
        let json = serde_json::to_value(self).ok()?;
        let val = Self::get_json_value_by_path(&json, key)?;
        match val {
            serde_json::Value::String(s) => Some(s.clone()),
            serde_json::Value::Object(_) => None,
            other => Some(other.to_string()),
        }
    }

    /// Set a config value by dot-separated key.
    ///
    /// The value is type-checked against the current one and the whole
    /// config is re-validated; on error `self` is left unchanged.
    pub fn set(&mut self, key: &str, value: &str) -> Result<(), ConfigError> {
        let mut json = serde_json::to_value(&*self).map_err(|e| ConfigError::InvalidValue {
            key: key.to_string(),
            message: e.to_string(),
        })?;
        Self::set_json_value_by_path(&mut json, key, value)?;
        let updated: Self = serde_json::from_value(json).map_err(|e| ConfigError::InvalidValue {
            key: key.to_string(),
            message: e.to_string(),
        })?;
        updated.validate()?;
        *self = updated;
        Ok(())
    }

    /// Every leaf key with its current value, in dot-path form.
    pub fn entries(&self) -> Vec<(String, String)> {
        fn walk(prefix: &str, value: &serde_json::Value, out: &mut Vec<(String, String)>) {
            match value {
                serde_json::Value::Object(map) => {
                    for (k, v) in map {
                        let key = if prefix.is_empty() {
                            k.clone()
                        } else {
                            format!("{prefix}.{k}")
                        };
                        walk(&key, v, out);
                    }
                }
                serde_json::Value::String(s) => out.push((prefix.to_string(), s.clone())),
                other => out.push((prefix.to_string(), other.to_string())),
            }
        }

        let mut out = Vec::new();
        if let Ok(json) = serde_json::to_value(self) {
            walk("", &json, &mut out);
        }
        out.sort();
        out
    }

    /// Parsed `default_start_time`.
    pub fn default_start(&self) -> Result<NaiveTime, ConfigurationError> {
        NaiveTime::parse_from_str(self.default_start_time.trim(), "%H:%M").map_err(|e| {
            ConfigurationError::InvalidSetting {
                key: "default_start_time".to_string(),
                message: format!("'{}' is not HH:MM ({e})", self.default_start_time),
            }
        })
    }

    /// Check value ranges that serde alone cannot express.
    pub fn validate(&self) -> Result<(), ConfigError> {
        let invalid = |key: &str, message: String| {
            Err(ConfigError::InvalidValue {
                key: key.to_string(),
                message,
            })
        };

        if !(0.0..=1.0).contains(&self.confidence_threshold) {
            return invalid(
                "confidence_threshold",
                format!("{} is outside [0, 1]", self.confidence_threshold),
            );
        }
        if let Err(ConfigurationError::InvalidSetting { key, message }) = self.default_start() {
            return invalid(&key, message);
        }
        if self.gaps.buffer_minutes < 0 {
            return invalid("gaps.buffer_minutes", "must not be negative".into());
        }
        if self.gaps.min_gap_minutes < 0 {
            return invalid("gaps.min_gap_minutes", "must not be negative".into());
        }
        if self.scoring.grace_minutes < 0 {
            return invalid("scoring.grace_minutes", "must not be negative".into());
        }
        if self.scoring.top_k == 0 {
            return invalid("scoring.top_k", "must be at least 1".into());
        }
        if self.provider.max_concurrency == 0 {
            return invalid("provider.max_concurrency", "must be at least 1".into());
        }
        if self.provider.pair_timeout_secs == 0 {
            return invalid("provider.pair_timeout_secs", "must be at least 1".into());
        }
        if self.provider.holistic_timeout_secs == 0 {
            return invalid("provider.holistic_timeout_secs", "must be at least 1".into());
        }
        Ok(())
    }
}

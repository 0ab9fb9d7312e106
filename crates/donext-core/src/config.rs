//! TOML-based configuration.
//!
//! Stores:
//! - Generative backend settings (endpoint, model, per-step temperatures)
//! - Check-in defaults and the user's timezone offset
//! - Stuck-pattern thresholds
//!
//! Configuration is stored at `~/.config/donext/config.toml`. The core never
//! reads it on its own: hosts load a [`Config`] and hand it to the dispatcher.

use chrono::{DateTime, FixedOffset, NaiveDate, Offset, Utc};
use serde::{Deserialize, Serialize};
use std::path::PathBuf;

use crate::error::ConfigError;
use crate::storage::data_dir;

/// Sampling parameters for one generative step.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct StepParams {
    pub temperature: f32,
    pub max_tokens: u32,
}

/// Generative backend configuration.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct GenerativeConfig {
    /// When false every generative step takes its deterministic fallback.
    #[serde(default)]
    pub enabled: bool,
    /// OpenAI-compatible chat completions endpoint
    #[serde(default = "default_endpoint")]
    pub endpoint: String,
    #[serde(default = "default_model")]
    pub model: String,
    /// Environment variable holding the API key
    #[serde(default = "default_api_key_env")]
    pub api_key_env: String,
    /// Per-call timeout
    #[serde(default = "default_timeout_secs")]
    pub timeout_secs: u64,
    #[serde(default = "default_selection_params")]
    pub selection: StepParams,
    #[serde(default = "default_coaching_params")]
    pub coaching: StepParams,
    #[serde(default = "default_microtask_params")]
    pub microtasks: StepParams,
}

/// Check-in defaults.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CheckinConfig {
    /// Minutes assumed when a check-in does not say
    #[serde(default = "default_available_minutes")]
    pub default_available_minutes: u32,
    /// Offset from UTC in hours, used to decide what "today" is
    #[serde(default)]
    pub timezone_offset_hours: i32,
}

/// Stuck-pattern detector thresholds.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct StuckConfig {
    /// Fires only when time in the current state exceeds this
    #[serde(default = "default_elapsed_threshold")]
    pub elapsed_threshold_minutes: u32,
    /// Fires only when interruptions exceed this
    #[serde(default = "default_interruption_threshold")]
    pub interruption_threshold: u32,
    /// Interruptions older than this do not count
    #[serde(default = "default_session_window")]
    pub session_window_minutes: u32,
}

/// Application configuration.
///
/// Serialized to/from TOML at `~/.config/donext/config.toml`.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct Config {
    #[serde(default)]
    pub generative: GenerativeConfig,
    #[serde(default)]
    pub checkin: CheckinConfig,
    #[serde(default)]
    pub stuck: StuckConfig,
}

fn default_endpoint() -> String {
    "https://api.openai.com/v1/chat/completions".into()
}
fn default_model() -> String {
    "gpt-4o-mini".into()
}
fn default_api_key_env() -> String {
    "DONEXT_API_KEY".into()
}
fn default_timeout_secs() -> u64 {
    10
}
fn default_selection_params() -> StepParams {
    StepParams {
        temperature: 0.2,
        max_tokens: 200,
    }
}
fn default_coaching_params() -> StepParams {
    StepParams {
        temperature: 0.7,
        max_tokens: 160,
    }
}
fn default_microtask_params() -> StepParams {
    StepParams {
        temperature: 0.5,
        max_tokens: 200,
    }
}
fn default_available_minutes() -> u32 {
    120
}
fn default_elapsed_threshold() -> u32 {
    45
}
fn default_interruption_threshold() -> u32 {
    2
}
fn default_session_window() -> u32 {
    240
}

impl Default for GenerativeConfig {
    fn default() -> Self {
        Self {
            enabled: false,
            endpoint: default_endpoint(),
            model: default_model(),
            api_key_env: default_api_key_env(),
            timeout_secs: default_timeout_secs(),
            selection: default_selection_params(),
            coaching: default_coaching_params(),
            microtasks: default_microtask_params(),
        }
    }
}

impl Default for CheckinConfig {
    fn default() -> Self {
        Self {
            default_available_minutes: default_available_minutes(),
            timezone_offset_hours: 0,
        }
    }
}

impl Default for StuckConfig {
    fn default() -> Self {
        Self {
            elapsed_threshold_minutes: default_elapsed_threshold(),
            interruption_threshold: default_interruption_threshold(),
            session_window_minutes: default_session_window(),
        }
    }
}

impl CheckinConfig {
    /// Calendar date of `at` in the configured timezone.
    pub fn local_date(&self, at: DateTime<Utc>) -> NaiveDate {
        let offset = FixedOffset::east_opt(self.timezone_offset_hours * 3600)
            .unwrap_or_else(|| Utc.fix());
        at.with_timezone(&offset).date_naive()
    }
}

impl Config {
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
        let unknown = || ConfigError::UnknownKey(key.to_string());
        let invalid = |message: String| ConfigError::InvalidValue {
            key: key.to_string(),
            message,
        };

        let mut parts = key.split('.').peekable();
        if parts.peek().is_none() || key.is_empty() {
            return Err(unknown());
        }

        let mut current = root;
        while let Some(part) = parts.next() {
            if parts.peek().is_none() {
                let obj = current.as_object_mut().ok_or_else(unknown)?;
                let existing = obj.get(part).ok_or_else(unknown)?;

                let new_value = match existing {
                    serde_json::Value::Bool(_) => serde_json::Value::Bool(
                        value.parse::<bool>().map_err(|e| invalid(e.to_string()))?,
                    ),
                    serde_json::Value::Number(_) => {
                        if let Ok(n) = value.parse::<i64>() {
                            serde_json::Value::Number(n.into())
                        } else if let Ok(n) = value.parse::<f64>() {
                            serde_json::Number::from_f64(n)
                                .map(serde_json::Value::Number)
                                .ok_or_else(|| invalid(format!("cannot parse '{value}' as number")))?
                        } else {
                            return Err(invalid(format!("cannot parse '{value}' as number")));
                        }
                    }
                    serde_json::Value::Object(_) | serde_json::Value::Array(_) => {
                        serde_json::from_str(value).map_err(|e| invalid(e.to_string()))?
                    }
                    _ => serde_json::Value::String(value.into()),
                };

                obj.insert(part.to_string(), new_value);
                return Ok(());
            }

            current = current.get_mut(part).ok_or_else(unknown)?;
        }

        Err(unknown())
    }

    pub fn path() -> Result<PathBuf, ConfigError> {
        Ok(data_dir()?.join("config.toml"))
    }

    /// Load from disk or write and return the default.
    ///
    /// # Errors
    ///
    /// Returns an error if the config file exists but cannot be parsed,
    /// or if the default config cannot be written to disk.
    pub fn load() -> Result<Self, ConfigError> {
        Self::load_from(&Self::path()?)
    }

    pub fn load_from(path: &std::path::Path) -> Result<Self, ConfigError> {
        match std::fs::read_to_string(path) {
            Ok(content) => toml::from_str(&content).map_err(|e| ConfigError::LoadFailed {
                path: path.to_path_buf(),
                message: e.to_string(),
            }),
            Err(_) => {
                let cfg = Self::default();
                cfg.save_to(path)?;
                Ok(cfg)
            }
        }
    }

    /// Persist to disk.
    pub fn save(&self) -> Result<(), ConfigError> {
        self.save_to(&Self::path()?)
    }

    pub fn save_to(&self, path: &std::path::Path) -> Result<(), ConfigError> {
        let save_failed = |message: String| ConfigError::SaveFailed {
            path: path.to_path_buf(),
            message,
        };
        let content = toml::to_string_pretty(self).map_err(|e| save_failed(e.to_string()))?;
        std::fs::write(path, content).map_err(|e| save_failed(e.to_string()))
    }

    /// Get a config value as string by dot-separated key.
    pub fn get(&self, key: &str) -> Option<String> {
        let json = serde_json::to_value(self).ok()?;
        let val = Self::get_json_value_by_path(&json, key)?;
        match val {
            serde_json::Value::String(s) => Some(s.clone()),
            other => Some(other.to_string()),
        }
    }

    /// Set a config value by dot-separated key, in memory only.
    ///
    /// # Errors
    ///
    /// Returns an error if the key is unknown or the value has the wrong type.
    pub fn set(&mut self, key: &str, value: &str) -> Result<(), ConfigError> {
        let invalid = |message: String| ConfigError::InvalidValue {
            key: key.to_string(),
            message,
        };
        let mut json = serde_json::to_value(&*self).map_err(|e| invalid(e.to_string()))?;
        Self::set_json_value_by_path(&mut json, key, value)?;
        *self = serde_json::from_value(json).map_err(|e| invalid(e.to_string()))?;
        Ok(())
    }

    /// Load from disk, returning default on error.
    pub fn load_or_default() -> Self {
        Self::load().unwrap_or_default()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;

    #[test]
    fn default_config_roundtrip() {
        let cfg = Config::default();
        let toml_str = toml::to_string_pretty(&cfg).unwrap();
        let parsed: Config = toml::from_str(&toml_str).unwrap();
        assert_eq!(parsed, cfg);
    }

    #[test]
    fn partial_file_fills_defaults() {
        let parsed: Config = toml::from_str("[generative]\nenabled = true\n").unwrap();
        assert!(parsed.generative.enabled);
        assert_eq!(parsed.generative.timeout_secs, 10);
        assert_eq!(parsed.checkin.default_available_minutes, 120);
        assert_eq!(parsed.stuck.interruption_threshold, 2);
    }

    #[test]
    fn get_supports_dot_path_keys() {
        let cfg = Config::default();
        assert_eq!(cfg.get("generative.enabled").as_deref(), Some("false"));
        assert_eq!(cfg.get("stuck.elapsed_threshold_minutes").as_deref(), Some("45"));
        assert_eq!(cfg.get("generative.model").as_deref(), Some("gpt-4o-mini"));
        assert!(cfg.get("generative.missing").is_none());
    }

    #[test]
    fn set_updates_nested_values() {
        let mut cfg = Config::default();
        cfg.set("generative.enabled", "true").unwrap();
        cfg.set("checkin.timezone_offset_hours", "-5").unwrap();
        cfg.set("generative.coaching.temperature", "0.9").unwrap();
        assert!(cfg.generative.enabled);
        assert_eq!(cfg.checkin.timezone_offset_hours, -5);
        assert!((cfg.generative.coaching.temperature - 0.9).abs() < 1e-6);
    }

    #[test]
    fn set_rejects_unknown_key_and_bad_type() {
        let mut cfg = Config::default();
        assert!(matches!(
            cfg.set("generative.nope", "1"),
            Err(ConfigError::UnknownKey(_))
        ));
        assert!(matches!(
            cfg.set("generative.enabled", "maybe"),
            Err(ConfigError::InvalidValue { .. })
        ));
    }

    #[test]
    fn load_from_writes_default_when_missing() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("config.toml");
        let cfg = Config::load_from(&path).unwrap();
        assert_eq!(cfg, Config::default());
        assert!(path.exists());
    }

    #[test]
    fn local_date_respects_offset() {
        let at = Utc.with_ymd_and_hms(2026, 3, 10, 23, 30, 0).unwrap();
        let utc = CheckinConfig::default();
        let tokyo = CheckinConfig {
            timezone_offset_hours: 9,
            ..Default::default()
        };
        assert_eq!(utc.local_date(at), NaiveDate::from_ymd_opt(2026, 3, 10).unwrap());
        assert_eq!(tokyo.local_date(at), NaiveDate::from_ymd_opt(2026, 3, 11).unwrap());
    }
}

//! TOML-based engine configuration.
//!
//! Stores:
//! - Emergency exit pricing (base price, multiplier, cap, product ids)
//! - Commitment advisory and history settings
//! - Monitor diagnostic log size
//! - The restriction set used by regret prevention
//!
//! Configuration is stored at `<data_dir>/config.toml`.

use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};

use super::data_dir;
use crate::commitment::ExitPricing;
use crate::error::ConfigError;
use crate::policy::RestrictionSet;

/// Emergency exit pricing.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PricingSettings {
    #[serde(default = "default_base_price_cents")]
    pub base_price_cents: u64,
    #[serde(default = "default_multiplier")]
    pub multiplier: f64,
    #[serde(default = "default_max_price_cents")]
    pub max_price_cents: u64,
    /// Product ids are `<prefix>.<price in cents>`.
    #[serde(default = "default_product_prefix")]
    pub product_prefix: String,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CommitmentSettings {
    /// Exit records kept in history.
    #[serde(default = "default_history_cap")]
    pub history_cap: usize,
    /// Trailing window, in days, for the exit pattern advisory.
    #[serde(default = "default_advisory_window_days")]
    pub advisory_window_days: u32,
    /// Exits within the window that trigger the advisory.
    #[serde(default = "default_advisory_threshold")]
    pub advisory_threshold: usize,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct MonitorSettings {
    #[serde(default = "default_diagnostic_log_cap")]
    pub diagnostic_log_cap: usize,
}

/// Regret prevention settings.
///
/// The restriction set is separate from any schedule or session selection.
/// It has no built-in default; until it is configured, protection windows
/// still activate and report state but block nothing.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RegretSettings {
    #[serde(default)]
    pub app_tokens: Vec<String>,
    #[serde(default)]
    pub category_tokens: Vec<String>,
    #[serde(default)]
    pub domains: Vec<String>,
    #[serde(default = "default_check_interval_secs")]
    pub check_interval_secs: u64,
}

/// Engine configuration.
///
/// Serialized to/from TOML at `<data_dir>/config.toml`.
#[derive(Debug, Clone, Serialize, Deserialize, Default)]
pub struct Config {
    #[serde(default)]
    pub pricing: PricingSettings,
    #[serde(default)]
    pub commitment: CommitmentSettings,
    #[serde(default)]
    pub monitor: MonitorSettings,
    #[serde(default)]
    pub regret: RegretSettings,
}

// Default functions
fn default_base_price_cents() -> u64 {
    200
}
fn default_multiplier() -> f64 {
    2.0
}
fn default_max_price_cents() -> u64 {
    5000
}
fn default_product_prefix() -> String {
    "focuslock.exit".into()
}
fn default_history_cap() -> usize {
    50
}
fn default_advisory_window_days() -> u32 {
    7
}
fn default_advisory_threshold() -> usize {
    3
}
fn default_diagnostic_log_cap() -> usize {
    100
}
fn default_check_interval_secs() -> u64 {
    60
}

impl Default for PricingSettings {
    fn default() -> Self {
        Self {
            base_price_cents: default_base_price_cents(),
            multiplier: default_multiplier(),
            max_price_cents: default_max_price_cents(),
            product_prefix: default_product_prefix(),
        }
    }
}

impl Default for CommitmentSettings {
    fn default() -> Self {
        Self {
            history_cap: default_history_cap(),
            advisory_window_days: default_advisory_window_days(),
            advisory_threshold: default_advisory_threshold(),
        }
    }
}

impl Default for MonitorSettings {
    fn default() -> Self {
        Self {
            diagnostic_log_cap: default_diagnostic_log_cap(),
        }
    }
}

impl Default for RegretSettings {
    fn default() -> Self {
        Self {
            app_tokens: Vec::new(),
            category_tokens: Vec::new(),
            domains: Vec::new(),
            check_interval_secs: default_check_interval_secs(),
        }
    }
}

impl PricingSettings {
    pub fn pricing(&self) -> ExitPricing {
        ExitPricing {
            base_price_cents: self.base_price_cents,
            multiplier: self.multiplier,
            max_price_cents: self.max_price_cents,
        }
    }
}

impl RegretSettings {
    pub fn restriction_set(&self) -> RestrictionSet {
        RestrictionSet::new()
            .with_apps(self.app_tokens.iter().cloned())
            .with_categories(self.category_tokens.iter().cloned())
            .with_domains(&self.domains)
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
        let invalid = |message: String| ConfigError::InvalidValue {
            key: key.to_string(),
            message,
        };
        let mut parts = key.split('.').peekable();
        if parts.peek().is_none() || key.is_empty() {
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
                        value.parse::<bool>().map_err(|e| invalid(e.to_string()))?,
                    ),
                    serde_json::Value::Number(_) => {
                        if let Ok(n) = value.parse::<u64>() {
                            serde_json::Value::Number(n.into())
                        } else if let Ok(n) = value.parse::<f64>() {
                            serde_json::Number::from_f64(n)
                                .map(serde_json::Value::Number)
                                .ok_or_else(|| invalid(format!("cannot parse '{value}' as number")))?
                        } else {
                            return Err(invalid(format!("cannot parse '{value}' as number")));
                        }
                    }
                    serde_json::Value::Array(_) => {
                        if value.trim_start().starts_with('[') {
                            serde_json::from_str(value).map_err(|e| invalid(e.to_string()))?
                        } else {
                            serde_json::Value::Array(
                                value
                                    .split(',')
                                    .map(str::trim)
                                    .filter(|s| !s.is_empty())
                                    .map(|s| serde_json::Value::String(s.to_string()))
                                    .collect(),
                            )
                        }
                    }
                    serde_json::Value::Object(_) => {
                        serde_json::from_str(value).map_err(|e| invalid(e.to_string()))?
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

    pub fn path_in(dir: &Path) -> PathBuf {
        dir.join("config.toml")
    }

    /// Load from `<dir>/config.toml`, writing the default file if none exists.
    ///
    /// # Errors
    ///
    /// Returns an error if the config file exists but cannot be parsed or is
    /// invalid, or if the default config cannot be written to disk.
    pub fn load_from(dir: &Path) -> Result<Self, ConfigError> {
        let path = Self::path_in(dir);
        match std::fs::read_to_string(&path) {
            Ok(content) => {
                let cfg: Config = toml::from_str(&content).map_err(|e| ConfigError::LoadFailed {
                    path: path.clone(),
                    message: e.to_string(),
                })?;
                cfg.validate()?;
                Ok(cfg)
            }
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => {
                let cfg = Self::default();
                cfg.save_to(dir)?;
                Ok(cfg)
            }
            Err(e) => Err(ConfigError::LoadFailed {
                path,
                message: e.to_string(),
            }),
        }
    }

    /// Load from the data directory.
    pub fn load() -> Result<Self, ConfigError> {
        Self::load_from(&data_dir()?)
    }

    /// Load from `dir`, returning default on error.
    /// This is a convenience method that never fails.
    pub fn load_or_default(dir: &Path) -> Self {
        Self::load_from(dir).unwrap_or_else(|e| {
            tracing::warn!("using default configuration: {e}");
            Self::default()
        })
    }

    /// Persist to `<dir>/config.toml`.
    ///
    /// # Errors
    ///
    /// Returns an error if the config cannot be serialized or written to disk.
    pub fn save_to(&self, dir: &Path) -> Result<(), ConfigError> {
        let path = Self::path_in(dir);
        let save_failed = |message: String| ConfigError::SaveFailed {
            path: path.clone(),
            message,
        };
        let content = toml::to_string_pretty(self).map_err(|e| save_failed(e.to_string()))?;
        std::fs::write(&path, content).map_err(|e| save_failed(e.to_string()))?;
        Ok(())
    }

    /// Check invariants that serde cannot express.
    pub fn validate(&self) -> Result<(), ConfigError> {
        let invalid = |key: &str, message: &str| ConfigError::InvalidValue {
            key: key.to_string(),
            message: message.to_string(),
        };
        if self.pricing.base_price_cents == 0 {
            return Err(invalid("pricing.base_price_cents", "must be greater than zero"));
        }
        if !self.pricing.multiplier.is_finite() || self.pricing.multiplier < 1.0 {
            return Err(invalid("pricing.multiplier", "must be a finite number of at least 1.0"));
        }
        if self.pricing.max_price_cents < self.pricing.base_price_cents {
            return Err(invalid("pricing.max_price_cents", "must not be below the base price"));
        }
        if self.pricing.product_prefix.trim().is_empty() {
            return Err(invalid("pricing.product_prefix", "must not be empty"));
        }
        if self.commitment.history_cap == 0 {
            return Err(invalid("commitment.history_cap", "must be greater than zero"));
        }
        if self.commitment.advisory_threshold == 0 {
            return Err(invalid("commitment.advisory_threshold", "must be greater than zero"));
        }
        if self.monitor.diagnostic_log_cap == 0 || self.monitor.diagnostic_log_cap > 100 {
            return Err(invalid("monitor.diagnostic_log_cap", "must be between 1 and 100"));
        }
        if self.regret.check_interval_secs == 0 {
            return Err(invalid("regret.check_interval_secs", "must be greater than zero"));
        }
        Ok(())
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

    /// Set a config value by key. The updated config is validated but not saved.
    ///
    /// # Errors
    ///
    /// Returns an error if the key is unknown, the value cannot be parsed,
    /// or the result is invalid.
    pub fn set(&mut self, key: &str, value: &str) -> Result<(), ConfigError> {
        let mut json = serde_json::to_value(&*self).map_err(|e| ConfigError::InvalidValue {
            key: key.to_string(),
            message: e.to_string(),
        })?;
        Self::set_json_value_by_path(&mut json, key, value)?;
        let updated: Config = serde_json::from_value(json).map_err(|e| ConfigError::InvalidValue {
            key: key.to_string(),
            message: e.to_string(),
        })?;
        updated.validate()?;
        *self = updated;
        Ok(())
    }
}

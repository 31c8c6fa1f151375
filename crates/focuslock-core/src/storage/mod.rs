mod config;
pub mod database;
pub mod migrations;

pub use config::{CommitmentSettings, Config, MonitorSettings, PricingSettings, RegretSettings};
pub use database::Database;

use std::path::PathBuf;

use crate::error::ConfigError;

/// Returns the focuslock data directory.
///
/// `FOCUSLOCK_HOME` overrides the location outright. Otherwise this is
/// `~/.config/focuslock[-dev]/`, with `FOCUSLOCK_ENV=dev` selecting the
/// development directory.
///
/// # Errors
/// Returns an error if creating the directory fails.
pub fn data_dir() -> Result<PathBuf, ConfigError> {
    let dir = match std::env::var_os("FOCUSLOCK_HOME") {
        Some(home) => PathBuf::from(home),
        None => {
            let base_dir = dirs::home_dir()
                .unwrap_or_else(|| PathBuf::from("."))
                .join(".config");

            let env = std::env::var("FOCUSLOCK_ENV").unwrap_or_else(|_| "production".to_string());

            if env == "dev" {
                base_dir.join("focuslock-dev")
            } else {
                base_dir.join("focuslock")
            }
        }
    };

    std::fs::create_dir_all(&dir).map_err(|e| ConfigError::DataDir(format!("{}: {e}", dir.display())))?;
    Ok(dir)
}

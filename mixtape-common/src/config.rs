//! Configuration file discovery and data folder resolution

use crate::{Error, Result};
use serde::de::DeserializeOwned;
use serde::Deserialize;
use std::path::{Path, PathBuf};
use tracing::info;

/// Logging section shared by every service TOML file
#[derive(Debug, Clone, Deserialize, PartialEq)]
pub struct LoggingConfig {
    /// Log level or full `EnvFilter` directive (trace, debug, info, warn, error)
    #[serde(default = "default_log_level")]
    pub level: String,
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            level: default_log_level(),
        }
    }
}

fn default_log_level() -> String {
    "info".to_string()
}

/// Data folder resolution priority order:
/// 1. Command-line argument (highest priority)
/// 2. Environment variable
/// 3. TOML config value
/// 4. OS-dependent compiled default (fallback)
pub fn resolve_data_folder(
    cli_arg: Option<&Path>,
    env_var_name: &str,
    toml_value: Option<&Path>,
) -> PathBuf {
    if let Some(path) = cli_arg {
        return path.to_path_buf();
    }

    if let Ok(path) = std::env::var(env_var_name) {
        if !path.trim().is_empty() {
            return PathBuf::from(path);
        }
    }

    if let Some(path) = toml_value {
        return path.to_path_buf();
    }

    default_data_folder()
}

/// Get OS-dependent default data folder path
pub fn default_data_folder() -> PathBuf {
    if cfg!(target_os = "linux") {
        // ~/.local/share/mixtape (or /var/lib/mixtape for system-wide)
        dirs::data_local_dir()
            .map(|d| d.join("mixtape"))
            .unwrap_or_else(|| PathBuf::from("/var/lib/mixtape"))
    } else if cfg!(target_os = "macos") {
        dirs::data_dir()
            .map(|d| d.join("mixtape"))
            .unwrap_or_else(|| PathBuf::from("/Library/Application Support/mixtape"))
    } else if cfg!(target_os = "windows") {
        dirs::data_local_dir()
            .map(|d| d.join("mixtape"))
            .unwrap_or_else(|| PathBuf::from("C:\\ProgramData\\mixtape"))
    } else {
        PathBuf::from("./mixtape_data")
    }
}

/// Locate the TOML config file for a service
///
/// An explicit path wins and must exist. Otherwise the user config dir
/// (`~/.config/mixtape/<file_name>`) is tried, then `/etc/mixtape/<file_name>` on Linux.
/// Returns `Ok(None)` when no file is found; running on defaults is allowed.
pub fn find_config_file(explicit: Option<&Path>, file_name: &str) -> Result<Option<PathBuf>> {
    if let Some(path) = explicit {
        if path.exists() {
            return Ok(Some(path.to_path_buf()));
        }
        return Err(Error::Config(format!(
            "Config file not found: {}",
            path.display()
        )));
    }

    if let Some(user_config) = dirs::config_dir().map(|d| d.join("mixtape").join(file_name)) {
        if user_config.exists() {
            return Ok(Some(user_config));
        }
    }

    if cfg!(target_os = "linux") {
        let system_config = PathBuf::from("/etc/mixtape").join(file_name);
        if system_config.exists() {
            return Ok(Some(system_config));
        }
    }

    Ok(None)
}

/// Parse a TOML config file, or fall back to `T::default()` when `path` is `None`
pub fn load_toml_config<T>(path: Option<&Path>) -> Result<T>
where
    T: DeserializeOwned + Default,
{
    let Some(path) = path else {
        info!("No config file found, using built-in defaults");
        return Ok(T::default());
    };

    let content = std::fs::read_to_string(path)
        .map_err(|e| Error::Config(format!("Read {} failed: {}", path.display(), e)))?;

    let config = toml::from_str(&content)
        .map_err(|e| Error::Config(format!("Parse {} failed: {}", path.display(), e)))?;

    info!("Loaded config from {}", path.display());
    Ok(config)
}

//! Configuration file loader for beacon.
//!
//! An explicit `--config` path must exist and parse. Without one, the loader
//! tries `./beacon.toml` and then `<user config dir>/beacon/config.toml`,
//! falling back to [`BotConfig::default()`] when neither is usable.
//! Validation is left to the caller, after command-line overrides apply.

use std::fmt;
use std::path::{Path, PathBuf};

use beacon_types::config::BotConfig;
use beacon_types::error::ConfigError;

/// File name looked up in the working directory.
pub const LOCAL_CONFIG_FILE: &str = "beacon.toml";

/// Where the effective configuration came from.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ConfigSource {
    /// Path passed on the command line.
    Explicit(PathBuf),
    /// First implicit candidate that parsed.
    Discovered(PathBuf),
    /// No usable file; built-in defaults.
    Defaults,
}

impl fmt::Display for ConfigSource {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Explicit(path) | Self::Discovered(path) => write!(f, "{}", path.display()),
            Self::Defaults => f.write_str("built-in defaults"),
        }
    }
}

#[derive(Debug, Clone)]
pub struct LoadedConfig {
    pub config: BotConfig,
    pub source: ConfigSource,
}

/// Implicit lookup locations, in priority order.
pub fn search_paths() -> Vec<PathBuf> {
    let mut paths = vec![PathBuf::from(LOCAL_CONFIG_FILE)];
    if let Some(dir) = dirs::config_dir() {
        paths.push(dir.join("beacon").join("config.toml"));
    }
    paths
}

/// Load configuration using the standard lookup order.
pub async fn load_config(explicit: Option<&Path>) -> Result<LoadedConfig, ConfigError> {
    load_config_from(explicit, &search_paths()).await
}

/// Load configuration from `explicit`, or else the first usable entry of
/// `candidates`.
///
/// # Errors
///
/// Only an explicit path can fail: [`ConfigError::Read`] if it cannot be
/// read and [`ConfigError::Parse`] if it is not a valid config. Problems
/// with implicit candidates are logged and skipped.
pub async fn load_config_from(
    explicit: Option<&Path>,
    candidates: &[PathBuf],
) -> Result<LoadedConfig, ConfigError> {
    if let Some(path) = explicit {
        let content = tokio::fs::read_to_string(path)
            .await
            .map_err(|err| ConfigError::Read {
                path: path.display().to_string(),
                reason: err.to_string(),
            })?;
        let config = parse(path, &content)?;
        tracing::debug!("Loaded config from {}", path.display());
        return Ok(LoadedConfig {
            config,
            source: ConfigSource::Explicit(path.to_path_buf()),
        });
    }

    for path in candidates {
        let content = match tokio::fs::read_to_string(path).await {
            Ok(content) => content,
            Err(err) if err.kind() == std::io::ErrorKind::NotFound => {
                tracing::debug!("No config found at {}", path.display());
                continue;
            }
            Err(err) => {
                tracing::warn!("Failed to read {}: {err}, using defaults", path.display());
                break;
            }
        };

        match parse(path, &content) {
            Ok(config) => {
                tracing::debug!("Loaded config from {}", path.display());
                return Ok(LoadedConfig {
                    config,
                    source: ConfigSource::Discovered(path.clone()),
                });
            }
            Err(err) => {
                tracing::warn!("{err}, using defaults");
                break;
            }
        }
    }

    Ok(LoadedConfig {
        config: BotConfig::default(),
        source: ConfigSource::Defaults,
    })
}

fn parse(path: &Path, content: &str) -> Result<BotConfig, ConfigError> {
    toml::from_str::<BotConfig>(content).map_err(|err| ConfigError::Parse {
        path: path.display().to_string(),
        reason: err.to_string(),
    })
}

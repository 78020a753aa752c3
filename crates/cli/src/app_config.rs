//! Configuration loading
//!
//! Values come from an optional TOML file, then `CERTIFY_*` environment
//! variables, then command line overrides applied by the caller.

use anyhow::{Context, Result};
use certify_types::AccountName;
use config::{Config, Environment, File as ConfigFile};
use std::fmt;
use std::path::{Path, PathBuf};
use std::str::FromStr;

pub const DEFAULT_OWNER: &str = "certify";
const CONFIG_FILE_NAME: &str = "certify.toml";

/// Storage backend selection
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StorageBackend {
    Sled,
    Memory,
}

impl FromStr for StorageBackend {
    type Err = anyhow::Error;

    fn from_str(s: &str) -> Result<Self> {
        match s.trim().to_ascii_lowercase().as_str() {
            "sled" => Ok(Self::Sled),
            "memory" | "mem" => Ok(Self::Memory),
            other => anyhow::bail!("unknown storage backend '{other}' (expected sled or memory)"),
        }
    }
}

impl fmt::Display for StorageBackend {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Sled => f.write_str("sled"),
            Self::Memory => f.write_str("memory"),
        }
    }
}

/// Application configuration
#[derive(Debug, Clone)]
pub struct AppConfig {
    pub config_path: Option<PathBuf>,
    /// Registry owner account
    pub owner: AccountName,
    pub storage: StorageBackend,
    pub data_dir: PathBuf,
    pub log_level: String,
    pub log_format: String,
}

impl AppConfig {
    pub fn load(config_path_override: Option<&Path>) -> Result<Self> {
        let resolved_path = match config_path_override {
            Some(path) => {
                if !path.exists() {
                    anyhow::bail!(
                        "Configuration file {} not found (specified via --config)",
                        path.display()
                    );
                }
                Some(path.to_path_buf())
            }
            None => default_config_path().filter(|path| path.exists()),
        };

        let mut builder = Config::builder();
        if let Some(path) = &resolved_path {
            builder = builder.add_source(ConfigFile::from(path.as_path()));
        }
        builder = builder.add_source(Environment::with_prefix("CERTIFY"));
        let config = builder.build()?;

        Self::from_config(&config, resolved_path)
    }

    fn from_config(config: &Config, config_path: Option<PathBuf>) -> Result<Self> {
        let owner = get_string_value(config, &["owner", "registry.owner"])
            .unwrap_or_else(|| DEFAULT_OWNER.to_string());
        let owner = AccountName::new(owner).context("invalid registry owner account")?;

        let storage = get_string_value(config, &["storage", "storage.backend"])
            .map(|value| value.parse::<StorageBackend>())
            .transpose()?
            .unwrap_or(StorageBackend::Sled);

        let data_dir = get_string_value(config, &["data_dir", "storage.data_dir"])
            .map(PathBuf::from)
            .unwrap_or_else(default_data_dir);

        Ok(Self {
            config_path,
            owner,
            storage,
            data_dir,
            log_level: get_string_value(config, &["log_level", "log.level"])
                .unwrap_or_else(|| "info".to_string()),
            log_format: get_string_value(config, &["log_format", "log.format"])
                .unwrap_or_else(|| "pretty".to_string()),
        })
    }
}

fn get_string_value(config: &Config, keys: &[&str]) -> Option<String> {
    keys.iter().find_map(|key| {
        config
            .get_string(key)
            .ok()
            .map(|value| value.trim().to_string())
            .filter(|value| !value.is_empty())
    })
}

fn default_config_path() -> Option<PathBuf> {
    dirs::config_dir().map(|dir| dir.join("certify").join(CONFIG_FILE_NAME))
}

fn default_data_dir() -> PathBuf {
    dirs::data_local_dir()
        .unwrap_or_else(|| PathBuf::from("."))
        .join("certify")
}

use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use crate::audit::Retention;
use crate::error::{Result, VaultError};

#[derive(Debug, Deserialize, Serialize, Clone, PartialEq, Default)]
pub struct VaultConfig {
    #[serde(default)]
    pub storage: StorageConfig,
    #[serde(default)]
    pub audit: AuditConfig,
    #[serde(default)]
    pub log: LogConfig,
}

#[derive(Debug, Deserialize, Serialize, Clone, PartialEq)]
pub struct StorageConfig {
    #[serde(default = "default_db_path")]
    pub path: PathBuf,
    /// Skip sled entirely; nothing outlives the process.
    #[serde(default)]
    pub in_memory: bool,
}

#[derive(Debug, Deserialize, Serialize, Clone, PartialEq, Default)]
pub struct AuditConfig {
    #[serde(default)]
    pub retention: Retention,
}

#[derive(Debug, Deserialize, Serialize, Clone, PartialEq)]
pub struct LogConfig {
    #[serde(default = "default_log_level")]
    pub level: String,
}

fn default_db_path() -> PathBuf {
    PathBuf::from("./data/vault")
}

fn default_log_level() -> String {
    "info".to_string()
}

impl Default for StorageConfig {
    fn default() -> Self {
        Self {
            path: default_db_path(),
            in_memory: false,
        }
    }
}

impl Default for LogConfig {
    fn default() -> Self {
        Self {
            level: default_log_level(),
        }
    }
}

impl VaultConfig {
    pub fn from_toml(s: &str) -> Result<Self> {
        let config: Self =
            toml::from_str(s).map_err(|e| VaultError::Config(format!("parse: {}", e)))?;
        config.validate()?;
        Ok(config)
    }

    pub fn validate(&self) -> Result<()> {
        self.audit.retention.validate()?;
        if !self.storage.in_memory && self.storage.path.as_os_str().is_empty() {
            return Err(VaultError::Config("storage.path is empty".to_string()));
        }
        Ok(())
    }

    /// Read `path`, or write the defaults there if it does not exist yet.
    pub fn load_or_default(path: impl AsRef<Path>) -> Result<Self> {
        let path = path.as_ref();
        if path.exists() {
            let s = std::fs::read_to_string(path)
                .map_err(|e| VaultError::Config(format!("read {}: {}", path.display(), e)))?;
            let config = Self::from_toml(&s)?;
            eprintln!("Config loaded from {}", path.display());
            Ok(config)
        } else {
            eprintln!("Config file not found at '{}'. Creating default.", path.display());
            let config = Self::default();
            match toml::to_string_pretty(&config) {
                Ok(s) => {
                    if let Err(e) = std::fs::write(path, s) {
                        eprintln!("Could not write default config: {}", e);
                    }
                }
                Err(e) => eprintln!("Could not render default config: {}", e),
            }
            Ok(config)
        }
    }
}

//! Manager settings: where client documents live and how their services are named

use crate::{validate_proxy_name, Error, Result};
use serde::{Deserialize, Serialize};
use std::fs;
use std::path::{Path, PathBuf};

/// Current config version for migration support
pub const CONFIG_VERSION: u32 = 1;

/// Settings for the manager itself (not a tunnel document)
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct ManagerConfig {
    pub version: u32,
    /// Directory holding one document per client
    pub artifact_dir: PathBuf,
    /// Client used when none is given on the command line
    pub client_name: String,
    /// Documents are named `{artifact_prefix}_{client}.toml`
    pub artifact_prefix: String,
    /// Services are named `{unit_prefix}_{client}`
    pub unit_prefix: String,
    /// Binary used to restart services
    pub systemctl: String,
    pub restart_after_change: bool,
    /// Keep a timestamped copy of a document before each rewrite
    pub backup_before_write: bool,
}

impl Default for ManagerConfig {
    fn default() -> Self {
        Self {
            version: CONFIG_VERSION,
            artifact_dir: PathBuf::from("/root/frp"),
            client_name: "client".to_string(),
            artifact_prefix: "frpc".to_string(),
            unit_prefix: "frpc".to_string(),
            systemctl: "systemctl".to_string(),
            restart_after_change: true,
            backup_before_write: false,
        }
    }
}

impl ManagerConfig {
    /// Get the default config file path
    pub fn default_path() -> PathBuf {
        dirs::config_dir()
            .unwrap_or_else(|| PathBuf::from("~/.config"))
            .join("tunnel-config")
            .join("config.toml")
    }

    /// Load config from `path`, falling back to defaults if it does not exist
    pub fn load_or_default(path: &Path) -> Result<Self> {
        if path.exists() {
            Self::load(path)
        } else {
            log::debug!("No config at {}, using defaults", path.display());
            Ok(Self::default())
        }
    }

    /// Load config from a specific path
    pub fn load(path: &Path) -> Result<Self> {
        let content = fs::read_to_string(path)?;
        let config: Self = toml::from_str(&content)?;

        if config.version != CONFIG_VERSION {
            return Err(Error::config(format!(
                "Unsupported config version {} in {} (expected {})",
                config.version,
                path.display(),
                CONFIG_VERSION
            )));
        }

        config.validate()?;
        Ok(config)
    }

    /// Save config to a specific path
    pub fn save_to(&self, path: &Path) -> Result<()> {
        if let Some(parent) = path.parent() {
            fs::create_dir_all(parent)?;
        }
        let content = toml::to_string_pretty(self)?;
        fs::write(path, content)?;
        Ok(())
    }

    /// Validate the configuration
    pub fn validate(&self) -> Result<()> {
        validate_proxy_name(&self.client_name)
            .map_err(|_| Error::config(format!("Invalid client name '{}'", self.client_name)))?;
        if self.artifact_prefix.is_empty() {
            return Err(Error::config("artifact_prefix cannot be empty"));
        }
        if self.unit_prefix.is_empty() {
            return Err(Error::config("unit_prefix cannot be empty"));
        }
        if self.systemctl.trim().is_empty() {
            return Err(Error::config("systemctl cannot be empty"));
        }
        Ok(())
    }

    /// Document path for a client
    pub fn artifact_path(&self, client: &str) -> PathBuf {
        self.artifact_dir
            .join(format!("{}_{}.toml", self.artifact_prefix, client))
    }

    /// Service name for a client
    pub fn unit_name(&self, client: &str) -> String {
        format!("{}_{}", self.unit_prefix, client)
    }

    /// Client names that have a document in the artifact directory
    pub fn discover_clients(&self) -> Result<Vec<String>> {
        discover_clients(&self.artifact_dir, &self.artifact_prefix)
    }
}

/// Service name for a document given directly by path: its file stem
pub fn unit_for_artifact(path: &Path) -> Result<String> {
    path.file_stem()
        .and_then(|s| s.to_str())
        .filter(|s| !s.is_empty())
        .map(str::to_string)
        .ok_or_else(|| Error::validation(format!("Cannot derive a unit name from {}", path.display())))
}

/// Discover client documents named `{prefix}_{client}.toml` in `dir`
pub fn discover_clients(dir: &Path, prefix: &str) -> Result<Vec<String>> {
    if !dir.exists() {
        return Ok(Vec::new());
    }

    let marker = format!("{}_", prefix);
    let mut clients = Vec::new();
    for entry in fs::read_dir(dir)? {
        let entry = entry?;
        let path = entry.path();
        if !path.is_file() || path.extension().map(|e| e != "toml").unwrap_or(true) {
            continue;
        }
        if let Some(stem) = path.file_stem().and_then(|s| s.to_str()) {
            if let Some(client) = stem.strip_prefix(&marker) {
                if !client.is_empty() {
                    clients.push(client.to_string());
                }
            }
        }
    }
    clients.sort();
    Ok(clients)
}

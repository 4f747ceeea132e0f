//! copilotd configuration file.
//!
//! JSON, loaded once at startup. The `bbs` section is required even when BBS
//! access is turned off, so a forgotten section is caught instead of silently
//! disabling the Istio `Routes` RPC.

use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};
use thiserror::Error;

use copilot_bbs::BbsClientConfig;

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("reading config {path}: {source}")]
    Read {
        path: PathBuf,
        source: std::io::Error,
    },

    #[error("writing config {path}: {source}")]
    Write {
        path: PathBuf,
        source: std::io::Error,
    },

    #[error("parsing config: {0}")]
    Parse(#[from] serde_json::Error),

    #[error("invalid config: missing required 'bbs' field")]
    MissingBbs,

    #[error("invalid config: {0} is required")]
    Required(&'static str),
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Config {
    pub listen_address_for_pilot: String,
    pub listen_address_for_cloud_controller: String,
    pub pilot_client_ca_path: PathBuf,
    pub cloud_controller_client_ca_path: PathBuf,
    pub server_cert_path: PathBuf,
    pub server_key_path: PathBuf,
    /// `None` after loading means BBS access is disabled.
    pub bbs: Option<BbsConfig>,
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct BbsConfig {
    #[serde(default)]
    pub server_ca_cert_path: PathBuf,
    #[serde(default)]
    pub client_cert_path: PathBuf,
    #[serde(default)]
    pub client_key_path: PathBuf,
    #[serde(default)]
    pub address: String,
    #[serde(default)]
    pub client_session_cache_size: usize,
    #[serde(default)]
    pub max_idle_conns_per_host: usize,
    #[serde(default)]
    pub disable: bool,
}

impl BbsConfig {
    pub fn client_config(&self) -> BbsClientConfig {
        BbsClientConfig {
            address: self.address.clone(),
            server_ca_cert_path: self.server_ca_cert_path.clone(),
            client_cert_path: self.client_cert_path.clone(),
            client_key_path: self.client_key_path.clone(),
            client_session_cache_size: self.client_session_cache_size,
            max_idle_conns_per_host: self.max_idle_conns_per_host,
        }
    }

    fn validate(&self) -> Result<(), ConfigError> {
        require_path(&self.server_ca_cert_path, "bbs.server_ca_cert_path")?;
        require_path(&self.client_cert_path, "bbs.client_cert_path")?;
        require_path(&self.client_key_path, "bbs.client_key_path")?;
        require(&self.address, "bbs.address")
    }
}

fn require(value: &str, field: &'static str) -> Result<(), ConfigError> {
    if value.is_empty() {
        return Err(ConfigError::Required(field));
    }
    Ok(())
}

fn require_path(value: &Path, field: &'static str) -> Result<(), ConfigError> {
    if value.as_os_str().is_empty() {
        return Err(ConfigError::Required(field));
    }
    Ok(())
}

impl Config {
    pub fn load(path: &Path) -> Result<Self, ConfigError> {
        let content = std::fs::read_to_string(path).map_err(|source| ConfigError::Read {
            path: path.to_path_buf(),
            source,
        })?;
        Self::from_json(&content)
    }

    /// Parse and validate a config document.
    ///
    /// A `bbs` section with `disable: true` is dropped before validation,
    /// so its other fields may be left empty.
    pub fn from_json(content: &str) -> Result<Self, ConfigError> {
        let mut config: Config = serde_json::from_str(content)?;

        let bbs = config.bbs.take().ok_or(ConfigError::MissingBbs)?;
        if !bbs.disable {
            bbs.validate()?;
            config.bbs = Some(bbs);
        }

        require(&config.listen_address_for_pilot, "listen_address_for_pilot")?;
        require(
            &config.listen_address_for_cloud_controller,
            "listen_address_for_cloud_controller",
        )?;
        require_path(&config.pilot_client_ca_path, "pilot_client_ca_path")?;
        require_path(
            &config.cloud_controller_client_ca_path,
            "cloud_controller_client_ca_path",
        )?;
        require_path(&config.server_cert_path, "server_cert_path")?;
        require_path(&config.server_key_path, "server_key_path")?;

        Ok(config)
    }

    /// Write the config as JSON, readable only by the owner.
    pub fn save(&self, path: &Path) -> Result<(), ConfigError> {
        let json = serde_json::to_vec_pretty(self)?;
        write_private(path, &json).map_err(|source| ConfigError::Write {
            path: path.to_path_buf(),
            source,
        })
    }

    pub fn bbs_enabled(&self) -> bool {
        self.bbs.is_some()
    }
}

#[cfg(unix)]
fn write_private(path: &Path, contents: &[u8]) -> std::io::Result<()> {
    use std::io::Write;
    use std::os::unix::fs::{OpenOptionsExt, PermissionsExt};

    let mut file = std::fs::OpenOptions::new()
        .write(true)
        .create(true)
        .truncate(true)
        .mode(0o600)
        .open(path)?;
    file.set_permissions(std::fs::Permissions::from_mode(0o600))?;
    file.write_all(contents)
}

#[cfg(not(unix))]
fn write_private(path: &Path, contents: &[u8]) -> std::io::Result<()> {
    std::fs::write(path, contents)
}

//! Configuration module
//!
//! Handles loading and saving dprd-ipc configuration.

use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use thiserror::Error;

use crate::network::IpcConfig;
use crate::protocol::DEFAULT_DAEMON_SOCKET;

/// Configuration errors
#[derive(Error, Debug)]
pub enum ConfigError {
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Parse error: {0}")]
    Parse(#[from] toml::de::Error),

    #[error("Serialize error: {0}")]
    Serialize(#[from] toml::ser::Error),

    #[error("Config file not found: {0}")]
    NotFound(PathBuf),
}

pub type ConfigResult<T> = Result<T, ConfigError>;

/// Main application configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Config {
    /// General settings
    #[serde(default)]
    pub general: GeneralConfig,

    /// IPC channel settings
    #[serde(default)]
    pub ipc: IpcSection,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            general: GeneralConfig::default(),
            ipc: IpcSection::default(),
        }
    }
}

/// General configuration
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct GeneralConfig {
    /// Enable verbose logging
    #[serde(default)]
    pub verbose: bool,
    /// Log file path (optional)
    pub log_file: Option<PathBuf>,
}

/// IPC channel configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct IpcSection {
    /// Control socket of the ranging daemon
    #[serde(default = "default_daemon_socket")]
    pub daemon_socket: PathBuf,
    /// Private socket this client binds for inbound snapshots
    #[serde(default = "default_receive_socket")]
    pub receive_socket: PathBuf,
    /// Depth of the client event channel
    #[serde(default = "default_event_capacity")]
    pub event_capacity: usize,
}

fn default_daemon_socket() -> PathBuf {
    PathBuf::from(DEFAULT_DAEMON_SOCKET)
}

fn default_receive_socket() -> PathBuf {
    PathBuf::from("/tmp/dprd-ipc.sock")
}

fn default_event_capacity() -> usize {
    256
}

impl Default for IpcSection {
    fn default() -> Self {
        Self {
            daemon_socket: default_daemon_socket(),
            receive_socket: default_receive_socket(),
            event_capacity: default_event_capacity(),
        }
    }
}

impl Config {
    /// Load configuration from a file
    pub fn load(path: &Path) -> ConfigResult<Self> {
        if !path.exists() {
            return Err(ConfigError::NotFound(path.to_path_buf()));
        }

        let contents = std::fs::read_to_string(path)?;
        let config: Config = toml::from_str(&contents)?;
        Ok(config)
    }

    /// Load configuration from the default location
    pub fn load_default() -> ConfigResult<Self> {
        let config_paths = [
            dirs::config_dir().map(|p| p.join("dprd-ipc/config.toml")),
            Some(PathBuf::from("./dprd-ipc.toml")),
            Some(PathBuf::from("./config.toml")),
        ];

        for path in config_paths.iter().flatten() {
            if path.exists() {
                return Self::load(path);
            }
        }

        // Return default config if no file found
        Ok(Self::default())
    }

    /// Save configuration to a file
    pub fn save(&self, path: &Path) -> ConfigResult<()> {
        let contents = toml::to_string_pretty(self)?;

        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent)?;
        }

        std::fs::write(path, contents)?;
        Ok(())
    }

    /// Build the channel configuration for a subscription client
    pub fn ipc_config(&self) -> IpcConfig {
        IpcConfig::new(&self.ipc.daemon_socket, &self.ipc.receive_socket)
            .with_event_capacity(self.ipc.event_capacity)
    }
}

/// Generate a sample configuration file
pub fn generate_sample_config() -> String {
    let config = Config {
        general: GeneralConfig {
            verbose: false,
            log_file: None,
        },
        ipc: IpcSection {
            daemon_socket: PathBuf::from("/var/run/p2p-dprd.sock"),
            receive_socket: PathBuf::from("/var/run/dprd-ipc.sock"),
            event_capacity: default_event_capacity(),
        },
    };

    toml::to_string_pretty(&config).unwrap()
}

use super::types::*;
use crate::error_handling::types::ConfigError;
use clap::Parser;
use log::{debug, info};
use serde::{Deserialize, Serialize};
use std::net::IpAddr;
use std::path::{Path, PathBuf};

/// Command-line arguments of the `vigil` binary.
///
/// The configuration file carries every setting; the optional flags override
/// the HTTP bind address so the same file can be reused across hosts.
#[derive(Parser, Debug, Clone)]
#[command(name = "vigil")]
#[command(version)]
#[command(about = "Camera fall-detection monitoring and alerting service")]
pub struct CliArgs {
    /// Path to the TOML configuration file
    pub config_file: PathBuf,

    /// Network address the HTTP adapter binds to.
    ///
    /// # Command Line
    /// Use `--bind-address <ADDRESS>` or the `VIGIL_BIND_ADDRESS` variable
    #[arg(long, env = "VIGIL_BIND_ADDRESS")]
    pub bind_address: Option<String>,

    /// Port the HTTP adapter listens on.
    ///
    /// # Command Line
    /// Use `--port <PORT>` or the `VIGIL_PORT` variable
    #[arg(long, env = "VIGIL_PORT")]
    pub port: Option<u16>,
}

/// Application configuration loaded from a TOML file.
///
/// # Fields Overview
///
/// - `server`: bind address and port of the HTTP/WebSocket adapter
/// - `storage`: where clips, recordings and the camera list live
/// - `classifier`: location and timeout of the fall classifier
/// - `monitoring`: ring buffer, sampling, cooldown and reconnection tuning
/// - `stream`: live view transport timeouts and encoding
///
/// Every section is optional; missing values take their defaults.
#[derive(Debug, Default, PartialEq, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct Config {
    pub server: ServerConfig,
    pub storage: StorageConfig,
    pub classifier: ClassifierConfig,
    pub monitoring: MonitoringConfig,
    pub stream: StreamConfig,
}

impl Config {
    /// Reads and validates the configuration stored at `path`.
    pub fn from_file(path: &Path) -> Result<Self, ConfigError> {
        info!("Reading configuration from {}", path.display());
        let content = std::fs::read_to_string(path)?;
        let config = Self::from_toml(&content)?;
        debug!("Configuration loaded: {:?}", config);
        Ok(config)
    }

    pub fn from_toml(content: &str) -> Result<Self, ConfigError> {
        let config: Config =
            toml::from_str(content).map_err(|e| ConfigError::TomlError(e.to_string()))?;
        config.validate()?;
        Ok(config)
    }

    /// Applies command-line overrides on top of the file values.
    pub fn apply_args(&mut self, args: &CliArgs) -> Result<(), ConfigError> {
        if let Some(ref address) = args.bind_address {
            self.server.bind_address = address.clone();
        }
        if let Some(port) = args.port {
            self.server.port = port;
        }
        self.validate()
    }

    pub fn validate(&self) -> Result<(), ConfigError> {
        self.server
            .bind_address
            .parse::<IpAddr>()
            .map_err(|_| ConfigError::BadAddress(self.server.bind_address.clone()))?;

        let m = &self.monitoring;
        if m.buffer_capacity == 0 {
            return Err(ConfigError::NotInRange(
                "monitoring.buffer_capacity must be at least 1".to_string(),
            ));
        }
        if m.sample_interval == 0 {
            return Err(ConfigError::NotInRange(
                "monitoring.sample_interval must be at least 1".to_string(),
            ));
        }
        if !(0.0..1.0).contains(&m.confidence_threshold) {
            return Err(ConfigError::NotInRange(format!(
                "monitoring.confidence_threshold {} not in [0, 1)",
                m.confidence_threshold
            )));
        }
        if m.frame_width == 0 || m.frame_height == 0 {
            return Err(ConfigError::NotInRange(
                "monitoring frame size must be non-zero".to_string(),
            ));
        }
        if m.nominal_fps <= 0.0 {
            return Err(ConfigError::NotInRange(
                "monitoring.nominal_fps must be positive".to_string(),
            ));
        }
        if m.reopen_after_failures == 0 {
            return Err(ConfigError::NotInRange(
                "monitoring.reopen_after_failures must be at least 1".to_string(),
            ));
        }
        if m.connect_timeout_secs == 0 {
            return Err(ConfigError::NotInRange(
                "monitoring.connect_timeout_secs must be at least 1".to_string(),
            ));
        }
        if self.classifier.timeout_secs == 0 {
            return Err(ConfigError::NotInRange(
                "classifier.timeout_secs must be at least 1".to_string(),
            ));
        }
        if !(2..=31).contains(&self.stream.jpeg_quality) {
            return Err(ConfigError::NotInRange(format!(
                "stream.jpeg_quality {} not in 2..=31",
                self.stream.jpeg_quality
            )));
        }
        if self.stream.fps == 0 {
            return Err(ConfigError::NotInRange(
                "stream.fps must be at least 1".to_string(),
            ));
        }
        if self.stream.connect_timeout_secs == 0 {
            return Err(ConfigError::NotInRange(
                "stream.connect_timeout_secs must be at least 1".to_string(),
            ));
        }
        if self.stream.error_frame_interval_ms == 0 {
            return Err(ConfigError::NotInRange(
                "stream.error_frame_interval_ms must be at least 1".to_string(),
            ));
        }
        Ok(())
    }

    /// Creates the clip and footage directories if they are missing.
    pub fn prepare_directories(&self) -> Result<(), ConfigError> {
        for dir in [&self.storage.clips_dir, &self.storage.footage_dir] {
            std::fs::create_dir_all(dir).map_err(|e| {
                ConfigError::DirectoryDoesNotExist(format!("{}: {}", dir.display(), e))
            })?;
        }
        Ok(())
    }
}

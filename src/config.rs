//! Agent configuration.
//!
//! Values are layered with `figment`: built-in defaults, then an optional
//! YAML file, then `TRICORDER_`-prefixed environment variables (nested keys
//! separated by `__`, for example `TRICORDER_INTERFACE__DEVICE=eth0`).
//! Command line flags are applied last by the binary.

use std::{
    net::{IpAddr, Ipv4Addr},
    path::{Path, PathBuf},
    time::Duration,
};

use figment::{
    Figment,
    providers::{Env, Format, Serialized, Yaml},
};
use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::source::CaptureFilter;

/// Default memcached binary protocol port.
pub const DEFAULT_MEMCACHED_PORT: u16 = 11_210;

/// Capture backend.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Deserialize, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum CaptureType {
    /// Capture from a network interface. `pcap`, `afpacket` and `pfring` are
    /// accepted as synonyms.
    #[default]
    #[serde(alias = "pcap", alias = "afpacket", alias = "pfring")]
    Live,
    /// Replay a capture file.
    File,
}

/// Where packets come from.
#[derive(Clone, Debug, PartialEq, Eq, Deserialize, Serialize)]
#[serde(default)]
pub struct InterfaceConfig {
    /// Interface name for live capture.
    pub device: String,
    /// Capture backend.
    #[serde(alias = "capturetype")]
    pub capture_type: CaptureType,
    /// Capture file for the `file` backend.
    pub path: Option<PathBuf>,
}

impl Default for InterfaceConfig {
    fn default() -> Self {
        Self {
            device: "lo".to_owned(),
            capture_type: CaptureType::Live,
            path: None,
        }
    }
}

/// Which segments are decoded.
#[derive(Clone, Debug, PartialEq, Eq, Deserialize, Serialize)]
#[serde(default)]
pub struct FilterConfig {
    /// Keep only segments to or from this port. `None` keeps all TCP.
    pub port: Option<u16>,
}

impl Default for FilterConfig {
    fn default() -> Self {
        Self {
            port: Some(DEFAULT_MEMCACHED_PORT),
        }
    }
}

impl FilterConfig {
    /// Filter applied by the capture backends.
    #[must_use]
    pub fn capture_filter(&self) -> CaptureFilter { CaptureFilter { port: self.port } }
}

/// Complete agent configuration.
#[derive(Clone, Debug, PartialEq, Eq, Deserialize, Serialize)]
#[serde(default)]
pub struct AgentConfig {
    /// Address the control listener binds to.
    pub listen_address: IpAddr,
    /// Port the control listener binds to.
    pub port: u16,
    /// Packet source.
    pub interface: InterfaceConfig,
    /// Segment filter.
    pub filter: FilterConfig,
    /// Label echoed in harvest reports so the coordinator can tell agents
    /// apart.
    pub mode: String,
    /// Log level for the binary's subscriber.
    pub log_level: String,
    /// Packets buffered between a capture thread and the session worker.
    pub channel_capacity: usize,
    /// Largest frame read from a live interface.
    pub snaplen: usize,
    /// Live capture poll interval in milliseconds.
    pub read_timeout_ms: u64,
    /// Port for the Prometheus exporter; disabled when unset.
    pub metrics_port: Option<u16>,
}

impl Default for AgentConfig {
    fn default() -> Self {
        Self {
            listen_address: IpAddr::V4(Ipv4Addr::UNSPECIFIED),
            port: 9876,
            interface: InterfaceConfig::default(),
            filter: FilterConfig::default(),
            mode: "latency".to_owned(),
            log_level: "info".to_owned(),
            channel_capacity: 4096,
            snaplen: 65_535,
            read_timeout_ms: 100,
            metrics_port: None,
        }
    }
}

impl AgentConfig {
    /// Load defaults, then `path` if given, then the environment.
    ///
    /// # Errors
    ///
    /// Returns [`ConfigError`] if the file is missing, is not YAML, or a value
    /// fails to deserialise.
    pub fn load(path: Option<&Path>) -> Result<Self, ConfigError> {
        let mut figment = Figment::new().merge(Serialized::defaults(AgentConfig::default()));
        if let Some(path) = path {
            validate_config_path(path)?;
            figment = figment.merge(Yaml::file(path));
        }
        figment = figment.merge(Env::prefixed("TRICORDER_").split("__"));
        Ok(figment.extract()?)
    }

    /// Live capture poll interval.
    #[must_use]
    pub fn read_timeout(&self) -> Duration { Duration::from_millis(self.read_timeout_ms) }
}

fn validate_config_path(path: &Path) -> Result<(), ConfigError> {
    if !path.is_file() {
        if path.exists() {
            return Err(ConfigError::NotAFile(path.to_path_buf()));
        }
        return Err(ConfigError::NotFound(path.to_path_buf()));
    }
    match path.extension().and_then(|ext| ext.to_str()) {
        Some("yaml" | "yml") => Ok(()),
        Some(ext) => Err(ConfigError::InvalidExtension(ext.to_owned())),
        None => Err(ConfigError::InvalidExtension("none".to_owned())),
    }
}

/// Failures while loading configuration.
#[derive(Debug, Error)]
pub enum ConfigError {
    /// The configuration file does not exist.
    #[error("config file not found: {}", .0.display())]
    NotFound(PathBuf),
    /// The path exists but is not a regular file.
    #[error("config path is not a file: {}", .0.display())]
    NotAFile(PathBuf),
    /// The file is not YAML.
    #[error("invalid config file extension '.{0}', expected 'yaml' or 'yml'")]
    InvalidExtension(String),
    /// A value failed to deserialise.
    #[error("configuration error: {0}")]
    Extraction(#[from] Box<figment::Error>),
}

impl From<figment::Error> for ConfigError {
    fn from(error: figment::Error) -> Self { Self::Extraction(Box::new(error)) }
}

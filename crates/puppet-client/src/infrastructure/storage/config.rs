//! TOML-based configuration for the plugin.
//!
//! The file is optional.  Every key has a default, and a missing file yields
//! the all-defaults configuration:
//!
//! ```toml
//! [network]
//! server_address = "127.0.0.1"
//! server_port = 11001
//! reconnect_interval_ms = 1000
//! handoff_timeout_ms = 5000
//! buffer_capacity = 4096
//!
//! [automation]
//! auto_accept_file = true
//! auto_accept_authorization_request = true
//!
//! [host]
//! tick_interval_ms = 100
//! log_level = "info"
//! ```
//!
//! # Serde default values
//!
//! Fields annotated with `#[serde(default = "some_fn")]` use the return value
//! of `some_fn()` when the key is absent, and `#[serde(default)]` on a section
//! fills in the whole section when its header is missing.

use std::path::{Path, PathBuf};
use std::time::Duration;

use puppet_core::protocol::codec::{DEFAULT_CAPACITY, HEADER_SIZE};
use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::application::notify_events::AutomationPolicy;
use crate::infrastructure::handoff::DEFAULT_HANDOFF_TIMEOUT;
use crate::infrastructure::network::ConnectionConfig;

/// Default file name looked up in the working directory.
pub const DEFAULT_CONFIG_FILE: &str = "puppet.toml";

/// Error type for configuration file operations.
#[derive(Debug, Error)]
pub enum ConfigError {
    /// A file system I/O error occurred.
    #[error("I/O error accessing config at {path}: {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    /// The TOML content could not be parsed.
    #[error("failed to parse config TOML: {0}")]
    Parse(#[from] toml::de::Error),

    /// A value parsed but cannot be used.
    #[error("invalid config value for {key}: {reason}")]
    Invalid { key: &'static str, reason: String },
}

// ── Config schema types ───────────────────────────────────────────────────────

/// Top-level plugin configuration.
#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq)]
pub struct PuppetConfig {
    #[serde(default)]
    pub network: NetworkConfig,
    #[serde(default)]
    pub automation: AutomationConfig,
    #[serde(default)]
    pub host: HostConfig,
}

/// Where the agent listens and how the link behaves.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct NetworkConfig {
    /// Host name or IP address of the agent.
    #[serde(default = "default_server_address")]
    pub server_address: String,
    /// TCP port of the agent.
    #[serde(default = "default_server_port")]
    pub server_port: u16,
    /// Wait between connection attempts, in milliseconds.
    #[serde(default = "default_reconnect_interval_ms")]
    pub reconnect_interval_ms: u64,
    /// Longest wait for the host loop to run a request, in milliseconds.
    #[serde(default = "default_handoff_timeout_ms")]
    pub handoff_timeout_ms: u64,
    /// Maximum encoded message size in bytes.
    #[serde(default = "default_buffer_capacity")]
    pub buffer_capacity: usize,
}

/// Automatic answers to requests from remote users.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct AutomationConfig {
    #[serde(default = "default_true")]
    pub auto_accept_file: bool,
    #[serde(default = "default_true")]
    pub auto_accept_authorization_request: bool,
}

/// Host loop settings.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct HostConfig {
    /// Interval between host loop ticks, in milliseconds.
    #[serde(default = "default_tick_interval_ms")]
    pub tick_interval_ms: u64,
    /// `tracing` log level used when `RUST_LOG` is unset.
    #[serde(default = "default_log_level")]
    pub log_level: String,
}

// ── Default helpers ───────────────────────────────────────────────────────────

fn default_server_address() -> String {
    "127.0.0.1".to_string()
}
fn default_server_port() -> u16 {
    11001
}
fn default_reconnect_interval_ms() -> u64 {
    1000
}
fn default_handoff_timeout_ms() -> u64 {
    DEFAULT_HANDOFF_TIMEOUT.as_millis() as u64
}
fn default_buffer_capacity() -> usize {
    DEFAULT_CAPACITY
}
fn default_true() -> bool {
    true
}
fn default_tick_interval_ms() -> u64 {
    100
}
fn default_log_level() -> String {
    "info".to_string()
}

impl Default for NetworkConfig {
    fn default() -> Self {
        Self {
            server_address: default_server_address(),
            server_port: default_server_port(),
            reconnect_interval_ms: default_reconnect_interval_ms(),
            handoff_timeout_ms: default_handoff_timeout_ms(),
            buffer_capacity: default_buffer_capacity(),
        }
    }
}

impl Default for AutomationConfig {
    fn default() -> Self {
        Self {
            auto_accept_file: default_true(),
            auto_accept_authorization_request: default_true(),
        }
    }
}

impl Default for HostConfig {
    fn default() -> Self {
        Self {
            tick_interval_ms: default_tick_interval_ms(),
            log_level: default_log_level(),
        }
    }
}

// ── Conversions ───────────────────────────────────────────────────────────────

impl PuppetConfig {
    /// Rejects values the runtime cannot work with.
    ///
    /// # Errors
    ///
    /// Returns [`ConfigError::Invalid`] naming the offending key.
    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.network.server_port == 0 {
            return Err(ConfigError::Invalid {
                key: "network.server_port",
                reason: "port 0 cannot be connected to".into(),
            });
        }
        if self.network.reconnect_interval_ms == 0 {
            return Err(ConfigError::Invalid {
                key: "network.reconnect_interval_ms",
                reason: "must be greater than zero".into(),
            });
        }
        if self.network.handoff_timeout_ms == 0 {
            return Err(ConfigError::Invalid {
                key: "network.handoff_timeout_ms",
                reason: "must be greater than zero".into(),
            });
        }
        if self.network.buffer_capacity < HEADER_SIZE {
            return Err(ConfigError::Invalid {
                key: "network.buffer_capacity",
                reason: format!("must be at least {HEADER_SIZE} bytes"),
            });
        }
        // The length field on the wire is a u32.
        if u32::try_from(self.network.buffer_capacity).is_err() {
            return Err(ConfigError::Invalid {
                key: "network.buffer_capacity",
                reason: format!("must not exceed {} bytes", u32::MAX),
            });
        }
        if self.host.tick_interval_ms == 0 {
            return Err(ConfigError::Invalid {
                key: "host.tick_interval_ms",
                reason: "must be greater than zero".into(),
            });
        }
        Ok(())
    }

    pub fn connection(&self) -> ConnectionConfig {
        ConnectionConfig {
            server_address: self.network.server_address.clone(),
            server_port: self.network.server_port,
            reconnect_interval: Duration::from_millis(self.network.reconnect_interval_ms),
            buffer_capacity: self.network.buffer_capacity,
        }
    }

    pub fn automation_policy(&self) -> AutomationPolicy {
        AutomationPolicy {
            auto_accept_file: self.automation.auto_accept_file,
            auto_accept_authorization_request: self.automation.auto_accept_authorization_request,
        }
    }

    pub fn handoff_timeout(&self) -> Duration {
        Duration::from_millis(self.network.handoff_timeout_ms)
    }

    pub fn tick_interval(&self) -> Duration {
        Duration::from_millis(self.host.tick_interval_ms)
    }
}

// ── Loading ───────────────────────────────────────────────────────────────────

/// Loads and validates the config at `path`, returning defaults if the file
/// does not exist.
///
/// # Errors
///
/// Returns [`ConfigError::Io`] for file-system errors other than "not found",
/// [`ConfigError::Parse`] if the TOML is malformed, and
/// [`ConfigError::Invalid`] for unusable values.
pub fn load_config(path: &Path) -> Result<PuppetConfig, ConfigError> {
    let cfg = match std::fs::read_to_string(path) {
        Ok(content) => toml::from_str(&content)?,
        Err(e) if e.kind() == std::io::ErrorKind::NotFound => PuppetConfig::default(),
        Err(e) => {
            return Err(ConfigError::Io {
                path: path.to_path_buf(),
                source: e,
            })
        }
    };
    cfg.validate()?;
    Ok(cfg)
}

// ── Tests ─────────────────────────────────────────────────────────────────────

//! # Runtime Configuration
//!
//! Loaded from a TOML file, then overridden from the environment.
//!
//! ## Sources (later wins)
//!
//! 1. Built-in defaults
//! 2. TOML file at `ANDON_CONFIG` (default `andon.toml`; missing file is fine
//!    unless `ANDON_CONFIG` names it explicitly)
//! 3. `ANDON_HOST`, `ANDON_PORT`, `ANDON_MAX_CONNECTIONS`, `ANDON_RATE_LIMIT`,
//!    `ANDON_LINES`

use andon_relay::{ConfigError, RelayConfig};
use serde::{Deserialize, Serialize};
use std::net::SocketAddr;
use std::path::{Path, PathBuf};
use thiserror::Error;

const DEFAULT_CONFIG_PATH: &str = "andon.toml";

/// Runtime configuration errors.
#[derive(Debug, Error)]
pub enum RuntimeConfigError {
    #[error("Failed to read {path}: {source}")]
    Read {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("Failed to parse {path}: {source}")]
    Parse {
        path: PathBuf,
        #[source]
        source: toml::de::Error,
    },

    #[error("Invalid value for {var}: {value}")]
    InvalidEnv { var: &'static str, value: String },

    #[error("Invalid bind address {0}")]
    InvalidAddress(String),

    #[error(transparent)]
    Relay(#[from] ConfigError),
}

/// Complete runtime configuration.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct RuntimeConfig {
    /// HTTP/WebSocket listener
    pub server: ServerConfig,
    /// Known production lines. Empty means every line is accepted.
    pub lines: Vec<String>,
    /// Relay core configuration
    pub relay: RelayConfig,
}

/// Listener configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct ServerConfig {
    pub host: String,
    pub port: u16,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            host: "0.0.0.0".to_string(),
            port: 8080,
        }
    }
}

impl RuntimeConfig {
    /// Load from `ANDON_CONFIG` (or `andon.toml`) plus environment overrides.
    pub fn load() -> Result<Self, RuntimeConfigError> {
        let (path, explicit) = match std::env::var("ANDON_CONFIG") {
            Ok(path) => (PathBuf::from(path), true),
            Err(_) => (PathBuf::from(DEFAULT_CONFIG_PATH), false),
        };

        let mut config = if path.exists() || explicit {
            Self::from_file(&path)?
        } else {
            Self::default()
        };
        config.apply_env(|var| std::env::var(var).ok())?;
        Ok(config)
    }

    /// Parse a TOML file.
    pub fn from_file(path: &Path) -> Result<Self, RuntimeConfigError> {
        let text = std::fs::read_to_string(path).map_err(|source| RuntimeConfigError::Read {
            path: path.to_path_buf(),
            source,
        })?;
        Self::from_toml(&text).map_err(|source| RuntimeConfigError::Parse {
            path: path.to_path_buf(),
            source,
        })
    }

    pub fn from_toml(text: &str) -> Result<Self, toml::de::Error> {
        toml::from_str(text)
    }

    /// Apply overrides from a variable lookup.
    pub fn apply_env<F>(&mut self, lookup: F) -> Result<(), RuntimeConfigError>
    where
        F: Fn(&str) -> Option<String>,
    {
        if let Some(host) = lookup("ANDON_HOST") {
            self.server.host = host;
        }
        if let Some(port) = lookup("ANDON_PORT") {
            self.server.port = parse_env("ANDON_PORT", port)?;
        }
        if let Some(max) = lookup("ANDON_MAX_CONNECTIONS") {
            self.relay.connections.max_connections = parse_env("ANDON_MAX_CONNECTIONS", max)?;
        }
        if let Some(limit) = lookup("ANDON_RATE_LIMIT") {
            // 0 turns the limiter off
            let max_messages: u32 = parse_env("ANDON_RATE_LIMIT", limit)?;
            self.relay.rate_limit.enabled = max_messages > 0;
            if max_messages > 0 {
                self.relay.rate_limit.max_messages = max_messages;
            }
        }
        if let Some(lines) = lookup("ANDON_LINES") {
            self.lines = lines
                .split(',')
                .map(str::trim)
                .filter(|line| !line.is_empty())
                .map(str::to_string)
                .collect();
        }
        Ok(())
    }

    /// Validate the relay section and the bind address.
    pub fn validate(&self) -> Result<(), RuntimeConfigError> {
        self.relay.validate()?;
        self.bind_addr()?;
        Ok(())
    }

    pub fn bind_addr(&self) -> Result<SocketAddr, RuntimeConfigError> {
        let addr = format!("{}:{}", self.server.host, self.server.port);
        addr.parse()
            .map_err(|_| RuntimeConfigError::InvalidAddress(addr))
    }
}

fn parse_env<T: std::str::FromStr>(var: &'static str, value: String) -> Result<T, RuntimeConfigError> {
    value
        .trim()
        .parse()
        .map_err(|_| RuntimeConfigError::InvalidEnv { var, value })
}

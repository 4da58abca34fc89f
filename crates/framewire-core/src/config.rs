//! Configuration system for framewire servers and clients.
//!
//! Resolution order: environment variables → config file → defaults.
//!
//! Config file location:
//!   1. $FRAMEWIRE_CONFIG (explicit override)
//!   2. $XDG_CONFIG_HOME/framewire/config.toml
//!   3. ~/.config/framewire/config.toml

use serde::{Deserialize, Serialize};
use std::path::PathBuf;

use crate::wire::{DEFAULT_CHUNK_SIZE, MIN_CHUNK_SIZE};

/// Top-level server configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct ServerConfig {
    pub listen: ListenConfig,
    pub protocol: ProtocolConfig,
    pub liveness: LivenessConfig,
}

/// Which IP stacks the listener binds.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum StackMode {
    /// Plain IPv4.
    V4,
    /// IPv6 socket accepting IPv4-mapped peers as well.
    Dual,
    /// IPv6 only (V6ONLY set).
    V6Only,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct ListenConfig {
    /// Bind address. Interpreted per `stack`.
    pub address: String,
    pub port: u16,
    /// Listen backlog passed to the OS.
    pub backlog: u32,
    /// Set SO_REUSEPORT in addition to SO_REUSEADDR.
    pub reuse_port: bool,
    pub stack: StackMode,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct ProtocolConfig {
    /// Chunk size the server dictates (or proposes, see `enforce_chunks`).
    pub chunk_size: u64,
    /// When false the server advertises `"sc"` and adopts the client's
    /// suggested chunk size.
    pub enforce_chunks: bool,
    /// zstd level 1-22. 0 disables compression entirely.
    pub compression_level: i32,
    /// Parse a PROXY v1/v2 preamble on accepted connections.
    pub allow_proxy: bool,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct LivenessConfig {
    /// Seconds between liveness pings to each session.
    pub ping_interval_secs: u64,
}

/// Client-side knobs. Small on purpose: everything else is dictated by the
/// server during handshake.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct ClientConfig {
    /// Chunk size suggested when the server advertises `"sc"`.
    pub chunk_size: u64,
}

// ── Defaults ─────────────────────────────────────────────────────────────────

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            listen: ListenConfig::default(),
            protocol: ProtocolConfig::default(),
            liveness: LivenessConfig::default(),
        }
    }
}

impl Default for ListenConfig {
    fn default() -> Self {
        Self {
            address: "127.0.0.1".to_string(),
            port: 3001,
            backlog: 128,
            reuse_port: false,
            stack: StackMode::V4,
        }
    }
}

impl Default for ProtocolConfig {
    fn default() -> Self {
        Self {
            chunk_size: DEFAULT_CHUNK_SIZE,
            enforce_chunks: true,
            compression_level: 3,
            allow_proxy: false,
        }
    }
}

impl Default for LivenessConfig {
    fn default() -> Self {
        Self {
            ping_interval_secs: 30,
        }
    }
}

impl Default for ClientConfig {
    fn default() -> Self {
        Self {
            chunk_size: DEFAULT_CHUNK_SIZE,
        }
    }
}

// ── Path helpers ─────────────────────────────────────────────────────────────

fn config_dir() -> PathBuf {
    std::env::var("XDG_CONFIG_HOME")
        .map(PathBuf::from)
        .unwrap_or_else(|_| home_or_tmp().join(".config"))
        .join("framewire")
}

fn home_or_tmp() -> PathBuf {
    std::env::var("HOME")
        .map(PathBuf::from)
        .unwrap_or_else(|_| PathBuf::from("/tmp"))
}

// ── Errors ───────────────────────────────────────────────────────────────────

#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    #[error("failed to read {0}: {1}")]
    ReadFailed(PathBuf, std::io::Error),
    #[error("failed to parse {0}: {1}")]
    ParseFailed(PathBuf, toml::de::Error),
    #[error("failed to write {0}: {1}")]
    WriteFailed(PathBuf, std::io::Error),
    #[error("failed to serialize: {0}")]
    SerializeFailed(toml::ser::Error),
    #[error("chunk_size {0} is below the protocol minimum {MIN_CHUNK_SIZE}")]
    ChunkTooSmall(u64),
}

// ── Loading ──────────────────────────────────────────────────────────────────

impl ServerConfig {
    /// Load config: env vars → file → defaults.
    pub fn load() -> Result<Self, ConfigError> {
        let path = Self::file_path();
        let mut config = if path.exists() {
            let text = std::fs::read_to_string(&path)
                .map_err(|e| ConfigError::ReadFailed(path.clone(), e))?;
            toml::from_str(&text).map_err(|e| ConfigError::ParseFailed(path.clone(), e))?
        } else {
            ServerConfig::default()
        };
        config.apply_env_overrides();
        config.validate()?;
        Ok(config)
    }

    /// Config file path.
    pub fn file_path() -> PathBuf {
        std::env::var("FRAMEWIRE_CONFIG")
            .map(PathBuf::from)
            .unwrap_or_else(|_| config_dir().join("config.toml"))
    }

    /// Write default config if none exists. Returns the path.
    pub fn write_default_if_missing() -> Result<PathBuf, ConfigError> {
        let path = Self::file_path();
        if !path.exists() {
            if let Some(parent) = path.parent() {
                std::fs::create_dir_all(parent)
                    .map_err(|e| ConfigError::WriteFailed(path.clone(), e))?;
            }
            let text = toml::to_string_pretty(&ServerConfig::default())
                .map_err(ConfigError::SerializeFailed)?;
            std::fs::write(&path, text).map_err(|e| ConfigError::WriteFailed(path.clone(), e))?;
        }
        Ok(path)
    }

    /// The protocol floor: a chunk must hold at least one frame header.
    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.protocol.chunk_size < MIN_CHUNK_SIZE {
            return Err(ConfigError::ChunkTooSmall(self.protocol.chunk_size));
        }
        Ok(())
    }

    /// Apply FRAMEWIRE_* env var overrides.
    fn apply_env_overrides(&mut self) {
        if let Ok(v) = std::env::var("FRAMEWIRE_LISTEN__ADDRESS") {
            self.listen.address = v;
        }
        if let Ok(v) = std::env::var("FRAMEWIRE_LISTEN__PORT") {
            if let Ok(p) = v.parse() {
                self.listen.port = p;
            }
        }
        if let Ok(v) = std::env::var("FRAMEWIRE_PROTOCOL__CHUNK_SIZE") {
            if let Ok(n) = v.parse() {
                self.protocol.chunk_size = n;
            }
        }
        if let Ok(v) = std::env::var("FRAMEWIRE_PROTOCOL__COMPRESSION_LEVEL") {
            if let Ok(n) = v.parse() {
                self.protocol.compression_level = n;
            }
        }
        if let Ok(v) = std::env::var("FRAMEWIRE_PROTOCOL__ALLOW_PROXY") {
            self.protocol.allow_proxy = v == "true" || v == "1";
        }
        if let Ok(v) = std::env::var("FRAMEWIRE_LIVENESS__PING_INTERVAL_SECS") {
            if let Ok(n) = v.parse() {
                self.liveness.ping_interval_secs = n;
            }
        }
    }
}

use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};

use crate::tracker::SessionSettings;
use crate::tracker::framer::DEFAULT_MAX_BUFFER_BYTES;

/// Environment variable naming the config file
pub const CONFIG_ENV_VAR: &str = "GATEWAY_CONFIG";

/// Smallest accepted frame buffer; must hold a full position report with room to spare
const MIN_BUFFER_BYTES: usize = 256;

/// Gateway configuration file (TOML)
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct GatewayConfig {
    /// Interface both listeners bind to
    pub bind_address: String,
    /// Port devices connect to
    pub tcp_port: u16,
    /// Port for status, health, test and metrics routes
    pub http_port: u16,
    /// Cap on bytes held for an unterminated frame before it is evicted
    pub max_buffer_bytes: usize,
    /// Size of each socket read
    pub read_buffer_bytes: usize,
    /// Chunks queued between a connection's reader and its session loop
    pub chunk_queue_capacity: usize,
}

impl Default for GatewayConfig {
    fn default() -> Self {
        Self {
            bind_address: "0.0.0.0".to_string(),
            tcp_port: 8888,
            http_port: 3000,
            max_buffer_bytes: DEFAULT_MAX_BUFFER_BYTES,
            read_buffer_bytes: 2048,
            chunk_queue_capacity: 64,
        }
    }
}

impl GatewayConfig {
    /// Load config from a TOML file; missing keys take their defaults
    pub fn load(path: &Path) -> Result<Self> {
        let contents =
            std::fs::read_to_string(path).with_context(|| format!("Failed to read {:?}", path))?;
        let config: GatewayConfig =
            toml::from_str(&contents).with_context(|| format!("Failed to parse {:?}", path))?;
        config.validate()?;
        Ok(config)
    }

    /// Load from the resolved config path, or use defaults when there is none
    pub fn load_or_default(explicit: Option<&Path>) -> Result<Self> {
        match resolve_config_path(explicit) {
            Some(path) => Self::load(&path),
            None => Ok(Self::default()),
        }
    }

    pub fn validate(&self) -> Result<()> {
        if self.max_buffer_bytes < MIN_BUFFER_BYTES {
            anyhow::bail!(
                "max_buffer_bytes must be at least {}, got {}",
                MIN_BUFFER_BYTES,
                self.max_buffer_bytes
            );
        }
        if self.read_buffer_bytes == 0 {
            anyhow::bail!("read_buffer_bytes must be greater than zero");
        }
        if self.chunk_queue_capacity == 0 {
            anyhow::bail!("chunk_queue_capacity must be greater than zero");
        }
        Ok(())
    }

    pub fn tcp_addr(&self) -> String {
        format!("{}:{}", self.bind_address, self.tcp_port)
    }

    pub fn http_addr(&self) -> String {
        format!("{}:{}", self.bind_address, self.http_port)
    }

    pub fn session_settings(&self) -> SessionSettings {
        SessionSettings {
            max_buffer_bytes: self.max_buffer_bytes,
            read_buffer_bytes: self.read_buffer_bytes,
            chunk_queue_capacity: self.chunk_queue_capacity,
        }
    }
}

/// Resolve the config file path.
///
/// Priority:
/// 1. Explicit path (from `--config`)
/// 2. `GATEWAY_CONFIG` env var
/// 3. None (built-in defaults)
pub fn resolve_config_path(explicit: Option<&Path>) -> Option<PathBuf> {
    if let Some(path) = explicit {
        return Some(path.to_path_buf());
    }
    std::env::var(CONFIG_ENV_VAR)
        .ok()
        .filter(|p| !p.trim().is_empty())
        .map(PathBuf::from)
}

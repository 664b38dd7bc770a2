use std::path::{Path, PathBuf};
use std::time::Duration;

use anyhow::{bail, Context};
use serde::Deserialize;

use crate::http::parser::ParseLimits;

/// Environment variable naming a YAML config file.
pub const CONFIG_ENV: &str = "TRELLIS_CONFIG";
/// Environment variable overriding the bind address.
pub const LISTEN_ENV: &str = "LISTEN";

#[derive(Debug, Clone, PartialEq, Deserialize)]
#[serde(default)]
pub struct Config {
    pub listen_addr: String,
    /// Budget for routing, middleware and the handler of one request
    pub compute_timeout_ms: u64,
    /// How long a single read from the client may block
    pub read_timeout_ms: u64,
    pub core_pool_size: usize,
    pub max_pool_size: usize,
    pub backlog: usize,
    pub max_requests_per_connection: usize,
    pub compress_threshold: usize,
    pub body_buffer_size: usize,
    pub chunk_size: usize,
    pub max_uri_length: usize,
    pub max_header_bytes: usize,
    pub max_body_size: usize,
    pub static_dir: Option<PathBuf>,
    /// `host:port` of a TLS endpoint plain requests are redirected to
    pub upgrade_insecure: Option<String>,
    pub server_name: String,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            listen_addr: "127.0.0.1:8080".to_string(),
            compute_timeout_ms: 5_000,
            read_timeout_ms: 10_000,
            core_pool_size: 10,
            max_pool_size: 20,
            backlog: 10,
            max_requests_per_connection: 100,
            compress_threshold: 32 * 1024,
            body_buffer_size: 1024 * 1024,
            chunk_size: 64 * 1024,
            max_uri_length: 2083,
            max_header_bytes: 16 * 1024,
            max_body_size: 8 * 1024 * 1024,
            static_dir: None,
            upgrade_insecure: None,
            server_name: "Trellis/0.1".to_string(),
        }
    }
}

impl Config {
    /// Builds the config from the environment.
    ///
    /// Reads the YAML file named by `TRELLIS_CONFIG` when it is set, then lets
    /// `LISTEN` override the bind address.
    pub fn load() -> anyhow::Result<Self> {
        let mut cfg = match std::env::var(CONFIG_ENV) {
            Ok(path) => Self::from_file(&path)?,
            Err(_) => Self::default(),
        };

        if let Ok(addr) = std::env::var(LISTEN_ENV) {
            cfg.listen_addr = addr;
        }

        cfg.validate()?;
        Ok(cfg)
    }

    pub fn from_file(path: impl AsRef<Path>) -> anyhow::Result<Self> {
        let path = path.as_ref();
        let raw = std::fs::read_to_string(path)
            .with_context(|| format!("reading config file {}", path.display()))?;
        Self::from_yaml_str(&raw).with_context(|| format!("parsing config file {}", path.display()))
    }

    pub fn from_yaml_str(raw: &str) -> anyhow::Result<Self> {
        let cfg: Self = serde_yaml::from_str(raw)?;
        cfg.validate()?;
        Ok(cfg)
    }

    pub fn validate(&self) -> anyhow::Result<()> {
        if self.core_pool_size == 0 || self.max_pool_size == 0 {
            bail!("pool sizes must be greater than zero");
        }
        if self.core_pool_size > self.max_pool_size {
            bail!(
                "core_pool_size ({}) exceeds max_pool_size ({})",
                self.core_pool_size,
                self.max_pool_size
            );
        }
        if self.compute_timeout_ms == 0 || self.read_timeout_ms == 0 {
            bail!("timeouts must be greater than zero");
        }
        if self.max_requests_per_connection == 0 {
            bail!("max_requests_per_connection must be greater than zero");
        }
        Ok(())
    }

    pub fn compute_timeout(&self) -> Duration {
        Duration::from_millis(self.compute_timeout_ms)
    }

    pub fn read_timeout(&self) -> Duration {
        Duration::from_millis(self.read_timeout_ms)
    }

    pub fn parse_limits(&self) -> ParseLimits {
        ParseLimits {
            max_uri_length: self.max_uri_length,
            max_header_bytes: self.max_header_bytes,
            max_body_size: self.max_body_size,
            read_timeout: self.read_timeout(),
        }
    }
}

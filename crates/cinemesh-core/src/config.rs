//! Configuration for the coordinator and worker binaries.
//!
//! Resolution order: environment variables → config file → defaults.
//!
//! Config file location:
//!   1. $CINEMESH_CONFIG (explicit override)
//!   2. ./cinemesh.toml
//!
//! The worker reads only `COORDINATOR_ADDR` — its remaining knobs are
//! compile-time constants.

use std::path::{Path, PathBuf};
use std::time::Duration;

use serde::{Deserialize, Serialize};

/// Coordinator configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct CoordinatorConfig {
    /// TCP listen address for worker connections.
    pub listen_addr: String,
    /// HTTP listen address for the query API.
    pub http_addr: String,
    /// MovieLens-style ratings CSV.
    pub ratings_path: PathBuf,
    pub dispatch: DispatchSettings,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct DispatchSettings {
    /// How long one assignment may wait for its RESULT.
    pub result_timeout_secs: u64,
    /// Neighbors requested per block.
    pub k: usize,
}

impl Default for CoordinatorConfig {
    fn default() -> Self {
        Self {
            listen_addr: "0.0.0.0:9090".to_string(),
            http_addr: "127.0.0.1:8080".to_string(),
            ratings_path: PathBuf::from("dataset/ml-latest-small/ratings.csv"),
            dispatch: DispatchSettings::default(),
        }
    }
}

impl Default for DispatchSettings {
    fn default() -> Self {
        Self {
            result_timeout_secs: 90,
            k: 30,
        }
    }
}

impl DispatchSettings {
    pub fn result_timeout(&self) -> Duration {
        Duration::from_secs(self.result_timeout_secs)
    }
}

impl CoordinatorConfig {
    /// Load config: env vars → file → defaults.
    pub fn load() -> Result<Self, ConfigError> {
        let mut config = Self::load_file(&Self::file_path())?;
        config.apply_env_overrides();
        Ok(config)
    }

    /// Config file path.
    pub fn file_path() -> PathBuf {
        std::env::var("CINEMESH_CONFIG")
            .map(PathBuf::from)
            .unwrap_or_else(|_| PathBuf::from("cinemesh.toml"))
    }

    fn load_file(path: &Path) -> Result<Self, ConfigError> {
        if !path.exists() {
            return Ok(Self::default());
        }
        let text = std::fs::read_to_string(path)
            .map_err(|e| ConfigError::ReadFailed(path.to_path_buf(), e))?;
        toml::from_str(&text).map_err(|e| ConfigError::ParseFailed(path.to_path_buf(), e))
    }

    /// Apply the environment overrides the deployment scripts set.
    fn apply_env_overrides(&mut self) {
        if let Ok(v) = std::env::var("WORKER_TCP_ADDR") {
            self.listen_addr = v;
        }
        if let Ok(v) = std::env::var("HTTP_ADDR") {
            self.http_addr = v;
        }
        if let Ok(v) = std::env::var("RATINGS_DATA_PATH") {
            self.ratings_path = PathBuf::from(v);
        }
        if let Ok(v) = std::env::var("DISPATCHER_RESULT_TIMEOUT") {
            match parse_duration(&v) {
                Some(d) => self.dispatch.result_timeout_secs = d.as_secs().max(1),
                None => tracing::warn!(
                    value = %v,
                    "invalid DISPATCHER_RESULT_TIMEOUT, keeping {}s",
                    self.dispatch.result_timeout_secs
                ),
            }
        }
    }
}

/// Worker configuration. Heartbeat interval and handshake deadline are
/// compile-time defaults in the client.
#[derive(Debug, Clone)]
pub struct WorkerConfig {
    /// Coordinator dial target.
    pub coordinator_addr: String,
}

impl Default for WorkerConfig {
    fn default() -> Self {
        Self {
            coordinator_addr: "127.0.0.1:9090".to_string(),
        }
    }
}

impl WorkerConfig {
    pub fn from_env() -> Self {
        let mut config = Self::default();
        if let Ok(v) = std::env::var("COORDINATOR_ADDR") {
            config.coordinator_addr = v;
        }
        config
    }
}

/// Parse a duration given either as bare seconds (`"90"`) or with a unit
/// suffix (`"90s"`, `"500ms"`, `"2m"`, `"1h"`).
pub fn parse_duration(value: &str) -> Option<Duration> {
    let value = value.trim();
    if value.is_empty() {
        return None;
    }
    if let Ok(secs) = value.parse::<u64>() {
        return Some(Duration::from_secs(secs));
    }

    let (number, unit) = value.split_at(value.find(|c: char| c.is_ascii_alphabetic())?);
    let number: f64 = number.parse().ok()?;
    if !number.is_finite() || number < 0.0 {
        return None;
    }
    let millis = match unit {
        "ms" => number,
        "s" => number * 1_000.0,
        "m" => number * 60_000.0,
        "h" => number * 3_600_000.0,
        _ => return None,
    };
    Some(Duration::from_millis(millis as u64))
}

// ── Errors ────────────────────────────────────────────────────────────────────

#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    #[error("failed to read {0}: {1}")]
    ReadFailed(PathBuf, std::io::Error),
    #[error("failed to parse {0}: {1}")]
    ParseFailed(PathBuf, toml::de::Error),
}

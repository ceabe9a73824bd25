use std::env;
use std::fs;
use std::path::PathBuf;
use std::time::Duration;

use serde::{Deserialize, Serialize};

use crate::error::{Result, TracegraphError};

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct Config {
    pub db_path: PathBuf,
    pub ingest_http_addr: String,
    pub query_tcp_addr: String,
    pub query_http_addr: String,
    pub uds_path: PathBuf,
    pub query_timeout: Duration,
    pub rpm_bucket: Duration,
    pub latency_bins: usize,
    pub max_batch_size: usize,
    /// Upper bound on an ingest body after content decoding.
    pub max_body_bytes: usize,
}

impl Default for Config {
    fn default() -> Self {
        let home = env::var("HOME").unwrap_or_else(|_| ".".to_string());
        let xdg_runtime = env::var("XDG_RUNTIME_DIR").ok();
        let data_home = env::var("XDG_DATA_HOME").ok();

        let data_root = data_home
            .map(PathBuf::from)
            .unwrap_or_else(|| PathBuf::from(home).join(".local/share"));

        let uds_path = xdg_runtime
            .map(PathBuf::from)
            .unwrap_or_else(|| data_root.join("tracegraph"))
            .join("tracegraph.sock");

        Self {
            db_path: data_root.join("tracegraph/tracegraph.duckdb"),
            ingest_http_addr: "127.0.0.1:4000".to_string(),
            query_tcp_addr: "127.0.0.1:4001".to_string(),
            query_http_addr: "127.0.0.1:4002".to_string(),
            uds_path,
            query_timeout: Duration::from_secs(10),
            rpm_bucket: Duration::from_secs(60),
            latency_bins: 30,
            max_batch_size: 5000,
            max_body_bytes: 64 * 1024 * 1024,
        }
    }
}

impl Config {
    pub fn load() -> Result<Self> {
        let mut cfg = Self::default();
        let config_path = config_file_path();
        if let Some(file_overrides) = load_file_overrides(&config_path)? {
            apply_overrides(&mut cfg, file_overrides, "config file")?;
        }
        let env_overrides = load_env_overrides()?;
        apply_overrides(&mut cfg, env_overrides, "environment")?;
        cfg.validate()?;
        Ok(cfg)
    }

    pub fn validate(&self) -> Result<()> {
        if self.query_timeout.is_zero() {
            return Err(TracegraphError::Config(
                "query_timeout must be greater than zero".to_string(),
            ));
        }
        if self.rpm_bucket < Duration::from_secs(1) {
            return Err(TracegraphError::Config(
                "rpm_bucket must be at least one second".to_string(),
            ));
        }
        if self.latency_bins == 0 {
            return Err(TracegraphError::Config(
                "latency_bins must be greater than zero".to_string(),
            ));
        }
        if self.max_batch_size == 0 {
            return Err(TracegraphError::Config(
                "max_batch_size must be greater than zero".to_string(),
            ));
        }
        if self.max_body_bytes == 0 {
            return Err(TracegraphError::Config(
                "max_body_bytes must be greater than zero".to_string(),
            ));
        }
        Ok(())
    }
}

#[derive(Debug, Default, Deserialize)]
struct ConfigOverrides {
    db_path: Option<PathBuf>,
    ingest_http_addr: Option<String>,
    query_tcp_addr: Option<String>,
    query_http_addr: Option<String>,
    uds_path: Option<PathBuf>,
    query_timeout: Option<String>,
    rpm_bucket: Option<String>,
    latency_bins: Option<usize>,
    max_batch_size: Option<usize>,
    max_body_bytes: Option<usize>,
}

fn config_file_path() -> PathBuf {
    if let Ok(path) = env::var("TRACEGRAPH_CONFIG") {
        return PathBuf::from(path);
    }

    let home = env::var("HOME").unwrap_or_else(|_| ".".to_string());
    let config_home = env::var("XDG_CONFIG_HOME")
        .map(PathBuf::from)
        .unwrap_or_else(|_| PathBuf::from(home).join(".config"));
    config_home.join("tracegraph/config.toml")
}

fn load_file_overrides(path: &PathBuf) -> Result<Option<ConfigOverrides>> {
    if !path.exists() {
        return Ok(None);
    }

    let raw = fs::read_to_string(path)
        .map_err(|e| TracegraphError::Config(format!("failed reading {}: {e}", path.display())))?;
    let parsed: ConfigOverrides = toml::from_str(&raw)
        .map_err(|e| TracegraphError::Config(format!("failed parsing {}: {e}", path.display())))?;
    Ok(Some(parsed))
}

fn env_usize(name: &str) -> Result<Option<usize>> {
    match env::var(name) {
        Ok(v) => v
            .parse::<usize>()
            .map(Some)
            .map_err(|e| TracegraphError::Config(format!("bad {name} in environment: {e}"))),
        Err(_) => Ok(None),
    }
}

fn load_env_overrides() -> Result<ConfigOverrides> {
    Ok(ConfigOverrides {
        db_path: env::var("TRACEGRAPH_DB_PATH").ok().map(PathBuf::from),
        ingest_http_addr: env::var("TRACEGRAPH_INGEST_HTTP_ADDR").ok(),
        query_tcp_addr: env::var("TRACEGRAPH_QUERY_TCP_ADDR").ok(),
        query_http_addr: env::var("TRACEGRAPH_QUERY_HTTP_ADDR").ok(),
        uds_path: env::var("TRACEGRAPH_QUERY_UDS_PATH").ok().map(PathBuf::from),
        query_timeout: env::var("TRACEGRAPH_QUERY_TIMEOUT").ok(),
        rpm_bucket: env::var("TRACEGRAPH_RPM_BUCKET").ok(),
        latency_bins: env_usize("TRACEGRAPH_LATENCY_BINS")?,
        max_batch_size: env_usize("TRACEGRAPH_MAX_BATCH_SIZE")?,
        max_body_bytes: env_usize("TRACEGRAPH_MAX_BODY_BYTES")?,
    })
}

fn apply_overrides(cfg: &mut Config, overrides: ConfigOverrides, source: &str) -> Result<()> {
    if let Some(v) = overrides.db_path {
        cfg.db_path = v;
    }
    if let Some(v) = overrides.ingest_http_addr {
        cfg.ingest_http_addr = v;
    }
    if let Some(v) = overrides.query_tcp_addr {
        cfg.query_tcp_addr = v;
    }
    if let Some(v) = overrides.query_http_addr {
        cfg.query_http_addr = v;
    }
    if let Some(v) = overrides.uds_path {
        cfg.uds_path = v;
    }
    if let Some(v) = overrides.query_timeout {
        cfg.query_timeout = humantime::parse_duration(&v).map_err(|e| {
            TracegraphError::Config(format!("bad query_timeout in {source}: {e} (value={v})"))
        })?;
    }
    if let Some(v) = overrides.rpm_bucket {
        cfg.rpm_bucket = humantime::parse_duration(&v).map_err(|e| {
            TracegraphError::Config(format!("bad rpm_bucket in {source}: {e} (value={v})"))
        })?;
    }
    if let Some(v) = overrides.latency_bins {
        cfg.latency_bins = v;
    }
    if let Some(v) = overrides.max_batch_size {
        cfg.max_batch_size = v;
    }
    if let Some(v) = overrides.max_body_bytes {
        cfg.max_body_bytes = v;
    }
    Ok(())
}

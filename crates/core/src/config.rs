use std::env;
use std::fs;
use std::path::{Path, PathBuf};
use std::time::Duration;

use serde::{Deserialize, Serialize};

use crate::error::{PerflogError, Result};
use crate::metric::MetricDefinition;
use crate::time::parse_duration_str;

pub const DEFAULT_API_BASE: &str = "https://api.newrelic.com";

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct Config {
    pub api_key: String,
    pub account: String,
    pub api_base: String,
    pub proxy_host: Option<String>,
    pub proxy_port: Option<u16>,
    pub ca_cert_path: Option<PathBuf>,
    pub request_timeout: Duration,
    pub interval_mins: u32,
    pub metrics: Vec<MetricDefinition>,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            api_key: String::new(),
            account: String::new(),
            api_base: DEFAULT_API_BASE.to_string(),
            proxy_host: None,
            proxy_port: None,
            ca_cert_path: None,
            request_timeout: Duration::from_secs(30),
            interval_mins: 30,
            metrics: Vec::new(),
        }
    }
}

impl Config {
    /// Defaults, then the config file, then `PERFLOG_*` environment variables.
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

    pub fn from_toml_str(raw: &str) -> Result<Self> {
        let overrides: ConfigOverrides = toml::from_str(raw)
            .map_err(|e| PerflogError::Config(format!("failed parsing config: {e}")))?;
        let mut cfg = Self::default();
        apply_overrides(&mut cfg, overrides, "config")?;
        cfg.validate()?;
        Ok(cfg)
    }

    pub fn validate(&self) -> Result<()> {
        if self.api_key.trim().is_empty() {
            return Err(PerflogError::Config(
                "api_key is not set (use api_key, api_key_file or PERFLOG_API_KEY)".to_string(),
            ));
        }
        if self.account.trim().is_empty() {
            return Err(PerflogError::Config("account is not set".to_string()));
        }
        if self.interval_mins == 0 {
            return Err(PerflogError::Config(
                "interval_mins must be at least 1".to_string(),
            ));
        }
        if self.proxy_host.is_some() != self.proxy_port.is_some() {
            return Err(PerflogError::Config(
                "proxy_host and proxy_port must be set together".to_string(),
            ));
        }
        for metric in &self.metrics {
            metric.validate()?;
        }
        Ok(())
    }

    /// `http://host:port` when a proxy is configured.
    pub fn proxy_url(&self) -> Option<String> {
        match (&self.proxy_host, self.proxy_port) {
            (Some(host), Some(port)) => Some(format!("http://{host}:{port}")),
            _ => None,
        }
    }
}

#[derive(Debug, Default, Deserialize)]
#[serde(deny_unknown_fields)]
struct ConfigOverrides {
    api_key: Option<String>,
    api_key_file: Option<PathBuf>,
    account: Option<String>,
    api_base: Option<String>,
    proxy_host: Option<String>,
    proxy_port: Option<u16>,
    ca_cert_path: Option<PathBuf>,
    request_timeout: Option<String>,
    interval_mins: Option<u32>,
    metrics: Option<Vec<MetricDefinition>>,
}

fn config_file_path() -> PathBuf {
    if let Ok(path) = env::var("PERFLOG_CONFIG") {
        return PathBuf::from(path);
    }

    let home = env::var("HOME").unwrap_or_else(|_| ".".to_string());
    let config_home = env::var("XDG_CONFIG_HOME")
        .map(PathBuf::from)
        .unwrap_or_else(|_| PathBuf::from(home).join(".config"));
    config_home.join("perflog/config.toml")
}

fn load_file_overrides(path: &Path) -> Result<Option<ConfigOverrides>> {
    if !path.exists() {
        return Ok(None);
    }

    let raw = fs::read_to_string(path)
        .map_err(|e| PerflogError::Config(format!("failed reading {}: {e}", path.display())))?;
    let mut parsed: ConfigOverrides = toml::from_str(&raw)
        .map_err(|e| PerflogError::Config(format!("failed parsing {}: {e}", path.display())))?;

    // Relative paths in the file are relative to the file itself.
    if let Some(dir) = path.parent() {
        for p in [&mut parsed.api_key_file, &mut parsed.ca_cert_path]
            .into_iter()
            .flatten()
        {
            if p.is_relative() {
                *p = dir.join(&*p);
            }
        }
    }
    Ok(Some(parsed))
}

fn load_env_overrides() -> Result<ConfigOverrides> {
    Ok(ConfigOverrides {
        api_key: env::var("PERFLOG_API_KEY").ok(),
        api_key_file: None,
        account: env::var("PERFLOG_ACCOUNT").ok(),
        api_base: env::var("PERFLOG_API_BASE").ok(),
        proxy_host: env::var("PERFLOG_PROXY_HOST").ok(),
        proxy_port: parse_env_number("PERFLOG_PROXY_PORT")?,
        ca_cert_path: None,
        request_timeout: env::var("PERFLOG_REQUEST_TIMEOUT").ok(),
        interval_mins: parse_env_number("PERFLOG_INTERVAL_MINS")?,
        metrics: None,
    })
}

fn parse_env_number<T>(key: &str) -> Result<Option<T>>
where
    T: std::str::FromStr,
    T::Err: std::fmt::Display,
{
    match env::var(key) {
        Ok(v) => v
            .trim()
            .parse::<T>()
            .map(Some)
            .map_err(|e| PerflogError::Config(format!("bad {key} in environment: {e}"))),
        Err(_) => Ok(None),
    }
}

fn apply_overrides(cfg: &mut Config, overrides: ConfigOverrides, source: &str) -> Result<()> {
    if let Some(path) = overrides.api_key_file {
        cfg.api_key = read_api_key_file(&path)?;
    }
    if let Some(v) = overrides.api_key {
        cfg.api_key = v;
    }
    if let Some(v) = overrides.account {
        cfg.account = v;
    }
    if let Some(v) = overrides.api_base {
        cfg.api_base = v.trim_end_matches('/').to_string();
    }
    if let Some(v) = overrides.proxy_host {
        cfg.proxy_host = Some(v);
    }
    if let Some(v) = overrides.proxy_port {
        cfg.proxy_port = Some(v);
    }
    if let Some(v) = overrides.ca_cert_path {
        cfg.ca_cert_path = Some(v);
    }
    if let Some(v) = overrides.request_timeout {
        cfg.request_timeout = parse_duration_str(&v).map_err(|e| {
            PerflogError::Config(format!("bad request_timeout in {source}: {e} (value={v})"))
        })?;
    }
    if let Some(v) = overrides.interval_mins {
        cfg.interval_mins = v;
    }
    if let Some(v) = overrides.metrics {
        cfg.metrics = v;
    }
    Ok(())
}

fn read_api_key_file(path: &Path) -> Result<String> {
    let raw = fs::read_to_string(path).map_err(|e| {
        PerflogError::Config(format!("failed reading api key file {}: {e}", path.display()))
    })?;
    Ok(raw.trim().to_string())
}

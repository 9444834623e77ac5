use std::env;
use std::fs;
use std::path::{Path, PathBuf};
use std::str::FromStr;
use std::time::Duration;

use anyhow::{Context, Result};
use petsflow_entitlements::PackageLimits;

/// Where tenant records and subscriptions live.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum BackendKind {
    Sqlite,
    Rest,
}

impl FromStr for BackendKind {
    type Err = anyhow::Error;

    fn from_str(s: &str) -> Result<Self> {
        match s.to_ascii_lowercase().as_str() {
            "sqlite" => Ok(BackendKind::Sqlite),
            "rest" => Ok(BackendKind::Rest),
            other => anyhow::bail!("unsupported backend '{other}', expected sqlite or rest"),
        }
    }
}

#[derive(Debug, Clone)]
pub struct LimitsServiceConfig {
    pub server_host: String,
    pub server_port: u16,
    pub data_dir: PathBuf,
    pub backend: BackendKind,
    pub backend_url: Option<String>,
    pub backend_api_key: Option<String>,
    pub backend_timeout_secs: u64,
    pub request_timeout_secs: u64,
    pub trial_limits: PackageLimits,
    pub log_level: String,
}

impl Default for LimitsServiceConfig {
    fn default() -> Self {
        Self {
            server_host: "127.0.0.1".to_string(),
            server_port: 8190,
            data_dir: PathBuf::from("data/limits"),
            backend: BackendKind::Sqlite,
            backend_url: None,
            backend_api_key: None,
            backend_timeout_secs: 5,
            request_timeout_secs: 30,
            trial_limits: PackageLimits::trial(),
            log_level: "info".to_string(),
        }
    }
}

impl LimitsServiceConfig {
    pub fn from_env() -> Result<Self> {
        let mut cfg = Self::default();

        if let Ok(host) = env::var("LIMITS_HOST") {
            cfg.server_host = host;
        }
        if let Ok(port) = env::var("LIMITS_PORT") {
            cfg.server_port = port.parse().context("LIMITS_PORT must be a valid u16")?;
        }
        if let Ok(dir) = env::var("LIMITS_DATA_DIR") {
            cfg.data_dir = PathBuf::from(dir);
        }
        if let Ok(backend) = env::var("LIMITS_BACKEND") {
            cfg.backend = backend.parse()?;
        }
        if let Ok(url) = env::var("BACKEND_URL") {
            cfg.backend_url = Some(url);
        }
        if let Ok(key) = env::var("BACKEND_API_KEY") {
            cfg.backend_api_key = Some(key);
        }
        if let Ok(timeout) = env::var("BACKEND_TIMEOUT_SECS") {
            cfg.backend_timeout_secs = timeout
                .parse()
                .context("BACKEND_TIMEOUT_SECS must be a positive integer")?;
        }
        if let Ok(timeout) = env::var("REQUEST_TIMEOUT_SECS") {
            cfg.request_timeout_secs = timeout
                .parse()
                .context("REQUEST_TIMEOUT_SECS must be a positive integer")?;
        }
        if let Ok(name) = env::var("TRIAL_PACKAGE_NAME") {
            cfg.trial_limits.package_name = name;
        }
        if let Some(max) = parse_limit("TRIAL_MAX_CLIENTS")? {
            cfg.trial_limits.max_clients = max;
        }
        if let Some(max) = parse_limit("TRIAL_MAX_PETS")? {
            cfg.trial_limits.max_pets = max;
        }
        if let Some(max) = parse_limit("TRIAL_MAX_SERVICES")? {
            cfg.trial_limits.max_services = max;
        }
        if let Some(max) = parse_limit("TRIAL_MAX_SPECIALIZATIONS")? {
            cfg.trial_limits.max_specializations = max;
        }
        if let Ok(level) = env::var("LOG_LEVEL") {
            cfg.log_level = level;
        }

        cfg.validate()?;
        Ok(cfg)
    }

    pub fn validate(&self) -> Result<()> {
        if self.trial_limits.package_name.trim().is_empty() {
            anyhow::bail!("TRIAL_PACKAGE_NAME cannot be empty");
        }
        if self.backend_timeout_secs == 0 {
            anyhow::bail!("BACKEND_TIMEOUT_SECS must be greater than zero");
        }
        if self.request_timeout_secs == 0 {
            anyhow::bail!("REQUEST_TIMEOUT_SECS must be greater than zero");
        }

        match self.backend {
            BackendKind::Sqlite => ensure_directory(&self.data_dir)?,
            BackendKind::Rest => {
                let url = self
                    .backend_url
                    .as_deref()
                    .filter(|url| !url.trim().is_empty())
                    .context("BACKEND_URL is required when LIMITS_BACKEND=rest")?;
                if !(url.starts_with("http://") || url.starts_with("https://")) {
                    anyhow::bail!("BACKEND_URL must be an http(s) URL: {url}");
                }
                if self.backend_api_key.as_deref().map_or(true, str::is_empty) {
                    anyhow::bail!("BACKEND_API_KEY is required when LIMITS_BACKEND=rest");
                }
            }
        }

        Ok(())
    }

    pub fn backend_timeout(&self) -> Duration {
        Duration::from_secs(self.backend_timeout_secs)
    }

    pub fn request_timeout(&self) -> Duration {
        Duration::from_secs(self.request_timeout_secs)
    }

    pub fn listen_addr(&self) -> String {
        format!("{}:{}", self.server_host, self.server_port)
    }
}

fn parse_limit(var: &str) -> Result<Option<u64>> {
    match env::var(var) {
        Ok(value) => value
            .parse()
            .map(Some)
            .with_context(|| format!("{var} must be a non-negative integer")),
        Err(_) => Ok(None),
    }
}

fn ensure_directory(path: &Path) -> Result<()> {
    if path.exists() {
        if !path.is_dir() {
            anyhow::bail!("{} exists but is not a directory", path.display());
        }
    } else {
        fs::create_dir_all(path)
            .with_context(|| format!("unable to create data directory {}", path.display()))?;
    }
    Ok(())
}

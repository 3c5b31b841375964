use crate::Result;
use crate::cas::DIR_PLACEHOLDER;
use camino::{Utf8Path, Utf8PathBuf};
use core::time::Duration;
use ohno::{EnrichableExt, IntoAppError, bail};
use serde::{Deserialize, Serialize};
use std::fs;
use std::io;
use std::path::PathBuf;

/// The default configuration TOML content, embedded from `default_config.toml`
pub const DEFAULT_CONFIG_TOML: &str = include_str!("../../default_config.toml");

/// Configuration file looked up in the working directory when `--config` is not given.
pub const CONFIG_FILE_NAME: &str = "harvest.toml";

#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(deny_unknown_fields)]
pub struct Config {
    /// Root of the stage files and downloaded content
    pub data_dir: PathBuf,

    /// Cache root; the platform cache directory when absent
    #[serde(default)]
    pub cache_dir: Option<PathBuf>,

    /// Default star threshold for search
    pub min_stars: u64,

    /// Concurrent records per enrichment stage
    pub workers: usize,

    #[serde(with = "humantime_serde")]
    pub http_cache_ttl: Duration,

    #[serde(with = "humantime_serde")]
    pub refs_cache_ttl: Duration,

    #[serde(with = "humantime_serde")]
    pub request_timeout: Duration,

    pub max_retries: u32,

    #[serde(with = "humantime_serde")]
    pub git_timeout: Duration,

    /// Rate-limit waits longer than this open the circuit breaker
    #[serde(with = "humantime_serde")]
    pub max_rate_limit_wait: Duration,

    pub low_water_mark: u64,

    #[serde(with = "humantime_serde")]
    pub core_min_interval: Duration,

    #[serde(with = "humantime_serde")]
    pub search_min_interval: Duration,

    pub api_base_url: String,
    pub raw_base_url: String,
    pub git_base_url: String,

    /// Argv template for the SBOM generator; `{dir}` is replaced with the manifest directory
    pub sbom_command: Vec<String>,

    #[serde(with = "humantime_serde")]
    pub sbom_timeout: Duration,

    pub export_batch_size: usize,
}

impl Config {
    /// Load configuration from `config_path`, or from `harvest.toml` in `base_dir` if present,
    /// or else the embedded defaults.
    ///
    /// Values missing from a file fall back to the defaults.
    pub fn load(base_dir: &Utf8Path, config_path: Option<&Utf8PathBuf>) -> Result<Self> {
        let (final_path, text) = if let Some(path) = config_path {
            let text = fs::read_to_string(path).into_app_err_with(|| format!("reading configuration file '{path}'"))?;
            (path.clone(), text)
        } else {
            let path = base_dir.join(CONFIG_FILE_NAME);
            match fs::read_to_string(&path) {
                Ok(text) => (path, text),
                Err(e) if e.kind() == io::ErrorKind::NotFound => return Ok(Self::default()),
                Err(e) => return Err(e).into_app_err_with(|| format!("reading configuration file '{path}'")),
            }
        };

        let config = Self::parse(&text).map_err(|e| e.enrich_with(|| format!("loading configuration file '{final_path}'")))?;
        config.validate()?;
        Ok(config)
    }

    /// Parse `text` layered over the embedded defaults.
    fn parse(text: &str) -> Result<Self> {
        let mut merged: toml::Table = toml::from_str(DEFAULT_CONFIG_TOML).into_app_err("parsing default configuration")?;
        let overrides: toml::Table = toml::from_str(text).into_app_err("parsing configuration")?;
        merged.extend(overrides);
        toml::Value::Table(merged).try_into::<Self>().into_app_err("interpreting configuration")
    }

    /// Validate configuration values
    pub fn validate(&self) -> Result<()> {
        if self.workers == 0 {
            bail!("workers must be at least 1");
        }
        if self.core_min_interval.is_zero() || self.search_min_interval.is_zero() {
            bail!("core_min_interval and search_min_interval must be greater than zero");
        }
        if self.max_rate_limit_wait.is_zero() {
            bail!("max_rate_limit_wait must be greater than zero");
        }
        if self.request_timeout.is_zero() || self.git_timeout.is_zero() || self.sbom_timeout.is_zero() {
            bail!("timeouts must be greater than zero");
        }
        if self.export_batch_size == 0 {
            bail!("export_batch_size must be at least 1");
        }
        if self.sbom_command.is_empty() {
            bail!("sbom_command must name a program");
        }
        if !self.sbom_command.iter().any(|arg| arg.contains(DIR_PLACEHOLDER)) {
            bail!("sbom_command must reference the manifest directory as '{DIR_PLACEHOLDER}'");
        }
        for (name, url) in [
            ("api_base_url", &self.api_base_url),
            ("raw_base_url", &self.raw_base_url),
            ("git_base_url", &self.git_base_url),
        ] {
            let _ = url::Url::parse(url).into_app_err_with(|| format!("{name} '{url}' is not a valid URL"))?;
        }
        Ok(())
    }
}

impl Default for Config {
    fn default() -> Self {
        toml::from_str(DEFAULT_CONFIG_TOML).expect("default_config.toml should be valid TOML that deserializes to Config")
    }
}

//! Settings, logging, and component wiring shared by every command.

use super::config::Config;
use crate::Result;
use crate::cache::Cache;
use crate::cas::ContentCache;
use crate::gateway::{ApiGateway, GatewayConfig, HttpClient, RateLimitInfo, RetryPolicy};
use crate::git::{BloblessFetch, LsRemote, RefResolver, TreeResolver};
use crate::model::Language;
use camino::Utf8PathBuf;
use chrono::Utc;
use clap::{Args, ValueEnum};
use directories::BaseDirs;
use ohno::{IntoAppError, bail};
use reqwest::{Method, StatusCode};
use std::path::PathBuf;
use std::sync::Arc;
use strum::IntoEnumIterator;
use url::Url;

const LOG_TARGET: &str = "   session";

/// Log level for diagnostic output
#[derive(Debug, Clone, Copy, PartialEq, Eq, ValueEnum)]
pub enum LogLevel {
    /// No logging output
    None,

    /// Only error messages
    Error,

    /// Warning and error messages
    Warn,

    /// Info, warning, and error messages
    Info,

    /// Debug, info, warning, and error messages
    Debug,

    /// Trace, debug, info, warning, and error messages
    Trace,
}

/// Arguments shared by every command
#[derive(Args, Debug)]
pub struct CommonArgs {
    /// GitHub personal access token
    #[arg(long, value_name = "TOKEN", env = "GITHUB_TOKEN", hide_env_values = true)]
    pub github_token: Option<String>,

    /// Path to configuration file (default is `harvest.toml`)
    #[arg(long, short = 'c', value_name = "PATH")]
    pub config: Option<Utf8PathBuf>,

    /// Directory holding stage files, overriding the configuration
    #[arg(long, value_name = "PATH")]
    pub data_dir: Option<Utf8PathBuf>,

    /// Directory where API responses and git listings are cached
    #[arg(long, value_name = "PATH")]
    pub cache_dir: Option<Utf8PathBuf>,

    /// Set the logging level for diagnostic output
    #[arg(long, value_name = "LEVEL", default_value = "none", global = true)]
    pub log_level: LogLevel,

    /// Ignore cached data and fetch everything fresh
    #[arg(long)]
    pub ignore_cached: bool,
}

/// The languages a command covers: one if given, all otherwise.
pub fn languages(language: Option<Language>) -> Vec<Language> {
    language.map_or_else(|| Language::iter().collect(), |l| vec![l])
}

/// Hint printed after a failure when no token was supplied.
pub const TOKEN_HINT: &str = "hint: no GitHub token was supplied; unauthenticated clients get a small fraction of the API quota. \
Set GITHUB_TOKEN or pass --github-token.";

/// Everything a command needs, built once from its arguments.
#[derive(Debug)]
pub struct Session {
    pub config: Config,
    pub data_dir: PathBuf,
    pub cache_dir: PathBuf,
    token: Option<String>,
    ignore_cached: bool,
}

impl Session {
    pub fn new(args: &CommonArgs) -> Result<Self> {
        init_logging(args.log_level);

        let config = Config::load(&Utf8PathBuf::from("."), args.config.as_ref())?;

        let data_dir = args
            .data_dir
            .as_ref()
            .map_or_else(|| config.data_dir.clone(), |p| p.as_std_path().to_path_buf());

        let cache_dir = if let Some(path) = &args.cache_dir {
            path.as_std_path().to_path_buf()
        } else if let Some(path) = &config.cache_dir {
            path.clone()
        } else {
            BaseDirs::new()
                .into_app_err("could not determine cache directory")?
                .cache_dir()
                .join("repo-harvest")
        };

        std::fs::create_dir_all(&cache_dir).into_app_err_with(|| format!("creating cache directory '{}'", cache_dir.display()))?;
        log::debug!(target: LOG_TARGET, "Data in '{}', cache in '{}'", data_dir.display(), cache_dir.display());

        Ok(Self {
            config,
            data_dir,
            cache_dir,
            token: args.github_token.clone().filter(|t| !t.trim().is_empty()),
            ignore_cached: args.ignore_cached,
        })
    }

    #[must_use]
    pub const fn has_token(&self) -> bool {
        self.token.is_some()
    }

    fn retry_policy(&self) -> RetryPolicy {
        RetryPolicy {
            max_retries: self.config.max_retries,
            ..RetryPolicy::default()
        }
    }

    pub fn http(&self) -> Result<HttpClient> {
        HttpClient::new(self.token.as_deref(), self.config.request_timeout, self.retry_policy())
    }

    /// Client for the raw content host, which must not receive the API token.
    pub fn raw_http(&self) -> Result<HttpClient> {
        HttpClient::new(None, self.config.request_timeout, self.retry_policy())
    }

    pub fn gateway(&self) -> Result<Arc<ApiGateway>> {
        let cache = Cache::new(&self.cache_dir, self.config.http_cache_ttl, Utc::now(), self.ignore_cached);
        let config = GatewayConfig {
            base_url: self.config.api_base_url.trim_end_matches('/').to_string(),
            core_min_interval: self.config.core_min_interval,
            search_min_interval: self.config.search_min_interval,
            low_water_mark: self.config.low_water_mark,
            max_rate_limit_wait: self.config.max_rate_limit_wait,
        };
        Ok(Arc::new(ApiGateway::new(self.http()?, cache, config)))
    }

    fn git_base_url(&self) -> Result<Url> {
        Url::parse(&self.config.git_base_url).into_app_err_with(|| format!("invalid git_base_url '{}'", self.config.git_base_url))
    }

    pub fn ref_resolver(&self) -> Result<Arc<RefResolver<LsRemote>>> {
        let lister = LsRemote::new(self.git_base_url()?, self.token.clone(), self.config.git_timeout);
        let cache = Cache::new(&self.cache_dir, self.config.refs_cache_ttl, Utc::now(), self.ignore_cached);
        Ok(Arc::new(RefResolver::new(lister, cache)))
    }

    pub fn tree_resolver(&self) -> Result<Arc<TreeResolver<BloblessFetch>>> {
        let lister = BloblessFetch::new(self.git_base_url()?, self.token.clone(), self.config.git_timeout);
        let cache = if self.ignore_cached {
            Cache::new(&self.cache_dir, core::time::Duration::ZERO, Utc::now(), true)
        } else {
            Cache::immutable(&self.cache_dir, Utc::now())
        };
        Ok(Arc::new(TreeResolver::new(lister, cache)))
    }

    #[must_use]
    pub fn content_cache(&self) -> ContentCache {
        ContentCache::new(self.cache_dir.join("cas"))
    }

    /// Check that the API answers and accepts the token before any work starts.
    pub async fn preflight(&self) -> Result<()> {
        let url = format!("{}/rate_limit", self.config.api_base_url.trim_end_matches('/'));
        let response = match self.http()?.send(Method::GET, &url, &[]).await {
            Ok(response) => response,
            Err(e) => bail!(
                "could not reach the GitHub API at '{}': {e:#}\nhint: check network access, or set api_base_url in {}",
                self.config.api_base_url,
                super::config::CONFIG_FILE_NAME
            ),
        };

        match response.status() {
            StatusCode::UNAUTHORIZED => bail!("the GitHub API rejected the supplied token\nhint: check that GITHUB_TOKEN is valid and not expired"),
            status if !status.is_success() => log::warn!(target: LOG_TARGET, "Quota check returned {status}; continuing"),
            _ => {}
        }

        if let Some(info) = RateLimitInfo::from_headers(response.headers()) {
            log::info!(
                target: LOG_TARGET,
                "{} core request(s) remaining, resetting in {}s",
                info.remaining,
                info.until_reset(Utc::now()).as_secs()
            );
        }
        if self.token.is_none() {
            log::warn!(target: LOG_TARGET, "No GitHub token supplied; running with the unauthenticated quota");
        }
        Ok(())
    }
}

/// Initialize logger based on log level
fn init_logging(log_level: LogLevel) {
    let level = match log_level {
        LogLevel::None => return,
        LogLevel::Error => "error",
        LogLevel::Warn => "warn",
        LogLevel::Info => "info",
        LogLevel::Debug => "debug",
        LogLevel::Trace => "trace",
    };

    let env = env_logger::Env::default().filter_or("RUST_LOG", level);

    // A second command in the same process keeps the first logger.
    let _ = env_logger::Builder::from_env(env)
        .format_timestamp(None)
        .format_module_path(false)
        .format_target(matches!(log_level, LogLevel::Debug | LogLevel::Trace))
        .try_init();
}

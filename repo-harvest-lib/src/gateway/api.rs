use super::client::HttpClient;
use super::pool::{PoolThrottle, QuotaPool};
use super::rate_limit::{self, RateLimitInfo};
use crate::cache::{Cache, CacheResult};
use chrono::Utc;
use core::sync::atomic::{AtomicU64, Ordering};
use core::time::Duration;
use ohno::{AppError, app_err};
use reqwest::{Method, StatusCode};
use serde::de::DeserializeOwned;
use serde_json::Value;
use sha2::{Digest, Sha256};

const LOG_TARGET: &str = "   gateway";

/// Consecutive rate-limit responses tolerated for a single call before it is reported as failed.
const MAX_RATE_LIMIT_RETRIES: u32 = 8;

/// Result of a gateway call.
#[derive(Debug)]
pub enum ApiOutcome<T = Value> {
    /// The resource exists.
    Found { payload: T, cached: bool },

    /// The server answered 404, now or when the negative entry was cached.
    NotFound { cached: bool },

    /// The call failed after retries. Not cached.
    Failed(AppError),

    /// The quota will not reset within the allowed wait. Callers should abort the whole run.
    CircuitOpen(AppError),
}

impl<T> ApiOutcome<T> {
    /// Whether the outcome was served from the local cache.
    #[must_use]
    pub const fn was_cached(&self) -> bool {
        matches!(self, Self::Found { cached: true, .. } | Self::NotFound { cached: true })
    }

    pub fn map<U>(self, f: impl FnOnce(T) -> Result<U, AppError>) -> ApiOutcome<U> {
        match self {
            Self::Found { payload, cached } => match f(payload) {
                Ok(payload) => ApiOutcome::Found { payload, cached },
                Err(e) => ApiOutcome::Failed(e),
            },
            Self::NotFound { cached } => ApiOutcome::NotFound { cached },
            Self::Failed(e) => ApiOutcome::Failed(e),
            Self::CircuitOpen(e) => ApiOutcome::CircuitOpen(e),
        }
    }
}

/// Tunables for [`ApiGateway`].
#[derive(Debug, Clone)]
pub struct GatewayConfig {
    pub base_url: String,
    pub core_min_interval: Duration,
    pub search_min_interval: Duration,
    pub low_water_mark: u64,
    pub max_rate_limit_wait: Duration,
}

/// The single choke point for hosting-API calls.
///
/// Every call is first looked up in the response cache. Live calls are paced per quota pool,
/// retried on transient failures, and suspended while the quota is exhausted. A wait longer
/// than `max_rate_limit_wait` opens the circuit instead.
#[derive(Debug)]
pub struct ApiGateway {
    http: HttpClient,
    cache: Cache,
    base_url: String,
    core: PoolThrottle,
    search: PoolThrottle,
    low_water_mark: u64,
    max_rate_limit_wait: Duration,
    live_calls: AtomicU64,
    cache_hits: AtomicU64,
}

impl ApiGateway {
    #[must_use]
    pub fn new(http: HttpClient, cache: Cache, config: GatewayConfig) -> Self {
        Self {
            http,
            cache,
            base_url: config.base_url.trim_end_matches('/').to_string(),
            core: PoolThrottle::new(QuotaPool::Core, config.core_min_interval),
            search: PoolThrottle::new(QuotaPool::Search, config.search_min_interval),
            low_water_mark: config.low_water_mark,
            max_rate_limit_wait: config.max_rate_limit_wait,
            live_calls: AtomicU64::new(0),
            cache_hits: AtomicU64::new(0),
        }
    }

    #[must_use]
    pub fn live_calls(&self) -> u64 {
        self.live_calls.load(Ordering::Relaxed)
    }

    #[must_use]
    pub fn cache_hits(&self) -> u64 {
        self.cache_hits.load(Ordering::Relaxed)
    }

    /// GET a resource and deserialize it.
    pub async fn get<T: DeserializeOwned>(&self, pool: QuotaPool, path: &str, params: &[(&str, String)]) -> ApiOutcome<T> {
        self.call(pool, Method::GET, path, params)
            .await
            .map(|value| serde_json::from_value(value).map_err(|e| app_err!("unexpected response shape for {path}: {e}")))
    }

    /// Issue a call, serving it from the cache when a fresh entry exists.
    pub async fn call(&self, pool: QuotaPool, method: Method, path: &str, params: &[(&str, String)]) -> ApiOutcome {
        let url = format!("{}{path}", self.base_url);
        let mut params: Vec<(String, String)> = params.iter().map(|(k, v)| ((*k).to_string(), v.clone())).collect();
        params.sort();

        let cache_file = cache_filename(pool, &method, &url, &params);
        match self.cache.load::<Value>(&cache_file) {
            CacheResult::Data(payload) => {
                let _ = self.cache_hits.fetch_add(1, Ordering::Relaxed);
                log::trace!(target: LOG_TARGET, "Cache hit for {method} {url}");
                return ApiOutcome::Found { payload, cached: true };
            }
            CacheResult::NoData(_) => {
                let _ = self.cache_hits.fetch_add(1, Ordering::Relaxed);
                return ApiOutcome::NotFound { cached: true };
            }
            CacheResult::Miss => {}
        }

        let throttle = match pool {
            QuotaPool::Core => &self.core,
            QuotaPool::Search => &self.search,
        };

        let mut rate_limit_retries = 0;
        loop {
            throttle.wait_turn().await;
            let _ = self.live_calls.fetch_add(1, Ordering::Relaxed);

            let resp = match self.http.send(method.clone(), &url, &params).await {
                Ok(resp) => resp,
                Err(e) => return ApiOutcome::Failed(e),
            };

            let status = resp.status();
            let headers = resp.headers().clone();
            let body = match resp.text().await {
                Ok(body) => body,
                Err(e) => return ApiOutcome::Failed(app_err!("reading response of {method} {url}: {e}")),
            };

            if rate_limit::is_rate_limited(status, &body) {
                let wait = rate_limit::wait_for(&headers, Utc::now());
                if wait > self.max_rate_limit_wait {
                    log::error!(
                        target: LOG_TARGET,
                        "{pool} quota resets in {}s, beyond the {}s ceiling",
                        wait.as_secs(),
                        self.max_rate_limit_wait.as_secs()
                    );
                    return ApiOutcome::CircuitOpen(app_err!(
                        "{pool} rate limit resets in {}s which exceeds the maximum wait of {}s",
                        wait.as_secs(),
                        self.max_rate_limit_wait.as_secs()
                    ));
                }

                rate_limit_retries += 1;
                if rate_limit_retries > MAX_RATE_LIMIT_RETRIES {
                    return ApiOutcome::Failed(app_err!("{method} {url} still rate limited after {MAX_RATE_LIMIT_RETRIES} waits"));
                }

                log::warn!(target: LOG_TARGET, "Rate limited on {pool} pool, waiting {}s before retrying", wait.as_secs());
                throttle.pause_for(wait).await;
                continue;
            }

            if let Some(info) = RateLimitInfo::from_headers(&headers)
                && info.remaining < self.low_water_mark
            {
                let pause = info.until_reset(Utc::now()).min(self.max_rate_limit_wait);
                log::debug!(target: LOG_TARGET, "{pool} quota down to {}, pausing until reset", info.remaining);
                throttle.pause_for(pause).await;
            }

            return self.finish(status, &method, &url, &cache_file, &body);
        }
    }

    fn finish(&self, status: StatusCode, method: &Method, url: &str, cache_file: &str, body: &str) -> ApiOutcome {
        if status == StatusCode::NOT_FOUND {
            if let Err(e) = self.cache.save_no_data(cache_file, "404") {
                log::warn!(target: LOG_TARGET, "Could not cache 404 for {url}: {e}");
            }
            return ApiOutcome::NotFound { cached: false };
        }

        if !status.is_success() {
            let snippet: String = body.chars().take(200).collect();
            return ApiOutcome::Failed(app_err!("{method} {url} returned {status}: {snippet}"));
        }

        let payload: Value = match serde_json::from_str(body) {
            Ok(v) => v,
            Err(e) => return ApiOutcome::Failed(app_err!("{method} {url} returned invalid JSON: {e}")),
        };

        if let Err(e) = self.cache.save(cache_file, &payload) {
            log::warn!(target: LOG_TARGET, "Could not cache response for {url}: {e}");
        }

        ApiOutcome::Found { payload, cached: false }
    }
}

/// Cache location for a call; the key folds in method, URL, and the sorted parameters.
fn cache_filename(pool: QuotaPool, method: &Method, url: &str, sorted_params: &[(String, String)]) -> String {
    let mut hasher = Sha256::new();
    hasher.update(method.as_str().as_bytes());
    hasher.update(b"\n");
    hasher.update(url.as_bytes());
    for (k, v) in sorted_params {
        hasher.update(b"\n");
        hasher.update(k.as_bytes());
        hasher.update(b"=");
        hasher.update(v.as_bytes());
    }
    let key = hex::encode(hasher.finalize());
    format!("http/{pool}/{}/{key}.json", &key[..2])
}

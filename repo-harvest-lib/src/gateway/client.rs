//! HTTP adapter with bounded retry and per-request timeouts.
//!
//! Network failures and 5xx responses are retried with exponential backoff. Everything else,
//! rate-limit responses included, is handed back to the caller untouched so the gateway can
//! apply its own policy.

use crate::Result;
use core::time::Duration;
use layered::{Execute, Service, Stack};
use ohno::{AppError, IntoAppError, app_err};
use reqwest::header::{ACCEPT, AUTHORIZATION, HeaderMap, HeaderValue};
use reqwest::{Method, Response, StatusCode};
use seatbelt::retry::{Backoff, Retry};
use seatbelt::timeout::Timeout;
use seatbelt::{RecoveryInfo, ResilienceContext};
use tick::Clock;

const LOG_TARGET: &str = "      http";
const USER_AGENT: &str = concat!("repo-harvest/", env!("CARGO_PKG_VERSION"));

/// How transient failures are retried.
#[derive(Debug, Clone, Copy)]
pub struct RetryPolicy {
    /// Retries on top of the original attempt.
    pub max_retries: u32,
    /// Delay before the first retry; backoff is exponential from here.
    pub base_delay: Duration,
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self {
            max_retries: 3,
            base_delay: Duration::from_secs(1),
        }
    }
}

/// Network errors and 5xx are transient. Rate-limit responses are not retried here; the
/// gateway owns that policy.
fn recovery_for(result: &Result<Response>) -> RecoveryInfo {
    match result {
        Err(_) => RecoveryInfo::retry(),
        Ok(resp) if resp.status().is_server_error() => RecoveryInfo::retry(),
        Ok(_) => RecoveryInfo::never(),
    }
}

/// A thin wrapper over [`reqwest::Client`] that carries authentication and retry policy.
#[derive(Debug, Clone)]
pub struct HttpClient {
    client: reqwest::Client,
    timeout: Duration,
    retry: RetryPolicy,
}

impl HttpClient {
    /// Create a client, optionally authenticated with a bearer token.
    ///
    /// `timeout` bounds each attempt, not the whole retried call.
    pub fn new(token: Option<&str>, timeout: Duration, retry: RetryPolicy) -> Result<Self> {
        let mut headers = HeaderMap::new();
        let _ = headers.insert(ACCEPT, HeaderValue::from_static("application/vnd.github+json"));

        if let Some(token) = token {
            let mut auth = HeaderValue::from_str(&format!("Bearer {token}")).into_app_err("token contains characters not allowed in a header")?;
            auth.set_sensitive(true);
            let _ = headers.insert(AUTHORIZATION, auth);
        }

        let client = reqwest::Client::builder()
            .user_agent(USER_AGENT)
            .default_headers(headers)
            .build()
            .into_app_err("building HTTP client")?;

        Ok(Self { client, timeout, retry })
    }

    /// Send a request, retrying network errors and server errors.
    ///
    /// The final response is returned whatever its status; only exhausting the retries on a
    /// network error or timeout produces an `Err`.
    pub async fn send(&self, method: Method, url: &str, params: &[(String, String)]) -> Result<Response> {
        let clock = Clock::new_tokio();
        let context = ResilienceContext::new(&clock).name("http_send");

        let client = self.client.clone();
        let timeout = self.timeout;
        let service = (
            Retry::layer("retry", &context)
                .clone_input()
                .recovery_with(|result: &Result<Response>, _| recovery_for(result))
                .max_retry_attempts(self.retry.max_retries)
                .base_delay(self.retry.base_delay)
                .backoff(Backoff::Exponential)
                .on_retry(|_output, args| {
                    log::debug!(
                        target: LOG_TARGET,
                        "retrying request (attempt {}, delay {}ms)",
                        args.attempt().index() + 1,
                        args.retry_delay().as_millis()
                    );
                }),
            Timeout::layer("timeout", &context)
                .timeout_error(move |_| app_err!("request timed out after {}s", timeout.as_secs()))
                .timeout(timeout),
            Execute::new(move |(method, url, params): (Method, String, Vec<(String, String)>)| {
                let client = client.clone();
                async move {
                    client
                        .request(method, &url)
                        .query(&params)
                        .send()
                        .await
                        .map_err(AppError::from)
                }
            }),
        )
            .into_service();

        service
            .execute((method.clone(), url.to_string(), params.to_vec()))
            .await
            .map_err(|e| app_err!("{method} {url} failed after {} attempt(s): {e:#}", self.retry.max_retries + 1))
    }

    /// Fetch a raw file. Returns `None` when the server answers 404.
    pub async fn get_bytes(&self, url: &str) -> Result<Option<Vec<u8>>> {
        let resp = self.send(Method::GET, url, &[]).await?;
        match resp.status() {
            StatusCode::NOT_FOUND => Ok(None),
            status if status.is_success() => {
                let bytes = resp.bytes().await.into_app_err_with(|| format!("reading body of {url}"))?;
                Ok(Some(bytes.to_vec()))
            }
            status => Err(app_err!("GET {url} returned {status}")),
        }
    }
}

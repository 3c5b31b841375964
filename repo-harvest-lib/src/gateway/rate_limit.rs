use chrono::{DateTime, Utc};
use core::time::Duration;
use reqwest::StatusCode;
use reqwest::header::HeaderMap;

const FALLBACK_WAIT: Duration = Duration::from_secs(60);
const MARGIN: Duration = Duration::from_secs(1);
const MIN_WAIT: Duration = Duration::from_secs(1);

/// Quota state reported by the `x-ratelimit-*` response headers.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RateLimitInfo {
    pub remaining: u64,
    pub reset_at: DateTime<Utc>,
}

impl RateLimitInfo {
    #[must_use]
    pub fn from_headers(headers: &HeaderMap) -> Option<Self> {
        let remaining = header_u64(headers, "x-ratelimit-remaining")?;
        let reset = header_u64(headers, "x-ratelimit-reset")?;
        let reset_at = DateTime::from_timestamp(i64::try_from(reset).ok()?, 0)?;
        Some(Self { remaining, reset_at })
    }

    /// Time left until the quota resets, plus a small margin.
    #[must_use]
    pub fn until_reset(&self, now: DateTime<Utc>) -> Duration {
        self.reset_at.signed_duration_since(now).to_std().unwrap_or(Duration::ZERO) + MARGIN
    }
}

fn header_u64(headers: &HeaderMap, name: &str) -> Option<u64> {
    headers.get(name)?.to_str().ok()?.trim().parse().ok()
}

/// Whether a response means the quota is exhausted.
///
/// GitHub signals this either with 429 or with a 403 whose body mentions the rate limit.
#[must_use]
pub fn is_rate_limited(status: StatusCode, body: &str) -> bool {
    status == StatusCode::TOO_MANY_REQUESTS || (status == StatusCode::FORBIDDEN && body.to_ascii_lowercase().contains("rate limit"))
}

/// How long to wait before retrying a rate-limited call.
///
/// `retry-after` is preferred since secondary limits set it while the primary reset may be far
/// off. Otherwise the reset time is used, and failing both a fixed fallback.
#[must_use]
pub fn wait_for(headers: &HeaderMap, now: DateTime<Utc>) -> Duration {
    let wait = header_u64(headers, "retry-after")
        .map(|secs| Duration::from_secs(secs) + MARGIN)
        .or_else(|| {
            let reset = header_u64(headers, "x-ratelimit-reset")?;
            let reset_at = DateTime::from_timestamp(i64::try_from(reset).ok()?, 0)?;
            Some(reset_at.signed_duration_since(now).to_std().unwrap_or(Duration::ZERO) + MARGIN)
        })
        .unwrap_or(FALLBACK_WAIT);

    wait.max(MIN_WAIT)
}

#[cfg(test)]
#[cfg_attr(coverage_nightly, coverage(off))]
mod tests {
    use super::*;
    use reqwest::header::HeaderValue;

    fn headers(pairs: &[(&'static str, String)]) -> HeaderMap {
        let mut map = HeaderMap::new();
        for (name, value) in pairs {
            let _ = map.insert(*name, HeaderValue::from_str(value).unwrap());
        }
        map
    }

    #[test]
    fn parses_quota_headers() {
        let now = Utc::now();
        let reset = now.timestamp() + 30;
        let info = RateLimitInfo::from_headers(&headers(&[
            ("x-ratelimit-remaining", "4".into()),
            ("x-ratelimit-reset", reset.to_string()),
        ]))
        .unwrap();

        assert_eq!(info.remaining, 4);
        let wait = info.until_reset(now).as_secs();
        assert!((30..=31).contains(&wait), "unexpected wait {wait}");
    }

    #[test]
    fn missing_headers_give_no_info() {
        assert!(RateLimitInfo::from_headers(&HeaderMap::new()).is_none());
    }

    #[test]
    fn detects_both_rate_limit_signals() {
        assert!(is_rate_limited(StatusCode::TOO_MANY_REQUESTS, ""));
        assert!(is_rate_limited(StatusCode::FORBIDDEN, r#"{"message":"API rate limit exceeded for user"}"#));
        assert!(is_rate_limited(StatusCode::FORBIDDEN, "You have exceeded a secondary Rate Limit"));
        assert!(!is_rate_limited(StatusCode::FORBIDDEN, r#"{"message":"Resource not accessible"}"#));
        assert!(!is_rate_limited(StatusCode::NOT_FOUND, "rate limit"));
    }

    #[test]
    fn retry_after_wins_over_reset() {
        let now = Utc::now();
        let wait = wait_for(
            &headers(&[
                ("retry-after", "5".into()),
                ("x-ratelimit-reset", (now.timestamp() + 3000).to_string()),
            ]),
            now,
        );
        assert_eq!(wait, Duration::from_secs(6));
    }

    #[test]
    fn reset_time_is_used_without_retry_after() {
        let now = DateTime::from_timestamp(1_700_000_000, 0).unwrap();
        let wait = wait_for(&headers(&[("x-ratelimit-reset", "1700007200".into())]), now);
        assert_eq!(wait, Duration::from_secs(7201));
    }

    #[test]
    fn fallback_and_floor() {
        let now = Utc::now();
        assert_eq!(wait_for(&HeaderMap::new(), now), FALLBACK_WAIT);

        let past = (now.timestamp() - 100).to_string();
        assert_eq!(wait_for(&headers(&[("x-ratelimit-reset", past)]), now), Duration::from_secs(1));
    }
}

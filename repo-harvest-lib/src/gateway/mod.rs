//! Access to the hosting service's REST API.
//!
//! [`ApiGateway`] is the only path by which the pipeline talks to the API. It layers a response
//! cache, per-pool pacing, and rate-limit handling over [`HttpClient`].

mod api;
mod client;
mod pool;
mod rate_limit;

pub use api::{ApiGateway, ApiOutcome, GatewayConfig};
pub use client::{HttpClient, RetryPolicy};
pub use pool::QuotaPool;
pub use rate_limit::RateLimitInfo;

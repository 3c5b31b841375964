use super::query::SearchQuery;
use crate::Result;
use crate::gateway::{ApiGateway, ApiOutcome, QuotaPool};
use crate::model::ApiRepository;
use core::future::Future;
use ohno::app_err;
use serde::Deserialize;
use std::sync::Arc;

/// Items per page, the maximum the search endpoint allows.
pub const PAGE_SIZE: usize = 100;

/// Deepest page the search endpoint will serve.
pub const MAX_PAGES: u32 = 10;

/// Results reachable for a single query.
pub const RESULT_WINDOW: u64 = PAGE_SIZE as u64 * MAX_PAGES as u64;

/// One page of search results.
#[derive(Debug, Default)]
pub struct SearchPage {
    pub total_count: u64,
    pub items: Vec<ApiRepository>,
    pub cached: bool,
}

/// Something that answers repository searches, sorted by stars descending.
pub trait SearchSource: Send + Sync {
    /// Fetch a 1-based page of results.
    fn search(&self, query: &SearchQuery, page: u32) -> impl Future<Output = Result<SearchPage>> + Send;
}

#[derive(Deserialize)]
struct SearchResponse {
    total_count: u64,
    #[serde(default)]
    items: Vec<ApiRepository>,
}

/// Searches through the API gateway's search pool.
#[derive(Debug, Clone)]
pub struct GatewaySearch {
    gateway: Arc<ApiGateway>,
}

impl GatewaySearch {
    #[must_use]
    pub const fn new(gateway: Arc<ApiGateway>) -> Self {
        Self { gateway }
    }
}

impl SearchSource for GatewaySearch {
    async fn search(&self, query: &SearchQuery, page: u32) -> Result<SearchPage> {
        let params = [
            ("q", query.to_string()),
            ("sort", "stars".to_string()),
            ("order", "desc".to_string()),
            ("per_page", PAGE_SIZE.to_string()),
            ("page", page.to_string()),
        ];

        match self.gateway.get::<SearchResponse>(QuotaPool::Search, "/search/repositories", &params).await {
            ApiOutcome::Found { payload, cached } => Ok(SearchPage {
                total_count: payload.total_count,
                items: payload.items,
                cached,
            }),
            ApiOutcome::NotFound { .. } => Err(app_err!("search endpoint returned 404 for '{query}'")),
            ApiOutcome::Failed(e) | ApiOutcome::CircuitOpen(e) => Err(e),
        }
    }
}

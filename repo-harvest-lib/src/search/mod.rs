//! Exhaustive repository discovery past the search endpoint's result window.

mod crawler;
mod query;
mod source;

pub use crawler::{CrawlStats, SearchCrawler};
pub use query::{CreatedRange, SearchQuery, StarFilter};
pub use source::{GatewaySearch, MAX_PAGES, PAGE_SIZE, RESULT_WINDOW, SearchPage, SearchSource};

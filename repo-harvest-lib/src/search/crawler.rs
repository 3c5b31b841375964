use super::query::{CreatedRange, SearchQuery, StarFilter};
use super::source::{MAX_PAGES, PAGE_SIZE, RESULT_WINDOW, SearchPage, SearchSource};
use crate::Result;
use crate::model::Language;
use crate::pipeline::{DedupStore, StopFlag};
use chrono::{DateTime, Utc};
use core::fmt::{Display, Formatter};

const LOG_TARGET: &str = "    search";

/// Totals for one crawl.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct CrawlStats {
    pub api_requests: u64,
    pub cache_hits: u64,
    pub repos_found: u64,
    pub repos_saved: u64,
    pub time_slices: u64,
}

impl Display for CrawlStats {
    fn fmt(&self, f: &mut Formatter<'_>) -> core::fmt::Result {
        write!(
            f,
            "{} found, {} new, {} API request(s), {} cache hit(s), {} time slice(s)",
            self.repos_found, self.repos_saved, self.api_requests, self.cache_hits, self.time_slices
        )
    }
}

/// What one windowed query produced.
#[derive(Debug, Clone, Copy, Default)]
struct Batch {
    count: u64,
    min_stars: Option<u64>,
}

/// Discovers every repository of a language with at least `min_stars` stars.
///
/// The search endpoint serves at most [`RESULT_WINDOW`] results per query. The crawler walks a
/// star window downward from the top: a full batch narrows the ceiling to the lowest star count it
/// saw, and when a full batch is made entirely of one star count (a dense wall) that value is
/// covered by bisecting creation time instead. Crawling is sequential since each query depends on
/// the last one's result.
#[derive(Debug)]
pub struct SearchCrawler<'a, S> {
    source: &'a S,
    store: &'a DedupStore,
    language: Language,
    now: DateTime<Utc>,
    stop: StopFlag,
    stats: CrawlStats,
}

impl<'a, S: SearchSource> SearchCrawler<'a, S> {
    #[must_use]
    pub fn new(source: &'a S, store: &'a DedupStore, language: Language, now: DateTime<Utc>, stop: StopFlag) -> Self {
        Self {
            source,
            store,
            language,
            now,
            stop,
            stats: CrawlStats::default(),
        }
    }

    pub async fn crawl(mut self, min_stars: u64) -> Result<CrawlStats> {
        if let Some(seen) = self.store.min_stars_seen()
            && seen <= min_stars
        {
            log::info!(
                target: LOG_TARGET,
                "{} already holds {} repositories down to {seen} stars, nothing to crawl",
                self.store.path().display(),
                self.store.len()
            );
            return Ok(self.stats);
        }

        log::info!(target: LOG_TARGET, "Crawling {} repositories with at least {min_stars} stars", self.language);

        let mut ceiling: Option<u64> = None;
        loop {
            if self.stop.is_stopped() {
                break;
            }

            let stars = ceiling.map_or(StarFilter::AtLeast(min_stars), |max| StarFilter::Range(min_stars, max));
            let batch = self.page_through(SearchQuery::new(self.language, stars)).await?;

            if batch.count < RESULT_WINDOW {
                break;
            }

            let Some(floor) = batch.min_stars else { break };
            if ceiling == Some(floor) {
                log::info!(target: LOG_TARGET, "More than {RESULT_WINDOW} repositories have exactly {floor} stars, slicing by creation date");
                self.slice_by_time(floor).await?;
                match floor.checked_sub(1) {
                    Some(next) => ceiling = Some(next),
                    None => break,
                }
            } else {
                ceiling = Some(floor);
            }

            if ceiling.is_some_and(|max| max < min_stars) {
                break;
            }
        }

        log::info!(target: LOG_TARGET, "Crawl finished: {}", self.stats);
        Ok(self.stats)
    }

    async fn fetch(&mut self, query: &SearchQuery, page: u32) -> Result<SearchPage> {
        let result = self.source.search(query, page).await?;
        if result.cached {
            self.stats.cache_hits += 1;
        } else {
            self.stats.api_requests += 1;
        }
        log::debug!(
            target: LOG_TARGET,
            "'{query}' page {page}: {} item(s) of {}{}",
            result.items.len(),
            result.total_count,
            if result.cached { " (cached)" } else { "" }
        );
        Ok(result)
    }

    fn absorb(&mut self, page: SearchPage, batch: &mut Batch) -> Result<bool> {
        let full = page.items.len() >= PAGE_SIZE;
        for item in page.items {
            let record = item.into_record();
            batch.count += 1;
            batch.min_stars = Some(batch.min_stars.map_or(record.stars, |m| m.min(record.stars)));
            self.stats.repos_found += 1;
            if self.store.save(&record)? {
                self.stats.repos_saved += 1;
            }
        }
        Ok(full)
    }

    /// Read pages of `query` until one comes back short or the window is exhausted.
    async fn page_through(&mut self, query: SearchQuery) -> Result<Batch> {
        let mut batch = Batch::default();
        for page in 1..=MAX_PAGES {
            if self.stop.is_stopped() {
                break;
            }
            let result = self.fetch(&query, page).await?;
            if !self.absorb(result, &mut batch)? {
                break;
            }
        }
        Ok(batch)
    }

    /// Cover every repository with exactly `stars` stars by bisecting creation time until each
    /// range fits in one result window.
    async fn slice_by_time(&mut self, stars: u64) -> Result<()> {
        let mut pending = vec![CreatedRange::full(self.now)];

        while let Some(range) = pending.pop() {
            if self.stop.is_stopped() {
                break;
            }

            self.stats.time_slices += 1;
            let query = SearchQuery::new(self.language, StarFilter::Exact(stars)).created(range);
            let first = self.fetch(&query, 1).await?;

            if first.total_count >= RESULT_WINDOW {
                if let Some((left, right)) = range.split() {
                    pending.push(right);
                    pending.push(left);
                    continue;
                }
                log::warn!(
                    target: LOG_TARGET,
                    "'{query}' still reports {} results and cannot be narrowed; some may be missed",
                    first.total_count
                );
            }

            let mut batch = Batch::default();
            if self.absorb(first, &mut batch)? {
                for page in 2..=MAX_PAGES {
                    let result = self.fetch(&query, page).await?;
                    if !self.absorb(result, &mut batch)? {
                        break;
                    }
                }
            }
        }

        Ok(())
    }
}

#[cfg(test)]
#[cfg_attr(coverage_nightly, coverage(off))]
mod tests {
    use super::*;
    use crate::model::{ApiRepository, RepositoryRecord};
    use crate::pipeline::load_records;
    use chrono::{TimeDelta, TimeZone};
    use std::collections::HashSet;
    use std::sync::Mutex;

    #[derive(Debug, Clone, Copy)]
    struct Repo {
        id: u64,
        stars: u64,
        created: DateTime<Utc>,
    }

    /// In-memory search that honours the result window the same way the real endpoint does.
    struct SyntheticSource {
        population: Vec<Repo>,
        queries: Mutex<Vec<String>>,
    }

    impl SyntheticSource {
        fn new(population: Vec<Repo>) -> Self {
            Self {
                population,
                queries: Mutex::new(Vec::new()),
            }
        }

        fn queries(&self) -> Vec<String> {
            self.queries.lock().unwrap().clone()
        }
    }

    impl SearchSource for SyntheticSource {
        async fn search(&self, query: &SearchQuery, page: u32) -> Result<SearchPage> {
            self.queries.lock().unwrap().push(format!("{query} #{page}"));

            let mut matches: Vec<Repo> = self
                .population
                .iter()
                .filter(|r| query.stars.matches(r.stars) && query.created.is_none_or(|c| c.contains(r.created)))
                .copied()
                .collect();
            matches.sort_by(|a, b| b.stars.cmp(&a.stars).then(a.id.cmp(&b.id)));

            let total_count = matches.len() as u64;
            let visible = matches.len().min(RESULT_WINDOW as usize);
            let start = ((page - 1) as usize * PAGE_SIZE).min(visible);
            let end = (start + PAGE_SIZE).min(visible);

            let items = matches[start..end]
                .iter()
                .map(|r| {
                    serde_json::from_value::<ApiRepository>(serde_json::json!({
                        "id": r.id,
                        "name": format!("repo{}", r.id),
                        "owner": { "login": "synthetic" },
                        "stargazers_count": r.stars,
                        "created_at": r.created,
                    }))
                    .unwrap()
                })
                .collect();

            Ok(SearchPage {
                total_count,
                items,
                cached: false,
            })
        }
    }

    fn now() -> DateTime<Utc> {
        Utc.with_ymd_and_hms(2025, 1, 1, 0, 0, 0).unwrap()
    }

    fn created(n: u64) -> DateTime<Utc> {
        Utc.with_ymd_and_hms(2010, 1, 1, 0, 0, 0).unwrap() + TimeDelta::hours(i64::try_from(n).unwrap() * 37)
    }

    fn stored_ids(store: &DedupStore) -> Vec<u64> {
        let mut ids: Vec<u64> = load_records(store.path()).unwrap().iter().map(|r: &RepositoryRecord| r.id).collect();
        ids.sort_unstable();
        ids
    }

    fn expected_ids(population: &[Repo], min_stars: u64) -> Vec<u64> {
        let mut ids: Vec<u64> = population.iter().filter(|r| r.stars >= min_stars).map(|r| r.id).collect();
        ids.sort_unstable();
        ids
    }

    async fn crawl(population: Vec<Repo>, min_stars: u64) -> (Vec<u64>, Vec<u64>, CrawlStats, Vec<String>) {
        let tmp = tempfile::tempdir().unwrap();
        let store = DedupStore::open(tmp.path().join("search/go.jsonl")).unwrap();
        let expected = expected_ids(&population, min_stars);
        let source = SyntheticSource::new(population);

        let stats = SearchCrawler::new(&source, &store, Language::Go, now(), StopFlag::new())
            .crawl(min_stars)
            .await
            .unwrap();
        (stored_ids(&store), expected, stats, source.queries())
    }

    #[tokio::test]
    async fn small_population_is_one_query() {
        let population: Vec<Repo> = (1..=250)
            .map(|id| Repo {
                id,
                stars: id * 3,
                created: created(id),
            })
            .collect();

        let (found, expected, stats, queries) = crawl(population, 30).await;
        assert_eq!(found, expected);
        assert_eq!(stats.time_slices, 0);
        assert!(queries.iter().all(|q| q.contains("stars:>=30")));
    }

    #[tokio::test]
    async fn repositories_at_exactly_min_stars_are_included() {
        let population = vec![
            Repo { id: 1, stars: 100, created: created(1) },
            Repo { id: 2, stars: 99, created: created(2) },
            Repo { id: 3, stars: 101, created: created(3) },
        ];
        let (found, _, _, _) = crawl(population, 100).await;
        assert_eq!(found, vec![1, 3]);
    }

    #[tokio::test]
    async fn full_batch_with_lower_minimum_narrows_the_ceiling() {
        // 1200 distinct star counts: the first batch is full, its minimum is far below where a
        // dense wall would sit, so the ceiling just drops to that minimum.
        let population: Vec<Repo> = (1..=1200)
            .map(|id| Repo {
                id,
                stars: id,
                created: created(id),
            })
            .collect();

        let (found, expected, stats, queries) = crawl(population, 1).await;
        assert_eq!(found, expected);
        assert_eq!(stats.time_slices, 0);
        assert!(queries.iter().any(|q| q.contains("stars:1..201")));
    }

    #[tokio::test]
    async fn exactly_one_window_of_results() {
        let population: Vec<Repo> = (1..=1000)
            .map(|id| Repo {
                id,
                stars: id,
                created: created(id),
            })
            .collect();

        let (found, expected, stats, _) = crawl(population, 1).await;
        assert_eq!(found.len(), 1000);
        assert_eq!(found, expected);
        assert_eq!(stats.repos_saved, 1000);
    }

    #[tokio::test]
    async fn dense_wall_is_covered_by_time_slicing() {
        let mut population = Vec::new();
        let mut id = 0;
        let mut push = |stars: u64, population: &mut Vec<Repo>| {
            id += 1;
            population.push(Repo {
                id,
                stars,
                created: created(id),
            });
        };

        for i in 0..800 {
            push(100 + i, &mut population);
        }
        for _ in 0..1500 {
            push(50, &mut population);
        }
        for i in 0..700 {
            push(10 + i % 40, &mut population);
        }
        for _ in 0..50 {
            push(3, &mut population);
        }

        let (found, expected, stats, queries) = crawl(population, 10).await;
        assert_eq!(found.len(), 3000);
        assert_eq!(found, expected);
        assert!(stats.time_slices > 1);
        assert!(queries.iter().any(|q| q.contains("stars:50 created:")));
        assert!(queries.iter().any(|q| q.contains("stars:10..49")));
    }

    #[tokio::test]
    async fn wall_at_the_first_query_is_detected() {
        let population: Vec<Repo> = (1..=2500)
            .map(|id| Repo {
                id,
                stars: 7,
                created: created(id),
            })
            .collect();

        let (found, expected, stats, _) = crawl(population, 7).await;
        assert_eq!(found, expected);
        assert!(stats.time_slices > 0);
    }

    #[tokio::test]
    async fn found_counts_duplicates_but_saved_does_not() {
        let population: Vec<Repo> = (1..=1500)
            .map(|id| Repo {
                id,
                stars: 1 + id % 2,
                created: created(id),
            })
            .collect();

        let (found, expected, stats, _) = crawl(population, 1).await;
        assert_eq!(found, expected);
        assert_eq!(stats.repos_saved, 1500);
        assert!(stats.repos_found > stats.repos_saved);
        assert_eq!(found.iter().copied().collect::<HashSet<_>>().len(), found.len());
    }

    #[tokio::test]
    async fn covered_threshold_skips_crawling() {
        let tmp = tempfile::tempdir().unwrap();
        let store = DedupStore::open(tmp.path().join("go.jsonl")).unwrap();
        let mut seen = RepositoryRecord::new(1, "o", "n");
        seen.stars = 5;
        let _ = store.save(&seen).unwrap();

        let source = SyntheticSource::new(vec![Repo { id: 2, stars: 20, created: created(2) }]);
        let stats = SearchCrawler::new(&source, &store, Language::Go, now(), StopFlag::new())
            .crawl(10)
            .await
            .unwrap();

        assert_eq!(stats, CrawlStats::default());
        assert!(source.queries().is_empty());

        let stats = SearchCrawler::new(&source, &store, Language::Go, now(), StopFlag::new())
            .crawl(3)
            .await
            .unwrap();
        assert_eq!(stats.repos_saved, 1);
    }
}

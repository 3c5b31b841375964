use super::count_call;
use crate::gateway::{ApiGateway, ApiOutcome, QuotaPool};
use crate::git::{RefLister, RefResolver};
use crate::model::{ApiRelease, ReleaseRecord, RepositoryRecord, sort_releases};
use crate::pipeline::{StageCounters, StepOutcome, Transform};
use std::sync::Arc;

const LOG_TARGET: &str = "  releases";

/// Release pages fetched per repository.
pub const MAX_RELEASE_PAGES: u32 = 5;

/// Releases stored on each record, newest first.
pub const RELEASES_KEPT: usize = 10;

const PER_PAGE: usize = 100;

/// Collects each repository's releases.
///
/// Repositories that publish no release objects fall back to their bare tags from the ref
/// advertisement.
#[derive(Debug)]
pub struct ReleasesStage<L> {
    gateway: Arc<ApiGateway>,
    refs: Arc<RefResolver<L>>,
}

impl<L: RefLister> ReleasesStage<L> {
    #[must_use]
    pub const fn new(gateway: Arc<ApiGateway>, refs: Arc<RefResolver<L>>) -> Self {
        Self { gateway, refs }
    }
}

impl<L: RefLister + 'static> Transform for ReleasesStage<L> {
    const NAME: &'static str = "releases";

    async fn apply(&self, mut record: RepositoryRecord, counters: &StageCounters) -> StepOutcome {
        let path = format!("/repos/{}/{}/releases", record.owner, record.name);
        let mut releases: Vec<ReleaseRecord> = Vec::new();

        for page in 1..=MAX_RELEASE_PAGES {
            let params = [("per_page", PER_PAGE.to_string()), ("page", page.to_string())];
            let outcome = self.gateway.get::<Vec<ApiRelease>>(QuotaPool::Core, &path, &params).await;
            count_call(&outcome, counters);

            match outcome {
                ApiOutcome::Found { payload, .. } => {
                    let full = payload.len() >= PER_PAGE;
                    releases.extend(payload.into_iter().map(|r| r.into_record(record.id)));
                    if !full {
                        break;
                    }
                }
                ApiOutcome::NotFound { .. } => return StepOutcome::Skipped("repository no longer exists".into()),
                ApiOutcome::Failed(e) => return StepOutcome::Failed(e),
                ApiOutcome::CircuitOpen(e) => return StepOutcome::Fatal(e),
            }
        }

        if releases.is_empty() {
            match self.refs.ref_set(&record.owner, &record.name).await {
                Ok((set, cached)) => {
                    counters.lookup(cached);
                    releases = set.tags().into_iter().map(|tag| ReleaseRecord::from_tag(record.id, tag)).collect();
                    if !releases.is_empty() {
                        log::debug!(target: LOG_TARGET, "{record} has no releases, using {} tag(s)", releases.len());
                    }
                }
                Err(e) => log::debug!(target: LOG_TARGET, "{record} has no releases and its tags could not be listed: {e:#}"),
            }
        }

        sort_releases(&mut releases);
        record.total_releases = Some(u32::try_from(releases.len()).unwrap_or(u32::MAX));
        record.releases = keep_recent(releases);
        StepOutcome::Enriched(record)
    }
}

/// The newest [`RELEASES_KEPT`] of `sorted`, plus the newest stable release when it is older
/// than all of them.
fn keep_recent(mut sorted: Vec<ReleaseRecord>) -> Vec<ReleaseRecord> {
    let stable = sorted.iter().position(ReleaseRecord::is_stable);
    if let Some(index) = stable.filter(|&i| i >= RELEASES_KEPT) {
        sorted.swap(RELEASES_KEPT, index);
        sorted.truncate(RELEASES_KEPT + 1);
    } else {
        sorted.truncate(RELEASES_KEPT);
    }
    sorted
}

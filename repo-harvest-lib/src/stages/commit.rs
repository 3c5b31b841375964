use super::count_call;
use crate::gateway::{ApiGateway, ApiOutcome, QuotaPool};
use crate::git::{RefLister, RefLookup, RefResolver};
use crate::model::{DownloadTarget, RefKind, RepositoryRecord};
use crate::pipeline::{StageCounters, StepOutcome, Transform};
use ohno::{AppError, app_err};
use serde::Deserialize;
use std::sync::Arc;

const LOG_TARGET: &str = "    commit";

/// How a repository's download target was settled.
#[derive(Debug)]
pub enum TargetLookup {
    /// `cached` is false whenever a fallback was needed, even if the data behind it was cached.
    Resolved { target: DownloadTarget, cached: bool },
    Missing(String),
    Failed(AppError),
    Fatal(AppError),
}

#[derive(Deserialize)]
struct CommitResponse {
    sha: String,
}

/// Pins each repository to a commit: its latest stable release, or its default branch.
///
/// Refs are resolved over the git protocol. A release tag that no longer resolves falls back to
/// the default branch; if the ref advertisement can't be fetched at all, the REST commit endpoint
/// is used instead.
#[derive(Debug)]
pub struct CommitStage<L> {
    gateway: Arc<ApiGateway>,
    refs: Arc<RefResolver<L>>,
}

impl<L: RefLister> CommitStage<L> {
    #[must_use]
    pub const fn new(gateway: Arc<ApiGateway>, refs: Arc<RefResolver<L>>) -> Self {
        Self { gateway, refs }
    }

    pub async fn resolve_target(&self, record: &RepositoryRecord, counters: &StageCounters) -> TargetLookup {
        let (ref_name, kind) = match record.latest_stable_release() {
            Some(release) => (release.tag_name.clone(), RefKind::Release),
            None => (record.default_branch.clone(), RefKind::Branch),
        };

        let resolution = self.refs.resolve(&record.owner, &record.name, &ref_name).await;
        match resolution.lookup {
            RefLookup::Found(sha) => {
                counters.lookup(resolution.cached);
                TargetLookup::Resolved {
                    target: DownloadTarget::new(ref_name, kind, sha),
                    cached: resolution.cached,
                }
            }

            RefLookup::NotFound if kind == RefKind::Release => {
                log::warn!(
                    target: LOG_TARGET,
                    "{record}: tag '{ref_name}' not among {} refs, falling back to '{}'",
                    resolution.total_refs,
                    record.default_branch
                );
                counters.live_call();
                let fallback = self.refs.resolve(&record.owner, &record.name, &record.default_branch).await;
                match fallback.lookup {
                    RefLookup::Found(sha) => TargetLookup::Resolved {
                        target: DownloadTarget::new(record.default_branch.clone(), RefKind::Branch, sha),
                        cached: false,
                    },
                    RefLookup::NotFound => TargetLookup::Missing(format!("neither '{ref_name}' nor '{}' resolves", record.default_branch)),
                    RefLookup::Error(e) => TargetLookup::Failed(e),
                }
            }

            RefLookup::NotFound => {
                counters.lookup(resolution.cached);
                TargetLookup::Missing(format!("branch '{ref_name}' not found"))
            }

            RefLookup::Error(e) => {
                log::debug!(target: LOG_TARGET, "{record}: ref listing failed ({e:#}), using the commit endpoint");
                self.resolve_via_rest(record, ref_name, kind, counters).await
            }
        }
    }

    async fn resolve_via_rest(&self, record: &RepositoryRecord, ref_name: String, kind: RefKind, counters: &StageCounters) -> TargetLookup {
        let first = self.commit_sha(record, &ref_name, counters).await;
        let first = match first {
            ApiOutcome::NotFound { .. } if kind == RefKind::Release => {
                log::warn!(target: LOG_TARGET, "{record}: tag '{ref_name}' not found, falling back to '{}'", record.default_branch);
                return match self.commit_sha(record, &record.default_branch, counters).await {
                    ApiOutcome::Found { payload, .. } => TargetLookup::Resolved {
                        target: DownloadTarget::new(record.default_branch.clone(), RefKind::Branch, payload.sha),
                        cached: false,
                    },
                    other => Self::unresolved(other, &record.default_branch),
                };
            }
            other => other,
        };

        match first {
            ApiOutcome::Found { payload, cached } => TargetLookup::Resolved {
                target: DownloadTarget::new(ref_name, kind, payload.sha),
                cached,
            },
            other => Self::unresolved(other, &ref_name),
        }
    }

    async fn commit_sha(&self, record: &RepositoryRecord, ref_name: &str, counters: &StageCounters) -> ApiOutcome<CommitResponse> {
        let path = format!("/repos/{}/{}/commits/{ref_name}", record.owner, record.name);
        let outcome = self.gateway.get::<CommitResponse>(QuotaPool::Core, &path, &[]).await;
        count_call(&outcome, counters);
        outcome
    }

    fn unresolved(outcome: ApiOutcome<CommitResponse>, ref_name: &str) -> TargetLookup {
        match outcome {
            ApiOutcome::Found { .. } => TargetLookup::Failed(app_err!("commit for '{ref_name}' resolved but was not used")),
            ApiOutcome::NotFound { .. } => TargetLookup::Missing(format!("'{ref_name}' not found")),
            ApiOutcome::Failed(e) => TargetLookup::Failed(e),
            ApiOutcome::CircuitOpen(e) => TargetLookup::Fatal(e),
        }
    }
}

impl<L: RefLister + 'static> Transform for CommitStage<L> {
    const NAME: &'static str = "commit";

    async fn apply(&self, mut record: RepositoryRecord, counters: &StageCounters) -> StepOutcome {
        match self.resolve_target(&record, counters).await {
            TargetLookup::Resolved { target, .. } => {
                record.download_target = Some(target);
                StepOutcome::Enriched(record)
            }
            TargetLookup::Missing(reason) => StepOutcome::Failed(app_err!("{reason}")),
            TargetLookup::Failed(e) => StepOutcome::Failed(e),
            TargetLookup::Fatal(e) => StepOutcome::Fatal(e),
        }
    }
}

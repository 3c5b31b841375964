use super::count_call;
use crate::gateway::{ApiGateway, ApiOutcome, QuotaPool};
use crate::model::{ApiRepository, RepositoryRecord};
use crate::pipeline::{StageCounters, StepOutcome, Transform};
use ohno::app_err;
use std::sync::Arc;

/// Refreshes repository metadata from the repository endpoint.
#[derive(Debug)]
pub struct MetadataStage {
    gateway: Arc<ApiGateway>,
}

impl MetadataStage {
    #[must_use]
    pub const fn new(gateway: Arc<ApiGateway>) -> Self {
        Self { gateway }
    }
}

impl Transform for MetadataStage {
    const NAME: &'static str = "metadata";

    async fn apply(&self, mut record: RepositoryRecord, counters: &StageCounters) -> StepOutcome {
        let path = format!("/repos/{}/{}", record.owner, record.name);
        let outcome = self.gateway.get::<ApiRepository>(QuotaPool::Core, &path, &[]).await;
        count_call(&outcome, counters);

        match outcome {
            ApiOutcome::Found { payload, .. } if payload.id != record.id => StepOutcome::Failed(app_err!(
                "{record} now refers to repository {}, not {}",
                payload.id,
                record.id
            )),
            ApiOutcome::Found { payload, .. } => {
                record.refresh_metadata(payload);
                StepOutcome::Enriched(record)
            }
            ApiOutcome::NotFound { .. } => StepOutcome::Skipped("repository no longer exists".into()),
            ApiOutcome::Failed(e) => StepOutcome::Failed(e),
            ApiOutcome::CircuitOpen(e) => StepOutcome::Fatal(e),
        }
    }
}

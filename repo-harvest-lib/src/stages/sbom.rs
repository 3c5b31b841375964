use crate::cas::{ArtifactGenerator, ContentCache};
use crate::model::{Language, RepositoryRecord};
use crate::path_utils::repo_relative_path;
use crate::pipeline::{StageCounters, StepOutcome, Transform};
use std::path::PathBuf;

/// Derives an SBOM from each repository's downloaded manifests.
///
/// Derivation goes through the [`ContentCache`], so repositories with byte-identical manifests
/// share one run of the generator. An SBOM already written for a repository is reused unless
/// `force` is set.
#[derive(Debug)]
pub struct SbomStage<G> {
    cas: ContentCache,
    generator: G,
    data_dir: PathBuf,
    language: Language,
    force: bool,
}

impl<G: ArtifactGenerator> SbomStage<G> {
    #[must_use]
    pub const fn new(cas: ContentCache, generator: G, data_dir: PathBuf, language: Language, force: bool) -> Self {
        Self {
            cas,
            generator,
            data_dir,
            language,
            force,
        }
    }
}

impl<G: ArtifactGenerator + 'static> Transform for SbomStage<G> {
    const NAME: &'static str = "sbom";

    async fn apply(&self, mut record: RepositoryRecord, counters: &StageCounters) -> StepOutcome {
        let (Some(target), Some(content)) = (&record.download_target, &record.content_path) else {
            return StepOutcome::Skipped("no downloaded manifests".into());
        };
        if !content.is_dir() {
            return StepOutcome::Skipped(format!("'{}' is missing", content.display()));
        }

        let output = self
            .data_dir
            .join("sbom")
            .join(self.language.to_string())
            .join(repo_relative_path(&record.owner, &record.name, &[&target.commit_sha]))
            .join("sbom.json");

        if output.is_file() && !self.force {
            counters.cache_hit();
        } else {
            match self.cas.derive(&self.generator, content, &output).await {
                Ok(cached) => counters.lookup(cached),
                Err(e) => return StepOutcome::Failed(e),
            }
        }

        record.sbom_path = Some(output);
        StepOutcome::Enriched(record)
    }
}

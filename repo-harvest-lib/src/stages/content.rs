use super::TreeListing;
use crate::Result;
use crate::gateway::HttpClient;
use crate::model::{Language, RepositoryRecord};
use crate::path_utils::{repo_relative_path, write_atomically};
use crate::pipeline::{StageCounters, StepOutcome, Transform};
use futures_util::future::join_all;
use std::collections::HashSet;
use std::path::{Path, PathBuf};
use std::sync::Arc;

const LOG_TARGET: &str = "   content";

enum Fetched {
    OnDisk,
    Downloaded,
    Absent,
}

/// Downloads the dependency manifests of each repository at its pinned commit.
///
/// Only manifests the tree listing shows are present are requested. Without a listing every
/// known manifest for the language is tried and missing ones are ignored.
#[derive(Debug)]
pub struct ContentStage {
    http: Arc<HttpClient>,
    raw_base_url: String,
    data_dir: PathBuf,
    language: Language,
}

impl ContentStage {
    #[must_use]
    pub fn new(http: Arc<HttpClient>, raw_base_url: impl Into<String>, data_dir: PathBuf, language: Language) -> Self {
        Self {
            http,
            raw_base_url: raw_base_url.into().trim_end_matches('/').to_string(),
            data_dir,
            language,
        }
    }

    fn wanted(&self, record: &RepositoryRecord) -> Result<Vec<&'static str>> {
        let manifests = self.language.manifests();
        let Some(tree_path) = &record.tree_path else {
            return Ok(manifests.to_vec());
        };

        let listing = TreeListing::load(tree_path)?;
        let present: HashSet<&str> = listing.paths.iter().map(String::as_str).collect();
        Ok(manifests.iter().copied().filter(|m| present.contains(m)).collect())
    }

    async fn fetch(&self, record: &RepositoryRecord, sha: &str, manifest: &str, dir: &Path) -> Result<Fetched> {
        let target = dir.join(manifest);
        if target.is_file() {
            return Ok(Fetched::OnDisk);
        }

        let url = format!("{}/{}/{}/{sha}/{manifest}", self.raw_base_url, record.owner, record.name);
        match self.http.get_bytes(&url).await? {
            Some(bytes) => {
                write_atomically(&target, &bytes)?;
                Ok(Fetched::Downloaded)
            }
            None => Ok(Fetched::Absent),
        }
    }
}

impl Transform for ContentStage {
    const NAME: &'static str = "content";

    async fn apply(&self, mut record: RepositoryRecord, counters: &StageCounters) -> StepOutcome {
        let Some(sha) = record.download_target.as_ref().map(|t| t.commit_sha.clone()) else {
            return StepOutcome::Skipped("no download target".into());
        };

        let wanted = match self.wanted(&record) {
            Ok(wanted) if wanted.is_empty() => return StepOutcome::Skipped("no manifests in tree".into()),
            Ok(wanted) => wanted,
            Err(e) => return StepOutcome::Failed(e),
        };

        let dir = self
            .data_dir
            .join("content")
            .join(self.language.to_string())
            .join(repo_relative_path(&record.owner, &record.name, &[&sha]));

        let results = join_all(wanted.iter().map(|m| self.fetch(&record, &sha, m, &dir))).await;

        let mut stored = 0;
        for (manifest, result) in wanted.iter().zip(results) {
            match result {
                Ok(Fetched::OnDisk) => {
                    counters.cache_hit();
                    stored += 1;
                }
                Ok(Fetched::Downloaded) => {
                    counters.live_call();
                    stored += 1;
                }
                Ok(Fetched::Absent) => {
                    counters.live_call();
                    log::debug!(target: LOG_TARGET, "{record}: '{manifest}' not found at {sha}");
                }
                Err(e) => return StepOutcome::Failed(e),
            }
        }

        if stored == 0 {
            return StepOutcome::Skipped("no manifests found".into());
        }

        record.content_path = Some(dir);
        StepOutcome::Enriched(record)
    }
}

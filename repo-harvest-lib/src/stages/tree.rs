use crate::git::{TreeLister, TreeResolver};
use crate::model::{Language, RepositoryRecord};
use crate::path_utils::{repo_relative_path, write_atomically};
use crate::pipeline::{StageCounters, StepOutcome, Transform};
use ohno::IntoAppError;
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use std::sync::Arc;

/// File written by the tree stage for each resolved commit.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TreeListing {
    pub commit_sha: String,
    pub paths: Vec<String>,
}

impl TreeListing {
    pub fn load(path: &Path) -> crate::Result<Self> {
        let text = std::fs::read_to_string(path).into_app_err_with(|| format!("reading '{}'", path.display()))?;
        serde_json::from_str(&text).into_app_err_with(|| format!("parsing '{}'", path.display()))
    }
}

/// Lists every file tracked at each repository's download target.
#[derive(Debug)]
pub struct TreeStage<T> {
    trees: Arc<TreeResolver<T>>,
    data_dir: PathBuf,
    language: Language,
}

impl<T: TreeLister> TreeStage<T> {
    #[must_use]
    pub const fn new(trees: Arc<TreeResolver<T>>, data_dir: PathBuf, language: Language) -> Self {
        Self { trees, data_dir, language }
    }

    fn output_path(&self, record: &RepositoryRecord, sha: &str) -> PathBuf {
        self.data_dir
            .join("tree")
            .join(self.language.to_string())
            .join(repo_relative_path(&record.owner, &record.name, &[sha]))
            .join("tree.json")
    }
}

impl<T: TreeLister + 'static> Transform for TreeStage<T> {
    const NAME: &'static str = "tree";

    async fn apply(&self, mut record: RepositoryRecord, counters: &StageCounters) -> StepOutcome {
        let Some(sha) = record.download_target.as_ref().map(|t| t.commit_sha.clone()) else {
            return StepOutcome::Skipped("no download target".into());
        };

        let paths = match self.trees.tree(&record.owner, &record.name, &sha).await {
            Ok((paths, cached)) => {
                counters.lookup(cached);
                paths
            }
            Err(e) => return StepOutcome::Failed(e),
        };

        let output = self.output_path(&record, &sha);
        let listing = TreeListing { commit_sha: sha, paths };
        let written = serde_json::to_vec_pretty(&listing)
            .into_app_err("serializing tree listing")
            .and_then(|bytes| write_atomically(&output, &bytes));
        if let Err(e) = written {
            return StepOutcome::Failed(e);
        }

        record.tree_path = Some(output);
        StepOutcome::Enriched(record)
    }
}

use super::LOG_TARGET;
use super::command::{check_git_output, remote_url, run_git};
use crate::Result;
use crate::cache::{Cache, CacheResult};
use crate::path_utils::sanitize_path_component;
use core::future::Future;
use core::time::Duration;
use ohno::{IntoAppError, bail};
use url::Url;

/// Lists every path tracked at a commit.
pub trait TreeLister: Send + Sync {
    fn list_tree(&self, owner: &str, repo: &str, commit: &str) -> impl Future<Output = Result<Vec<String>>> + Send;
}

/// Lists a tree through a shallow, blob-less fetch into a scratch repository.
#[derive(Debug, Clone)]
pub struct BloblessFetch {
    base_url: Url,
    token: Option<String>,
    timeout: Duration,
}

impl BloblessFetch {
    #[must_use]
    pub const fn new(base_url: Url, token: Option<String>, timeout: Duration) -> Self {
        Self { base_url, token, timeout }
    }
}

impl TreeLister for BloblessFetch {
    async fn list_tree(&self, owner: &str, repo: &str, commit: &str) -> Result<Vec<String>> {
        if commit.is_empty() || !commit.chars().all(|c| c.is_ascii_hexdigit()) {
            bail!("'{commit}' is not a commit hash");
        }

        // Removed on drop, whichever way this function returns.
        let scratch = tempfile::Builder::new()
            .prefix("repo-harvest-tree-")
            .tempdir()
            .into_app_err("creating scratch directory")?;
        let dir = scratch.path().to_str().into_app_err("scratch directory path is not valid UTF-8")?;

        let url = remote_url(&self.base_url, owner, repo, self.token.as_deref())?;

        let output = run_git(&["init", "--quiet", dir], self.timeout).await?;
        check_git_output(&output, "git init")?;

        let output = run_git(
            &["-C", dir, "fetch", "--quiet", "--depth", "1", "--filter=blob:none", url.as_str(), commit],
            self.timeout,
        )
        .await?;
        check_git_output(&output, &format!("git fetch {owner}/{repo}@{commit}"))?;

        let output = run_git(&["-C", dir, "ls-tree", "-r", "--name-only", "FETCH_HEAD"], self.timeout).await?;
        check_git_output(&output, "git ls-tree")?;

        Ok(String::from_utf8_lossy(&output.stdout).lines().map(str::to_string).collect())
    }
}

/// Resolves and caches the file listing of commits.
///
/// Commits never change, so the cache should be [`Cache::immutable`].
#[derive(Debug)]
pub struct TreeResolver<L> {
    lister: L,
    cache: Cache,
}

impl<L: TreeLister> TreeResolver<L> {
    #[must_use]
    pub const fn new(lister: L, cache: Cache) -> Self {
        Self { lister, cache }
    }

    /// The paths tracked at `commit`, and whether they came from the cache.
    pub async fn tree(&self, owner: &str, repo: &str, commit: &str) -> Result<(Vec<String>, bool)> {
        let file = format!("trees/{}.json", sanitize_path_component(commit));
        if let CacheResult::Data(paths) = self.cache.load::<Vec<String>>(&file) {
            return Ok((paths, true));
        }

        let start = std::time::Instant::now();
        let paths = self.lister.list_tree(owner, repo, commit).await?;
        log::debug!(
            target: LOG_TARGET,
            "Listed {} path(s) of {owner}/{repo}@{commit} in {:.3}s",
            paths.len(),
            start.elapsed().as_secs_f64()
        );

        if let Err(e) = self.cache.save(&file, &paths) {
            log::warn!(target: LOG_TARGET, "Could not cache tree of {owner}/{repo}@{commit}: {e}");
        }
        Ok((paths, false))
    }
}

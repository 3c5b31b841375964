use super::LOG_TARGET;
use super::command::{check_git_output, mask_secret, remote_url, run_git};
use crate::Result;
use crate::cache::{Cache, CacheResult};
use crate::path_utils::sanitize_path_component;
use chrono::{DateTime, Utc};
use core::future::Future;
use core::time::Duration;
use ohno::AppError;
use serde::{Deserialize, Serialize};
use std::collections::{BTreeMap, HashMap};
use url::Url;

const TAG_PREFIX: &str = "refs/tags/";
const HEAD_PREFIX: &str = "refs/heads/";
const DEREF_SUFFIX: &str = "^{}";

/// Lists the refs a remote repository advertises.
pub trait RefLister: Send + Sync {
    /// Raw `<hash>\t<ref>` advertisement lines.
    fn list_refs(&self, owner: &str, repo: &str) -> impl Future<Output = Result<String>> + Send;
}

/// `git ls-remote` against the hosting service.
#[derive(Debug, Clone)]
pub struct LsRemote {
    base_url: Url,
    token: Option<String>,
    timeout: Duration,
}

impl LsRemote {
    #[must_use]
    pub const fn new(base_url: Url, token: Option<String>, timeout: Duration) -> Self {
        Self { base_url, token, timeout }
    }
}

impl RefLister for LsRemote {
    async fn list_refs(&self, owner: &str, repo: &str) -> Result<String> {
        let url = remote_url(&self.base_url, owner, repo, self.token.as_deref())?;
        let output = run_git(&["ls-remote", url.as_str()], self.timeout).await?;
        check_git_output(&output, &format!("git ls-remote {}", mask_secret(url.as_str())))?;
        Ok(String::from_utf8_lossy(&output.stdout).into_owned())
    }
}

/// Every ref of one repository, by full and short name.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CachedRefSet {
    pub fetched_at: DateTime<Utc>,
    pub refs: BTreeMap<String, String>,
}

impl CachedRefSet {
    /// Look `name` up as given, then as a tag, then as a branch.
    #[must_use]
    pub fn resolve(&self, name: &str) -> Option<&str> {
        self.refs
            .get(name)
            .or_else(|| self.refs.get(&format!("{TAG_PREFIX}{name}")))
            .or_else(|| self.refs.get(&format!("{HEAD_PREFIX}{name}")))
            .map(String::as_str)
    }

    /// Short names of every tag.
    #[must_use]
    pub fn tags(&self) -> Vec<&str> {
        self.refs.keys().filter_map(|k| k.strip_prefix(TAG_PREFIX)).collect()
    }
}

/// Precedence of an entry for its short name: a dereferenced tag beats the tag object, which
/// beats a branch of the same name.
fn short_rank(full: &str, dereferenced: bool) -> u8 {
    match (full.starts_with(TAG_PREFIX), dereferenced) {
        (true, true) => 3,
        (true, false) => 2,
        _ => 1,
    }
}

fn short_name(full: &str) -> Option<&str> {
    full.strip_prefix(TAG_PREFIX).or_else(|| full.strip_prefix(HEAD_PREFIX))
}

/// Parse `git ls-remote` output into a map from full and short ref names to commit hashes.
///
/// An annotated tag shows up twice: once for the tag object and once, suffixed with `^{}`, for
/// the commit it points to. The commit always wins.
#[must_use]
pub fn parse_ls_remote(output: &str) -> BTreeMap<String, String> {
    let mut refs = BTreeMap::new();
    let mut full_is_deref: HashMap<String, bool> = HashMap::new();
    let mut short_ranks: HashMap<String, u8> = HashMap::new();

    for line in output.lines() {
        let mut parts = line.split_whitespace();
        let (Some(hash), Some(name)) = (parts.next(), parts.next()) else {
            continue;
        };

        let (full, dereferenced) = match name.strip_suffix(DEREF_SUFFIX) {
            Some(base) => (base, true),
            None => (name, false),
        };

        let existing_deref = full_is_deref.get(full).copied();
        if existing_deref == Some(true) || (existing_deref == Some(false) && !dereferenced) {
            continue;
        }
        let _ = full_is_deref.insert(full.to_string(), dereferenced);
        let _ = refs.insert(full.to_string(), hash.to_string());

        if let Some(short) = short_name(full) {
            let rank = short_rank(full, dereferenced);
            if short_ranks.get(short).is_none_or(|&r| rank > r) {
                let _ = short_ranks.insert(short.to_string(), rank);
                let _ = refs.insert(short.to_string(), hash.to_string());
            }
        }
    }

    refs
}

/// Outcome of resolving one ref name.
#[derive(Debug)]
pub enum RefLookup {
    Found(String),
    NotFound,
    Error(AppError),
}

/// A [`RefLookup`] plus where it came from.
#[derive(Debug)]
pub struct Resolution {
    pub lookup: RefLookup,
    pub cached: bool,
    pub total_refs: usize,
}

/// Resolves branch and tag names to commits over the git protocol.
///
/// The full ref advertisement of each repository is cached on disk and reused until it is older
/// than the cache's TTL.
#[derive(Debug)]
pub struct RefResolver<L> {
    lister: L,
    cache: Cache,
}

impl<L: RefLister> RefResolver<L> {
    #[must_use]
    pub const fn new(lister: L, cache: Cache) -> Self {
        Self { lister, cache }
    }

    fn cache_file(owner: &str, repo: &str) -> String {
        format!("refs/{}/{}.json", sanitize_path_component(owner), sanitize_path_component(repo))
    }

    /// Fetch every ref of a repository. The flag reports whether the set came from the cache.
    pub async fn ref_set(&self, owner: &str, repo: &str) -> Result<(CachedRefSet, bool)> {
        let file = Self::cache_file(owner, repo);
        if let CacheResult::Data(set) = self.cache.load::<CachedRefSet>(&file) {
            return Ok((set, true));
        }

        let output = self.lister.list_refs(owner, repo).await?;

        let set = CachedRefSet {
            fetched_at: Utc::now(),
            refs: parse_ls_remote(&output),
        };
        log::debug!(target: LOG_TARGET, "{owner}/{repo} advertises {} ref name(s)", set.refs.len());

        if let Err(e) = self.cache.save(&file, &set) {
            log::warn!(target: LOG_TARGET, "Could not cache refs of {owner}/{repo}: {e}");
        }
        Ok((set, false))
    }

    /// Resolve `name`, trying it verbatim, then as a tag, then as a branch.
    pub async fn resolve(&self, owner: &str, repo: &str, name: &str) -> Resolution {
        match self.ref_set(owner, repo).await {
            Ok((set, cached)) => Resolution {
                lookup: set.resolve(name).map_or(RefLookup::NotFound, |hash| RefLookup::Found(hash.to_string())),
                cached,
                total_refs: set.refs.len(),
            },
            Err(e) => Resolution {
                lookup: RefLookup::Error(e),
                cached: false,
                total_refs: 0,
            },
        }
    }
}

use chrono::{DateTime, Utc};
use core::cmp::Ordering;
use serde::{Deserialize, Serialize};

/// Where a release record came from.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ReleaseSource {
    /// A release object published through the hosting API.
    #[default]
    GithubRelease,

    /// A bare tag seen in the ref advertisement, with no release object behind it.
    GitTag,
}

/// A published release (or inferred tag) of a repository. Immutable once fetched.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ReleaseRecord {
    pub repository_id: u64,
    pub tag_name: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub published_at: Option<DateTime<Utc>>,
    #[serde(default)]
    pub prerelease: bool,
    #[serde(default)]
    pub draft: bool,
    #[serde(default)]
    pub source: ReleaseSource,
}

impl ReleaseRecord {
    /// Build a release from a bare tag name. Tags that parse as a semantic version with a
    /// pre-release component are flagged as prereleases.
    #[must_use]
    pub fn from_tag(repository_id: u64, tag_name: impl Into<String>) -> Self {
        let tag_name = tag_name.into();
        let prerelease = tag_version(&tag_name).is_some_and(|v| !v.pre.is_empty());
        Self {
            repository_id,
            tag_name,
            published_at: None,
            prerelease,
            draft: false,
            source: ReleaseSource::GitTag,
        }
    }

    #[must_use]
    pub const fn is_stable(&self) -> bool {
        !self.prerelease && !self.draft
    }
}

/// Minimal release object returned by the releases endpoint.
#[derive(Debug, Deserialize)]
pub struct ApiRelease {
    pub tag_name: String,
    pub published_at: Option<DateTime<Utc>>,
    pub created_at: Option<DateTime<Utc>>,
    #[serde(default)]
    pub prerelease: bool,
    #[serde(default)]
    pub draft: bool,
}

impl ApiRelease {
    #[must_use]
    pub fn into_record(self, repository_id: u64) -> ReleaseRecord {
        ReleaseRecord {
            repository_id,
            tag_name: self.tag_name,
            published_at: self.published_at.or(self.created_at),
            prerelease: self.prerelease,
            draft: self.draft,
            source: ReleaseSource::GithubRelease,
        }
    }
}

/// Sort releases newest first.
///
/// Dated releases come first, by publish time. Undated ones (bare tags) follow, ordered by
/// semantic version when the tag parses as one, then by name.
pub fn sort_releases(releases: &mut [ReleaseRecord]) {
    releases.sort_by(|a, b| match (a.published_at, b.published_at) {
        (Some(x), Some(y)) => y.cmp(&x),
        (Some(_), None) => Ordering::Less,
        (None, Some(_)) => Ordering::Greater,
        (None, None) => match (tag_version(&a.tag_name), tag_version(&b.tag_name)) {
            (Some(x), Some(y)) => y.cmp(&x),
            (Some(_), None) => Ordering::Less,
            (None, Some(_)) => Ordering::Greater,
            (None, None) => b.tag_name.cmp(&a.tag_name),
        },
    });
}

fn tag_version(tag: &str) -> Option<semver::Version> {
    let trimmed = tag.strip_prefix('v').or_else(|| tag.strip_prefix('V')).unwrap_or(tag);
    semver::Version::parse(trimmed).ok()
}

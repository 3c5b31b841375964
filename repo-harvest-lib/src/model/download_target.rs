use serde::{Deserialize, Serialize};
use strum::Display;

/// What kind of ref a download target was resolved from.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Display)]
#[serde(rename_all = "lowercase")]
#[strum(serialize_all = "lowercase")]
pub enum RefKind {
    Branch,
    Release,
}

/// The immutable commit a repository's content is fetched from.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct DownloadTarget {
    #[serde(rename = "ref")]
    pub ref_name: String,
    #[serde(rename = "ref_type")]
    pub ref_kind: RefKind,
    pub commit_sha: String,
    pub commit_sha_short: String,
}

impl DownloadTarget {
    const SHORT_SHA_LEN: usize = 7;

    #[must_use]
    pub fn new(ref_name: impl Into<String>, ref_kind: RefKind, commit_sha: impl Into<String>) -> Self {
        let commit_sha = commit_sha.into();
        let commit_sha_short = commit_sha.chars().take(Self::SHORT_SHA_LEN).collect();
        Self {
            ref_name: ref_name.into(),
            ref_kind,
            commit_sha,
            commit_sha_short,
        }
    }
}

#[cfg(test)]
#[cfg_attr(coverage_nightly, coverage(off))]
mod tests {
    use super::*;

    #[test]
    fn short_sha_is_derived() {
        let target = DownloadTarget::new("v1.0", RefKind::Release, "0123456789abcdef");
        assert_eq!(target.commit_sha_short, "0123456");
        assert_eq!(target.ref_kind.to_string(), "release");
    }

    #[test]
    fn serialized_field_names_are_stable() {
        let target = DownloadTarget::new("main", RefKind::Branch, "abc");
        let json = serde_json::to_value(&target).unwrap();
        assert_eq!(json["ref"], "main");
        assert_eq!(json["ref_type"], "branch");
        assert_eq!(json["commit_sha_short"], "abc");
    }
}

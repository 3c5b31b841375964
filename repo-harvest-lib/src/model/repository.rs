use super::{DownloadTarget, ReleaseRecord};
use chrono::{DateTime, Utc};
use core::fmt::{Display, Formatter};
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};
use std::path::PathBuf;

fn default_branch() -> String {
    "main".to_string()
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct License {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub spdx_id: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub name: Option<String>,
}

/// A repository as it moves through the pipeline.
///
/// `id` is assigned by the hosting service and identifies the record across every stage.
/// Everything else is filled in or refreshed by successive stages. Fields this type doesn't
/// know about are kept in [`extra`](Self::extra) and written back out unchanged.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RepositoryRecord {
    pub id: u64,
    pub owner: String,
    pub name: String,
    #[serde(default)]
    pub stars: u64,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub created_at: Option<DateTime<Utc>>,
    #[serde(default = "default_branch")]
    pub default_branch: String,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub topics: Vec<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub license: Option<License>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub description: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub language: Option<String>,

    /// Number of releases the repository has, when the release stage has run.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub total_releases: Option<u32>,

    /// The most recent releases, newest first, followed by the latest stable release when
    /// none of those is stable.
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub releases: Vec<ReleaseRecord>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub download_target: Option<DownloadTarget>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub tree_path: Option<PathBuf>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub content_path: Option<PathBuf>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub sbom_path: Option<PathBuf>,

    #[serde(flatten)]
    pub extra: Map<String, Value>,
}

impl RepositoryRecord {
    #[must_use]
    pub fn new(id: u64, owner: impl Into<String>, name: impl Into<String>) -> Self {
        Self {
            id,
            owner: owner.into(),
            name: name.into(),
            stars: 0,
            created_at: None,
            default_branch: default_branch(),
            topics: Vec::new(),
            license: None,
            description: None,
            language: None,
            total_releases: None,
            releases: Vec::new(),
            download_target: None,
            tree_path: None,
            content_path: None,
            sbom_path: None,
            extra: Map::new(),
        }
    }

    #[must_use]
    pub fn full_name(&self) -> String {
        format!("{}/{}", self.owner, self.name)
    }

    /// The newest release that is neither a prerelease nor a draft.
    #[must_use]
    pub fn latest_stable_release(&self) -> Option<&ReleaseRecord> {
        self.releases.iter().find(|r| r.is_stable())
    }

    /// Overlay metadata freshly fetched from the API onto this record, keeping identity
    /// and everything later stages added.
    pub fn refresh_metadata(&mut self, api: ApiRepository) {
        self.stars = api.stargazers_count;
        self.created_at = api.created_at.or(self.created_at);
        if let Some(branch) = api.default_branch {
            self.default_branch = branch;
        }
        self.topics = api.topics;
        self.license = api.license;
        self.description = api.description;
        self.language = api.language;
    }
}

impl Display for RepositoryRecord {
    fn fmt(&self, f: &mut Formatter<'_>) -> core::fmt::Result {
        write!(f, "{}/{}", self.owner, self.name)
    }
}

#[derive(Debug, Deserialize)]
pub struct ApiOwner {
    pub login: String,
}

/// Repository object as returned by the search and repository endpoints.
#[derive(Debug, Deserialize)]
pub struct ApiRepository {
    pub id: u64,
    pub name: String,
    pub owner: ApiOwner,
    #[serde(default)]
    pub stargazers_count: u64,
    pub created_at: Option<DateTime<Utc>>,
    pub default_branch: Option<String>,
    #[serde(default)]
    pub topics: Vec<String>,
    pub license: Option<License>,
    pub description: Option<String>,
    pub language: Option<String>,
}

impl ApiRepository {
    #[must_use]
    pub fn into_record(self) -> RepositoryRecord {
        let mut record = RepositoryRecord::new(self.id, self.owner.login.clone(), self.name.clone());
        record.refresh_metadata(self);
        record
    }
}

#[cfg(test)]
#[cfg_attr(coverage_nightly, coverage(off))]
mod tests {
    use super::*;
    use crate::model::RefKind;

    const SEARCH_ITEM: &str = r#"{
        "id": 42,
        "name": "widget",
        "full_name": "acme/widget",
        "owner": { "login": "acme", "id": 7 },
        "stargazers_count": 1234,
        "created_at": "2015-06-01T12:00:00Z",
        "default_branch": "trunk",
        "topics": ["cli", "rust"],
        "license": { "key": "mit", "spdx_id": "MIT", "name": "MIT License" },
        "description": "Makes widgets",
        "language": "Rust"
    }"#;

    #[test]
    fn api_item_converts_to_record() {
        let record = serde_json::from_str::<ApiRepository>(SEARCH_ITEM).unwrap().into_record();
        assert_eq!(record.id, 42);
        assert_eq!(record.full_name(), "acme/widget");
        assert_eq!(record.stars, 1234);
        assert_eq!(record.default_branch, "trunk");
        assert_eq!(record.license.unwrap().spdx_id.as_deref(), Some("MIT"));
    }

    #[test]
    fn unknown_fields_survive_a_round_trip() {
        let line = r#"{"id":1,"owner":"a","name":"b","stars":5,"scorecard":{"score":7.5},"notes":"kept"}"#;
        let record: RepositoryRecord = serde_json::from_str(line).unwrap();
        assert_eq!(record.extra["notes"], "kept");

        let written = serde_json::to_value(&record).unwrap();
        assert_eq!(written["scorecard"]["score"], 7.5);
        assert_eq!(written["notes"], "kept");
    }

    #[test]
    fn missing_optional_fields_take_defaults() {
        let record: RepositoryRecord = serde_json::from_str(r#"{"id":3,"owner":"o","name":"n"}"#).unwrap();
        assert_eq!(record.default_branch, "main");
        assert_eq!(record.stars, 0);
        assert!(record.download_target.is_none());
        assert!(record.extra.is_empty());
    }

    #[test]
    fn latest_stable_skips_prereleases_and_drafts() {
        let mut record = RepositoryRecord::new(1, "o", "n");
        let mut rc = ReleaseRecord::from_tag(1, "v2.0.0-rc.1");
        rc.published_at = Some(Utc::now());
        let mut draft = ReleaseRecord::from_tag(1, "v1.9.0");
        draft.draft = true;
        record.releases = vec![rc, draft, ReleaseRecord::from_tag(1, "v1.8.0")];

        assert_eq!(record.latest_stable_release().unwrap().tag_name, "v1.8.0");
    }

    #[test]
    fn refresh_keeps_later_stage_fields() {
        let mut record = RepositoryRecord::new(42, "acme", "widget");
        record.download_target = Some(DownloadTarget::new("main", RefKind::Branch, "abc"));
        let _ = record.extra.insert("custom".into(), Value::from(1));

        record.refresh_metadata(serde_json::from_str(SEARCH_ITEM).unwrap());
        assert_eq!(record.stars, 1234);
        assert!(record.download_target.is_some());
        assert_eq!(record.extra["custom"], 1);
    }
}

//! Path utilities for safe filesystem operations.

use crate::Result;
use ohno::IntoAppError;
use std::io::Write;
use std::path::Path;

/// Sanitize a string for use as a single path component.
///
/// Owner names, repository names, and ref names come from the remote API and may contain
/// characters that are unsafe in a path (a branch called `feature/x`, say). Traversal
/// sequences are neutralized and separators are flattened.
#[must_use]
pub fn sanitize_path_component(s: &str) -> String {
    let s = s.replace("..", "__");
    s.replace(['/', '\\', ':', '*', '?', '"', '<', '>', '|'], "_")
}

/// Build a relative path `owner/repo/...` from untrusted components.
#[must_use]
pub fn repo_relative_path(owner: &str, repo: &str, rest: &[&str]) -> std::path::PathBuf {
    let mut path = std::path::PathBuf::from(sanitize_path_component(owner));
    path.push(sanitize_path_component(repo));
    for component in rest {
        path.push(sanitize_path_component(component));
    }
    path
}

/// Write `bytes` to `path` through a temporary sibling, creating parent directories.
///
/// Readers see either the previous file or the complete new one.
pub fn write_atomically(path: &Path, bytes: &[u8]) -> Result<()> {
    let parent = path.parent().unwrap_or_else(|| Path::new("."));
    std::fs::create_dir_all(parent).into_app_err_with(|| format!("creating directory '{}'", parent.display()))?;

    let mut tmp = tempfile::NamedTempFile::new_in(parent).into_app_err_with(|| format!("creating temporary file in '{}'", parent.display()))?;
    tmp.write_all(bytes).into_app_err_with(|| format!("writing '{}'", path.display()))?;
    let _ = tmp.persist(path).into_app_err_with(|| format!("moving '{}' into place", path.display()))?;
    Ok(())
}

#[cfg(test)]
#[cfg_attr(coverage_nightly, coverage(off))]
mod tests {
    use super::*;

    #[test]
    fn normal_names_are_untouched() {
        assert_eq!(sanitize_path_component("tokio"), "tokio");
        assert_eq!(sanitize_path_component("my.repo"), "my.repo");
        assert_eq!(sanitize_path_component("v1.2.3"), "v1.2.3");
    }

    #[test]
    fn traversal_is_neutralized() {
        assert_eq!(sanitize_path_component(".."), "__");
        assert_eq!(sanitize_path_component("../../etc/passwd"), "______etc_passwd");
    }

    #[test]
    fn branch_names_with_slashes_are_flattened() {
        assert_eq!(sanitize_path_component("feature/new-api"), "feature_new-api");
        assert_eq!(sanitize_path_component("release\\1.0"), "release_1.0");
    }

    #[test]
    fn repo_relative_path_joins_sanitized_components() {
        let path = repo_relative_path("octo", "hello/world", &["main", "abc123"]);
        assert_eq!(path, std::path::Path::new("octo/hello_world/main/abc123"));
    }

    #[test]
    fn write_atomically_creates_parents_and_replaces() {
        let tmp = tempfile::tempdir().unwrap();
        let path = tmp.path().join("a/b/out.json");
        write_atomically(&path, b"one").unwrap();
        write_atomically(&path, b"two").unwrap();
        assert_eq!(std::fs::read(&path).unwrap(), b"two");
    }
}

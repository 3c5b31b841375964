use crate::Result;
use fs4::fs_std::FileExt;
use ohno::{IntoAppError, bail};
use std::fs::{File, OpenOptions};
use std::path::{Path, PathBuf};

const LOG_TARGET: &str = "      lock";

/// Guard that releases a stage lock when dropped
#[derive(Debug)]
pub struct StageLockGuard {
    file: File,
    path: PathBuf,
}

impl Drop for StageLockGuard {
    fn drop(&mut self) {
        if let Err(e) = self.file.unlock() {
            log::warn!(target: LOG_TARGET, "Could not unlock '{}': {e:#}", self.path.display());
        }
    }
}

/// Take the advisory lock guarding a stage output file.
///
/// A stage file is only deduplicated within one process, so two runs appending to the same
/// file would duplicate records. The second run fails fast instead of waiting.
pub fn acquire_stage_lock(output: &Path) -> Result<StageLockGuard> {
    let path = output.with_extension("lock");
    if let Some(parent) = path.parent() {
        std::fs::create_dir_all(parent).into_app_err_with(|| format!("creating directory '{}'", parent.display()))?;
    }

    let file = OpenOptions::new()
        .write(true)
        .create(true)
        .truncate(false)
        .open(&path)
        .into_app_err_with(|| format!("opening lock file '{}'", path.display()))?;

    match file.try_lock_exclusive() {
        Ok(true) => {
            log::debug!(target: LOG_TARGET, "Acquired '{}'", path.display());
            Ok(StageLockGuard { file, path })
        }
        Ok(false) => bail!("'{}' is being written by another run (lock '{}' is held)", output.display(), path.display()),
        Err(e) => Err(e).into_app_err_with(|| format!("locking '{}'", path.display())),
    }
}

#[cfg(test)]
#[cfg_attr(coverage_nightly, coverage(off))]
mod tests {
    use super::*;

    #[test]
    fn lock_file_sits_beside_output() {
        let tmp = tempfile::tempdir().unwrap();
        let output = tmp.path().join("metadata/go.jsonl");

        let guard = acquire_stage_lock(&output).unwrap();
        assert!(tmp.path().join("metadata/go.lock").exists());
        drop(guard);
    }

    #[test]
    fn second_holder_is_refused_until_release() {
        let tmp = tempfile::tempdir().unwrap();
        let output = tmp.path().join("search/rust.jsonl");

        let guard = acquire_stage_lock(&output).unwrap();
        let _ = acquire_stage_lock(&output).unwrap_err();
        drop(guard);

        let _ = acquire_stage_lock(&output).unwrap();
    }
}

use crate::Result;
use crate::model::RepositoryRecord;
use ohno::IntoAppError;
use serde::Deserialize;
use std::collections::HashSet;
use std::fs::{self, File, OpenOptions};
use std::io::{BufRead, BufReader, Read, Seek, SeekFrom, Write};
use std::path::{Path, PathBuf};
use std::sync::Mutex;

const LOG_TARGET: &str = "     store";

/// The fields replay needs; everything else on a line is ignored.
#[derive(Deserialize)]
struct Identity {
    id: u64,
    #[serde(default)]
    stars: Option<u64>,
}

#[derive(Debug)]
struct Inner {
    seen: HashSet<u64>,
    min_stars_seen: Option<u64>,
    file: File,
}

/// Append-only JSONL record file with an in-memory index of the ids it holds.
///
/// Opening replays the file to rebuild the index. Each [`save`](Self::save) is one write of a
/// complete line followed by a flush, so a killed process loses at most the record in flight.
#[derive(Debug)]
pub struct DedupStore {
    path: PathBuf,
    inner: Mutex<Inner>,
}

impl DedupStore {
    /// Open a store, replaying any records already in the file.
    pub fn open(path: impl Into<PathBuf>) -> Result<Self> {
        let path = path.into();
        create_parent(&path)?;

        let mut file = OpenOptions::new()
            .read(true)
            .append(true)
            .create(true)
            .open(&path)
            .into_app_err_with(|| format!("opening record file '{}'", path.display()))?;

        let mut seen = HashSet::new();
        let mut min_stars_seen: Option<u64> = None;
        let mut bad_lines = 0usize;

        for line in BufReader::new(&file).lines() {
            let line = line.into_app_err_with(|| format!("reading record file '{}'", path.display()))?;
            if line.trim().is_empty() {
                continue;
            }
            match serde_json::from_str::<Identity>(&line) {
                Ok(identity) => {
                    let _ = seen.insert(identity.id);
                    if let Some(stars) = identity.stars {
                        min_stars_seen = Some(min_stars_seen.map_or(stars, |m| m.min(stars)));
                    }
                }
                Err(_) => bad_lines += 1,
            }
        }

        if bad_lines > 0 {
            log::warn!(target: LOG_TARGET, "Skipped {bad_lines} unreadable line(s) in '{}'", path.display());
        }

        terminate_partial_line(&mut file, &path)?;

        log::debug!(target: LOG_TARGET, "Opened '{}' with {} record(s)", path.display(), seen.len());

        Ok(Self {
            path,
            inner: Mutex::new(Inner { seen, min_stars_seen, file }),
        })
    }

    /// Open a store after discarding whatever the file held.
    pub fn open_truncated(path: impl Into<PathBuf>) -> Result<Self> {
        let path = path.into();
        create_parent(&path)?;
        let _ = File::create(&path).into_app_err_with(|| format!("truncating record file '{}'", path.display()))?;
        Self::open(path)
    }

    #[must_use]
    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Append a record unless its id is already present. Returns whether it was written.
    pub fn save(&self, record: &RepositoryRecord) -> Result<bool> {
        let mut line = serde_json::to_vec(record).into_app_err("serializing record")?;
        line.push(b'\n');

        let mut inner = self.inner.lock().expect("lock not poisoned");
        if inner.seen.contains(&record.id) {
            return Ok(false);
        }

        let file = &mut inner.file;
        file.write_all(&line)
            .and_then(|()| file.flush())
            .into_app_err_with(|| format!("appending to '{}'", self.path.display()))?;

        let _ = inner.seen.insert(record.id);
        inner.min_stars_seen = Some(inner.min_stars_seen.map_or(record.stars, |m| m.min(record.stars)));
        Ok(true)
    }

    #[must_use]
    pub fn contains(&self, id: u64) -> bool {
        self.inner.lock().expect("lock not poisoned").seen.contains(&id)
    }

    #[must_use]
    pub fn len(&self) -> usize {
        self.inner.lock().expect("lock not poisoned").seen.len()
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Lowest star count among stored records, if any carried one.
    #[must_use]
    pub fn min_stars_seen(&self) -> Option<u64> {
        self.inner.lock().expect("lock not poisoned").min_stars_seen
    }
}

fn create_parent(path: &Path) -> Result<()> {
    if let Some(parent) = path.parent() {
        fs::create_dir_all(parent).into_app_err_with(|| format!("creating directory '{}'", parent.display()))?;
    }
    Ok(())
}

/// A crash mid-write can leave a final line without its newline; close it off so the next
/// append starts on a fresh line.
fn terminate_partial_line(file: &mut File, path: &Path) -> Result<()> {
    let len = file.metadata().into_app_err_with(|| format!("inspecting '{}'", path.display()))?.len();
    if len == 0 {
        return Ok(());
    }

    let mut last = [0u8; 1];
    let _ = file
        .seek(SeekFrom::Start(len - 1))
        .into_app_err_with(|| format!("seeking in '{}'", path.display()))?;
    file.read_exact(&mut last).into_app_err_with(|| format!("reading '{}'", path.display()))?;

    if last[0] != b'\n' {
        log::warn!(target: LOG_TARGET, "'{}' ends with a partial line, terminating it", path.display());
        file.write_all(b"\n").into_app_err_with(|| format!("repairing '{}'", path.display()))?;
    }
    Ok(())
}

#[cfg(test)]
#[cfg_attr(coverage_nightly, coverage(off))]
mod tests {
    use super::*;

    fn record(id: u64, stars: u64) -> RepositoryRecord {
        let mut r = RepositoryRecord::new(id, "owner", format!("repo{id}"));
        r.stars = stars;
        r
    }

    fn line_count(path: &Path) -> usize {
        fs::read_to_string(path).unwrap().lines().filter(|l| !l.is_empty()).count()
    }

    #[test]
    fn second_save_of_same_id_is_rejected() {
        let tmp = tempfile::tempdir().unwrap();
        let path = tmp.path().join("out.jsonl");
        let store = DedupStore::open(&path).unwrap();

        assert!(store.save(&record(1, 10)).unwrap());
        assert!(!store.save(&record(1, 99)).unwrap());
        assert_eq!(line_count(&path), 1);
        assert!(store.contains(1));
        assert_eq!(store.len(), 1);
    }

    #[test]
    fn reopen_replays_ids_and_min_stars() {
        let tmp = tempfile::tempdir().unwrap();
        let path = tmp.path().join("nested/dir/out.jsonl");
        {
            let store = DedupStore::open(&path).unwrap();
            let _ = store.save(&record(1, 500)).unwrap();
            let _ = store.save(&record(2, 120)).unwrap();
            let _ = store.save(&record(3, 300)).unwrap();
        }

        let store = DedupStore::open(&path).unwrap();
        assert_eq!(store.len(), 3);
        assert_eq!(store.min_stars_seen(), Some(120));
        assert!(!store.save(&record(2, 120)).unwrap());
        assert_eq!(line_count(&path), 3);
    }

    #[test]
    fn unreadable_lines_are_skipped() {
        let tmp = tempfile::tempdir().unwrap();
        let path = tmp.path().join("out.jsonl");
        fs::write(&path, "{\"id\":1,\"owner\":\"o\",\"name\":\"n\"}\nnot json\n\n{\"id\":2}\n").unwrap();

        let store = DedupStore::open(&path).unwrap();
        assert_eq!(store.len(), 2);
        assert_eq!(store.min_stars_seen(), None);
    }

    #[test]
    fn partial_trailing_line_does_not_swallow_next_record() {
        let tmp = tempfile::tempdir().unwrap();
        let path = tmp.path().join("out.jsonl");
        fs::write(&path, "{\"id\":1,\"stars\":5}\n{\"id\":2,\"sta").unwrap();

        let store = DedupStore::open(&path).unwrap();
        assert_eq!(store.len(), 1);
        assert!(store.save(&record(3, 7)).unwrap());
        drop(store);

        let reopened = DedupStore::open(&path).unwrap();
        assert!(reopened.contains(1));
        assert!(reopened.contains(3));
        assert!(!reopened.contains(2));
    }

    #[test]
    fn truncated_open_starts_empty() {
        let tmp = tempfile::tempdir().unwrap();
        let path = tmp.path().join("out.jsonl");
        {
            let store = DedupStore::open(&path).unwrap();
            let _ = store.save(&record(1, 1)).unwrap();
        }

        let store = DedupStore::open_truncated(&path).unwrap();
        assert!(store.is_empty());
        assert_eq!(line_count(&path), 0);
    }
}

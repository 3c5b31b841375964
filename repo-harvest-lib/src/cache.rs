//! A reusable cache backed by JSON files with TTL-aware loading.
//!
//! [`Cache`] wraps a cache directory, TTL, and timestamp so that callers
//! don't need to thread those values through every load/save call. It backs the
//! gateway's response cache, the ref resolver's per-repository ref sets, and the
//! tree resolver's per-commit listings.

use crate::Result;
use chrono::{DateTime, Utc};
use core::time::Duration;
use ohno::IntoAppError;
use serde::{Deserialize, Serialize};
use std::fs::{self, File};
use std::io::{BufReader, BufWriter, Write};
use std::path::{Path, PathBuf};

const LOG_TARGET: &str = "     cache";

/// Result of loading an entry from the cache.
#[derive(Debug, Clone)]
pub enum CacheResult<T> {
    /// Cached data was found and is still fresh.
    Data(T),

    /// A negative cache entry exists: the remote side said the data does not exist.
    NoData(String),

    /// No usable cache entry exists (miss, expired, corrupt, or the cache is bypassed).
    Miss,
}

impl<T> CacheResult<T> {
    /// Returns `true` for both positive and negative hits.
    #[must_use]
    pub const fn is_hit(&self) -> bool {
        !matches!(self, Self::Miss)
    }
}

/// On-disk representation of a cache entry.
#[derive(Debug, Clone, Deserialize, Serialize)]
pub(crate) struct Envelope<T> {
    pub(crate) timestamp: DateTime<Utc>,
    pub(crate) payload: EnvelopePayload<T>,
}

/// The payload within an [`Envelope`].
#[derive(Debug, Clone, Deserialize, Serialize)]
pub(crate) enum EnvelopePayload<T> {
    Data(T),
    NoData(String),
}

/// A TTL-aware, directory-backed JSON cache.
///
/// Writes go through a temporary file in the target directory followed by a rename, so
/// concurrent readers never observe a half-written entry.
#[derive(Debug, Clone)]
pub struct Cache {
    dir: PathBuf,
    ttl: Duration,
    now: DateTime<Utc>,
    bypass: bool,
}

impl Cache {
    /// Create a new cache.
    ///
    /// With `bypass` set every load is a miss, while saves still refresh the stored entries.
    #[must_use]
    pub fn new(cache_dir: impl Into<PathBuf>, ttl: Duration, now: DateTime<Utc>, bypass: bool) -> Self {
        Self {
            dir: cache_dir.into(),
            ttl,
            now,
            bypass,
        }
    }

    /// A cache whose entries never expire, for data keyed by an immutable identifier.
    #[must_use]
    pub fn immutable(cache_dir: impl Into<PathBuf>, now: DateTime<Utc>) -> Self {
        Self::new(cache_dir, Duration::MAX, now, false)
    }

    #[must_use]
    pub fn dir(&self) -> &Path {
        &self.dir
    }

    #[must_use]
    pub const fn ttl(&self) -> Duration {
        self.ttl
    }

    #[must_use]
    pub const fn now(&self) -> DateTime<Utc> {
        self.now
    }

    /// Load a cache entry by filename (relative to the cache directory).
    #[must_use]
    pub fn load<T>(&self, filename: &str) -> CacheResult<T>
    where
        T: for<'de> Deserialize<'de>,
    {
        if self.bypass {
            return CacheResult::Miss;
        }

        let path = self.dir.join(filename);
        let file = match File::open(&path) {
            Ok(file) => file,
            Err(e) => {
                log::trace!(target: LOG_TARGET, "Cache miss for {filename}: {e:#}");
                return CacheResult::Miss;
            }
        };

        let envelope: Envelope<T> = match serde_json::from_reader(BufReader::new(file)) {
            Ok(envelope) => envelope,
            Err(e) => {
                log::debug!(target: LOG_TARGET, "Ignoring unreadable cache entry {filename}: {e:#}");
                return CacheResult::Miss;
            }
        };

        let age = self.now.signed_duration_since(envelope.timestamp);
        if age.num_seconds() < 0 {
            log::debug!(target: LOG_TARGET, "Cache timestamp is in the future for {filename} (clock skew), treating as fresh");
        } else {
            let age = age.to_std().unwrap_or(Duration::MAX);
            if age >= self.ttl {
                log::debug!(
                    target: LOG_TARGET,
                    "Cache expired for {filename} (age: {}s, TTL: {}s)",
                    age.as_secs(),
                    self.ttl.as_secs()
                );
                return CacheResult::Miss;
            }
        }

        match envelope.payload {
            EnvelopePayload::Data(data) => CacheResult::Data(data),
            EnvelopePayload::NoData(reason) => CacheResult::NoData(reason),
        }
    }

    /// Save data to the cache under the given filename.
    pub fn save<T: Serialize>(&self, filename: &str, data: &T) -> Result<()> {
        self.write_envelope(
            filename,
            &Envelope {
                timestamp: self.now,
                payload: EnvelopePayload::Data(data),
            },
        )
    }

    /// Save a negative cache entry under the given filename.
    pub fn save_no_data(&self, filename: &str, reason: &str) -> Result<()> {
        self.write_envelope(
            filename,
            &Envelope::<()> {
                timestamp: self.now,
                payload: EnvelopePayload::NoData(reason.to_string()),
            },
        )
    }

    fn write_envelope<T: Serialize>(&self, filename: &str, envelope: &Envelope<T>) -> Result<()> {
        let path = self.dir.join(filename);
        let parent = path.parent().unwrap_or(&self.dir);
        fs::create_dir_all(parent).into_app_err_with(|| format!("creating directory '{}'", parent.display()))?;

        let tmp = tempfile::NamedTempFile::new_in(parent).into_app_err_with(|| format!("creating temporary file in '{}'", parent.display()))?;
        {
            let mut writer = BufWriter::new(tmp.as_file());
            serde_json::to_writer(&mut writer, envelope).into_app_err_with(|| format!("writing cache file '{}'", path.display()))?;
            writer.flush().into_app_err_with(|| format!("flushing cache file '{}'", path.display()))?;
        }

        let _ = tmp
            .persist(&path)
            .into_app_err_with(|| format!("moving cache file into place at '{}'", path.display()))?;
        Ok(())
    }
}

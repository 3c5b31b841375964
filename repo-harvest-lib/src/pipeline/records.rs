use crate::Result;
use crate::model::{Language, RepositoryRecord};
use clap::ValueEnum;
use ohno::IntoAppError;
use std::fs::File;
use std::io::{BufRead, BufReader};
use std::path::{Path, PathBuf};
use strum::{Display, EnumIter, EnumString};

const LOG_TARGET: &str = "   records";

/// The steps of the pipeline, in execution order.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Display, EnumString, EnumIter, ValueEnum)]
#[strum(serialize_all = "lowercase")]
pub enum StageName {
    Search,
    Metadata,
    Releases,
    Commit,
    Tree,
    Content,
    Sbom,
}

impl StageName {
    /// The stage whose output this one consumes.
    #[must_use]
    pub const fn input(self) -> Option<Self> {
        match self {
            Self::Search => None,
            Self::Metadata => Some(Self::Search),
            Self::Releases => Some(Self::Metadata),
            Self::Commit => Some(Self::Releases),
            Self::Tree => Some(Self::Commit),
            Self::Content => Some(Self::Tree),
            Self::Sbom => Some(Self::Content),
        }
    }

    /// `<data_dir>/<stage>/<language>.jsonl`
    #[must_use]
    pub fn file(self, data_dir: &Path, language: Language) -> PathBuf {
        data_dir.join(self.to_string()).join(format!("{language}.jsonl"))
    }
}

/// Read every record in a stage file.
///
/// Lines that fail to parse are logged and skipped. Unknown fields are kept on each record.
pub fn load_records(path: &Path) -> Result<Vec<RepositoryRecord>> {
    let file = File::open(path).into_app_err_with(|| format!("opening input file '{}'", path.display()))?;

    let mut records = Vec::new();
    for (index, line) in BufReader::new(file).lines().enumerate() {
        let line = line.into_app_err_with(|| format!("reading '{}'", path.display()))?;
        if line.trim().is_empty() {
            continue;
        }
        match serde_json::from_str(&line) {
            Ok(record) => records.push(record),
            Err(e) => log::warn!(target: LOG_TARGET, "Skipping line {} of '{}': {e}", index + 1, path.display()),
        }
    }

    log::debug!(target: LOG_TARGET, "Loaded {} record(s) from '{}'", records.len(), path.display());
    Ok(records)
}

/// Count the non-empty lines in a stage file, or `None` if the file doesn't exist.
pub fn count_records(path: &Path) -> Result<Option<usize>> {
    let file = match File::open(path) {
        Ok(file) => file,
        Err(e) if e.kind() == std::io::ErrorKind::NotFound => return Ok(None),
        Err(e) => return Err(e).into_app_err_with(|| format!("opening '{}'", path.display())),
    };

    let mut count = 0;
    for line in BufReader::new(file).lines() {
        let line = line.into_app_err_with(|| format!("reading '{}'", path.display()))?;
        if !line.trim().is_empty() {
            count += 1;
        }
    }
    Ok(Some(count))
}

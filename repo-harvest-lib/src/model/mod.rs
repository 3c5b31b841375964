//! Records that flow between pipeline stages.
//!
//! Every stage reads and writes [`RepositoryRecord`] lines. Known fields are typed; anything
//! else a producer added rides along in an extension map so it survives a round trip through
//! stages that don't know about it.

mod download_target;
mod language;
mod release;
mod repository;

pub use download_target::{DownloadTarget, RefKind};
pub use language::Language;
pub use release::{ApiRelease, ReleaseRecord, ReleaseSource, sort_releases};
pub use repository::{ApiRepository, License, RepositoryRecord};

//! The concrete enrichment steps, each a [`Transform`](crate::pipeline::Transform).
//!
//! | stage      | adds                                   | talks to                    |
//! |------------|----------------------------------------|-----------------------------|
//! | metadata   | stars, topics, license, default branch | REST core pool              |
//! | releases   | recent releases, release count         | REST core pool, ref listing |
//! | commit     | download target                        | ref listing, REST fallback  |
//! | tree       | file listing of the target commit      | blob-less fetch             |
//! | content    | dependency manifests on disk           | raw content host            |
//! | sbom       | derived artifact per repository        | external tool via the CAS   |

mod commit;
mod content;
mod metadata;
mod releases;
mod sbom;
mod tree;

pub use commit::{CommitStage, TargetLookup};
pub use content::ContentStage;
pub use metadata::MetadataStage;
pub use releases::{ReleasesStage, MAX_RELEASE_PAGES, RELEASES_KEPT};
pub use sbom::SbomStage;
pub use tree::{TreeListing, TreeStage};

use crate::gateway::ApiOutcome;
use crate::pipeline::StageCounters;

/// Count a gateway call as a cache hit or a live call.
fn count_call<T>(outcome: &ApiOutcome<T>, counters: &StageCounters) {
    counters.lookup(outcome.was_cached());
}

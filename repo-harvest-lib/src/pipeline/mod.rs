//! The resumable stage machinery every enrichment step runs on.
//!
//! A stage reads the previous stage's JSONL file, skips records its own output already holds,
//! runs a [`Transform`] over the rest on a bounded worker pool, and appends results through a
//! [`DedupStore`]. The output file is the only checkpoint.

mod counters;
mod dedup_store;
mod records;
mod runner;

pub use counters::{CounterSnapshot, StageCounters};
pub use dedup_store::DedupStore;
pub use records::{StageName, count_records, load_records};
pub use runner::{StageOptions, StepOutcome, StopFlag, Transform, run_stage};

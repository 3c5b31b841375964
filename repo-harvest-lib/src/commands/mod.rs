//! Command-line interface and orchestration for repo-harvest
//!
//! This module parses arguments, loads configuration, wires the library components together,
//! and runs one pipeline step per invocation.
//!
//! # Commands
//!
//! - **search**: crawl the search endpoint for every repository of a language above a star
//!   threshold, writing `<data>/search/<language>.jsonl`
//! - **metadata**, **releases**, **commit**, **tree**, **content**, **sbom**: enrichment stages;
//!   each reads the previous stage's file and appends to its own, skipping records already there
//! - **status**: per-language record counts for every stage file
//! - **export**: stream a stage file to the analytical store in batches
//!
//! Every command loads `harvest.toml` (or `--config`) layered over the embedded defaults. A
//! stage file is guarded by an advisory lock for the duration of a run. Ctrl-C stops workers
//! from taking new records; output already appended is kept and the next run resumes from it.

mod common;
mod config;
mod enrich;
mod export;
mod host;
mod run;
mod search;
mod stage_lock;
mod status;

#[cfg(debug_assertions)]
pub use config::Config;

pub use enrich::{StageArgs, enrich};
pub use export::{ExportArgs, export_records};
pub use host::Host;
pub use run::run;
pub use search::{SearchArgs, search};
pub use status::{StatusArgs, status};

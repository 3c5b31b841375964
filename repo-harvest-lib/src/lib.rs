#![doc(hidden)]
#![cfg_attr(coverage_nightly, feature(coverage_attribute))]

//! Core library for repo-harvest
//!
//! This library discovers GitHub repositories for a language and drives a resumable,
//! multi-stage enrichment pipeline over them.
//!
//! # Module Organization
//!
//! - [`gateway`]: Rate-limited, cached, circuit-broken access to the REST API
//! - [`search`]: Exhaustive search crawling past the 1000-result window
//! - [`git`]: Ref and tree resolution over the git wire protocol
//! - [`pipeline`]: Dedup store, counters, and the generic stage runner
//! - [`stages`]: The concrete enrichment stages
//! - [`cas`]: Content-addressable cache for derived artifacts
//! - [`commands`]: Command-line interface and orchestration

pub type Result<T, E = ohno::AppError> = core::result::Result<T, E>;

pub mod cache;
pub mod cas;
pub mod export;
pub mod gateway;
pub mod git;
pub mod model;
pub mod pipeline;
pub mod search;
pub mod stages;

mod path_utils;

#[cfg(any(debug_assertions, test))]
pub mod commands;
#[cfg(not(any(debug_assertions, test)))]
mod commands;

pub use crate::commands::{Host, run};

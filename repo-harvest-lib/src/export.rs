//! Batched hand-off of stage output to an analytical store.
//!
//! The store itself lives outside this crate. It is reached through a [`BatchSink`]; the only
//! sink shipped here writes JSON lines, a format most column stores ingest directly.

use crate::Result;
use crate::model::RepositoryRecord;
use core::future::Future;
use ohno::{IntoAppError, bail};
use std::fs::File;
use std::io::{BufRead, BufReader, Write};
use std::path::Path;

const LOG_TARGET: &str = "    export";

/// Receives records in fixed-size batches.
pub trait BatchSink: Send {
    fn write_batch(&mut self, batch: &[RepositoryRecord]) -> impl Future<Output = Result<()>> + Send;
}

/// Writes each batch as JSON lines to any writer.
#[derive(Debug)]
pub struct JsonLinesSink<W> {
    writer: W,
}

impl<W: Write + Send> JsonLinesSink<W> {
    pub const fn new(writer: W) -> Self {
        Self { writer }
    }

    pub fn into_inner(self) -> W {
        self.writer
    }
}

impl<W: Write + Send> BatchSink for JsonLinesSink<W> {
    async fn write_batch(&mut self, batch: &[RepositoryRecord]) -> Result<()> {
        for record in batch {
            serde_json::to_writer(&mut self.writer, record).into_app_err("serializing record")?;
            self.writer.write_all(b"\n").into_app_err("writing record")?;
        }
        self.writer.flush().into_app_err("flushing batch")
    }
}

/// Totals for one export.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct ExportStats {
    pub records: u64,
    pub batches: u64,
    pub skipped_lines: u64,
}

/// Stream `input` into `sink`, `batch_size` records at a time.
pub async fn export<S: BatchSink>(input: &Path, batch_size: usize, sink: &mut S) -> Result<ExportStats> {
    if batch_size == 0 {
        bail!("batch size must be at least 1");
    }

    let file = File::open(input).into_app_err_with(|| format!("opening '{}'", input.display()))?;
    let mut stats = ExportStats::default();
    let mut batch = Vec::with_capacity(batch_size);

    for line in BufReader::new(file).lines() {
        let line = line.into_app_err_with(|| format!("reading '{}'", input.display()))?;
        if line.trim().is_empty() {
            continue;
        }
        match serde_json::from_str::<RepositoryRecord>(&line) {
            Ok(record) => batch.push(record),
            Err(e) => {
                stats.skipped_lines += 1;
                log::warn!(target: LOG_TARGET, "Skipping unreadable line in '{}': {e}", input.display());
                continue;
            }
        }

        if batch.len() == batch_size {
            sink.write_batch(&batch).await?;
            stats.records += batch.len() as u64;
            stats.batches += 1;
            batch.clear();
        }
    }

    if !batch.is_empty() {
        sink.write_batch(&batch).await?;
        stats.records += batch.len() as u64;
        stats.batches += 1;
    }

    log::info!(
        target: LOG_TARGET,
        "Exported {} record(s) from '{}' in {} batch(es)",
        stats.records,
        input.display(),
        stats.batches
    );
    Ok(stats)
}

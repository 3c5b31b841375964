use super::counters::{CounterSnapshot, StageCounters};
use super::dedup_store::DedupStore;
use super::records::load_records;
use crate::Result;
use crate::model::RepositoryRecord;
use core::future::Future;
use core::sync::atomic::{AtomicBool, Ordering};
use ohno::{AppError, IntoAppError};
use std::path::Path;
use std::sync::Arc;
use tokio::sync::Semaphore;
use tokio::task::{JoinError, JoinSet};

const LOG_TARGET: &str = "  pipeline";

/// What a transform did with one record.
#[derive(Debug)]
pub enum StepOutcome {
    /// The record was enriched and should be appended to the stage output.
    Enriched(RepositoryRecord),

    /// Nothing to do for this record; it is not written and will be retried next run.
    Skipped(String),

    /// Processing this record failed. Counted and logged, the run continues.
    Failed(AppError),

    /// A condition that makes continuing pointless. The run stops dispatching and returns the error.
    Fatal(AppError),
}

/// One enrichment step applied to each record of a stage.
pub trait Transform: Send + Sync + 'static {
    /// Name used in log lines.
    const NAME: &'static str;

    fn apply(&self, record: RepositoryRecord, counters: &StageCounters) -> impl Future<Output = StepOutcome> + Send;
}

/// Cooperative cancellation shared between the interrupt handler and running stages.
#[derive(Debug, Clone, Default)]
pub struct StopFlag(Arc<AtomicBool>);

impl StopFlag {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// A flag that is raised when the process receives Ctrl-C.
    #[must_use]
    pub fn on_ctrl_c() -> Self {
        let flag = Self::new();
        let handle = flag.clone();
        drop(tokio::spawn(async move {
            if tokio::signal::ctrl_c().await.is_ok() {
                log::warn!(target: LOG_TARGET, "Interrupted, finishing in-flight work");
                handle.stop();
            }
        }));
        flag
    }

    pub fn stop(&self) {
        self.0.store(true, Ordering::Release);
    }

    #[must_use]
    pub fn is_stopped(&self) -> bool {
        self.0.load(Ordering::Acquire)
    }
}

/// How a stage run is carried out.
#[derive(Debug, Clone, Copy)]
pub struct StageOptions {
    pub workers: usize,
    /// Reprocess every record, discarding the existing output.
    pub force: bool,
    /// Process at most this many records that aren't already done.
    pub limit: Option<usize>,
}

/// Run `transform` over every record of `input`, appending results to `output`.
///
/// Records already present in `output` are skipped unless `force` is set. At most
/// `options.workers` records are in flight at once; results are appended in completion order.
pub async fn run_stage<T: Transform>(
    transform: Arc<T>,
    input: &Path,
    output: &Path,
    options: StageOptions,
    stop: &StopFlag,
) -> Result<CounterSnapshot> {
    let records = load_records(input)?;
    let store = if options.force {
        DedupStore::open_truncated(output)?
    } else {
        DedupStore::open(output)?
    };

    log::info!(
        target: LOG_TARGET,
        "{}: {} input record(s), {} already done",
        T::NAME,
        records.len(),
        store.len()
    );

    let counters = Arc::new(StageCounters::new());
    let semaphore = Arc::new(Semaphore::new(options.workers.max(1)));
    let mut tasks = JoinSet::new();
    let mut fatal: Option<AppError> = None;
    let mut dispatched = 0usize;

    for record in records {
        while let Some(joined) = tasks.try_join_next() {
            settle::<T>(joined, &store, &counters, &mut fatal);
        }

        if fatal.is_some() || stop.is_stopped() {
            break;
        }

        counters.processed();
        if store.contains(record.id) {
            counters.skipped();
            continue;
        }

        if options.limit.is_some_and(|limit| dispatched >= limit) {
            break;
        }
        dispatched += 1;

        let permit = Arc::clone(&semaphore).acquire_owned().await.into_app_err("worker pool closed")?;
        let transform = Arc::clone(&transform);
        let counters = Arc::clone(&counters);
        let _ = tasks.spawn(async move {
            let _permit = permit;
            let label = record.full_name();
            (label, transform.apply(record, &counters).await)
        });
    }

    while let Some(joined) = tasks.join_next().await {
        settle::<T>(joined, &store, &counters, &mut fatal);
    }

    let snapshot = counters.snapshot();
    if let Some(e) = fatal {
        log::error!(target: LOG_TARGET, "{} aborted: {snapshot}", T::NAME);
        return Err(e);
    }

    if stop.is_stopped() {
        log::warn!(target: LOG_TARGET, "{} interrupted: {snapshot}", T::NAME);
    } else {
        log::info!(target: LOG_TARGET, "{} done: {snapshot}", T::NAME);
    }
    Ok(snapshot)
}

fn settle<T: Transform>(
    joined: core::result::Result<(String, StepOutcome), JoinError>,
    store: &DedupStore,
    counters: &StageCounters,
    fatal: &mut Option<AppError>,
) {
    match joined {
        Ok((_, StepOutcome::Enriched(record))) => match store.save(&record) {
            Ok(true) => counters.enriched(),
            Ok(false) => counters.skipped(),
            Err(e) => {
                counters.failed();
                log::error!(target: LOG_TARGET, "{}: could not save {record}: {e:#}", T::NAME);
            }
        },
        Ok((label, StepOutcome::Skipped(reason))) => {
            counters.skipped();
            log::debug!(target: LOG_TARGET, "{}: skipped {label}: {reason}", T::NAME);
        }
        Ok((label, StepOutcome::Failed(e))) => {
            counters.failed();
            log::warn!(target: LOG_TARGET, "{}: {label} failed: {e:#}", T::NAME);
        }
        Ok((label, StepOutcome::Fatal(e))) => {
            counters.failed();
            log::error!(target: LOG_TARGET, "{}: fatal error on {label}: {e:#}", T::NAME);
            if fatal.is_none() {
                *fatal = Some(e);
            }
        }
        Err(e) => {
            counters.failed();
            log::error!(target: LOG_TARGET, "{}: worker panicked: {e}", T::NAME);
        }
    }
}

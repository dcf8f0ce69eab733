/// Work dispatch: runs the collector over a batch of paths with bounded
/// parallelism.
///
/// The pool is behind the [`Executor`] trait so the same dispatcher can run
/// on a dedicated rayon pool in production and synchronously in tests. Every
/// unit goes through one wrapper, [`isolate`], which turns a panic in the
/// collector into an error record. After the executor returns,
/// [`reconcile`] guarantees that each submitted path that was not skipped by
/// cancellation has exactly one record.
///
/// Units are never retried: re-reading a file can change the very
/// timestamps the scan is recording.
use crate::config::ScanConfiguration;
use crate::model::FileRecord;
use crate::scanner::cancel::CancelToken;
use crate::scanner::collector::{Collect, FileMetadataCollector};
use parking_lot::Mutex;
use rayon::prelude::*;
use std::any::Any;
use std::collections::HashSet;
use std::panic::{self, AssertUnwindSafe};
use std::path::{Path, PathBuf};
use std::sync::Arc;
use tracing::{debug, error, warn};

/// Pool-level failure not attributable to a single file.
#[derive(Debug, thiserror::Error)]
pub enum DispatchError {
    #[error("failed to build worker pool with {workers} threads: {source}")]
    PoolBuild {
        workers: usize,
        #[source]
        source: rayon::ThreadPoolBuildError,
    },
}

/// One unit of work: produce the record for a path, or `None` when the unit
/// was skipped because the scan was cancelled.
pub type Unit<'a> = dyn Fn(&Path) -> Option<FileRecord> + Sync + 'a;

/// Submit-all, await-all execution of units.
///
/// `execute` must call `unit` at most once per path and block until every
/// call has returned. Order of the returned records is unspecified.
pub trait Executor: Send + Sync {
    fn name(&self) -> &'static str;

    /// Upper bound on units running at once.
    fn workers(&self) -> usize;

    fn execute(&self, paths: &[PathBuf], unit: &Unit<'_>) -> Vec<FileRecord>;
}

/// Runs every unit on the calling thread, in input order.
#[derive(Debug, Clone, Copy, Default)]
pub struct InlineExecutor;

impl Executor for InlineExecutor {
    fn name(&self) -> &'static str {
        "inline"
    }

    fn workers(&self) -> usize {
        1
    }

    fn execute(&self, paths: &[PathBuf], unit: &Unit<'_>) -> Vec<FileRecord> {
        paths.iter().filter_map(|path| unit(path)).collect()
    }
}

/// A dedicated rayon pool with a fixed thread count, reusable across scans.
pub struct RayonExecutor {
    pool: rayon::ThreadPool,
    workers: usize,
}

impl RayonExecutor {
    pub fn new(workers: usize) -> Result<Self, DispatchError> {
        let workers = workers.max(1);
        let pool = rayon::ThreadPoolBuilder::new()
            .num_threads(workers)
            .thread_name(|i| format!("scantrail-worker-{i}"))
            .build()
            .map_err(|source| DispatchError::PoolBuild { workers, source })?;
        Ok(Self { pool, workers })
    }
}

impl Executor for RayonExecutor {
    fn name(&self) -> &'static str {
        "rayon"
    }

    fn workers(&self) -> usize {
        self.workers
    }

    fn execute(&self, paths: &[PathBuf], unit: &Unit<'_>) -> Vec<FileRecord> {
        self.pool
            .install(|| paths.par_iter().filter_map(|path| unit(path)).collect())
    }
}

/// Records produced by one dispatch.
#[derive(Debug, Default)]
pub struct Dispatched {
    pub records: Vec<FileRecord>,
    /// Units never started because cancellation was requested first.
    pub skipped: usize,
}

impl Dispatched {
    pub fn is_partial(&self) -> bool {
        self.skipped > 0
    }
}

/// Runs a [`Collect`] implementation over many paths through an [`Executor`].
pub struct WorkDispatcher {
    executor: Arc<dyn Executor>,
    collector: Arc<dyn Collect>,
}

impl WorkDispatcher {
    /// A dispatcher on a rayon pool of `workers` threads. If the pool cannot
    /// be built the dispatcher logs the failure and runs units inline.
    pub fn new(workers: usize) -> Self {
        let executor: Arc<dyn Executor> = match RayonExecutor::new(workers) {
            Ok(pool) => Arc::new(pool),
            Err(err) => {
                warn!("{err}; falling back to inline execution");
                Arc::new(InlineExecutor)
            }
        };
        Self::with_executor(executor)
    }

    /// A dispatcher on a caller-supplied executor.
    pub fn with_executor(executor: Arc<dyn Executor>) -> Self {
        Self {
            executor,
            collector: Arc::new(FileMetadataCollector),
        }
    }

    /// Replace the filesystem collector.
    pub fn with_collector(mut self, collector: Arc<dyn Collect>) -> Self {
        self.collector = collector;
        self
    }

    pub fn executor_name(&self) -> &'static str {
        self.executor.name()
    }

    pub fn workers(&self) -> usize {
        self.executor.workers()
    }

    /// Collect one record per path. Blocks until every unit has finished.
    pub fn run(&self, paths: &[PathBuf], config: &ScanConfiguration) -> Vec<FileRecord> {
        self.run_until(paths, config, &CancelToken::new()).records
    }

    /// Like [`run`](Self::run), but units not yet started when `cancel`
    /// trips are skipped. Records of finished units are kept.
    pub fn run_until(
        &self,
        paths: &[PathBuf],
        config: &ScanConfiguration,
        cancel: &CancelToken,
    ) -> Dispatched {
        if paths.is_empty() {
            return Dispatched::default();
        }

        let skipped: Mutex<Vec<PathBuf>> = Mutex::new(Vec::new());
        let collector = &*self.collector;
        let unit = |path: &Path| -> Option<FileRecord> {
            if cancel.is_cancelled() {
                skipped.lock().push(path.to_path_buf());
                return None;
            }
            Some(isolate(path, || collector.collect(path, config)))
        };

        debug!(
            "Dispatching {} files on {} executor ({} workers)",
            paths.len(),
            self.executor.name(),
            self.executor.workers()
        );
        let mut records = self.executor.execute(paths, &unit);
        let skipped = skipped.into_inner();
        reconcile(paths, &mut records, &skipped);

        Dispatched {
            records,
            skipped: skipped.len(),
        }
    }
}

/// Run one collector call, converting a panic into an error record for
/// `path`.
pub fn isolate<F>(path: &Path, collect: F) -> FileRecord
where
    F: FnOnce() -> FileRecord,
{
    match panic::catch_unwind(AssertUnwindSafe(collect)) {
        Ok(record) => record,
        Err(payload) => {
            let message = panic_message(payload.as_ref());
            error!("Collector panicked on {}: {message}", path.display());
            FileRecord::failed(path, format!("collector panicked: {message}"))
        }
    }
}

pub(crate) fn panic_message(payload: &(dyn Any + Send)) -> String {
    payload
        .downcast_ref::<&str>()
        .map(|s| (*s).to_string())
        .or_else(|| payload.downcast_ref::<String>().cloned())
        .unwrap_or_else(|| "unknown panic".to_string())
}

/// Add an error record for every path the executor returned nothing for
/// and that was not skipped by cancellation.
fn reconcile(paths: &[PathBuf], records: &mut Vec<FileRecord>, skipped: &[PathBuf]) {
    if records.len() + skipped.len() == paths.len() {
        return;
    }

    let lost: Vec<FileRecord> = {
        let accounted: HashSet<&Path> = records
            .iter()
            .map(FileRecord::path)
            .chain(skipped.iter().map(PathBuf::as_path))
            .collect();
        paths
            .iter()
            .filter(|path| !accounted.contains(path.as_path()))
            .map(|path| {
                error!("Executor returned no result for {}", path.display());
                FileRecord::failed(path, "dispatch error: no result returned for this path")
            })
            .collect()
    };
    records.extend(lost);
}

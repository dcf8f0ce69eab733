/// Scanner module: orchestrates one forensic scan.
///
/// A scan runs in four phases:
/// 1. **Traversal**: a single-threaded `walkdir` walk. Each entry passes the
///    [`PathValidator`]; rejected directories are pruned, accepted regular
///    files are collected (once per canonical path).
/// 2. **Dispatch**: the batch goes to the [`WorkDispatcher`], which runs the
///    collector on a fixed-size pool.
/// 3. **Aggregation**: records become one [`ScanReport`].
/// 4. **Persistence**: the report is handed to the configured sink.
///
/// Only a missing or unreadable root aborts a scan. Everything else (rejected
/// entries, unreadable files, collector panics) is recorded as data.
pub mod cancel;
pub mod collector;
pub mod dispatch;
pub mod hasher;
pub mod progress;
pub mod validator;

pub use cancel::CancelToken;
pub use collector::{collect, Collect, FileMetadataCollector};
pub use dispatch::{
    DispatchError, Dispatched, Executor, InlineExecutor, RayonExecutor, WorkDispatcher,
};
pub use progress::ScanProgress;
pub use validator::{PathValidator, RejectReason, SymlinkVisitSet};

use crate::config::ScanConfiguration;
use crate::model::ScanReport;
use crate::sink::{ReportSink, SinkError};
use crossbeam_channel::{Receiver, Sender};
use std::collections::HashSet;
use std::fs;
use std::io;
use std::path::{Path, PathBuf};
use std::thread;
use std::time::Instant;
use tracing::{debug, error, info, warn};

/// Maximum number of progress messages that may queue up in the channel.
///
/// If the consumer falls behind, the scanner blocks on `send` rather than
/// buffering without bound.
pub const PROGRESS_CHANNEL_CAPACITY: usize = 4_096;

/// Send a `Traversed` progress message every this many walker entries.
const TRAVERSAL_UPDATE_INTERVAL: u64 = 1_000;

/// Fatal scan errors. Per-file problems never appear here.
#[derive(Debug, thiserror::Error)]
pub enum ScanError {
    #[error("scan root {0} does not exist")]
    RootNotFound(PathBuf),

    #[error("scan root {path} cannot be opened: {source}")]
    RootUnreadable {
        path: PathBuf,
        #[source]
        source: io::Error,
    },

    #[error("scan root {0} is not a directory")]
    RootNotDirectory(PathBuf),

    /// The scan finished but the sink could not store the report. The
    /// report itself is carried here so the caller can still use it.
    #[error("failed to persist scan report: {source}")]
    Persist {
        report: Box<ScanReport>,
        #[source]
        source: SinkError,
    },

    #[error("scan thread terminated abnormally: {0}")]
    Aborted(String),
}

impl ScanError {
    /// The finished report, when the error happened after aggregation.
    pub fn into_report(self) -> Option<ScanReport> {
        match self {
            Self::Persist { report, .. } => Some(*report),
            _ => None,
        }
    }
}

/// Lifecycle of a coordinator's most recent scan.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ScanState {
    Initialized,
    Traversing,
    Dispatching,
    Aggregating,
    Persisted,
    /// The root could not be scanned at all.
    Failed,
}

/// Result of the traversal phase.
struct Traversal {
    files: Vec<PathBuf>,
    rejected: u64,
    cut_short: bool,
}

/// Orchestrates traversal, dispatch, aggregation and persistence.
pub struct ScanCoordinator {
    config: ScanConfiguration,
    dispatcher: WorkDispatcher,
    sink: Option<Box<dyn ReportSink>>,
    progress_tx: Option<Sender<ScanProgress>>,
    cancel: CancelToken,
    state: ScanState,
}

impl ScanCoordinator {
    /// A coordinator with a rayon pool sized by `config.parallel_workers`.
    ///
    /// `config` is expected to be validated already.
    pub fn new(config: ScanConfiguration) -> Self {
        let dispatcher = WorkDispatcher::new(config.parallel_workers);
        Self::with_dispatcher(config, dispatcher)
    }

    pub fn with_dispatcher(config: ScanConfiguration, dispatcher: WorkDispatcher) -> Self {
        Self {
            config,
            dispatcher,
            sink: None,
            progress_tx: None,
            cancel: CancelToken::new(),
            state: ScanState::Initialized,
        }
    }

    /// Persist each finished report through `sink`.
    pub fn with_sink(mut self, sink: Box<dyn ReportSink>) -> Self {
        self.sink = Some(sink);
        self
    }

    /// Publish progress messages on `tx`.
    pub fn with_progress(mut self, tx: Sender<ScanProgress>) -> Self {
        self.progress_tx = Some(tx);
        self
    }

    /// Use `cancel` instead of the coordinator's own token.
    pub fn with_cancel_token(mut self, cancel: CancelToken) -> Self {
        self.cancel = cancel;
        self
    }

    /// A handle that cancels scans run by this coordinator.
    ///
    /// A request covers one scan: the flag is cleared when `scan` returns,
    /// so a request made between scans stops the next one.
    pub fn cancel_token(&self) -> CancelToken {
        self.cancel.clone()
    }

    pub fn config(&self) -> &ScanConfiguration {
        &self.config
    }

    pub fn state(&self) -> ScanState {
        self.state
    }

    /// Scan `root` and return the report.
    ///
    /// Fails only when the root is missing, not a directory, or cannot be
    /// opened, or when the configured sink cannot store the report. In the
    /// latter case the report is returned inside [`ScanError::Persist`].
    pub fn scan(&mut self, root: &Path) -> Result<ScanReport, ScanError> {
        let result = self.run_scan(root);
        self.cancel.reset();
        result
    }

    fn run_scan(&mut self, root: &Path) -> Result<ScanReport, ScanError> {
        let start = Instant::now();
        self.state = ScanState::Initialized;

        let root = match open_root(root) {
            Ok(root) => root,
            Err(err) => {
                error!("{err}");
                self.transition(ScanState::Failed);
                return Err(err);
            }
        };

        let cancel = match self.config.scan_timeout() {
            Some(timeout) => self.cancel.with_timeout(timeout),
            None => self.cancel.clone(),
        };
        info!(
            "Starting scan of {} ({} workers, {})",
            root.display(),
            self.dispatcher.workers(),
            self.config.hash_algorithm
        );

        self.transition(ScanState::Traversing);
        let traversal = self.traverse(&root, &cancel);
        info!(
            "Found {} files to process ({} entries rejected)",
            traversal.files.len(),
            traversal.rejected
        );

        self.transition(ScanState::Dispatching);
        self.send(ScanProgress::Dispatched {
            files: traversal.files.len(),
            workers: self.dispatcher.workers(),
        });
        let dispatched = self
            .dispatcher
            .run_until(&traversal.files, &self.config, &cancel);

        self.transition(ScanState::Aggregating);
        for record in dispatched.records.iter().filter(|r| r.is_error()) {
            let message = record.error().unwrap_or_default();
            warn!("Error processing {}: {message}", record.path().display());
            self.send(ScanProgress::Error {
                path: record.path().to_string_lossy().into_owned(),
                message: message.to_string(),
            });
        }

        let partial = traversal.cut_short || dispatched.is_partial();
        let report = ScanReport::new(
            &root,
            self.config.clone(),
            dispatched.records,
            partial,
            traversal.rejected,
        );

        if partial {
            warn!(
                "Scan of {} stopped early: {} records kept, {} files not processed",
                root.display(),
                report.file_count(),
                dispatched.skipped
            );
            self.send(ScanProgress::Cancelled {
                completed: report.file_count(),
                skipped: dispatched.skipped,
            });
        } else {
            self.send(ScanProgress::Complete {
                duration: start.elapsed(),
                file_count: report.file_count(),
                error_count: report.error_count(),
            });
        }
        info!(
            "Scan complete. Processed {} files ({} errors) in {:?}",
            report.file_count(),
            report.error_count(),
            start.elapsed()
        );

        if let Some(sink) = &self.sink {
            if let Err(source) = sink.write_report(&report) {
                error!("Error saving report to {}: {source}", sink.describe());
                return Err(ScanError::Persist {
                    report: Box::new(report),
                    source,
                });
            }
            self.transition(ScanState::Persisted);
        }

        Ok(report)
    }

    /// Walk `root` single-threaded, validating every entry.
    ///
    /// Links are followed so in-root symlinked directories are scanned; the
    /// validator's visited set and `walkdir`'s own ancestor check keep that
    /// bounded. Only regular files are returned, each canonical file once,
    /// and each canonical directory is walked once.
    fn traverse(&self, root: &Path, cancel: &CancelToken) -> Traversal {
        let mut validator = PathValidator::new(root, &self.config);
        let mut seen: HashSet<PathBuf> = HashSet::new();
        let mut walked_dirs: HashSet<PathBuf> = HashSet::new();
        let mut files = Vec::new();
        let mut rejected: u64 = 0;
        let mut entries: u64 = 0;
        let mut cut_short = false;

        let mut walker = walkdir::WalkDir::new(root)
            .follow_links(true)
            .sort_by_file_name()
            .into_iter();

        while let Some(next) = walker.next() {
            if cancel.is_cancelled() {
                cut_short = true;
                break;
            }

            let entry = match next {
                Ok(entry) => entry,
                Err(err) => {
                    // Loops, dangling links and unreadable subdirectories.
                    rejected += 1;
                    debug!("Skipping unreadable entry: {err}");
                    continue;
                }
            };
            if entry.depth() == 0 {
                continue;
            }

            entries += 1;
            let is_dir = entry.file_type().is_dir();
            match validator.check(entry.path()) {
                Ok(canonical) if is_dir => {
                    if !walked_dirs.insert(canonical) {
                        debug!("Already walked {}", entry.path().display());
                        rejected += 1;
                        walker.skip_current_dir();
                    }
                }
                Ok(canonical) => {
                    if entry.file_type().is_file() && seen.insert(canonical) {
                        files.push(entry.into_path());
                    }
                }
                Err(_) => {
                    rejected += 1;
                    if is_dir {
                        walker.skip_current_dir();
                    }
                }
            }

            if entries % TRAVERSAL_UPDATE_INTERVAL == 0 {
                let current_path = files
                    .last()
                    .map(|p: &PathBuf| p.to_string_lossy().into_owned())
                    .unwrap_or_default();
                self.send(ScanProgress::Traversed {
                    files_found: files.len() as u64,
                    rejected,
                    current_path,
                });
            }
        }

        debug!(
            "Traversal visited {} entries, {} symlink targets tracked",
            entries,
            validator.session().len()
        );
        Traversal {
            files,
            rejected,
            cut_short,
        }
    }

    fn transition(&mut self, next: ScanState) {
        debug!("Scan state {:?} -> {:?}", self.state, next);
        self.state = next;
    }

    fn send(&self, message: ScanProgress) {
        if let Some(tx) = &self.progress_tx {
            let _ = tx.send(message);
        }
    }
}

/// Check that `root` exists, is a directory and can be listed, and return
/// its canonical form.
fn open_root(root: &Path) -> Result<PathBuf, ScanError> {
    let meta = fs::metadata(root).map_err(|source| match source.kind() {
        io::ErrorKind::NotFound => ScanError::RootNotFound(root.to_path_buf()),
        _ => ScanError::RootUnreadable {
            path: root.to_path_buf(),
            source,
        },
    })?;
    if !meta.is_dir() {
        return Err(ScanError::RootNotDirectory(root.to_path_buf()));
    }

    let unreadable = |source| ScanError::RootUnreadable {
        path: root.to_path_buf(),
        source,
    };
    fs::read_dir(root).map_err(unreadable)?;
    fs::canonicalize(root).map_err(unreadable)
}

/// Handle to a scan running on a background thread.
pub struct ScanHandle {
    /// Receiver for progress updates from the scan thread.
    pub progress_rx: Receiver<ScanProgress>,
    cancel: CancelToken,
    thread: thread::JoinHandle<Result<ScanReport, ScanError>>,
}

impl ScanHandle {
    /// Request the scan to stop as soon as possible. Records collected so far
    /// are kept in a partial report.
    pub fn cancel(&self) {
        self.cancel.cancel();
    }

    pub fn is_cancelled(&self) -> bool {
        self.cancel.is_cancelled()
    }

    pub fn is_finished(&self) -> bool {
        self.thread.is_finished()
    }

    /// Block until the scan finishes and return its outcome.
    pub fn wait(self) -> Result<ScanReport, ScanError> {
        self.thread
            .join()
            .map_err(|payload| ScanError::Aborted(dispatch::panic_message(payload.as_ref())))?
    }
}

/// Start a scan of `root` on a background thread.
///
/// Progress messages arrive on the handle's bounded channel; drain it or drop
/// the receiver, otherwise the scanner blocks once the channel is full.
pub fn start_scan(coordinator: ScanCoordinator, root: PathBuf) -> io::Result<ScanHandle> {
    let (progress_tx, progress_rx) =
        crossbeam_channel::bounded::<ScanProgress>(PROGRESS_CHANNEL_CAPACITY);
    let mut coordinator = coordinator.with_progress(progress_tx);
    let cancel = coordinator.cancel_token();

    let thread = thread::Builder::new()
        .name("scantrail-scanner".into())
        .spawn(move || coordinator.scan(&root))?;

    Ok(ScanHandle {
        progress_rx,
        cancel,
        thread,
    })
}

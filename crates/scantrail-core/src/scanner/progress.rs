/// Scan progress reporting: lightweight messages sent from the scan
/// thread to whoever is watching (the CLI, a UI, a test) via a crossbeam
/// channel.
use std::time::Duration;

/// Progress updates sent from the scan thread.
///
/// The records themselves travel in the final `ScanReport`; these messages
/// carry only counters and status flags.
#[derive(Debug, Clone, PartialEq)]
pub enum ScanProgress {
    /// Periodic update while walking the tree.
    Traversed {
        files_found: u64,
        rejected: u64,
        current_path: String,
    },
    /// Traversal finished; the batch was handed to the worker pool.
    Dispatched { files: usize, workers: usize },
    /// A file produced an error record.
    Error { path: String, message: String },
    /// Scan finished and every validated file has a record.
    Complete {
        duration: Duration,
        file_count: usize,
        error_count: usize,
    },
    /// Scan was cancelled or timed out; the report is partial.
    Cancelled { completed: usize, skipped: usize },
}

/// Per-file metadata collection.
///
/// [`collect`] never fails: every stat or read problem becomes an error
/// [`FileRecord`] so the caller always gets exactly one record per path.
use crate::config::ScanConfiguration;
use crate::model::{FileRecord, FileTimes};
use crate::scanner::hasher;
use std::fs;
use std::path::Path;
use tracing::trace;

/// Produces one forensic record for one path.
///
/// The dispatcher calls this from worker threads; implementations must not
/// share mutable state between calls.
pub trait Collect: Send + Sync {
    fn collect(&self, path: &Path, config: &ScanConfiguration) -> FileRecord;
}

/// The filesystem-backed collector: stat, then hash inside the size window.
#[derive(Debug, Clone, Copy, Default)]
pub struct FileMetadataCollector;

impl Collect for FileMetadataCollector {
    fn collect(&self, path: &Path, config: &ScanConfiguration) -> FileRecord {
        collect(path, config)
    }
}

/// Stat `path` and, when its size lies within
/// `[min_file_size, max_file_size]`, hash its contents.
///
/// Outside the window the record keeps its size and timestamps but
/// `file_hash` is `None`. A hashing failure discards the partial digest and
/// yields an error record.
pub fn collect(path: &Path, config: &ScanConfiguration) -> FileRecord {
    let meta = match fs::metadata(path) {
        Ok(meta) => meta,
        Err(e) => return FileRecord::failed(path, format!("stat failed: {e}")),
    };

    let size = meta.len();
    let times = FileTimes::from(&meta);

    let file_hash = if config.hashes_size(size) {
        match hasher::hash_file(config.hash_algorithm, path) {
            Ok(digest) => Some(digest),
            Err(e) => return FileRecord::failed(path, format!("hash failed: {e}")),
        }
    } else {
        trace!("Skipping hash for {} ({size} bytes)", path.display());
        None
    };

    FileRecord::collected(path, size, times, file_hash)
}

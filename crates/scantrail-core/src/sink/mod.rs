/// Report sinks: where a finished [`ScanReport`] is persisted.
///
/// The scanner only needs a "write one structured document" capability, so
/// storage is behind the [`ReportSink`] trait.
///
/// - [`JsonFileSink`]: the full report as pretty-printed JSON.
/// - [`CsvFileSink`]: one row per file record, for spreadsheet review.
/// - [`MemorySink`]: keeps reports in memory for embedding callers and tests.
pub mod csv_file;
pub mod json_file;

pub use csv_file::CsvFileSink;
pub use json_file::JsonFileSink;

use crate::model::ScanReport;
use parking_lot::Mutex;
use std::fs;
use std::path::{Path, PathBuf};
use std::sync::Arc;

/// Failure to persist a report.
#[derive(Debug, thiserror::Error)]
pub enum SinkError {
    #[error("I/O error writing report to {path}: {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("failed to encode report as JSON: {0}")]
    Json(#[from] serde_json::Error),

    #[error("failed to encode report as CSV: {0}")]
    Csv(#[from] ::csv::Error),
}

/// Durable destination for a finished report.
pub trait ReportSink: Send + Sync {
    fn write_report(&self, report: &ScanReport) -> Result<(), SinkError>;

    /// Human-readable destination, used in log lines.
    fn describe(&self) -> String;
}

/// Keeps every written report in memory. Clones share storage.
#[derive(Debug, Clone, Default)]
pub struct MemorySink {
    reports: Arc<Mutex<Vec<ScanReport>>>,
}

impl MemorySink {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn reports(&self) -> Vec<ScanReport> {
        self.reports.lock().clone()
    }

    pub fn last(&self) -> Option<ScanReport> {
        self.reports.lock().last().cloned()
    }

    pub fn len(&self) -> usize {
        self.reports.lock().len()
    }

    pub fn is_empty(&self) -> bool {
        self.reports.lock().is_empty()
    }
}

impl ReportSink for MemorySink {
    fn write_report(&self, report: &ScanReport) -> Result<(), SinkError> {
        self.reports.lock().push(report.clone());
        Ok(())
    }

    fn describe(&self) -> String {
        "memory".to_string()
    }
}

/// Create the parent directory of `path` if it does not exist yet.
pub(crate) fn ensure_parent(path: &Path) -> Result<(), SinkError> {
    match path.parent() {
        Some(parent) if !parent.as_os_str().is_empty() => {
            fs::create_dir_all(parent).map_err(|source| SinkError::Io {
                path: parent.to_path_buf(),
                source,
            })
        }
        _ => Ok(()),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::ScanConfiguration;

    #[test]
    fn memory_sink_clones_share_storage() {
        let sink = MemorySink::new();
        let observer = sink.clone();
        let report = ScanReport::new("/r", ScanConfiguration::default(), Vec::new(), false, 0);

        sink.write_report(&report).unwrap();
        assert_eq!(observer.len(), 1);
        assert_eq!(observer.last().unwrap().file_count(), 0);
    }
}

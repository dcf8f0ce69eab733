/// CSV export: one row per file record.
use super::{ensure_parent, ReportSink, SinkError};
use crate::model::ScanReport;
use chrono::{DateTime, SecondsFormat, Utc};
use std::path::{Path, PathBuf};
use tracing::info;

const HEADER: [&str; 8] = [
    "path",
    "size",
    "created",
    "modified",
    "accessed",
    "file_hash",
    "error",
    "timestamp",
];

/// Writes the file records as CSV. Scan-level fields (root, configuration)
/// are not part of the table; absent values are empty cells.
#[derive(Debug, Clone)]
pub struct CsvFileSink {
    path: PathBuf,
}

impl CsvFileSink {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self { path: path.into() }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }
}

fn rfc3339(ts: Option<DateTime<Utc>>) -> String {
    ts.map(|t| t.to_rfc3339_opts(SecondsFormat::Micros, true))
        .unwrap_or_default()
}

impl ReportSink for CsvFileSink {
    fn write_report(&self, report: &ScanReport) -> Result<(), SinkError> {
        ensure_parent(&self.path)?;
        let mut writer = csv::Writer::from_path(&self.path)?;
        writer.write_record(HEADER)?;

        for record in report.files() {
            let times = record.times();
            writer.write_record([
                record.path().to_string_lossy().into_owned(),
                record.size().map(|s| s.to_string()).unwrap_or_default(),
                rfc3339(times.created),
                rfc3339(times.modified),
                rfc3339(times.accessed),
                record.file_hash().unwrap_or_default().to_string(),
                record.error().unwrap_or_default().to_string(),
                rfc3339(Some(record.timestamp())),
            ])?;
        }

        writer.flush().map_err(|source| SinkError::Io {
            path: self.path.clone(),
            source,
        })?;
        info!(
            "CSV report with {} rows saved to {}",
            report.file_count(),
            self.path.display()
        );
        Ok(())
    }

    fn describe(&self) -> String {
        self.path.display().to_string()
    }
}

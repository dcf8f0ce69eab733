/// JSON report file.
use super::{ensure_parent, ReportSink, SinkError};
use crate::model::ScanReport;
use std::fs::{self, File};
use std::io::{BufWriter, Write};
use std::path::{Path, PathBuf};
use tracing::info;

/// Writes the whole report as pretty-printed JSON.
///
/// The document is written to a sibling `.partial` file, synced, and renamed
/// over the destination, so readers never observe a half-written report.
#[derive(Debug, Clone)]
pub struct JsonFileSink {
    path: PathBuf,
}

impl JsonFileSink {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self { path: path.into() }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    fn staging_path(&self) -> PathBuf {
        let mut name = self.path.file_name().unwrap_or_default().to_os_string();
        name.push(".partial");
        self.path.with_file_name(name)
    }
}

impl ReportSink for JsonFileSink {
    fn write_report(&self, report: &ScanReport) -> Result<(), SinkError> {
        ensure_parent(&self.path)?;
        let staging = self.staging_path();
        let io_err = |source| SinkError::Io {
            path: staging.clone(),
            source,
        };

        let file = File::create(&staging).map_err(io_err)?;
        let mut writer = BufWriter::new(file);
        serde_json::to_writer_pretty(&mut writer, report)?;
        writer.write_all(b"\n").map_err(io_err)?;
        let file = writer.into_inner().map_err(|e| io_err(e.into_error()))?;
        file.sync_all().map_err(io_err)?;
        drop(file);

        fs::rename(&staging, &self.path).map_err(|source| SinkError::Io {
            path: self.path.clone(),
            source,
        })?;
        info!(
            "Report with {} records saved to {}",
            report.file_count(),
            self.path.display()
        );
        Ok(())
    }

    fn describe(&self) -> String {
        self.path.display().to_string()
    }
}

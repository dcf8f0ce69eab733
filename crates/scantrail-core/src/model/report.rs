//! The aggregated, self-describing output of one scan.
use crate::config::ScanConfiguration;
use crate::model::record::FileRecord;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize, Serializer};
use std::path::{Path, PathBuf};

/// Complete output of one scan run.
///
/// Built once at the end of a scan and never mutated afterwards.
/// `file_count` always equals `files.len()`; the constructor is the only
/// place either is set.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(try_from = "ReportDocument")]
pub struct ScanReport {
    scan_timestamp: DateTime<Utc>,
    #[serde(serialize_with = "lossy_path")]
    scanned_directory: PathBuf,
    file_count: usize,
    /// `true` when cancellation or a timeout stopped the scan early.
    partial: bool,
    /// Entries the validator rejected or the walker could not follow.
    rejected_count: u64,
    configuration: ScanConfiguration,
    files: Vec<FileRecord>,
}

/// Wire form read back from disk; checked before it becomes a report.
#[derive(Deserialize)]
struct ReportDocument {
    scan_timestamp: DateTime<Utc>,
    scanned_directory: PathBuf,
    file_count: usize,
    #[serde(default)]
    partial: bool,
    #[serde(default)]
    rejected_count: u64,
    configuration: ScanConfiguration,
    files: Vec<FileRecord>,
}

impl TryFrom<ReportDocument> for ScanReport {
    type Error = String;

    fn try_from(doc: ReportDocument) -> Result<Self, Self::Error> {
        if doc.file_count != doc.files.len() {
            return Err(format!(
                "file_count is {} but the report holds {} records",
                doc.file_count,
                doc.files.len()
            ));
        }
        Ok(Self {
            scan_timestamp: doc.scan_timestamp,
            scanned_directory: doc.scanned_directory,
            file_count: doc.file_count,
            partial: doc.partial,
            rejected_count: doc.rejected_count,
            configuration: doc.configuration,
            files: doc.files,
        })
    }
}

impl ScanReport {
    pub fn new(
        scanned_directory: impl Into<PathBuf>,
        configuration: ScanConfiguration,
        files: Vec<FileRecord>,
        partial: bool,
        rejected_count: u64,
    ) -> Self {
        Self {
            scan_timestamp: Utc::now(),
            scanned_directory: scanned_directory.into(),
            file_count: files.len(),
            partial,
            rejected_count,
            configuration,
            files,
        }
    }

    pub fn scan_timestamp(&self) -> DateTime<Utc> {
        self.scan_timestamp
    }

    pub fn scanned_directory(&self) -> &Path {
        &self.scanned_directory
    }

    pub fn file_count(&self) -> usize {
        self.file_count
    }

    pub fn is_partial(&self) -> bool {
        self.partial
    }

    pub fn rejected_count(&self) -> u64 {
        self.rejected_count
    }

    pub fn configuration(&self) -> &ScanConfiguration {
        &self.configuration
    }

    pub fn files(&self) -> &[FileRecord] {
        &self.files
    }

    /// Look up the record for `path`, if one was produced.
    pub fn record_for(&self, path: &Path) -> Option<&FileRecord> {
        self.files.iter().find(|r| r.path() == path)
    }

    pub fn error_count(&self) -> usize {
        self.files.iter().filter(|r| r.is_error()).count()
    }

    pub fn hashed_count(&self) -> usize {
        self.files.iter().filter(|r| r.file_hash().is_some()).count()
    }

    /// Total bytes across collected records.
    pub fn total_size(&self) -> u64 {
        self.files.iter().filter_map(FileRecord::size).sum()
    }

    pub fn into_files(self) -> Vec<FileRecord> {
        self.files
    }
}

fn lossy_path<S: Serializer>(path: &Path, serializer: S) -> Result<S::Ok, S::Error> {
    serializer.serialize_str(&path.to_string_lossy())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::model::FileTimes;

    fn sample_report() -> ScanReport {
        let files = vec![
            FileRecord::collected("/r/a.txt", 20, FileTimes::default(), Some("aa".into())),
            FileRecord::collected("/r/b.bin", 2_000_000, FileTimes::default(), None),
            FileRecord::failed("/r/c", "permission denied"),
        ];
        ScanReport::new("/r", ScanConfiguration::default(), files, false, 2)
    }

    #[test]
    fn file_count_matches_records() {
        let report = sample_report();
        assert_eq!(report.file_count(), 3);
        assert_eq!(report.files().len(), report.file_count());
        assert_eq!(report.error_count(), 1);
        assert_eq!(report.hashed_count(), 1);
        assert_eq!(report.total_size(), 2_000_020);
        assert_eq!(report.rejected_count(), 2);
    }

    #[test]
    fn report_json_has_expected_top_level_shape() {
        let json = serde_json::to_value(sample_report()).unwrap();
        for key in [
            "scan_timestamp",
            "scanned_directory",
            "file_count",
            "partial",
            "configuration",
            "files",
        ] {
            assert!(json.get(key).is_some(), "missing key {key}");
        }
        let config = &json["configuration"];
        for key in ["max_file_size", "min_file_size", "hash_algorithm", "parallel_workers"] {
            assert!(config.get(key).is_some(), "missing configuration key {key}");
        }
        assert_eq!(config["hash_algorithm"], "sha256");
        assert_eq!(json["scanned_directory"], "/r");
    }

    #[test]
    fn mismatched_file_count_is_refused_on_load() {
        let mut json = serde_json::to_value(sample_report()).unwrap();
        let back: ScanReport = serde_json::from_value(json.clone()).unwrap();
        assert_eq!(back.file_count(), 3);

        json["file_count"] = serde_json::json!(5);
        let err = serde_json::from_value::<ScanReport>(json).unwrap_err();
        assert!(err.to_string().contains("file_count is 5"));
    }

    #[test]
    fn record_lookup_by_path() {
        let report = sample_report();
        let record = report.record_for(Path::new("/r/b.bin")).unwrap();
        assert_eq!(record.size(), Some(2_000_000));
        assert!(report.record_for(Path::new("/r/missing")).is_none());
    }
}

/// Data model for scan output.
///
/// Re-exports the per-file forensic record and the aggregated report.
pub mod record;
pub mod report;

pub use record::{FileRecord, FileTimes};
pub use report::ScanReport;

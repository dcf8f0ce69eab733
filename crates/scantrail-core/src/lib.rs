//! ScanTrail Core: forensic directory scanning.
//!
//! This crate contains all scanning logic with no CLI dependencies, so the
//! same engine can sit behind a command line, a service, or a test harness.
//!
//! # Modules
//!
//! - [`config`]: Scan configuration, validation, and environment overrides.
//! - [`model`]: Per-file forensic records and the aggregated scan report.
//! - [`scanner`]: Path validation, metadata collection, parallel dispatch,
//!   and the scan coordinator.
//! - [`sink`]: Report persistence (JSON, CSV, in-memory).
pub mod config;
pub mod model;
pub mod scanner;
pub mod sink;

pub use config::{ConfigError, HashAlgorithm, ReportFormat, ScanConfiguration};
pub use model::{FileRecord, FileTimes, ScanReport};
pub use scanner::{start_scan, ScanCoordinator, ScanError, ScanHandle, ScanState};
pub use sink::{CsvFileSink, JsonFileSink, MemorySink, ReportSink, SinkError};

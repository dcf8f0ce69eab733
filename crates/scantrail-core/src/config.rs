//! Scan configuration: the immutable settings one scan runs under.
//!
//! A [`ScanConfiguration`] is loaded from an optional JSON document, layered
//! with `SCANTRAIL_*` environment overrides, and validated once before a scan
//! starts. The scanner trusts a validated configuration and never re-checks
//! the size window or worker count.
use serde::{Deserialize, Serialize};
use std::collections::BTreeSet;
use std::fmt;
use std::path::{Path, PathBuf};
use std::str::FromStr;
use std::time::Duration;
use tracing::{debug, warn};

/// Prefix for environment variables that override configuration fields.
pub const ENV_PREFIX: &str = "SCANTRAIL_";

/// Default upper bound for content hashing: 100 MiB.
pub const DEFAULT_MAX_FILE_SIZE: u64 = 100 * 1024 * 1024;

/// Errors raised while loading or validating a configuration.
#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    #[error("max_file_size ({max}) must be greater than or equal to min_file_size ({min})")]
    SizeWindow { min: u64, max: u64 },

    #[error("parallel_workers must be at least 1")]
    NoWorkers,

    #[error("scan_timeout_secs must be greater than zero when set")]
    ZeroTimeout,

    #[error("excluded directory name {0:?} must be a single non-empty path segment")]
    InvalidExcludedDir(String),

    #[error("unknown hash algorithm {0:?} (expected md5, sha256, sha512 or blake3)")]
    UnknownAlgorithm(String),

    #[error("unknown report format {0:?} (expected json or csv)")]
    UnknownFormat(String),

    #[error("failed to read configuration file {path}: {source}")]
    Read {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("failed to parse configuration file {path}: {source}")]
    Parse {
        path: PathBuf,
        #[source]
        source: serde_json::Error,
    },
}

/// Digest used for file content hashes.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum HashAlgorithm {
    Md5,
    #[default]
    Sha256,
    Sha512,
    Blake3,
}

impl HashAlgorithm {
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Md5 => "md5",
            Self::Sha256 => "sha256",
            Self::Sha512 => "sha512",
            Self::Blake3 => "blake3",
        }
    }
}

impl fmt::Display for HashAlgorithm {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for HashAlgorithm {
    type Err = ConfigError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().replace('-', "").as_str() {
            "md5" => Ok(Self::Md5),
            "sha256" => Ok(Self::Sha256),
            "sha512" => Ok(Self::Sha512),
            "blake3" => Ok(Self::Blake3),
            _ => Err(ConfigError::UnknownAlgorithm(s.to_string())),
        }
    }
}

/// On-disk format the binary writes the report in.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ReportFormat {
    #[default]
    Json,
    Csv,
}

impl ReportFormat {
    /// File extension used for default output names.
    pub fn extension(self) -> &'static str {
        match self {
            Self::Json => "json",
            Self::Csv => "csv",
        }
    }
}

impl FromStr for ReportFormat {
    type Err = ConfigError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "json" => Ok(Self::Json),
            "csv" => Ok(Self::Csv),
            _ => Err(ConfigError::UnknownFormat(s.to_string())),
        }
    }
}

/// Settings for one scan. Immutable once the scan starts; a copy is embedded
/// in every report so the report describes how it was produced.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct ScanConfiguration {
    /// Files larger than this are recorded without a content hash.
    pub max_file_size: u64,
    /// Files smaller than this are recorded without a content hash.
    pub min_file_size: u64,
    /// Size of the metadata collection pool.
    pub parallel_workers: usize,
    pub hash_algorithm: HashAlgorithm,
    /// Directory names pruned wherever they appear below the root.
    pub excluded_dirs: BTreeSet<String>,
    /// Extensions (without the leading dot, lower-case) never recorded.
    pub excluded_extensions: BTreeSet<String>,
    /// Reject entries whose name starts with `.`.
    pub skip_hidden_files: bool,
    /// Advisory wall-clock limit; when it expires the report is flagged partial.
    pub scan_timeout_secs: Option<u64>,
    pub report_format: ReportFormat,
}

impl Default for ScanConfiguration {
    fn default() -> Self {
        Self {
            max_file_size: DEFAULT_MAX_FILE_SIZE,
            min_file_size: 0,
            parallel_workers: num_cpus::get().max(1),
            hash_algorithm: HashAlgorithm::default(),
            excluded_dirs: [".git", "__pycache__"].into_iter().map(String::from).collect(),
            excluded_extensions: ["pyc", "tmp"].into_iter().map(String::from).collect(),
            skip_hidden_files: false,
            scan_timeout_secs: None,
            report_format: ReportFormat::default(),
        }
    }
}

impl ScanConfiguration {
    /// Load a configuration from a JSON document. Missing fields take their
    /// defaults. The result is normalised but not validated.
    pub fn from_json_file(path: &Path) -> Result<Self, ConfigError> {
        let text = std::fs::read_to_string(path).map_err(|source| ConfigError::Read {
            path: path.to_path_buf(),
            source,
        })?;
        let config: Self = serde_json::from_str(&text).map_err(|source| ConfigError::Parse {
            path: path.to_path_buf(),
            source,
        })?;
        debug!("Loaded configuration from {}", path.display());
        Ok(config.normalized())
    }

    /// Check the invariants the scanner relies on.
    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.max_file_size < self.min_file_size {
            return Err(ConfigError::SizeWindow {
                min: self.min_file_size,
                max: self.max_file_size,
            });
        }
        if self.parallel_workers == 0 {
            return Err(ConfigError::NoWorkers);
        }
        if self.scan_timeout_secs == Some(0) {
            return Err(ConfigError::ZeroTimeout);
        }
        if let Some(bad) = self
            .excluded_dirs
            .iter()
            .find(|name| name.is_empty() || name.contains(['/', '\\']))
        {
            return Err(ConfigError::InvalidExcludedDir(bad.clone()));
        }
        Ok(())
    }

    /// Lower-case extensions and strip their leading dots so `.PYC`, `pyc`
    /// and `.pyc` name the same exclusion.
    pub fn normalized(mut self) -> Self {
        self.excluded_extensions = self
            .excluded_extensions
            .iter()
            .map(|ext| normalize_extension(ext))
            .filter(|ext| !ext.is_empty())
            .collect();
        self
    }

    /// `true` when a file of `size` bytes gets a content hash.
    #[inline]
    pub fn hashes_size(&self, size: u64) -> bool {
        (self.min_file_size..=self.max_file_size).contains(&size)
    }

    /// `true` when `ext` (with or without a dot, any case) is excluded.
    pub fn excludes_extension(&self, ext: &str) -> bool {
        let ext = normalize_extension(ext);
        self.excluded_extensions
            .iter()
            .any(|excluded| normalize_extension(excluded) == ext)
    }

    pub fn scan_timeout(&self) -> Option<Duration> {
        self.scan_timeout_secs.map(Duration::from_secs)
    }

    /// Apply `SCANTRAIL_*` overrides from the process environment.
    pub fn apply_env_overrides(&mut self) {
        self.apply_overrides(std::env::vars());
    }

    /// Apply `SCANTRAIL_<FIELD>=value` pairs. Sets are comma-separated.
    /// Values that fail to parse are logged and ignored.
    pub fn apply_overrides<I>(&mut self, vars: I)
    where
        I: IntoIterator<Item = (String, String)>,
    {
        for (key, value) in vars {
            let Some(field) = key.strip_prefix(ENV_PREFIX) else {
                continue;
            };
            let field = field.to_ascii_lowercase();
            let applied = match field.as_str() {
                "max_file_size" => parse_into(&value, &mut self.max_file_size),
                "min_file_size" => parse_into(&value, &mut self.min_file_size),
                "parallel_workers" => parse_into(&value, &mut self.parallel_workers),
                "skip_hidden_files" => parse_into(&value, &mut self.skip_hidden_files),
                "hash_algorithm" => parse_into(&value, &mut self.hash_algorithm),
                "report_format" => parse_into(&value, &mut self.report_format),
                "scan_timeout_secs" => {
                    let mut secs = 0u64;
                    let ok = parse_into(&value, &mut secs);
                    if ok {
                        self.scan_timeout_secs = Some(secs);
                    }
                    ok
                }
                "excluded_dirs" => {
                    self.excluded_dirs = split_list(&value).collect();
                    true
                }
                "excluded_extensions" => {
                    self.excluded_extensions =
                        split_list(&value).map(|ext| normalize_extension(&ext)).collect();
                    true
                }
                _ => {
                    debug!("Ignoring unknown override {key}");
                    continue;
                }
            };
            if applied {
                debug!("Override {field} from environment");
            } else {
                warn!("Invalid environment override {key}={value:?}; keeping previous value");
            }
        }
    }
}

fn parse_into<T: FromStr>(value: &str, slot: &mut T) -> bool {
    match value.trim().parse() {
        Ok(parsed) => {
            *slot = parsed;
            true
        }
        Err(_) => false,
    }
}

fn split_list(value: &str) -> impl Iterator<Item = String> + '_ {
    value
        .split(',')
        .map(str::trim)
        .filter(|item| !item.is_empty())
        .map(String::from)
}

/// Lower-case and strip leading dots: `".TaR"` → `"tar"`.
pub fn normalize_extension(ext: &str) -> String {
    ext.trim().trim_start_matches('.').to_lowercase()
}

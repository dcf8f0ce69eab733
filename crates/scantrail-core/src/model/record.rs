//! One forensic record per scanned file.
use chrono::{DateTime, Utc};
use serde::ser::SerializeMap;
use serde::{Deserialize, Serialize, Serializer};
use std::fs::Metadata;
use std::path::{Path, PathBuf};

/// Filesystem timestamps captured from one `stat`.
///
/// `created` is `None` on platforms or filesystems that do not report a
/// birth time.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct FileTimes {
    pub created: Option<DateTime<Utc>>,
    pub modified: Option<DateTime<Utc>>,
    pub accessed: Option<DateTime<Utc>>,
}

impl From<&Metadata> for FileTimes {
    fn from(meta: &Metadata) -> Self {
        Self {
            created: meta.created().ok().map(DateTime::<Utc>::from),
            modified: meta.modified().ok().map(DateTime::<Utc>::from),
            accessed: meta.accessed().ok().map(DateTime::<Utc>::from),
        }
    }
}

/// Identity and temporal attributes of one file, or the error that
/// prevented collecting them.
///
/// A record is either *collected* (`error` is `None`, `size` is set) or
/// *failed* (`error` is set, every other attribute is absent). A collected
/// record may still have `file_hash == None`, meaning the size fell outside
/// the hashing window.
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
pub struct FileRecord {
    path: PathBuf,
    #[serde(default)]
    size: Option<u64>,
    #[serde(default)]
    created: Option<DateTime<Utc>>,
    #[serde(default)]
    modified: Option<DateTime<Utc>>,
    #[serde(default)]
    accessed: Option<DateTime<Utc>>,
    #[serde(default)]
    file_hash: Option<String>,
    #[serde(default)]
    error: Option<String>,
    timestamp: DateTime<Utc>,
}

impl FileRecord {
    /// A successfully collected record. The collection timestamp is taken now.
    pub fn collected(
        path: impl Into<PathBuf>,
        size: u64,
        times: FileTimes,
        file_hash: Option<String>,
    ) -> Self {
        Self {
            path: path.into(),
            size: Some(size),
            created: times.created,
            modified: times.modified,
            accessed: times.accessed,
            file_hash,
            error: None,
            timestamp: Utc::now(),
        }
    }

    /// An error record: path, error message and collection timestamp only.
    pub fn failed(path: impl Into<PathBuf>, error: impl Into<String>) -> Self {
        Self {
            path: path.into(),
            size: None,
            created: None,
            modified: None,
            accessed: None,
            file_hash: None,
            error: Some(error.into()),
            timestamp: Utc::now(),
        }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    pub fn size(&self) -> Option<u64> {
        self.size
    }

    pub fn times(&self) -> FileTimes {
        FileTimes {
            created: self.created,
            modified: self.modified,
            accessed: self.accessed,
        }
    }

    /// Hex digest, or `None` when the hash was not computed.
    pub fn file_hash(&self) -> Option<&str> {
        self.file_hash.as_deref()
    }

    pub fn error(&self) -> Option<&str> {
        self.error.as_deref()
    }

    #[inline]
    pub fn is_error(&self) -> bool {
        self.error.is_some()
    }

    /// Wall-clock time the record was produced.
    pub fn timestamp(&self) -> DateTime<Utc> {
        self.timestamp
    }
}

// Collected records always carry `file_hash` and `error` keys (possibly
// null); failed records carry only path, error and timestamp.
impl Serialize for FileRecord {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        let mut map = serializer.serialize_map(None)?;
        map.serialize_entry("path", &self.path.to_string_lossy())?;
        match &self.error {
            Some(error) => map.serialize_entry("error", error)?,
            None => {
                map.serialize_entry("size", &self.size)?;
                map.serialize_entry("created", &self.created)?;
                map.serialize_entry("modified", &self.modified)?;
                map.serialize_entry("accessed", &self.accessed)?;
                map.serialize_entry("file_hash", &self.file_hash)?;
                map.serialize_entry("error", &None::<String>)?;
            }
        }
        map.serialize_entry("timestamp", &self.timestamp)?;
        map.end()
    }
}

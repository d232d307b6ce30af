pub mod exiftool;

use std::collections::{HashMap, HashSet};
use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};

use crate::error::TransportError;
use crate::record::MetadataRecord;

pub use exiftool::ExifTool;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct WriteOptions {
    /// Rewrite the file in place instead of keeping an `_original` copy.
    pub overwrite_original: bool,
}

/// Read/write access to a file's embedded metadata.
///
/// Implementations are used from one thread for a whole run.
pub trait MetadataTransport {
    /// All embedded metadata fields of `path`.
    fn read(&mut self, path: &Path) -> Result<MetadataRecord, TransportError>;

    /// Set `fields` on `path`.
    fn write(
        &mut self,
        path: &Path,
        fields: &MetadataRecord,
        options: WriteOptions,
    ) -> Result<(), TransportError>;
}

/// A write recorded by [`MemoryTransport`].
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RecordedWrite {
    pub path: PathBuf,
    pub fields: MetadataRecord,
    pub options: WriteOptions,
}

/// Transport over in-memory records, for dry runs and tests.
#[derive(Debug, Default)]
pub struct MemoryTransport {
    records: HashMap<PathBuf, MetadataRecord>,
    writes: Vec<RecordedWrite>,
    failing: HashSet<PathBuf>,
}

impl MemoryTransport {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_record(mut self, path: impl Into<PathBuf>, record: MetadataRecord) -> Self {
        self.records.insert(path.into(), record);
        self
    }

    /// Every read and write of `path` fails.
    pub fn with_failure(mut self, path: impl Into<PathBuf>) -> Self {
        self.failing.insert(path.into());
        self
    }

    pub fn record(&self, path: &Path) -> Option<&MetadataRecord> {
        self.records.get(path)
    }

    pub fn writes(&self) -> &[RecordedWrite] {
        &self.writes
    }
}

impl MetadataTransport for MemoryTransport {
    fn read(&mut self, path: &Path) -> Result<MetadataRecord, TransportError> {
        if self.failing.contains(path) {
            return Err(TransportError::Read {
                path: path.to_path_buf(),
                message: "simulated failure".to_string(),
            });
        }
        self.records.get(path).cloned().ok_or_else(|| TransportError::Read {
            path: path.to_path_buf(),
            message: "file not found".to_string(),
        })
    }

    fn write(
        &mut self,
        path: &Path,
        fields: &MetadataRecord,
        options: WriteOptions,
    ) -> Result<(), TransportError> {
        if self.failing.contains(path) {
            return Err(TransportError::Write {
                path: path.to_path_buf(),
                message: "simulated failure".to_string(),
            });
        }
        let record = self.records.entry(path.to_path_buf()).or_default();
        for (k, v) in fields.iter() {
            record.insert(k, v);
        }
        self.writes.push(RecordedWrite {
            path: path.to_path_buf(),
            fields: fields.clone(),
            options,
        });
        Ok(())
    }
}

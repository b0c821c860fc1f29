//! Disk-persisted confidence cache
//!
//! Maps configuration fingerprints to a scalar confidence score. The
//! cache is loaded once when a model opens and flushed unconditionally
//! when it closes; writes are whole-file atomic replacements. Two
//! model instances sharing the same file race last-writer-wins, which
//! is an accepted limitation rather than a corruption risk.

use crate::error::ModelError;
use std::collections::HashMap;
use std::fs::{File, OpenOptions};
use std::io::Write;
use std::path::{Path, PathBuf};
use tracing::debug;

/// Process-lifetime mapping from fingerprint to confidence, backed by
/// a single JSON file.
#[derive(Debug)]
pub struct ConfidenceCache {
    path: PathBuf,
    entries: HashMap<String, f64>,
}

impl ConfidenceCache {
    /// Load the cache from disk. A missing file yields an empty cache;
    /// a present but unreadable file is an error.
    pub fn load(path: impl Into<PathBuf>) -> Result<Self, ModelError> {
        let path = path.into();
        let entries = if path.is_file() {
            let data = std::fs::read(&path)?;
            serde_json::from_slice(&data).map_err(|e| {
                ModelError::CorruptState(format!(
                    "confidence cache {} is unreadable: {e}",
                    path.display()
                ))
            })?
        } else {
            HashMap::new()
        };
        debug!(path = %path.display(), entries = entries.len(), "Confidence cache loaded");
        Ok(Self { path, entries })
    }

    /// Cached confidence for a fingerprint; NaN when absent.
    pub fn get(&self, fingerprint: &str) -> f64 {
        self.entries
            .get(fingerprint)
            .copied()
            .unwrap_or(f64::NAN)
    }

    /// Overwrite the confidence for a fingerprint.
    pub fn set(&mut self, fingerprint: impl Into<String>, value: f64) {
        self.entries.insert(fingerprint.into(), value);
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// Write the cache back to disk, unconditionally, replacing the
    /// whole file.
    pub fn flush(&self) -> Result<(), ModelError> {
        let json = serde_json::to_vec(&self.entries)?;
        write_atomic(&self.path, &json)?;
        debug!(path = %self.path.display(), entries = self.entries.len(), "Confidence cache flushed");
        Ok(())
    }
}

/// Replace a file's contents atomically via temp file + rename.
pub(crate) fn write_atomic(path: &Path, data: &[u8]) -> Result<(), ModelError> {
    if let Some(parent) = path.parent() {
        std::fs::create_dir_all(parent)?;
    }

    let temp_path = path.with_extension("tmp");
    let mut file = OpenOptions::new()
        .write(true)
        .create(true)
        .truncate(true)
        .open(&temp_path)?;
    file.write_all(data)?;
    file.sync_all()?;
    drop(file);

    std::fs::rename(&temp_path, path)?;
    Ok(())
}

/// Read a whole file, distinguishing "absent" from other I/O errors.
pub(crate) fn read_if_present(path: &Path) -> Result<Option<Vec<u8>>, ModelError> {
    if !path.is_file() {
        return Ok(None);
    }
    let mut data = Vec::new();
    use std::io::Read;
    File::open(path)?.read_to_end(&mut data)?;
    Ok(Some(data))
}

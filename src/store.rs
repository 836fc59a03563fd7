// src/store.rs
//! Whole-document JSON persistence primitive backing the durable queue

use crate::error::{Result, TrackerError};
use log::warn;
use serde::de::DeserializeOwned;
use serde::Serialize;
use std::path::PathBuf;

/// Named JSON documents in a data directory, replaced whole on every write.
/// Writes go to a temp file first and are renamed into place, so a document
/// is either the old version or the new one after a process kill, never a
/// torn write.
#[derive(Debug, Clone)]
pub struct JsonStore {
    dir: PathBuf,
}

impl JsonStore {
    pub fn new(dir: PathBuf) -> Result<Self> {
        std::fs::create_dir_all(&dir)
            .map_err(|e| TrackerError::Persistence(format!("Failed to create data directory: {}", e)))?;
        Ok(Self { dir })
    }

    fn document_path(&self, name: &str) -> PathBuf {
        self.dir.join(format!("{}.json", name))
    }

    /// Read a named document. A missing, unreadable or corrupt document is
    /// reported as `None` with a warning, never as an error to the caller.
    pub fn get<T: DeserializeOwned>(&self, name: &str) -> Option<T> {
        let path = self.document_path(name);
        if !path.exists() {
            return None;
        }

        let contents = match std::fs::read_to_string(&path) {
            Ok(contents) => contents,
            Err(e) => {
                warn!("Could not read document '{}': {}", name, e);
                return None;
            }
        };

        match serde_json::from_str(&contents) {
            Ok(value) => Some(value),
            Err(e) => {
                warn!("Document '{}' is corrupt, treating as empty: {}", name, e);
                None
            }
        }
    }

    /// Replace a named document atomically
    pub fn put<T: Serialize>(&self, name: &str, value: &T) -> Result<()> {
        let path = self.document_path(name);
        let tmp_path = self.dir.join(format!("{}.json.tmp", name));

        let contents = serde_json::to_string(value)?;
        std::fs::write(&tmp_path, contents)
            .map_err(|e| TrackerError::Persistence(format!("Failed to write '{}': {}", name, e)))?;
        std::fs::rename(&tmp_path, &path)
            .map_err(|e| TrackerError::Persistence(format!("Failed to replace '{}': {}", name, e)))?;

        Ok(())
    }

    /// Delete a named document if present
    pub fn remove(&self, name: &str) -> Result<()> {
        let path = self.document_path(name);
        if path.exists() {
            std::fs::remove_file(&path)
                .map_err(|e| TrackerError::Persistence(format!("Failed to remove '{}': {}", name, e)))?;
        }
        Ok(())
    }

    /// On-disk size of a named document in bytes, 0 if absent
    pub fn size_bytes(&self, name: &str) -> u64 {
        std::fs::metadata(self.document_path(name))
            .map(|m| m.len())
            .unwrap_or(0)
    }
}

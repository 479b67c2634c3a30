// SPDX-License-Identifier: MIT
// Copyright 2026 Roland Dreier <roland@rolandd.dev>

//! Cursor storage: a single get/set slot.

use crate::models::SyncCursor;
use chrono::Utc;
use std::path::{Path, PathBuf};

/// Errors reading or writing the cursor.
#[derive(Debug, thiserror::Error)]
pub enum CursorError {
    #[error("Cursor I/O error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Cursor format error: {0}")]
    Format(#[from] serde_json::Error),
}

/// Read/write slot for the sync cursor. The medium is up to the implementation.
pub trait CursorStore: Send + Sync {
    fn load(&self) -> Result<SyncCursor, CursorError>;
    fn save(&self, cursor: &SyncCursor) -> Result<(), CursorError>;
}

/// Cursor persisted as a JSON file.
#[derive(Debug, Clone)]
pub struct FileCursorStore {
    path: PathBuf,
}

impl FileCursorStore {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self { path: path.into() }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }
}

impl CursorStore for FileCursorStore {
    /// Load the cursor; a missing file is an empty cursor.
    ///
    /// Older releases stored a bare JSON list of synced activity IDs. Those
    /// load with the current time as their start, so they age out of the
    /// window normally.
    fn load(&self) -> Result<SyncCursor, CursorError> {
        let raw = match std::fs::read_to_string(&self.path) {
            Ok(raw) => raw,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => {
                return Ok(SyncCursor::default())
            }
            Err(e) => return Err(e.into()),
        };

        match serde_json::from_str::<SyncCursor>(&raw) {
            Ok(cursor) => Ok(cursor),
            Err(err) => {
                let ids: Vec<String> = serde_json::from_str(&raw).map_err(|_| err)?;
                tracing::info!(count = ids.len(), "Migrating legacy synced-id cache");
                let now = Utc::now();
                let mut cursor = SyncCursor::default();
                for id in ids {
                    cursor.mark_synced(&id, now);
                }
                Ok(cursor)
            }
        }
    }

    /// Write the cursor via a temp file and rename, so a crash never leaves half a file.
    fn save(&self, cursor: &SyncCursor) -> Result<(), CursorError> {
        if let Some(parent) = self.path.parent() {
            if !parent.as_os_str().is_empty() {
                std::fs::create_dir_all(parent)?;
            }
        }
        let json = serde_json::to_string_pretty(cursor)?;
        let tmp = self.path.with_extension("json.tmp");
        std::fs::write(&tmp, json)?;
        std::fs::rename(&tmp, &self.path)?;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_missing_file_is_empty_cursor() {
        let dir = tempfile::tempdir().unwrap();
        let store = FileCursorStore::new(dir.path().join("cursor.json"));
        assert_eq!(store.load().unwrap(), SyncCursor::default());
    }

    #[test]
    fn test_save_then_load() {
        let dir = tempfile::tempdir().unwrap();
        let store = FileCursorStore::new(dir.path().join("data/cursor.json"));
        let mut cursor = SyncCursor::default();
        cursor.mark_synced("123", Utc::now());
        cursor.last_synced_at = Some(Utc::now());

        store.save(&cursor).unwrap();
        assert_eq!(store.load().unwrap(), cursor);
    }

    #[test]
    fn test_loads_legacy_id_list() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join(".strava_synced_cache.json");
        std::fs::write(&path, r#"["111", "222"]"#).unwrap();

        let cursor = FileCursorStore::new(&path).load().unwrap();
        assert!(cursor.is_synced("111"));
        assert!(cursor.is_synced("222"));
        assert!(cursor.last_synced_at.is_none());
    }

    #[test]
    fn test_corrupt_file_is_error() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("cursor.json");
        std::fs::write(&path, "{ not json").unwrap();
        assert!(matches!(
            FileCursorStore::new(&path).load(),
            Err(CursorError::Format(_))
        ));
    }
}

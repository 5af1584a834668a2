// Copyright (C) 2025 SyncMyOrders Sp. z o.o.
// SPDX-License-Identifier: AGPL-3.0-or-later
//! Bounded per-key archive of generation records.
//!
//! Each key owns one directory under the data root; each record is one file
//! named `Generation_<index>` with a contiguous zero-based index. Appends
//! beyond the retention limit evict the oldest records and renumber the
//! survivors, so after any completed mutation the indices form `[0, count)`
//! in creation order.
//!
//! Mutations are not atomic: a crash mid-sequence can leave a transient gap,
//! which the next re-scan for that key closes. Mutations on one key are
//! serialized through a per-key lock so concurrent appends or an append
//! racing a delete cannot interleave their rescan/rename steps; different
//! keys never contend.

use std::collections::HashMap;
use std::path::{Path, PathBuf};
use std::sync::{Arc, Mutex as StdMutex};
use std::time::SystemTime;

use thiserror::Error;
use tokio::fs;
use tokio::sync::Mutex;
use tracing::{debug, error, info, warn};

use crate::config::ArchiveConfig;
use crate::record::Generation;

/// File name prefix for archived records.
pub const RECORD_PREFIX: &str = "Generation_";

/// Errors from archive store operations.
#[derive(Debug, Error)]
#[non_exhaustive]
pub enum StorageError {
    /// I/O operation failed.
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    /// JSON encoding of a record failed.
    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),
}

/// One record file found on disk.
#[derive(Debug)]
struct RecordFile {
    path: PathBuf,
    index: u64,
    modified: SystemTime,
}

/// Parse the numeric index out of a record file name.
fn parse_index(name: &str) -> Option<u64> {
    name.strip_prefix(RECORD_PREFIX)?.parse().ok()
}

/// Bounded per-key archive store.
pub struct ArchiveStore {
    data_dir: PathBuf,
    max_records: usize,
    key_locks: StdMutex<HashMap<String, Arc<Mutex<()>>>>,
}

impl ArchiveStore {
    /// Create an archive store, creating the data root if absent.
    pub fn new(config: ArchiveConfig) -> Result<Self, StorageError> {
        std::fs::create_dir_all(&config.data_dir)?;
        Ok(Self {
            data_dir: config.data_dir,
            max_records: config.max_records,
            key_locks: StdMutex::new(HashMap::new()),
        })
    }

    /// Directory holding the records for one key.
    fn key_dir(&self, key: &str) -> PathBuf {
        self.data_dir.join(key)
    }

    /// Get or create the mutation lock for one key.
    fn key_lock(&self, key: &str) -> Arc<Mutex<()>> {
        let mut locks = self
            .key_locks
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner());
        locks.entry(key.to_string()).or_default().clone()
    }

    /// Append a record under `key`, evicting the oldest records when the
    /// retention limit is exceeded and renumbering the survivors.
    pub async fn append(&self, key: &str, record: &Generation) -> Result<(), StorageError> {
        let lock = self.key_lock(key);
        let _guard = lock.lock().await;

        let result = self.append_locked(key, record).await;
        if let Err(e) = &result {
            error!(key = %key, error = %e, "Failed to append generation record");
        }
        result
    }

    async fn append_locked(&self, key: &str, record: &Generation) -> Result<(), StorageError> {
        let dir = self.key_dir(key);
        fs::create_dir_all(&dir).await?;

        let count = self.scan_by_creation(&dir).await?.len();
        let path = dir.join(format!("{RECORD_PREFIX}{count}"));
        let json = serde_json::to_string(record)?;
        fs::write(&path, json).await?;

        debug!(key = %key, path = %path.display(), "Stored generation record");

        let files = self.scan_by_creation(&dir).await?;
        if files.len() > self.max_records {
            let excess = files.len() - self.max_records;
            for stale in &files[..excess] {
                fs::remove_file(&stale.path).await?;
            }
            info!(key = %key, evicted = excess, "Evicted oldest generation records");

            let survivors = self.scan_by_creation(&dir).await?;
            self.reindex(&dir, &survivors).await?;
        }

        Ok(())
    }

    /// Read every record archived under `key`, in ascending index order.
    ///
    /// A record that fails to read or decode is logged and skipped rather
    /// than failing the whole listing. A key with no records yields an
    /// empty vec.
    pub async fn list_all(&self, key: &str) -> Result<Vec<Generation>, StorageError> {
        let dir = self.key_dir(key);
        fs::create_dir_all(&dir).await?;

        let mut files = self.scan_by_creation(&dir).await?;
        files.sort_by_key(|f| f.index);

        let mut records = Vec::with_capacity(files.len());
        for file in files {
            let content = match fs::read_to_string(&file.path).await {
                Ok(c) => c,
                Err(e) => {
                    error!(path = %file.path.display(), error = %e, "Skipping unreadable record");
                    continue;
                }
            };
            match serde_json::from_str::<Generation>(&content) {
                Ok(record) => records.push(record),
                Err(e) => {
                    error!(path = %file.path.display(), error = %e, "Skipping undecodable record");
                }
            }
        }

        Ok(records)
    }

    /// Delete the record named `record_name` (e.g. `Generation_3`) under
    /// `key`, then renumber the survivors contiguously.
    ///
    /// Returns `Ok(false)` when no such record exists.
    pub async fn delete(&self, key: &str, record_name: &str) -> Result<bool, StorageError> {
        // Reject names that are not record names at all; this also keeps
        // path fragments out of the key directory.
        if parse_index(record_name).is_none() {
            return Ok(false);
        }

        let lock = self.key_lock(key);
        let _guard = lock.lock().await;

        let result = self.delete_locked(key, record_name).await;
        if let Err(e) = &result {
            error!(key = %key, record = %record_name, error = %e, "Failed to delete generation record");
        }
        result
    }

    async fn delete_locked(&self, key: &str, record_name: &str) -> Result<bool, StorageError> {
        let dir = self.key_dir(key);
        let path = dir.join(record_name);

        match fs::remove_file(&path).await {
            Ok(()) => {}
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => return Ok(false),
            Err(e) => return Err(e.into()),
        }

        debug!(key = %key, record = %record_name, "Deleted generation record");

        let survivors = self.scan_by_creation(&dir).await?;
        self.reindex(&dir, &survivors).await?;
        Ok(true)
    }

    /// Enumerate record files in creation order.
    ///
    /// Creation order is the file modification time (stable across the
    /// renames done by re-indexing), tie-broken by the numeric index in the
    /// name so bursts of appends within one clock tick stay ordered.
    async fn scan_by_creation(&self, dir: &Path) -> Result<Vec<RecordFile>, StorageError> {
        let mut files = Vec::new();

        let mut entries = fs::read_dir(dir).await?;
        while let Some(entry) = entries.next_entry().await? {
            let name = entry.file_name();
            let Some(index) = parse_index(&name.to_string_lossy()) else {
                continue;
            };
            let modified = match entry.metadata().await.and_then(|m| m.modified()) {
                Ok(t) => t,
                Err(e) => {
                    warn!(path = %entry.path().display(), error = %e, "Failed to read record mtime");
                    continue;
                }
            };
            files.push(RecordFile {
                path: entry.path(),
                index,
                modified,
            });
        }

        files.sort_by(|a, b| a.modified.cmp(&b.modified).then(a.index.cmp(&b.index)));
        Ok(files)
    }

    /// Rename `files` (already in creation order) to occupy indices
    /// `0..files.len()`, skipping files whose name already matches.
    ///
    /// Returns the number of renames performed.
    async fn reindex(&self, dir: &Path, files: &[RecordFile]) -> Result<usize, StorageError> {
        let mut renamed = 0;
        for (i, file) in files.iter().enumerate() {
            let target = dir.join(format!("{RECORD_PREFIX}{i}"));
            if file.path != target {
                fs::rename(&file.path, &target).await?;
                renamed += 1;
            }
        }
        if renamed > 0 {
            debug!(dir = %dir.display(), renamed = renamed, "Re-indexed archive records");
        }
        Ok(renamed)
    }
}

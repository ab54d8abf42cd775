// Multiget - Resumable Chunked Downloads for Mobile
// Copyright (C) 2025 Henning Berge
//
// This program is free software: you can redistribute it and/or modify
// it under the terms of the GNU General Public License as published by
// the Free Software Foundation, either version 3 of the License, or
// (at your option) any later version.
//
// This program is distributed in the hope that it will be useful,
// but WITHOUT ANY WARRANTY; without even the implied warranty of
// MERCHANTABILITY or FITNESS FOR A PARTICULAR PURPOSE. See the
// GNU General Public License for more details.
//
// You should have received a copy of the GNU General Public License
// along with this program. If not, see <https://www.gnu.org/licenses/>.


//! Persistent transfer state for resume support
//!
//! # Record Layout
//! One JSON document per transfer, stored next to the partial download:
//! - `<name>.download` - the preallocated partial file
//! - `<name>.download_state.json` - this record
//!
//! The document carries an explicit `version`. Anything that does not decode
//! as the current version is treated as absent, so a schema change or a torn
//! write degrades to a fresh download instead of a hard error.
//!
//! # Offsets
//! `worker_offsets` maps worker id (1..=N) to the number of bytes that worker
//! has written inside its own block. They are absolute per worker, not deltas:
//! remaining work for worker `i` is `range_len(i) - offset(i)`.

use crate::download::partition::{block_size, WorkerRange};
use crate::error::{DownloadError, Result};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::path::{Path, PathBuf};
use std::time::Duration;
use tracing::warn;

/// Suffix of the partially downloaded file
pub const PARTIAL_SUFFIX: &str = ".download";

/// Suffix of the progress record file
pub const RECORD_SUFFIX: &str = ".download_state.json";

/// Current record schema version
pub const RECORD_VERSION: u32 = 1;

/// Snapshot of everything needed to resume a transfer
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ProgressRecord {
    /// Schema version, always `RECORD_VERSION` when written
    pub version: u32,

    /// HTTP(s) URL of the file (final URL after redirects once probed)
    pub url: String,

    /// Target file name, known after the first probe
    pub file_name: Option<String>,

    /// Total content length in bytes (0 until probed)
    pub file_size: u64,

    /// Per-worker block size
    pub block_size: u64,

    /// Worker id -> bytes written inside that worker's block
    pub worker_offsets: BTreeMap<usize, u64>,

    /// Cumulative bytes written across all workers
    pub downloaded: u64,

    /// When the transfer was (re)initialized
    pub created_at: DateTime<Utc>,

    /// Active download time accumulated over all sessions
    pub spent_ms: u64,

    /// Last-Modified header seen at initialization
    pub remote_last_modified: Option<String>,
}

impl ProgressRecord {
    /// Create an unprobed record with a zero offset for every worker
    pub fn new(url: String, workers: usize) -> Self {
        Self {
            version: RECORD_VERSION,
            url,
            file_name: None,
            file_size: 0,
            block_size: 0,
            worker_offsets: (1..=workers.max(1)).map(|id| (id, 0)).collect(),
            downloaded: 0,
            created_at: Utc::now(),
            spent_ms: 0,
            remote_last_modified: None,
        }
    }

    /// Number of workers, always the size of the offset map
    pub fn worker_count(&self) -> usize {
        self.worker_offsets.len()
    }

    pub fn offset(&self, worker_id: usize) -> u64 {
        self.worker_offsets.get(&worker_id).copied().unwrap_or(0)
    }

    pub fn range(&self, worker_id: usize) -> WorkerRange {
        WorkerRange::new(worker_id, self.block_size, self.file_size)
    }

    pub fn spent(&self) -> Duration {
        Duration::from_millis(self.spent_ms)
    }

    pub fn add_spent(&mut self, elapsed: Duration) {
        self.spent_ms = self.spent_ms.saturating_add(elapsed.as_millis() as u64);
    }

    pub fn is_probed(&self) -> bool {
        self.file_size > 0
    }

    pub fn is_complete(&self) -> bool {
        self.is_probed() && self.downloaded >= self.file_size
    }

    /// Set size and block for a freshly probed resource, clearing all progress
    pub fn reinitialize(&mut self, file_size: u64) {
        self.file_size = file_size;
        self.block_size = block_size(file_size, self.worker_count());
        self.reset_progress();
    }

    /// Drop all progress, keeping URL, size and worker count
    pub fn reset_progress(&mut self) {
        for offset in self.worker_offsets.values_mut() {
            *offset = 0;
        }
        self.downloaded = 0;
        self.spent_ms = 0;
        self.created_at = Utc::now();
    }

    /// Record a flushed write: bump the counter and move the worker's offset
    pub fn apply(&mut self, worker_id: usize, written: u64, offset: u64) {
        self.worker_offsets.insert(worker_id, offset);
        self.downloaded = self.downloaded.saturating_add(written);
    }

    /// Check the structural invariants of a loaded record
    pub fn validate(&self) -> std::result::Result<(), String> {
        if self.worker_offsets.is_empty() {
            return Err("record has no workers".to_string());
        }
        let expected_ids: Vec<usize> = (1..=self.worker_count()).collect();
        let ids: Vec<usize> = self.worker_offsets.keys().copied().collect();
        if ids != expected_ids {
            return Err(format!("worker ids {:?} are not 1..={}", ids, self.worker_count()));
        }
        if !self.is_probed() {
            return Ok(());
        }
        if self.block_size != block_size(self.file_size, self.worker_count()) {
            return Err(format!(
                "block size {} does not match file size {} over {} workers",
                self.block_size,
                self.file_size,
                self.worker_count()
            ));
        }
        let mut total = 0u64;
        for (&id, &offset) in &self.worker_offsets {
            let range = self.range(id);
            if offset > range.len {
                return Err(format!("worker {} offset {} exceeds range length {}", id, offset, range.len));
            }
            total += offset;
        }
        if total != self.downloaded {
            return Err(format!("offsets sum to {} but downloaded is {}", total, self.downloaded));
        }
        Ok(())
    }

    /// Save record to disk via a sibling temp file and rename
    pub async fn save(&self, path: &Path) -> Result<()> {
        let json = serde_json::to_vec_pretty(self)?;
        let tmp = temp_path(path);
        tokio::fs::write(&tmp, json).await?;
        tokio::fs::rename(&tmp, path).await?;
        Ok(())
    }

    /// Load record from disk
    ///
    /// Returns `Ok(None)` when the file is missing or does not decode as the
    /// current version.
    pub async fn load(path: &Path) -> Result<Option<Self>> {
        let bytes = match tokio::fs::read(path).await {
            Ok(bytes) => bytes,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => return Ok(None),
            Err(e) => return Err(e.into()),
        };
        Ok(Self::decode(&bytes, path))
    }

    fn decode(bytes: &[u8], path: &Path) -> Option<Self> {
        let value: serde_json::Value = match serde_json::from_slice(bytes) {
            Ok(v) => v,
            Err(e) => {
                warn!(path = %path.display(), error = %e, "progress record is corrupt");
                return None;
            }
        };
        let version = value.get("version").and_then(|v| v.as_u64());
        if version != Some(RECORD_VERSION as u64) {
            warn!(path = %path.display(), ?version, "unsupported progress record version");
            return None;
        }
        match serde_json::from_value(value) {
            Ok(record) => Some(record),
            Err(e) => {
                warn!(path = %path.display(), error = %e, "progress record is missing fields");
                None
            }
        }
    }

    /// Delete a record file; missing files are fine
    pub async fn delete(path: &Path) -> Result<()> {
        match tokio::fs::remove_file(path).await {
            Ok(()) => Ok(()),
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(()),
            Err(e) => Err(e.into()),
        }
    }
}

fn temp_path(path: &Path) -> PathBuf {
    let mut name = path
        .file_name()
        .map(|n| n.to_os_string())
        .unwrap_or_default();
    name.push(".tmp");
    path.with_file_name(name)
}

/// On-disk locations of one transfer
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TransferPaths {
    /// Final file name
    pub file_name: String,

    /// `<dir>/<name>.download`
    pub partial: PathBuf,

    /// `<dir>/<name>.download_state.json`
    pub record: PathBuf,

    /// `<dir>/<name>`
    pub target: PathBuf,
}

impl TransferPaths {
    pub fn new(save_dir: &Path, file_name: &str) -> Self {
        Self {
            file_name: file_name.to_string(),
            partial: save_dir.join(format!("{}{}", file_name, PARTIAL_SUFFIX)),
            record: save_dir.join(format!("{}{}", file_name, RECORD_SUFFIX)),
            target: save_dir.join(file_name),
        }
    }

    /// Derive all paths from a record path; the partial file lives in the same directory
    pub fn from_record_path(record: &Path) -> Result<Self> {
        let name = record
            .file_name()
            .and_then(|n| n.to_str())
            .and_then(|n| n.strip_suffix(RECORD_SUFFIX))
            .filter(|n| !n.is_empty())
            .ok_or_else(|| {
                DownloadError::invalid_input(format!(
                    "{} is not a progress record (expected *{})",
                    record.display(),
                    RECORD_SUFFIX
                ))
            })?;
        let dir = record.parent().unwrap_or_else(|| Path::new("."));
        Ok(Self::new(dir, name))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn probed_record() -> ProgressRecord {
        let mut record = ProgressRecord::new("https://example.com/file.bin".to_string(), 2);
        record.file_name = Some("file.bin".to_string());
        record.reinitialize(1000);
        record.remote_last_modified = Some("Wed, 21 Oct 2015 07:28:00 GMT".to_string());
        record
    }

    #[test]
    fn test_new_record_has_zero_offsets() {
        let record = ProgressRecord::new("https://example.com/a".to_string(), 3);
        assert_eq!(record.worker_count(), 3);
        assert!(record.worker_offsets.values().all(|&o| o == 0));
        assert!(!record.is_probed());
        assert!(record.validate().is_ok());
    }

    #[test]
    fn test_apply_tracks_counter_and_offsets() {
        let mut record = probed_record();
        assert_eq!(record.block_size, 500);

        record.apply(1, 100, 100);
        record.apply(2, 200, 200);
        record.apply(1, 50, 150);

        assert_eq!(record.downloaded, 350);
        assert_eq!(record.offset(1), 150);
        assert_eq!(record.offset(2), 200);
        assert!(record.validate().is_ok());
    }

    #[test]
    fn test_validate_rejects_inconsistent_records() {
        let mut record = probed_record();
        record.downloaded = 10;
        assert!(record.validate().is_err());

        let mut record = probed_record();
        record.worker_offsets.insert(2, 501);
        record.downloaded = 501;
        assert!(record.validate().is_err());

        let mut record = probed_record();
        record.worker_offsets.remove(&1);
        assert!(record.validate().is_err());

        let mut record = probed_record();
        record.block_size = 400;
        assert!(record.validate().is_err());
    }

    #[tokio::test]
    async fn test_save_load_keeps_every_field() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("file.bin.download_state.json");

        let mut record = probed_record();
        record.apply(1, 120, 120);
        record.apply(2, 180, 180);
        record.add_spent(Duration::from_millis(4321));
        record.save(&path).await.unwrap();

        let loaded = ProgressRecord::load(&path).await.unwrap().unwrap();
        assert_eq!(loaded, record);
        assert!(!temp_path(&path).exists());
    }

    #[tokio::test]
    async fn test_load_missing_or_corrupt_is_absent() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("gone.download_state.json");
        assert!(ProgressRecord::load(&path).await.unwrap().is_none());

        tokio::fs::write(&path, b"{\"version\":1,\"url\":").await.unwrap();
        assert!(ProgressRecord::load(&path).await.unwrap().is_none());

        let mut value = serde_json::to_value(probed_record()).unwrap();
        value["version"] = serde_json::json!(99);
        tokio::fs::write(&path, serde_json::to_vec(&value).unwrap()).await.unwrap();
        assert!(ProgressRecord::load(&path).await.unwrap().is_none());
    }

    #[tokio::test]
    async fn test_delete_is_idempotent() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("x.download_state.json");
        probed_record().save(&path).await.unwrap();

        ProgressRecord::delete(&path).await.unwrap();
        ProgressRecord::delete(&path).await.unwrap();
        assert!(!path.exists());
    }

    #[test]
    fn test_transfer_paths() {
        let paths = TransferPaths::new(Path::new("/tmp/dl"), "movie.mp4");
        assert_eq!(paths.partial, PathBuf::from("/tmp/dl/movie.mp4.download"));
        assert_eq!(paths.record, PathBuf::from("/tmp/dl/movie.mp4.download_state.json"));
        assert_eq!(paths.target, PathBuf::from("/tmp/dl/movie.mp4"));

        let derived = TransferPaths::from_record_path(&paths.record).unwrap();
        assert_eq!(derived, paths);

        assert!(TransferPaths::from_record_path(Path::new("/tmp/dl/movie.mp4")).is_err());
    }
}

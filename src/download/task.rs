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


//! Background wrapper around [`DownloadEngine`]
//!
//! Callers on a UI thread never await anything: `prepare` and `start` spawn
//! onto the ambient tokio runtime, or onto a process-wide runtime when called
//! from plain threads (mobile bridges, desktop UI loops). Errors are logged and
//! delivered through the listener, never returned.

use crate::download::config::EngineConfig;
use crate::download::engine::{DownloadEngine, EngineState};
use crate::download::listener::SharedListener;
use crate::error::Result;
use chrono::{DateTime, Utc};
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::Duration;
use tokio::runtime::{Handle, Runtime};
use tokio::task::JoinHandle;
use tracing::{debug, warn};

// Lazy static tokio runtime for callers outside any runtime
lazy_static::lazy_static! {
    static ref RUNTIME: Runtime =
        Runtime::new().expect("Failed to create Tokio runtime");
}

fn runtime_handle() -> Handle {
    Handle::try_current().unwrap_or_else(|_| RUNTIME.handle().clone())
}

/// Non-blocking prepare/start/stop over a shared engine
#[derive(Debug, Clone)]
pub struct DownloadTask {
    engine: Arc<DownloadEngine>,
    runtime: Handle,
}

impl DownloadTask {
    pub fn new(engine: DownloadEngine) -> Self {
        Self::from_shared(Arc::new(engine))
    }

    pub fn from_shared(engine: Arc<DownloadEngine>) -> Self {
        Self {
            engine,
            runtime: runtime_handle(),
        }
    }

    /// Fresh transfer; see [`DownloadEngine::new`]
    pub fn fresh(url: &str, save_dir: impl Into<PathBuf>, workers: usize) -> Result<Self> {
        Ok(Self::new(DownloadEngine::new(url, save_dir, workers)?))
    }

    /// Resumed transfer; see [`DownloadEngine::resume`]
    pub async fn resume(record_path: impl AsRef<Path>) -> Result<Self> {
        Ok(Self::new(DownloadEngine::resume(record_path).await?))
    }

    /// Probe in the background; `None` if already initialized
    pub fn prepare(&self) -> Option<JoinHandle<()>> {
        if self.engine.is_initialized() {
            debug!("prepare skipped, transfer already initialized");
            return None;
        }
        let engine = self.engine.clone();
        Some(self.runtime.spawn(async move {
            if let Err(e) = engine.initialize().await {
                warn!(error = %e, "background prepare failed");
            }
        }))
    }

    /// Probe if needed, then download in the background
    ///
    /// `None` while a download is running or after it finished.
    pub fn start(&self) -> Option<JoinHandle<()>> {
        match self.engine.state() {
            EngineState::Downloading | EngineState::Finished => {
                debug!(state = self.engine.state().as_str(), "start skipped");
                return None;
            }
            _ => {}
        }
        let engine = self.engine.clone();
        Some(self.runtime.spawn(async move {
            // download() probes first when the transfer is not initialized
            if let Err(e) = engine.download().await {
                warn!(error = %e, "background download failed");
            }
        }))
    }

    /// Cooperative pause; workers stop after their current buffer
    pub fn stop(&self) {
        self.engine.pause();
    }

    pub fn engine(&self) -> &Arc<DownloadEngine> {
        &self.engine
    }

    pub fn set_listener(&self, listener: SharedListener) {
        self.engine.set_listener(listener);
    }

    pub fn config(&self) -> &EngineConfig {
        self.engine.config()
    }

    pub fn is_ready(&self) -> bool {
        self.engine.is_initialized()
    }

    pub fn is_started(&self) -> bool {
        self.engine.state() == EngineState::Downloading
    }

    pub fn is_stopped(&self) -> bool {
        self.engine.state() == EngineState::Paused
    }

    pub fn is_done(&self) -> bool {
        self.engine.state() == EngineState::Finished
    }

    pub fn is_failed(&self) -> bool {
        self.engine.state() == EngineState::Failed
    }

    pub fn url(&self) -> String {
        self.engine.url()
    }

    pub fn save_dir(&self) -> &Path {
        self.engine.save_dir()
    }

    pub fn file_name(&self) -> Option<String> {
        self.engine.file_name()
    }

    pub fn file_size(&self) -> u64 {
        self.engine.file_size()
    }

    pub fn downloaded_size(&self) -> u64 {
        self.engine.downloaded_size()
    }

    /// Earlier sessions plus the running one
    pub fn spent_time(&self) -> Duration {
        self.engine.spent_time() + self.engine.session_elapsed()
    }

    pub fn created_at(&self) -> DateTime<Utc> {
        self.engine.created_at()
    }

    pub fn worker_count(&self) -> usize {
        self.engine.worker_count()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_start_against_dead_host_fails_in_background() {
        let dir = tempfile::tempdir().unwrap();
        let task = DownloadTask::fresh("http://127.0.0.1:9/file.bin", dir.path(), 2).unwrap();
        assert_eq!(task.worker_count(), 2);
        assert!(!task.is_ready());

        let handle = task.start().expect("first start spawns");
        handle.await.unwrap();

        assert!(task.is_failed());
        assert!(!task.is_done());
        assert_eq!(task.downloaded_size(), 0);
    }

    #[test]
    fn test_task_outside_runtime_uses_shared_runtime() {
        let task = DownloadTask::fresh("http://127.0.0.1:9/file.bin", "/tmp/multiget-test", 1).unwrap();
        let handle = task.prepare().expect("not initialized yet");
        RUNTIME.block_on(handle).unwrap();
        assert!(!task.is_ready());
        assert!(!task.is_started());
    }
}

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


//! Download engine: probe, partition, supervise, finalize
//!
//! # Lifecycle
//! ```text
//! Uninitialized --initialize--> Initialized --download--> Downloading
//! Downloading --all bytes--> Finished
//! Downloading --pause--> Paused --download--> Downloading
//! Downloading --fatal error--> Failed --download--> Downloading
//! ```
//!
//! # Supervision
//! Workers report over a channel: once when the server accepts their ranged
//! request and once when they end. A slot counts as working only between
//! those two events, never while it waits out its backoff. A stalled worker
//! is restarted from its last committed offset after `retry_delay`. The
//! restart counter grows when no other worker is working, or when the stall
//! cause is not retryable; once it passes `retry_limit` the transfer fails
//! with [`DownloadError::NoFunctionalWorker`]. A changed remote file fails the
//! transfer immediately and does not touch the counter.
//!
//! Between events the supervisor ticks every `poll_interval`, emitting
//! progress and checkpointing the record every `checkpoint_interval`.

use crate::download::config::EngineConfig;
use crate::download::http::{ProbeInfo, TransferClient};
use crate::download::ledger::ProgressLedger;
use crate::download::listener::{self, SharedListener};
use crate::download::partition::WorkerRange;
use crate::download::progress::{ProgressTracker, TransferProgress};
use crate::download::record::{ProgressRecord, TransferPaths};
use crate::download::worker::{
    ChunkWorker, WorkerContext, WorkerEvent, WorkerOutcome, WorkerReport, WorkerState,
};
use crate::error::{DownloadError, Result};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex, MutexGuard, RwLock};
use std::time::{Duration, Instant};
use tokio::sync::{mpsc, watch};
use tokio::task::JoinHandle;
use tokio::time::MissedTickBehavior;
use tokio_util::sync::CancellationToken;
use tracing::{debug, error, info, warn};
use url::Url;

/// Engine lifecycle state
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum EngineState {
    Uninitialized,
    Initialized,
    Downloading,
    Paused,
    Finished,
    Failed,
}

impl EngineState {
    pub fn as_str(&self) -> &'static str {
        match self {
            EngineState::Uninitialized => "uninitialized",
            EngineState::Initialized => "initialized",
            EngineState::Downloading => "downloading",
            EngineState::Paused => "paused",
            EngineState::Finished => "finished",
            EngineState::Failed => "failed",
        }
    }
}

/// How a supervised session ended without error
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum SessionEnd {
    Finished,
    Paused,
}

struct WorkerSlot {
    range: WorkerRange,
    state: WorkerState,
    handle: Option<JoinHandle<()>>,
}

/// Multi-worker resumable download of a single file
pub struct DownloadEngine {
    config: EngineConfig,
    client: TransferClient,
    save_dir: PathBuf,
    paths: RwLock<Option<TransferPaths>>,
    ledger: Arc<ProgressLedger>,
    state: watch::Sender<EngineState>,
    initialized: AtomicBool,
    init_lock: tokio::sync::Mutex<()>,
    pause: Mutex<CancellationToken>,
    session_started: Mutex<Option<Instant>>,
    listener: RwLock<SharedListener>,
}

impl DownloadEngine {
    /// Fresh transfer of `url` into `save_dir` with `workers` ranges (0 means 1)
    pub fn new(url: &str, save_dir: impl Into<PathBuf>, workers: usize) -> Result<Self> {
        let parsed = parse_url(url)?;
        let record = ProgressRecord::new(parsed.to_string(), workers.max(1));
        Self::from_parts(record, save_dir.into(), None, EngineConfig::default())
    }

    /// Resume from a `<name>.download_state.json` record
    ///
    /// The worker count is the size of the persisted offset map. Progress is
    /// reset when the partial file is gone or the record is inconsistent. The
    /// engine always starts uninitialized so the remote file is re-probed.
    pub async fn resume(record_path: impl AsRef<Path>) -> Result<Self> {
        let record_path = record_path.as_ref();
        let paths = TransferPaths::from_record_path(record_path)?;
        let mut record = ProgressRecord::load(record_path)
            .await?
            .ok_or_else(|| DownloadError::RecordUnavailable(record_path.to_path_buf()))?;
        parse_url(&record.url)?;

        if let Err(reason) = record.validate() {
            warn!(record = %record_path.display(), %reason, "inconsistent progress record, starting over");
            let workers = record.worker_count().max(1);
            record.worker_offsets = (1..=workers).map(|id| (id, 0)).collect();
            if record.is_probed() {
                let size = record.file_size;
                record.reinitialize(size);
            } else {
                record.reset_progress();
            }
        } else if !tokio::fs::try_exists(&paths.partial).await.unwrap_or(false) {
            info!(partial = %paths.partial.display(), "partial file missing, starting over");
            record.reset_progress();
        }
        record.file_name = Some(paths.file_name.clone());

        let save_dir = record_path
            .parent()
            .map(Path::to_path_buf)
            .unwrap_or_else(|| PathBuf::from("."));
        info!(
            url = %record.url,
            workers = record.worker_count(),
            downloaded = record.downloaded,
            "resuming transfer"
        );
        Self::from_parts(record, save_dir, Some(paths), EngineConfig::default())
    }

    fn from_parts(
        record: ProgressRecord,
        save_dir: PathBuf,
        paths: Option<TransferPaths>,
        config: EngineConfig,
    ) -> Result<Self> {
        let (state, _) = watch::channel(EngineState::Uninitialized);
        Ok(Self {
            client: TransferClient::new(&config)?,
            config,
            save_dir,
            paths: RwLock::new(paths),
            ledger: Arc::new(ProgressLedger::new(record)),
            state,
            initialized: AtomicBool::new(false),
            init_lock: tokio::sync::Mutex::new(()),
            pause: Mutex::new(CancellationToken::new()),
            session_started: Mutex::new(None),
            listener: RwLock::new(listener::noop()),
        })
    }

    /// Replace the tuning knobs; rebuilds the HTTP client
    pub fn with_config(mut self, config: EngineConfig) -> Result<Self> {
        self.client = TransferClient::new(&config)?;
        self.config = config;
        Ok(self)
    }

    pub fn with_listener(mut self, listener: SharedListener) -> Self {
        self.listener = RwLock::new(listener);
        self
    }

    pub fn set_listener(&self, listener: SharedListener) {
        *self.listener.write().unwrap_or_else(|p| p.into_inner()) = listener;
    }

    fn listener(&self) -> SharedListener {
        self.listener.read().unwrap_or_else(|p| p.into_inner()).clone()
    }

    fn pause_token(&self) -> MutexGuard<'_, CancellationToken> {
        self.pause.lock().unwrap_or_else(|p| p.into_inner())
    }

    fn session_guard(&self) -> MutexGuard<'_, Option<Instant>> {
        self.session_started.lock().unwrap_or_else(|p| p.into_inner())
    }

    fn set_state(&self, state: EngineState) {
        let previous = self.state.send_replace(state);
        if previous != state {
            debug!(from = previous.as_str(), to = state.as_str(), "engine state changed");
        }
    }

    /// Probe the remote file and prepare the record; no-op once initialized
    pub async fn initialize(&self) -> Result<()> {
        let _guard = self.init_lock.lock().await;
        if self.is_initialized() {
            return Ok(());
        }

        match self.probe_and_prepare().await {
            Ok(()) => {
                self.initialized.store(true, Ordering::SeqCst);
                self.state.send_if_modified(|state| {
                    if *state == EngineState::Uninitialized {
                        *state = EngineState::Initialized;
                        true
                    } else {
                        false
                    }
                });
                info!(
                    file = ?self.file_name(),
                    size = self.file_size(),
                    downloaded = self.downloaded_size(),
                    "transfer initialized"
                );
                self.listener().on_initialized(Ok(()));
                Ok(())
            }
            Err(e) => {
                error!(url = %self.url(), error = %e, "initialization failed");
                self.listener().on_initialized(Err(&e));
                Err(e)
            }
        }
    }

    async fn probe_and_prepare(&self) -> Result<()> {
        let url = parse_url(&self.url())?;
        let info = self.client.probe(&url).await?;

        let unchanged = self.ledger.read(|record| {
            record.is_probed()
                && record.remote_last_modified == info.last_modified
                && info.content_length.map_or(true, |len| len == record.file_size)
        });
        if unchanged && self.paths().is_some() {
            debug!(last_modified = ?info.last_modified, "remote file unchanged, keeping progress");
            tokio::fs::create_dir_all(&self.save_dir).await?;
            return Ok(());
        }

        self.reset_for(info).await
    }

    /// Start over against a newly probed (or changed) remote file
    async fn reset_for(&self, info: ProbeInfo) -> Result<()> {
        let file_size = info
            .content_length
            .filter(|&len| len > 0)
            .ok_or(DownloadError::UnknownFileSize)?;

        let paths = TransferPaths::new(&self.save_dir, &info.file_name);
        if let Some(old) = self.paths() {
            if self.ledger.read(ProgressRecord::is_probed) {
                let old_tag = self.ledger.read(|r| r.remote_last_modified.clone());
                info!(?old_tag, new_tag = ?info.last_modified, "remote file changed, restarting from zero");
            }
            if old != paths {
                remove_stale(&old.partial).await;
                remove_stale(&old.record).await;
            }
        }

        tokio::fs::create_dir_all(&self.save_dir).await?;
        self.ledger.update(|record| {
            record.url = info.final_url.to_string();
            record.file_name = Some(paths.file_name.clone());
            record.remote_last_modified = info.last_modified.clone();
            record.reinitialize(file_size);
        });
        *self.paths.write().unwrap_or_else(|p| p.into_inner()) = Some(paths.clone());

        self.ledger.snapshot().save(&paths.record).await?;
        self.ledger.take_dirty();
        Ok(())
    }

    /// Run the transfer until it finishes, pauses or fails
    ///
    /// No-op when already downloading or finished. Initializes first if
    /// needed. Fatal errors are reported to the listener and returned.
    pub async fn download(&self) -> Result<()> {
        let cancel = CancellationToken::new();
        let claimed = self.state.send_if_modified(|state| match state {
            EngineState::Downloading | EngineState::Finished => false,
            _ => {
                *self.pause_token() = cancel.clone();
                *state = EngineState::Downloading;
                true
            }
        });
        if !claimed {
            debug!(state = self.state().as_str(), "download already running or done");
            return Ok(());
        }

        let started = Instant::now();
        *self.session_guard() = Some(started);

        let outcome = match self.run_session(&cancel).await {
            Ok(SessionEnd::Paused) => self.persist(started).await.map(|()| SessionEnd::Paused),
            other => other,
        };
        *self.session_guard() = None;

        match outcome {
            Ok(SessionEnd::Finished) => {
                self.set_state(EngineState::Finished);
                let target = self.target_path().unwrap_or_default();
                let spent = self.spent_time() + started.elapsed();
                info!(target = %target.display(), ?spent, "download finished");
                self.listener().on_finish(&target);
                Ok(())
            }
            Ok(SessionEnd::Paused) => {
                self.set_state(EngineState::Paused);
                let progress = TransferProgress::new(self.downloaded_size(), self.file_size(), started.elapsed());
                info!(downloaded = progress.downloaded, total = progress.total, "download paused");
                self.listener().on_pause(&progress);
                Ok(())
            }
            Err(e) => {
                if matches!(e, DownloadError::RemoteChanged { .. }) {
                    // Force a re-probe so the next attempt sees the new tag
                    self.initialized.store(false, Ordering::SeqCst);
                }
                self.set_state(EngineState::Failed);
                error!(error = %e, downloaded = self.downloaded_size(), "download failed");
                if let Err(persist_err) = self.persist(started).await {
                    warn!(error = %persist_err, "could not persist progress after failure");
                }
                self.listener().on_failure(&e);
                Err(e)
            }
        }
    }

    /// Ask workers and the supervisor to stop after their current buffer
    pub fn pause(&self) {
        info!("pause requested");
        self.pause_token().cancel();
    }

    async fn run_session(&self, cancel: &CancellationToken) -> Result<SessionEnd> {
        self.initialize().await?;

        let paths = self.paths().ok_or(DownloadError::NotInitialized)?;
        let url = parse_url(&self.url())?;
        let file_size = self.file_size();
        preallocate(&paths.partial, file_size).await?;

        self.listener().on_start();
        info!(
            file = %paths.file_name,
            size = file_size,
            workers = self.worker_count(),
            downloaded = self.downloaded_size(),
            "download started"
        );

        let workers_cancel = cancel.child_token();
        let ctx = WorkerContext {
            client: self.client.clone(),
            url,
            partial: paths.partial.clone(),
            remote_tag: self.ledger.read(|r| r.remote_last_modified.clone()),
            ledger: self.ledger.clone(),
            cancel: workers_cancel.clone(),
            buffer_size: self.config.buffer_size(),
            retry_delay: self.config.retry_delay(),
        };

        let (reports_tx, reports_rx) = mpsc::unbounded_channel();
        let mut slots: Vec<WorkerSlot> = (1..=self.worker_count())
            .map(|id| WorkerSlot {
                range: self.ledger.read(|r| r.range(id)),
                state: WorkerState::Idle,
                handle: None,
            })
            .collect();
        for slot in slots.iter_mut() {
            let offset = self.ledger.offset(slot.range.worker_id);
            if slot.range.is_complete(offset) {
                debug!(worker = slot.range.worker_id, "range already complete");
                continue;
            }
            let worker = ChunkWorker::new(ctx.clone(), slot.range, offset, false);
            slot.handle = Some(worker.spawn(reports_tx.clone()));
            slot.state = WorkerState::Connecting;
        }

        let supervised = self
            .supervise(&ctx, &mut slots, reports_tx, reports_rx, cancel, file_size, &paths)
            .await;

        workers_cancel.cancel();
        for slot in slots.iter_mut() {
            if let Some(handle) = slot.handle.take() {
                if let Err(e) = handle.await {
                    warn!(worker = slot.range.worker_id, error = %e, "worker task ended abnormally");
                }
            }
        }

        // A pause that raced the last buffer still completes the file
        let end = match supervised? {
            SessionEnd::Paused if self.downloaded_size() >= file_size => SessionEnd::Finished,
            end => end,
        };
        if end == SessionEnd::Finished {
            self.finalize(&paths).await?;
        }
        Ok(end)
    }

    #[allow(clippy::too_many_arguments)]
    async fn supervise(
        &self,
        ctx: &WorkerContext,
        slots: &mut [WorkerSlot],
        reports_tx: mpsc::UnboundedSender<WorkerReport>,
        mut reports_rx: mpsc::UnboundedReceiver<WorkerReport>,
        cancel: &CancellationToken,
        file_size: u64,
        paths: &TransferPaths,
    ) -> Result<SessionEnd> {
        let mut tracker = ProgressTracker::new(file_size);
        let mut ticker = tokio::time::interval(self.config.poll_interval());
        ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);
        ticker.tick().await;
        let mut last_checkpoint = Instant::now();
        let mut restarts: u32 = 0;

        loop {
            if self.ledger.downloaded() >= file_size {
                self.listener().on_progress(&tracker.sample(self.ledger.downloaded()));
                return Ok(SessionEnd::Finished);
            }
            if cancel.is_cancelled() {
                return Ok(SessionEnd::Paused);
            }

            tokio::select! {
                biased;
                _ = cancel.cancelled() => {}
                Some(report) = reports_rx.recv() => {
                    let Some(slot) = slots.get_mut(report.worker_id.wrapping_sub(1)) else {
                        warn!(worker = report.worker_id, "report from unknown worker");
                        continue;
                    };
                    match report.event {
                        WorkerEvent::Connected => slot.state = WorkerState::Working,
                        WorkerEvent::Ended(WorkerOutcome::Finished) => slot.state = WorkerState::Finished,
                        WorkerEvent::Ended(WorkerOutcome::RemoteChanged { expected, actual }) => {
                            return Err(DownloadError::RemoteChanged { expected, actual });
                        }
                        WorkerEvent::Ended(WorkerOutcome::Stalled(cause)) => {
                            slot.state = WorkerState::Stalled;
                            if cancel.is_cancelled() {
                                continue;
                            }
                            restarts = self.restart(ctx, slots, report.worker_id, restarts, &cause, &reports_tx).await?;
                        }
                    }
                }
                _ = ticker.tick() => {
                    let progress = tracker.sample(self.ledger.downloaded());
                    debug!(downloaded = progress.downloaded, total = progress.total, "{}", progress.display_string());
                    self.listener().on_progress(&progress);

                    if last_checkpoint.elapsed() >= self.config.checkpoint_interval() {
                        last_checkpoint = Instant::now();
                        self.checkpoint(&paths.record, tracker.elapsed()).await;
                    }
                }
            }
        }
    }

    /// Respawn a stalled worker
    ///
    /// The restart budget is charged when no other slot is connected and
    /// streaming, or when the stall cannot heal by itself (4xx, ignored range).
    async fn restart(
        &self,
        ctx: &WorkerContext,
        slots: &mut [WorkerSlot],
        worker_id: usize,
        restarts: u32,
        cause: &DownloadError,
        reports_tx: &mpsc::UnboundedSender<WorkerReport>,
    ) -> Result<u32> {
        let any_working = slots.iter().any(|s| s.state == WorkerState::Working);
        let charged = !any_working || !cause.is_retryable();
        let restarts = if charged { restarts + 1 } else { restarts };
        if restarts > self.config.retry_limit {
            error!(restarts, last_error = %cause, "no functional worker left");
            return Err(DownloadError::NoFunctionalWorker { restarts });
        }

        let slot = &mut slots[worker_id - 1];
        if let Some(finished) = slot.handle.take() {
            if let Err(e) = finished.await {
                warn!(worker = worker_id, error = %e, "worker task ended abnormally");
            }
        }
        let offset = self.ledger.offset(worker_id);
        info!(worker = worker_id, offset, restarts, cause = %cause, "restarting stalled worker");
        let worker = ChunkWorker::new(ctx.clone(), slot.range, offset, true);
        slot.handle = Some(worker.spawn(reports_tx.clone()));
        slot.state = WorkerState::Connecting;
        Ok(restarts)
    }

    /// Write the record if workers moved since the last write; failures only warn
    async fn checkpoint(&self, record_path: &Path, session: Duration) {
        let Some(mut snapshot) = self.ledger.take_dirty() else {
            return;
        };
        snapshot.add_spent(session);
        match snapshot.save(record_path).await {
            Ok(()) => debug!(downloaded = snapshot.downloaded, "progress checkpoint written"),
            Err(e) => warn!(error = %e, "progress checkpoint failed"),
        }
    }

    /// Fold this session's time into the record and write it
    async fn persist(&self, session_started: Instant) -> Result<()> {
        let Some(paths) = self.paths() else {
            return Ok(());
        };
        self.ledger.update(|record| record.add_spent(session_started.elapsed()));
        self.ledger.snapshot().save(&paths.record).await?;
        self.ledger.take_dirty();
        debug!(record = %paths.record.display(), "progress record saved");
        Ok(())
    }

    async fn finalize(&self, paths: &TransferPaths) -> Result<()> {
        ProgressRecord::delete(&paths.record).await?;
        tokio::fs::rename(&paths.partial, &paths.target)
            .await
            .map_err(|e| {
                DownloadError::FileIoError(format!(
                    "renaming {} to {}: {}",
                    paths.partial.display(),
                    paths.target.display(),
                    e
                ))
            })
    }

    // ===== Accessors =====

    pub fn state(&self) -> EngineState {
        *self.state.borrow()
    }

    /// Watch state transitions
    pub fn subscribe(&self) -> watch::Receiver<EngineState> {
        self.state.subscribe()
    }

    pub fn is_initialized(&self) -> bool {
        self.initialized.load(Ordering::SeqCst)
    }

    pub fn config(&self) -> &EngineConfig {
        &self.config
    }

    /// Download URL (the final URL once probed)
    pub fn url(&self) -> String {
        self.ledger.read(|r| r.url.clone())
    }

    pub fn save_dir(&self) -> &Path {
        &self.save_dir
    }

    pub fn file_name(&self) -> Option<String> {
        self.ledger.read(|r| r.file_name.clone())
    }

    pub fn file_size(&self) -> u64 {
        self.ledger.read(|r| r.file_size)
    }

    pub fn block_size(&self) -> u64 {
        self.ledger.read(|r| r.block_size)
    }

    pub fn worker_count(&self) -> usize {
        self.ledger.read(ProgressRecord::worker_count)
    }

    pub fn downloaded_size(&self) -> u64 {
        self.ledger.downloaded()
    }

    pub fn created_at(&self) -> DateTime<Utc> {
        self.ledger.read(|r| r.created_at)
    }

    /// Active time from earlier sessions
    pub fn spent_time(&self) -> Duration {
        self.ledger.read(ProgressRecord::spent)
    }

    /// Time since the running session started, zero when idle
    pub fn session_elapsed(&self) -> Duration {
        self.session_guard().map(|t| t.elapsed()).unwrap_or_default()
    }

    pub fn record(&self) -> ProgressRecord {
        self.ledger.snapshot()
    }

    pub fn paths(&self) -> Option<TransferPaths> {
        self.paths.read().unwrap_or_else(|p| p.into_inner()).clone()
    }

    pub fn partial_path(&self) -> Option<PathBuf> {
        self.paths().map(|p| p.partial)
    }

    pub fn record_path(&self) -> Option<PathBuf> {
        self.paths().map(|p| p.record)
    }

    pub fn target_path(&self) -> Option<PathBuf> {
        self.paths().map(|p| p.target)
    }
}

impl std::fmt::Debug for DownloadEngine {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("DownloadEngine")
            .field("state", &self.state())
            .field("url", &self.url())
            .field("save_dir", &self.save_dir)
            .field("downloaded", &self.downloaded_size())
            .field("file_size", &self.file_size())
            .finish()
    }
}

fn parse_url(raw: &str) -> Result<Url> {
    let url = Url::parse(raw).map_err(|e| DownloadError::InvalidUrl(format!("{}: {}", raw, e)))?;
    match url.scheme() {
        "http" | "https" => Ok(url),
        scheme => Err(DownloadError::InvalidUrl(format!("unsupported scheme {}", scheme))),
    }
}

/// Create the partial file if needed and size it to the whole file
async fn preallocate(path: &Path, file_size: u64) -> Result<()> {
    let file = tokio::fs::OpenOptions::new()
        .create(true)
        .write(true)
        .truncate(false)
        .open(path)
        .await?;
    if file.metadata().await?.len() != file_size {
        file.set_len(file_size).await?;
    }
    Ok(())
}

async fn remove_stale(path: &Path) {
    match tokio::fs::remove_file(path).await {
        Ok(()) => debug!(path = %path.display(), "removed stale file"),
        Err(e) if e.kind() == std::io::ErrorKind::NotFound => {}
        Err(e) => warn!(path = %path.display(), error = %e, "could not remove stale file"),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_new_validates_url_and_workers() {
        let engine = DownloadEngine::new("https://example.com/a/file.bin", "/tmp/dl", 0).unwrap();
        assert_eq!(engine.worker_count(), 1);
        assert_eq!(engine.state(), EngineState::Uninitialized);
        assert!(!engine.is_initialized());
        assert!(engine.file_name().is_none());
        assert!(engine.paths().is_none());

        assert!(matches!(
            DownloadEngine::new("not a url", "/tmp/dl", 2),
            Err(DownloadError::InvalidUrl(_))
        ));
        assert!(matches!(
            DownloadEngine::new("ftp://example.com/file", "/tmp/dl", 2),
            Err(DownloadError::InvalidUrl(_))
        ));
    }

    #[tokio::test]
    async fn test_resume_missing_record_is_unavailable() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("file.bin.download_state.json");
        assert!(matches!(
            DownloadEngine::resume(&path).await,
            Err(DownloadError::RecordUnavailable(_))
        ));
    }

    #[tokio::test]
    async fn test_resume_without_partial_resets_progress() {
        let dir = tempfile::tempdir().unwrap();
        let paths = TransferPaths::new(dir.path(), "file.bin");

        let mut record = ProgressRecord::new("https://example.com/file.bin".to_string(), 3);
        record.file_name = Some("file.bin".to_string());
        record.reinitialize(900);
        record.apply(1, 100, 100);
        record.apply(3, 50, 50);
        record.save(&paths.record).await.unwrap();

        let engine = DownloadEngine::resume(&paths.record).await.unwrap();
        assert_eq!(engine.worker_count(), 3);
        assert_eq!(engine.downloaded_size(), 0);
        assert_eq!(engine.file_size(), 900);
        assert_eq!(engine.paths(), Some(paths));
        assert_eq!(engine.state(), EngineState::Uninitialized);
    }

    #[tokio::test]
    async fn test_resume_keeps_progress_with_partial() {
        let dir = tempfile::tempdir().unwrap();
        let paths = TransferPaths::new(dir.path(), "file.bin");

        let mut record = ProgressRecord::new("https://example.com/file.bin".to_string(), 2);
        record.reinitialize(1000);
        record.apply(1, 200, 200);
        record.apply(2, 100, 100);
        record.save(&paths.record).await.unwrap();
        std::fs::write(&paths.partial, vec![0u8; 1000]).unwrap();

        let engine = DownloadEngine::resume(&paths.record).await.unwrap();
        assert_eq!(engine.downloaded_size(), 300);
        assert_eq!(engine.record().offset(1), 200);
        assert_eq!(engine.file_name().as_deref(), Some("file.bin"));
    }

    #[tokio::test]
    async fn test_resume_inconsistent_record_starts_over() {
        let dir = tempfile::tempdir().unwrap();
        let paths = TransferPaths::new(dir.path(), "file.bin");

        let mut record = ProgressRecord::new("https://example.com/file.bin".to_string(), 2);
        record.reinitialize(1000);
        record.apply(1, 200, 200);
        record.downloaded = 999;
        record.save(&paths.record).await.unwrap();
        std::fs::write(&paths.partial, vec![0u8; 1000]).unwrap();

        let engine = DownloadEngine::resume(&paths.record).await.unwrap();
        assert_eq!(engine.downloaded_size(), 0);
        assert!(engine.record().validate().is_ok());
    }

    #[tokio::test]
    async fn test_preallocate_sizes_existing_file() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("x.download");
        std::fs::write(&path, b"abc").unwrap();

        preallocate(&path, 10).await.unwrap();
        let bytes = std::fs::read(&path).unwrap();
        assert_eq!(bytes.len(), 10);
        assert_eq!(&bytes[..3], b"abc");
    }

    #[test]
    fn test_pause_before_download_is_harmless() {
        let engine = DownloadEngine::new("https://example.com/f", "/tmp/dl", 2).unwrap();
        engine.pause();
        assert_eq!(engine.state(), EngineState::Uninitialized);
    }
}

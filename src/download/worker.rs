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


//! Per-range download worker
//!
//! A worker owns one [`WorkerRange`], opens its own handle on the partial file
//! and writes sequentially from `range.start + offset`. Ranges of different
//! workers never overlap, so no file-level locking is needed.
//!
//! # Loop
//! 1. Wait `retry_delay` if this is a restart
//! 2. Ranged GET, reject a changed `Last-Modified`, report
//!    [`WorkerEvent::Connected`]
//! 3. Read into a fixed buffer, write, flush, commit to the ledger
//! 4. Stop on pause or when the range is complete
//!
//! Errors never escape: they are logged and reported as
//! [`WorkerOutcome::Stalled`] for the supervisor to act on.

use crate::download::http::{self, TransferClient};
use crate::download::ledger::ProgressLedger;
use crate::download::partition::WorkerRange;
use crate::error::{DownloadError, Result};
use futures_util::{FutureExt, TryStreamExt};
use std::io::{self, SeekFrom};
use std::panic::AssertUnwindSafe;
use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;
use tokio::fs::OpenOptions;
use tokio::io::{AsyncReadExt, AsyncSeekExt, AsyncWriteExt};
use tokio::sync::mpsc::UnboundedSender;
use tokio::task::JoinHandle;
use tokio_util::io::StreamReader;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};
use url::Url;

/// Supervisor's view of one worker slot
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum WorkerState {
    /// Not started, or its range was already complete
    Idle,
    /// Task spawned but still in backoff or waiting on the server
    Connecting,
    /// Ranged response accepted, body streaming
    Working,
    /// Task ended without completing its range and without a pause
    Stalled,
    /// Range delivered, or stopped cooperatively on pause
    Finished,
}

/// How a worker task ended
#[derive(Debug)]
pub enum WorkerOutcome {
    Finished,
    Stalled(DownloadError),
    RemoteChanged {
        expected: Option<String>,
        actual: Option<String>,
    },
}

/// What a worker tells the supervisor
#[derive(Debug)]
pub enum WorkerEvent {
    /// Server accepted the ranged request with the expected tag
    Connected,
    /// Task is done; always the last event of a task
    Ended(WorkerOutcome),
}

#[derive(Debug)]
pub struct WorkerReport {
    pub worker_id: usize,
    pub event: WorkerEvent,
}

/// Everything a worker shares with its siblings
#[derive(Debug, Clone)]
pub struct WorkerContext {
    pub client: TransferClient,
    pub url: Url,
    pub partial: PathBuf,
    pub remote_tag: Option<String>,
    pub ledger: Arc<ProgressLedger>,
    pub cancel: CancellationToken,
    pub buffer_size: usize,
    pub retry_delay: Duration,
}

/// Downloads one byte range into the shared partial file
#[derive(Debug)]
pub struct ChunkWorker {
    range: WorkerRange,
    offset: u64,
    retry: bool,
    ctx: WorkerContext,
    reports: Option<UnboundedSender<WorkerReport>>,
}

impl ChunkWorker {
    pub fn new(ctx: WorkerContext, range: WorkerRange, offset: u64, retry: bool) -> Self {
        Self {
            range,
            offset,
            retry,
            ctx,
            reports: None,
        }
    }

    pub fn id(&self) -> usize {
        self.range.worker_id
    }

    /// Run on the runtime and report the outcome on `reports`
    pub fn spawn(mut self, reports: UnboundedSender<WorkerReport>) -> JoinHandle<()> {
        self.reports = Some(reports.clone());
        tokio::spawn(async move {
            let worker_id = self.id();
            let outcome = match AssertUnwindSafe(self.run()).catch_unwind().await {
                Ok(outcome) => outcome,
                Err(_) => {
                    warn!(worker = worker_id, "worker panicked");
                    WorkerOutcome::Stalled(DownloadError::internal(format!(
                        "worker {} panicked",
                        worker_id
                    )))
                }
            };
            // Supervisor gone means the transfer already ended
            let _ = reports.send(WorkerReport {
                worker_id,
                event: WorkerEvent::Ended(outcome),
            });
        })
    }

    pub async fn run(mut self) -> WorkerOutcome {
        match self.transfer().await {
            Ok(()) => WorkerOutcome::Finished,
            Err(DownloadError::RemoteChanged { expected, actual }) => {
                warn!(worker = self.id(), ?expected, ?actual, "remote file changed under worker");
                WorkerOutcome::RemoteChanged { expected, actual }
            }
            Err(e) => {
                warn!(worker = self.id(), offset = self.offset, error = %e, "worker stalled");
                WorkerOutcome::Stalled(e)
            }
        }
    }

    async fn transfer(&mut self) -> Result<()> {
        if self.range.is_complete(self.offset) {
            return Ok(());
        }

        if self.retry {
            tokio::select! {
                _ = self.ctx.cancel.cancelled() => return Ok(()),
                _ = tokio::time::sleep(self.ctx.retry_delay) => {}
            }
        }

        let response = tokio::select! {
            _ = self.ctx.cancel.cancelled() => return Ok(()),
            response = self.ctx.client.fetch_range(&self.ctx.url, &self.range, self.offset) => response?,
        };

        let actual = http::last_modified(response.headers());
        if actual != self.ctx.remote_tag {
            return Err(DownloadError::RemoteChanged {
                expected: self.ctx.remote_tag.clone(),
                actual,
            });
        }

        if let Some(reports) = &self.reports {
            let _ = reports.send(WorkerReport {
                worker_id: self.id(),
                event: WorkerEvent::Connected,
            });
        }

        let start = self.range.position(self.offset);
        info!(worker = self.id(), start, retry = self.retry, "worker downloading");

        let mut file = OpenOptions::new().write(true).open(&self.ctx.partial).await?;
        file.seek(SeekFrom::Start(start)).await?;

        let body = response
            .bytes_stream()
            .map_err(|e| io::Error::new(io::ErrorKind::Other, e));
        let reader = StreamReader::new(body);
        tokio::pin!(reader);

        let mut buffer = vec![0u8; self.ctx.buffer_size.max(1)];
        loop {
            let remaining = self.range.remaining(self.offset);
            if remaining == 0 {
                break;
            }
            // Never write past our own range, whatever the server sends
            let want = remaining.min(buffer.len() as u64) as usize;

            let read = tokio::select! {
                biased;
                _ = self.ctx.cancel.cancelled() => break,
                read = reader.read(&mut buffer[..want]) => read?,
            };
            if read == 0 {
                break;
            }

            file.write_all(&buffer[..read]).await?;
            file.flush().await?;
            self.offset += read as u64;
            self.ctx.ledger.commit(self.id(), read as u64, self.offset);
        }
        file.sync_data().await?;

        if self.ctx.cancel.is_cancelled() {
            debug!(worker = self.id(), offset = self.offset, "worker paused");
            return Ok(());
        }
        if !self.range.is_complete(self.offset) {
            return Err(DownloadError::IncompleteBody {
                expected: self.range.len,
                actual: self.offset,
            });
        }

        info!(worker = self.id(), "worker finished range");
        Ok(())
    }
}

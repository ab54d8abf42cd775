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


//! Transfer notifications
//!
//! Callbacks are advisory: nothing they return changes what the engine does.
//! They run on the supervisor task, so implementations should hand work off
//! rather than block.

use crate::download::progress::TransferProgress;
use crate::error::DownloadError;
use std::path::Path;
use std::sync::Arc;

/// Receives lifecycle and progress events from a [`DownloadEngine`](super::DownloadEngine)
///
/// Every method has an empty default so implementors pick what they need.
pub trait TransferListener: Send + Sync {
    /// Probe finished; `Err` carries the reason initialization failed
    fn on_initialized(&self, _result: Result<(), &DownloadError>) {}

    /// Workers are about to launch
    fn on_start(&self) {}

    /// Supervisor tick with cumulative progress
    fn on_progress(&self, _progress: &TransferProgress) {}

    /// Transfer stopped cooperatively; progress has been persisted
    fn on_pause(&self, _progress: &TransferProgress) {}

    /// Transfer failed; the record has been persisted
    fn on_failure(&self, _error: &DownloadError) {}

    /// File fully assembled at `path`
    fn on_finish(&self, _path: &Path) {}
}

/// Listener that ignores everything
#[derive(Debug, Default, Clone, Copy)]
pub struct NoopListener;

impl TransferListener for NoopListener {}

pub type SharedListener = Arc<dyn TransferListener>;

pub(crate) fn noop() -> SharedListener {
    Arc::new(NoopListener)
}

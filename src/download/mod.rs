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


//! Resumable multi-worker downloads
//!
//! A transfer probes the remote file, splits it into one contiguous byte range
//! per worker and downloads the ranges concurrently into a single partial
//! file. Progress is kept in a JSON record next to the partial file so the
//! transfer survives a pause or a process restart.
//!
//! # Files on disk
//! - `<name>.download` - preallocated partial file, renamed to `<name>` when done
//! - `<name>.download_state.json` - progress record, deleted when done

pub mod config;
pub mod engine;
pub mod http;
pub mod ledger;
pub mod listener;
pub mod partition;
pub mod progress;
pub mod record;
pub mod task;
pub mod worker;

// Re-export commonly used types
pub use config::EngineConfig;
pub use engine::{DownloadEngine, EngineState};
pub use listener::{NoopListener, SharedListener, TransferListener};
pub use progress::TransferProgress;
pub use record::{ProgressRecord, TransferPaths};
pub use task::DownloadTask;
pub use worker::WorkerState;

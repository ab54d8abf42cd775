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


//! Multiget core: resumable, multi-worker chunked HTTP downloads
//!
//! ```no_run
//! use multiget_core::DownloadEngine;
//!
//! # async fn run() -> multiget_core::Result<()> {
//! let engine = DownloadEngine::new("https://example.com/big.iso", "/tmp/downloads", 4)?;
//! engine.download().await?;
//! # Ok(())
//! # }
//! ```

pub mod download;
pub mod error;

pub use download::{
    DownloadEngine, DownloadTask, EngineConfig, EngineState, ProgressRecord, TransferListener,
    TransferProgress,
};
pub use error::{DownloadError, Result};

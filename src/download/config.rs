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


//! Engine tuning knobs
//!
//! Durations are stored as milliseconds so the config round-trips through
//! JSON without a custom serializer.

use crate::error::{DownloadError, Result};
use serde::{Deserialize, Serialize};
use std::path::Path;
use std::time::Duration;

/// Download engine configuration
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct EngineConfig {
    /// Wait before a restarted worker reconnects
    pub retry_delay_ms: u64,

    /// Restarts allowed while no worker is working before the transfer fails
    pub retry_limit: u32,

    /// Read buffer per worker in bytes
    pub buffer_size: usize,

    /// Supervisor tick for progress callbacks
    pub poll_interval_ms: u64,

    /// How often a dirty record is written to disk while downloading
    pub checkpoint_interval_ms: u64,

    /// Connect timeout for every HTTP request
    pub connect_timeout_ms: u64,
}

impl Default for EngineConfig {
    fn default() -> Self {
        Self {
            retry_delay_ms: 5_000,
            retry_limit: 35,
            buffer_size: 5 * 1024,
            poll_interval_ms: 900,
            checkpoint_interval_ms: 5_000,
            connect_timeout_ms: 5_000,
        }
    }
}

impl EngineConfig {
    pub fn retry_delay(&self) -> Duration {
        Duration::from_millis(self.retry_delay_ms)
    }

    pub fn poll_interval(&self) -> Duration {
        Duration::from_millis(self.poll_interval_ms.max(1))
    }

    pub fn checkpoint_interval(&self) -> Duration {
        Duration::from_millis(self.checkpoint_interval_ms.max(1))
    }

    pub fn connect_timeout(&self) -> Duration {
        Duration::from_millis(self.connect_timeout_ms)
    }

    /// Buffer size, never zero
    pub fn buffer_size(&self) -> usize {
        self.buffer_size.max(1)
    }

    /// Load a config from a JSON file; missing keys take their defaults
    pub fn from_file(path: &Path) -> Result<Self> {
        let json = std::fs::read_to_string(path).map_err(|e| {
            DownloadError::FileIoError(format!("{}: {}", path.display(), e))
        })?;
        Ok(serde_json::from_str(&json)?)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_defaults() {
        let config = EngineConfig::default();
        assert_eq!(config.retry_delay(), Duration::from_secs(5));
        assert_eq!(config.retry_limit, 35);
        assert_eq!(config.buffer_size(), 5120);
        assert_eq!(config.poll_interval(), Duration::from_millis(900));
    }

    #[test]
    fn test_partial_json_uses_defaults() {
        let config: EngineConfig = serde_json::from_str(r#"{"retry_limit": 3}"#).unwrap();
        assert_eq!(config.retry_limit, 3);
        assert_eq!(config.retry_delay_ms, 5_000);
    }

    #[test]
    fn test_zero_buffer_is_clamped() {
        let config = EngineConfig {
            buffer_size: 0,
            ..Default::default()
        };
        assert_eq!(config.buffer_size(), 1);
    }

    #[test]
    fn test_from_file() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("engine.json");
        std::fs::write(&path, r#"{"buffer_size": 16384, "poll_interval_ms": 250}"#).unwrap();

        let config = EngineConfig::from_file(&path).unwrap();
        assert_eq!(config.buffer_size(), 16384);
        assert_eq!(config.poll_interval(), Duration::from_millis(250));
    }
}

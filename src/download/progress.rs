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


//! Transfer progress snapshots and speed estimation
//!
//! # Progress Information
//! - Bytes downloaded / total bytes across all workers
//! - Active time of the current session
//! - Speed (bytes/s) over a sliding window
//! - Percentage and estimated time remaining

use serde::{Deserialize, Serialize};
use std::collections::VecDeque;
use std::time::{Duration, Instant};

/// Progress snapshot handed to listeners
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TransferProgress {
    /// Cumulative bytes written by all workers
    pub downloaded: u64,

    /// File size in bytes
    pub total: u64,

    /// Percentage complete (0.0 - 100.0)
    pub percent: f64,

    /// Moving-average speed in bytes per second
    pub bytes_per_second: f64,

    /// Active time of the current download session
    pub elapsed: Duration,

    /// Estimated time remaining, if the speed is known
    pub eta: Option<Duration>,
}

impl TransferProgress {
    pub fn new(downloaded: u64, total: u64, elapsed: Duration) -> Self {
        let percent = if total > 0 {
            (downloaded as f64 / total as f64) * 100.0
        } else {
            0.0
        };
        Self {
            downloaded,
            total,
            percent,
            bytes_per_second: 0.0,
            elapsed,
            eta: None,
        }
    }

    pub fn remaining(&self) -> u64 {
        self.total.saturating_sub(self.downloaded)
    }

    /// Format speed as human-readable string (e.g., "2.5 MB/s")
    pub fn speed_string(&self) -> String {
        format!("{:.1} MB/s", self.bytes_per_second / 1_000_000.0)
    }

    /// Format ETA as human-readable string (e.g., "5m 30s")
    pub fn eta_string(&self) -> String {
        let Some(eta) = self.eta else {
            return "calculating...".to_string();
        };
        let secs = eta.as_secs();
        let (hours, minutes, seconds) = (secs / 3600, (secs % 3600) / 60, secs % 60);
        if hours > 0 {
            format!("{}h {}m", hours, minutes)
        } else if minutes > 0 {
            format!("{}m {}s", minutes, seconds)
        } else {
            format!("{}s", seconds)
        }
    }

    /// One-line summary for logs and the CLI
    pub fn display_string(&self) -> String {
        format!(
            "{:.1}% ({:.1} / {:.1} MB) - {} - {}",
            self.percent,
            self.downloaded as f64 / 1_000_000.0,
            self.total as f64 / 1_000_000.0,
            self.speed_string(),
            self.eta_string()
        )
    }
}

/// Sliding-window speed estimate over cumulative byte positions
#[derive(Debug)]
pub struct SpeedTracker {
    samples: VecDeque<(Instant, u64)>,
    window: Duration,
}

impl SpeedTracker {
    /// Tracker with a 10-second window
    pub fn new() -> Self {
        Self::with_window(Duration::from_secs(10))
    }

    pub fn with_window(window: Duration) -> Self {
        Self {
            samples: VecDeque::new(),
            window,
        }
    }

    /// Add a cumulative position sample and evict samples older than the window
    pub fn add_position(&mut self, position: u64) {
        self.add_position_at(Instant::now(), position);
    }

    fn add_position_at(&mut self, now: Instant, position: u64) {
        self.samples.push_back((now, position));
        while let Some(&(at, _)) = self.samples.front() {
            if now.duration_since(at) > self.window {
                self.samples.pop_front();
            } else {
                break;
            }
        }
    }

    /// Average bytes per second across the window
    pub fn average_speed(&self) -> f64 {
        let (Some(&(t0, p0)), Some(&(t1, p1))) = (self.samples.front(), self.samples.back()) else {
            return 0.0;
        };
        let secs = t1.duration_since(t0).as_secs_f64();
        if secs > 0.0 {
            p1.saturating_sub(p0) as f64 / secs
        } else {
            0.0
        }
    }

    pub fn estimate_time_remaining(&self, bytes_remaining: u64) -> Option<Duration> {
        let speed = self.average_speed();
        (speed > 0.0).then(|| Duration::from_secs_f64(bytes_remaining as f64 / speed))
    }
}

impl Default for SpeedTracker {
    fn default() -> Self {
        Self::new()
    }
}

/// Builds snapshots for the supervisor, one per tick
#[derive(Debug)]
pub struct ProgressTracker {
    total: u64,
    started: Instant,
    speed: SpeedTracker,
}

impl ProgressTracker {
    pub fn new(total: u64) -> Self {
        Self {
            total,
            started: Instant::now(),
            speed: SpeedTracker::new(),
        }
    }

    /// Active time since the tracker was created
    pub fn elapsed(&self) -> Duration {
        self.started.elapsed()
    }

    /// Record the current cumulative count and build a snapshot
    pub fn sample(&mut self, downloaded: u64) -> TransferProgress {
        self.speed.add_position(downloaded);
        let mut progress = TransferProgress::new(downloaded, self.total, self.elapsed());
        progress.bytes_per_second = self.speed.average_speed();
        progress.eta = self.speed.estimate_time_remaining(progress.remaining());
        progress
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_progress_percentage() {
        let progress = TransferProgress::new(250, 1000, Duration::ZERO);
        assert_eq!(progress.percent, 25.0);
        assert_eq!(progress.remaining(), 750);

        let empty = TransferProgress::new(0, 0, Duration::ZERO);
        assert_eq!(empty.percent, 0.0);
    }

    #[test]
    fn test_speed_over_window() {
        let mut tracker = SpeedTracker::new();
        let t0 = Instant::now();
        tracker.add_position_at(t0, 0);
        tracker.add_position_at(t0 + Duration::from_millis(500), 500_000);
        tracker.add_position_at(t0 + Duration::from_secs(1), 1_000_000);

        assert!((tracker.average_speed() - 1_000_000.0).abs() < 1.0);
        let eta = tracker.estimate_time_remaining(5_000_000).unwrap();
        assert_eq!(eta.as_secs(), 5);
    }

    #[test]
    fn test_old_samples_are_evicted() {
        let mut tracker = SpeedTracker::with_window(Duration::from_secs(2));
        let t0 = Instant::now();
        tracker.add_position_at(t0, 0);
        tracker.add_position_at(t0 + Duration::from_secs(5), 100);
        tracker.add_position_at(t0 + Duration::from_secs(6), 200);

        assert!((tracker.average_speed() - 100.0).abs() < 0.001);
    }

    #[test]
    fn test_eta_string() {
        let mut progress = TransferProgress::new(0, 100, Duration::ZERO);
        assert_eq!(progress.eta_string(), "calculating...");
        progress.eta = Some(Duration::from_secs(330));
        assert_eq!(progress.eta_string(), "5m 30s");
        progress.eta = Some(Duration::from_secs(7300));
        assert_eq!(progress.eta_string(), "2h 1m");
    }
}

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


//! Byte-range partitioning
//!
//! Worker `i` (1-indexed) owns `[block*(i-1), block*i)` clamped to the file
//! size, where `block = ceil(file_size / workers)`. Ranges never overlap, which
//! is what lets workers write the shared file without locking.

/// Per-worker block size: ceiling division of the file size by the worker count
pub fn block_size(file_size: u64, workers: usize) -> u64 {
    let workers = workers.max(1) as u64;
    if file_size % workers == 0 {
        file_size / workers
    } else {
        file_size / workers + 1
    }
}

/// Byte range owned by a single worker
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct WorkerRange {
    pub worker_id: usize,
    /// First byte of the block
    pub start: u64,
    /// Logical last byte (`block*id - 1`), may lie past end of file
    pub logical_end: u64,
    /// Bytes this worker actually has to deliver
    pub len: u64,
}

impl WorkerRange {
    pub fn new(worker_id: usize, block: u64, file_size: u64) -> Self {
        let id = worker_id.max(1) as u64;
        let start = (block * (id - 1)).min(file_size);
        let end = (block * id).min(file_size);
        Self {
            worker_id,
            start,
            logical_end: (block * id).saturating_sub(1),
            len: end - start,
        }
    }

    /// Absolute file position for a worker that already wrote `offset` bytes
    pub fn position(&self, offset: u64) -> u64 {
        self.start + offset
    }

    /// Bytes left after `offset`
    pub fn remaining(&self, offset: u64) -> u64 {
        self.len.saturating_sub(offset)
    }

    pub fn is_complete(&self, offset: u64) -> bool {
        offset >= self.len
    }

    /// `Range` header value for a worker resuming at `offset`
    pub fn header_value(&self, offset: u64) -> String {
        format!("bytes={}-{}", self.position(offset), self.logical_end)
    }
}

/// Ranges for every worker, ids `1..=workers`
pub fn partition(file_size: u64, workers: usize) -> Vec<WorkerRange> {
    let workers = workers.max(1);
    let block = block_size(file_size, workers);
    (1..=workers)
        .map(|id| WorkerRange::new(id, block, file_size))
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_block_size_is_ceiling() {
        assert_eq!(block_size(1000, 2), 500);
        assert_eq!(block_size(1001, 2), 501);
        assert_eq!(block_size(7, 3), 3);
        assert_eq!(block_size(3, 5), 1);
        assert_eq!(block_size(10, 0), 10);
    }

    #[test]
    fn test_two_workers_thousand_bytes() {
        let ranges = partition(1000, 2);
        assert_eq!(ranges[0].start, 0);
        assert_eq!(ranges[0].logical_end, 499);
        assert_eq!(ranges[1].start, 500);
        assert_eq!(ranges[1].logical_end, 999);
        assert_eq!(ranges[0].header_value(0), "bytes=0-499");
        assert_eq!(ranges[1].header_value(120), "bytes=620-999");
    }

    #[test]
    fn test_ranges_cover_file_without_overlap() {
        for file_size in [1u64, 2, 3, 7, 99, 100, 101, 1000, 4097] {
            for workers in 1..=9usize {
                let block = block_size(file_size, workers);
                assert!(file_size <= block * workers as u64);

                let ranges = partition(file_size, workers);
                assert_eq!(ranges.len(), workers);

                let mut cursor = 0;
                for range in &ranges {
                    assert_eq!(range.start, cursor, "gap or overlap at {file_size}/{workers}");
                    cursor += range.len;
                    if range.start + block <= file_size {
                        assert_eq!(range.len, block);
                    }
                }
                assert_eq!(cursor, file_size);
            }
        }
    }

    #[test]
    fn test_last_range_is_clamped() {
        let ranges = partition(1001, 2);
        assert_eq!(ranges[1].len, 500);
        assert_eq!(ranges[1].logical_end, 1001);
        assert!(ranges[1].is_complete(500));
        assert!(!ranges[0].is_complete(500));
        assert_eq!(ranges[0].remaining(500), 1);
    }

    #[test]
    fn test_more_workers_than_bytes() {
        let ranges = partition(3, 5);
        let lens: Vec<u64> = ranges.iter().map(|r| r.len).collect();
        assert_eq!(lens, vec![1, 1, 1, 0, 0]);
        assert!(ranges[4].is_complete(0));
    }
}

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


//! Shared progress ledger
//!
//! The only lock in a transfer. Workers call [`ProgressLedger::commit`] after
//! every flushed buffer; the supervisor reads snapshots and writes them to
//! disk. The lock is never held across file or network I/O.

use crate::download::record::ProgressRecord;
use std::sync::{Mutex, MutexGuard};

#[derive(Debug)]
struct LedgerState {
    record: ProgressRecord,
    dirty: bool,
}

/// In-memory progress record guarded for concurrent worker updates
#[derive(Debug)]
pub struct ProgressLedger {
    inner: Mutex<LedgerState>,
}

impl ProgressLedger {
    pub fn new(record: ProgressRecord) -> Self {
        Self {
            inner: Mutex::new(LedgerState {
                record,
                dirty: false,
            }),
        }
    }

    fn lock(&self) -> MutexGuard<'_, LedgerState> {
        // A worker that panicked mid-commit left plain integers behind; keep going.
        self.inner.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
    }

    /// Add `written` to the cumulative counter and move the worker's offset
    pub fn commit(&self, worker_id: usize, written: u64, offset: u64) -> u64 {
        let mut state = self.lock();
        state.record.apply(worker_id, written, offset);
        state.dirty = true;
        state.record.downloaded
    }

    pub fn downloaded(&self) -> u64 {
        self.lock().record.downloaded
    }

    pub fn offset(&self, worker_id: usize) -> u64 {
        self.lock().record.offset(worker_id)
    }

    pub fn snapshot(&self) -> ProgressRecord {
        self.lock().record.clone()
    }

    /// Snapshot and clear the dirty flag, or `None` if nothing changed
    pub fn take_dirty(&self) -> Option<ProgressRecord> {
        let mut state = self.lock();
        if !state.dirty {
            return None;
        }
        state.dirty = false;
        Some(state.record.clone())
    }

    /// Mutate the record outside the worker path (initialization, spent time)
    pub fn update<R>(&self, f: impl FnOnce(&mut ProgressRecord) -> R) -> R {
        let mut state = self.lock();
        state.dirty = true;
        f(&mut state.record)
    }

    /// Read from the record without cloning it
    pub fn read<R>(&self, f: impl FnOnce(&ProgressRecord) -> R) -> R {
        f(&self.lock().record)
    }
}

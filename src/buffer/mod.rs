//! # Mutable Buffer Module
//!
//! The bounded, append-only staging area that absorbs writes before they
//! are reshaped into immutable shards.
//!
//! ## Design Invariants
//!
//! - The buffer never holds more than `capacity` entries; [`MutableBuffer::append`]
//!   refuses further writes with [`BufferError::Full`] once the bound is
//!   reached.
//! - Every appended entry receives a timestamp from a counter that only
//!   moves forward, so copies remain ordered even after they migrate
//!   through several merges.
//! - [`MutableBuffer::snapshot`] freezes the current contents; [`MutableBuffer::reset`]
//!   discards the frozen prefix once the snapshot has been consumed and
//!   advances the buffer epoch.
//!
//! ## Snapshot Ownership
//!
//! A [`BufferView`] owns a copy of the frozen entries. It stays valid and
//! readable after any number of subsequent resets, which is what lets a
//! failed flush leave the data queryable and lets in-flight queries keep
//! reading a consistent view while the writer moves on.
//!
//! ## Concurrency
//!
//! The buffer has no interior locking; the owning extension serializes
//! writers and takes its read lock while copying out a view.


use thiserror::Error;
use tracing::trace;

use crate::record::{Record, Wrapped};
use std::sync::Arc;

// ------------------------------------------------------------------------------------------------
// Error Types
// ------------------------------------------------------------------------------------------------

/// Errors returned by buffer operations.
#[derive(Debug, Error)]
pub enum BufferError {
    /// The buffer already holds `capacity` entries; a flush must run
    /// before the write can be retried.
    #[error("buffer is at capacity ({0} records)")]
    Full(usize),
}

// ------------------------------------------------------------------------------------------------
// MutableBuffer
// ------------------------------------------------------------------------------------------------

/// The bounded append-only write buffer.
///
/// Entries are kept in arrival order. Tombstones are appended like any
/// other entry; reconciliation against live copies is deferred to shard
/// construction and query combine stages.
pub struct MutableBuffer<R: Record> {
    entries: Vec<Wrapped<R>>,
    capacity: usize,
    tombstones: usize,
    /// Number of leading entries frozen by the last `snapshot` call.
    frozen: usize,
    /// Incremented on every reset; identifies which fill cycle a view
    /// was taken from.
    epoch: u64,
    /// Monotonic timestamp source. Never rewinds, so timestamps stay
    /// comparable across epochs.
    next_timestamp: u32,
}

impl<R: Record> MutableBuffer<R> {
    /// Creates an empty buffer with the given capacity.
    pub fn new(capacity: usize) -> Self {
        Self {
            entries: Vec::with_capacity(capacity),
            capacity,
            tombstones: 0,
            frozen: 0,
            epoch: 0,
            next_timestamp: 0,
        }
    }

    /// Appends a record, wrapping it with the deletion flag and the next
    /// timestamp.
    ///
    /// Returns [`BufferError::Full`] without consuming a timestamp when
    /// the buffer already holds `capacity` entries.
    pub fn append(&mut self, rec: R, tombstone: bool) -> Result<(), BufferError> {
        if self.entries.len() == self.capacity {
            return Err(BufferError::Full(self.capacity));
        }

        let ts = self.next_timestamp;
        self.next_timestamp = self.next_timestamp.wrapping_add(1);

        trace!(timestamp = ts, tombstone, "buffer append");

        self.entries.push(Wrapped::new(rec, tombstone, ts));
        if tombstone {
            self.tombstones += 1;
        }

        Ok(())
    }

    /// Returns an owned, immutable view of the current contents and
    /// freezes that range. The view remains usable after `reset`.
    pub fn snapshot(&mut self) -> BufferView<R> {
        self.frozen = self.entries.len();
        self.view()
    }

    /// Returns an owned view of the current contents without freezing.
    /// Used by the query path, which must not disturb flush bookkeeping.
    pub fn view(&self) -> BufferView<R> {
        BufferView {
            entries: Arc::from(self.entries.as_slice()),
            tombstones: self.tombstones,
            epoch: self.epoch,
        }
    }

    /// Discards the frozen prefix after its snapshot has been consumed
    /// and starts a new epoch.
    pub fn reset(&mut self) {
        if self.frozen == 0 {
            return;
        }

        let drained: Vec<_> = self.entries.drain(..self.frozen).collect();
        self.tombstones -= drained.iter().filter(|w| w.is_tombstone()).count();
        self.frozen = 0;
        self.epoch += 1;

        trace!(epoch = self.epoch, "buffer reset");
    }

    /// Number of buffered entries, tombstones included.
    pub fn record_count(&self) -> usize {
        self.entries.len()
    }

    /// Number of buffered tombstone entries.
    pub fn tombstone_count(&self) -> usize {
        self.tombstones
    }

    /// The configured capacity bound.
    pub fn capacity(&self) -> usize {
        self.capacity
    }

    /// The current fill-cycle epoch.
    pub fn epoch(&self) -> u64 {
        self.epoch
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    pub fn is_full(&self) -> bool {
        self.entries.len() == self.capacity
    }
}

// ------------------------------------------------------------------------------------------------
// BufferView
// ------------------------------------------------------------------------------------------------

/// An immutable, owned snapshot of buffer contents in arrival order.
///
/// Cloning a view is cheap — the entries live behind an `Arc`.
#[derive(Debug, Clone)]
pub struct BufferView<R: Record> {
    entries: Arc<[Wrapped<R>]>,
    tombstones: usize,
    epoch: u64,
}

impl<R: Record> BufferView<R> {
    /// Number of entries in the snapshot.
    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// Number of tombstone entries in the snapshot.
    pub fn tombstone_count(&self) -> usize {
        self.tombstones
    }

    /// The fill-cycle epoch this snapshot was taken from.
    pub fn epoch(&self) -> u64 {
        self.epoch
    }

    /// Random access by arrival index.
    pub fn get(&self, idx: usize) -> &Wrapped<R> {
        &self.entries[idx]
    }

    /// Iterates entries in arrival order.
    pub fn iter(&self) -> impl Iterator<Item = &Wrapped<R>> {
        self.entries.iter()
    }
}

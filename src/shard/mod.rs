//! # Shard Module
//!
//! Immutable, indexed record containers and the contracts the framework
//! consumes them through.
//!
//! ## Design Overview
//!
//! A shard is built exactly once — either from a frozen buffer snapshot
//! or by merge-constructing a set of existing shards — and never mutated
//! afterwards. The framework only assumes the base [`Shard`] contract;
//! query classes narrow it with capability traits:
//!
//! | Trait | Capability | Consumed by |
//! |-------|------------|-------------|
//! | [`Shard`] | counts, memory, point lookup, tombstone probe | every query class, the reconstruction cascade |
//! | [`OrderedShard`] | `lower_bound` / `upper_bound` / positional access | range query, range count, range sampling |
//! | [`WeightedShard`] | total weight, weighted record draw | weighted set sampling |
//! | [`MetricShard`] | local k-nearest scan | nearest-neighbor query |
//!
//! Two reference implementations ship with the crate:
//!
//! - [`SortedShard`] — a flat sorted run with a bloom filter over keys.
//! - [`AliasShard`] — a sorted run augmented with a Walker alias table
//!   over record weights.
//!
//! ## Merge Semantics
//!
//! Merge construction performs a k-way merge of the source runs (ordered
//! newest first) with tombstone cancellation: a tombstone cancels exactly
//! one matching live copy from an older-or-equal source. Whether
//! unmatched tombstones survive the merge is controlled by
//! [`TombstonePolicy`] — the bottom level of the cascade drops them,
//! every other destination retains them.

#[cfg(test)]
mod tests;

pub(crate) mod merge;
mod sorted;
mod weighted;

pub use sorted::SortedShard;
pub use weighted::AliasShard;

use std::sync::Arc;

use thiserror::Error;

use crate::buffer::BufferView;
use crate::record::{MetricRecord, Record, WeightedRecord, Wrapped};
use rand::Rng;

// ------------------------------------------------------------------------------------------------
// Error Types
// ------------------------------------------------------------------------------------------------

/// Errors raised while building a shard.
#[derive(Debug, Error)]
pub enum ShardError {
    /// The implementation could not assemble its internal index.
    #[error("shard construction failed: {0}")]
    Construction(String),

    /// Merge construction was invoked with no source shards.
    #[error("merge-construct requires at least one source shard")]
    EmptyMerge,
}

// ------------------------------------------------------------------------------------------------
// TombstonePolicy
// ------------------------------------------------------------------------------------------------

/// Controls what a merge does with tombstones that found no live copy to
/// cancel.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TombstonePolicy {
    /// Keep unmatched tombstones — they may still cancel a copy residing
    /// in a deeper level.
    Retain,

    /// Drop unmatched tombstones. Only valid when nothing lives below
    /// the merge destination, so the tombstone can never cancel again.
    DropUnmatched,
}

// ------------------------------------------------------------------------------------------------
// Shard contracts
// ------------------------------------------------------------------------------------------------

/// The base contract of an immutable indexed record container.
pub trait Shard<R: Record>: Send + Sync + Sized + 'static {
    /// Builds a shard from a frozen buffer snapshot. Cancellation is
    /// applied within the snapshot: a tombstone consumes one matching
    /// live copy appended before it.
    fn from_buffer(view: &BufferView<R>) -> Result<Self, ShardError>;

    /// Merge-constructs a shard from existing shards, ordered newest
    /// first. Runs in time linear in the sum of the source sizes and
    /// yields the multiset union of the sources with tombstone
    /// cancellation applied.
    fn from_shards(sources: &[Arc<Self>], policy: TombstonePolicy) -> Result<Self, ShardError>;

    /// Total number of stored entries, tombstones included.
    fn record_count(&self) -> usize;

    /// Number of stored tombstone entries.
    fn tombstone_count(&self) -> usize;

    /// Approximate heap footprint in bytes.
    fn memory_usage(&self) -> usize;

    /// Returns the first stored entry for `key`, live or tombstone, or
    /// `None` when the key is absent.
    fn point_lookup(&self, key: &R::Key) -> Option<&Wrapped<R>>;

    /// Returns `true` when the shard holds a tombstone matching
    /// `key` + `value`. Used by sampling rejection.
    fn has_tombstone(&self, key: &R::Key, value: &R::Value) -> bool;

    /// Fraction of stored entries that are tombstones; `0.0` for an
    /// empty shard.
    fn tombstone_proportion(&self) -> f64 {
        if self.record_count() == 0 {
            0.0
        } else {
            self.tombstone_count() as f64 / self.record_count() as f64
        }
    }
}

/// A shard whose entries are laid out in key order.
pub trait OrderedShard<R: Record>: Shard<R> {
    /// Index of the first entry with key `>= key`.
    fn lower_bound(&self, key: &R::Key) -> usize;

    /// Index of the first entry with key `> key`.
    fn upper_bound(&self, key: &R::Key) -> usize;

    /// Positional access; `idx` must be in `[0, record_count())`.
    fn get_record_at(&self, idx: usize) -> &Wrapped<R>;
}

/// A shard supporting O(1) weighted record draws.
pub trait WeightedShard<R: WeightedRecord>: Shard<R> {
    /// Sum of the weights of the live entries.
    fn total_weight(&self) -> f64;

    /// Draws an entry with probability proportional to its weight, or
    /// `None` when no live weight remains.
    fn draw<G: Rng + ?Sized>(&self, rng: &mut G) -> Option<&Wrapped<R>>;
}

/// A shard supporting local nearest-neighbor scans.
pub trait MetricShard<R: MetricRecord>: Shard<R> {
    /// The `k` stored entries closest to `target`, distance-ascending.
    /// Tombstone entries are included so the combine stage can cancel
    /// deleted matches.
    fn nearest(&self, target: &R, k: usize) -> Vec<(f64, &Wrapped<R>)>;
}

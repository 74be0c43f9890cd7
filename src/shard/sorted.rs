//! Flat sorted-run shard with a bloom filter over keys.

use std::hash::Hash;
use std::mem;
use std::sync::Arc;

use bloomfilter::Bloom;
use tracing::debug;

use crate::buffer::BufferView;
use crate::record::{MetricRecord, Record, Wrapped};
use crate::shard::merge::{cancelling_merge, run_from_unsorted};
use crate::shard::{MetricShard, OrderedShard, Shard, ShardError, TombstonePolicy};

/// False-positive rate for the per-shard key bloom filter.
const BLOOM_FALSE_POSITIVE_RATE: f64 = 0.01;

/// An immutable sorted run of wrapped records.
///
/// Entries are laid out key-ascending (live copies ahead of matching
/// tombstones), giving `O(log n)` bound searches and positional access.
/// A bloom filter over keys — built over every entry, tombstones
/// included — answers most negative point probes without touching the
/// run.
#[derive(Debug)]
pub struct SortedShard<R: Record> {
    data: Vec<Wrapped<R>>,
    tombstones: usize,
    bloom: Bloom<R::Key>,
}

impl<R: Record> SortedShard<R>
where
    R::Key: Hash,
{
    fn from_run(data: Vec<Wrapped<R>>) -> Result<Self, ShardError> {
        let mut bloom = Bloom::new_for_fp_rate(data.len().max(1), BLOOM_FALSE_POSITIVE_RATE)
            .map_err(|e| ShardError::Construction(e.to_string()))?;

        let mut tombstones = 0;
        for entry in &data {
            bloom.set(entry.key());
            if entry.is_tombstone() {
                tombstones += 1;
            }
        }

        debug!(
            records = data.len(),
            tombstones, "sorted shard constructed"
        );

        Ok(Self {
            data,
            tombstones,
            bloom,
        })
    }

    /// Iterates the run in key order.
    pub fn iter(&self) -> impl Iterator<Item = &Wrapped<R>> {
        self.data.iter()
    }
}

impl<R: Record> Shard<R> for SortedShard<R>
where
    R::Key: Hash,
{
    fn from_buffer(view: &BufferView<R>) -> Result<Self, ShardError> {
        let entries: Vec<_> = view.iter().cloned().collect();
        Self::from_run(run_from_unsorted(entries))
    }

    fn from_shards(sources: &[Arc<Self>], policy: TombstonePolicy) -> Result<Self, ShardError> {
        if sources.is_empty() {
            return Err(ShardError::EmptyMerge);
        }
        let runs: Vec<_> = sources.iter().map(|s| s.data.clone()).collect();
        Self::from_run(cancelling_merge(runs, policy))
    }

    fn record_count(&self) -> usize {
        self.data.len()
    }

    fn tombstone_count(&self) -> usize {
        self.tombstones
    }

    fn memory_usage(&self) -> usize {
        self.data.capacity() * mem::size_of::<Wrapped<R>>() + self.bloom.as_slice().len()
    }

    fn point_lookup(&self, key: &R::Key) -> Option<&Wrapped<R>> {
        if !self.bloom.check(key) {
            return None;
        }
        let idx = self.lower_bound(key);
        self.data.get(idx).filter(|w| w.key() == key)
    }

    fn has_tombstone(&self, key: &R::Key, value: &R::Value) -> bool {
        if !self.bloom.check(key) {
            return false;
        }
        let lo = self.lower_bound(key);
        let hi = self.upper_bound(key);
        self.data[lo..hi]
            .iter()
            .any(|w| w.is_tombstone() && w.value() == value)
    }
}

impl<R: Record> OrderedShard<R> for SortedShard<R>
where
    R::Key: Hash,
{
    fn lower_bound(&self, key: &R::Key) -> usize {
        self.data.partition_point(|w| w.key() < key)
    }

    fn upper_bound(&self, key: &R::Key) -> usize {
        self.data.partition_point(|w| w.key() <= key)
    }

    fn get_record_at(&self, idx: usize) -> &Wrapped<R> {
        &self.data[idx]
    }
}

impl<R: MetricRecord> MetricShard<R> for SortedShard<R>
where
    R::Key: Hash,
{
    /// Exhaustive scan. Specialized metric shards (VP-trees, M-trees)
    /// can implement this contract with sublinear searches; the sorted
    /// run settles for correctness.
    fn nearest(&self, target: &R, k: usize) -> Vec<(f64, &Wrapped<R>)> {
        let mut scored: Vec<(f64, &Wrapped<R>)> = self
            .data
            .iter()
            .map(|w| (w.record().distance(target), w))
            .collect();
        scored.sort_by(|a, b| a.0.total_cmp(&b.0));
        scored.truncate(k);
        scored
    }
}

//! Sorted-run shard with a Walker alias table over record weights.

use std::mem;
use std::sync::Arc;

use rand::Rng;
use tracing::debug;

use crate::alias::Alias;
use crate::buffer::BufferView;
use crate::record::{WeightedRecord, Wrapped};
use crate::shard::merge::{cancelling_merge, run_from_unsorted};
use crate::shard::{OrderedShard, Shard, ShardError, TombstonePolicy, WeightedShard};

/// An immutable sorted run whose live entries can be drawn with
/// probability proportional to their weight in O(1).
///
/// Tombstone entries participate in the run (so ordered queries and
/// cancellation behave exactly as on [`SortedShard`](crate::shard::SortedShard))
/// but carry zero sampling mass — the alias table can never yield one.
pub struct AliasShard<R: WeightedRecord> {
    data: Vec<Wrapped<R>>,
    tombstones: usize,
    total_weight: f64,
    /// `None` when the shard holds no live weight.
    alias: Option<Alias>,
}

impl<R: WeightedRecord> AliasShard<R> {
    fn from_run(data: Vec<Wrapped<R>>) -> Result<Self, ShardError> {
        let mut tombstones = 0;
        let weights: Vec<f64> = data
            .iter()
            .map(|w| {
                if w.is_tombstone() {
                    tombstones += 1;
                    0.0
                } else {
                    w.record().weight()
                }
            })
            .collect();

        if weights.iter().any(|w| !w.is_finite() || *w < 0.0) {
            return Err(ShardError::Construction(
                "record weights must be finite and non-negative".into(),
            ));
        }

        let total_weight: f64 = weights.iter().sum();
        let alias = Alias::from_weights(&weights);

        debug!(
            records = data.len(),
            tombstones, total_weight, "alias shard constructed"
        );

        Ok(Self {
            data,
            tombstones,
            total_weight,
            alias,
        })
    }

    /// Iterates the run in key order.
    pub fn iter(&self) -> impl Iterator<Item = &Wrapped<R>> {
        self.data.iter()
    }
}

impl<R: WeightedRecord> Shard<R> for AliasShard<R> {
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
        let alias_bytes = self
            .alias
            .as_ref()
            .map(|a| a.len() * (mem::size_of::<usize>() + mem::size_of::<f64>()))
            .unwrap_or(0);
        self.data.capacity() * mem::size_of::<Wrapped<R>>() + alias_bytes
    }

    fn point_lookup(&self, key: &R::Key) -> Option<&Wrapped<R>> {
        let idx = self.lower_bound(key);
        self.data.get(idx).filter(|w| w.key() == key)
    }

    fn has_tombstone(&self, key: &R::Key, value: &R::Value) -> bool {
        let lo = self.lower_bound(key);
        let hi = self.upper_bound(key);
        self.data[lo..hi]
            .iter()
            .any(|w| w.is_tombstone() && w.value() == value)
    }
}

impl<R: WeightedRecord> OrderedShard<R> for AliasShard<R> {
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

impl<R: WeightedRecord> WeightedShard<R> for AliasShard<R> {
    fn total_weight(&self) -> f64 {
        self.total_weight
    }

    fn draw<G: Rng + ?Sized>(&self, rng: &mut G) -> Option<&Wrapped<R>> {
        let alias = self.alias.as_ref()?;
        Some(&self.data[alias.draw(rng)])
    }
}

//! Range query: every live record with key in `[lower, upper]`, in key
//! order.
//!
//! Local stages copy out each source's in-range run; combine performs
//! the multi-way cancelling merge and drops whatever tombstones remain,
//! so a deleted record never reaches the caller even when its live copy
//! and tombstone sit in different sources.

use std::sync::Arc;

use crate::buffer::BufferView;
use crate::query::{Query, QueryError};
use crate::record::{Record, Wrapped};
use crate::shard::merge::cancelling_merge;
use crate::shard::{OrderedShard, TombstonePolicy};

/// The range query class.
pub struct RangeQuery;

/// Inclusive key interval.
#[derive(Debug, Clone)]
pub struct RangeParams<K> {
    pub lower: K,
    pub upper: K,
}

impl<K> RangeParams<K> {
    pub fn new(lower: K, upper: K) -> Self {
        Self { lower, upper }
    }
}

/// Entry interval a shard contributes, computed once during preprocess.
#[derive(Debug, Clone, Copy)]
pub struct ShardInterval {
    pub start: usize,
    pub stop: usize,
}

/// Frozen length of the buffer view at preprocess time.
#[derive(Debug, Clone, Copy)]
pub struct BufferCutoff {
    pub cutoff: usize,
}

impl<R, S> Query<R, S> for RangeQuery
where
    R: Record,
    S: OrderedShard<R>,
{
    type Parameters = RangeParams<R::Key>;
    type LocalState = ShardInterval;
    type BufferState = BufferCutoff;
    type GlobalState = ();
    type LocalResult = Vec<Wrapped<R>>;
    type FinalResult = Vec<R>;

    fn preprocess(
        shards: &[Arc<S>],
        buffer: &BufferView<R>,
        params: &Self::Parameters,
    ) -> (Vec<Self::LocalState>, Self::BufferState, Self::GlobalState) {
        let states = shards
            .iter()
            .map(|shard| ShardInterval {
                start: shard.lower_bound(&params.lower),
                stop: shard.upper_bound(&params.upper),
            })
            .collect();

        (states, BufferCutoff { cutoff: buffer.len() }, ())
    }

    fn local(
        shard: &Arc<S>,
        state: &Self::LocalState,
        _params: &Self::Parameters,
    ) -> Self::LocalResult {
        (state.start..state.stop)
            .map(|idx| shard.get_record_at(idx).clone())
            .collect()
    }

    fn local_buffer(
        buffer: &BufferView<R>,
        state: &Self::BufferState,
        params: &Self::Parameters,
    ) -> Self::LocalResult {
        let mut hits: Vec<Wrapped<R>> = (0..state.cutoff)
            .map(|idx| buffer.get(idx))
            .filter(|w| *w.key() >= params.lower && *w.key() <= params.upper)
            .cloned()
            .collect();
        hits.sort_by(|a, b| a.run_order(b));
        hits
    }

    fn combine(
        results: Vec<Self::LocalResult>,
        _global: &Self::GlobalState,
        _params: &mut Self::Parameters,
    ) -> Result<Self::FinalResult, QueryError> {
        let survivors = cancelling_merge(results, TombstonePolicy::Retain);
        Ok(survivors
            .into_iter()
            .filter(|w| !w.is_tombstone())
            .map(Wrapped::into_record)
            .collect())
    }
}

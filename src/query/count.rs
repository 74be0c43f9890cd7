//! Range count: number of live records with key in `[lower, upper]`.
//!
//! Each source reports how many entries and how many tombstones fall in
//! the interval; combine sums the differences. No record data moves.

use std::sync::Arc;

use crate::buffer::BufferView;
use crate::query::range::{BufferCutoff, RangeParams, ShardInterval};
use crate::query::{Query, QueryError};
use crate::record::Record;
use crate::shard::OrderedShard;

/// The range count query class.
pub struct RangeCount;

/// One source's in-range entry and tombstone tallies.
#[derive(Debug, Clone, Copy, Default)]
pub struct RangeTally {
    pub records: usize,
    pub tombstones: usize,
}

impl<R, S> Query<R, S> for RangeCount
where
    R: Record,
    S: OrderedShard<R>,
{
    type Parameters = RangeParams<R::Key>;
    type LocalState = ShardInterval;
    type BufferState = BufferCutoff;
    type GlobalState = ();
    type LocalResult = RangeTally;
    type FinalResult = usize;

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
        let records = state.stop.saturating_sub(state.start);
        let tombstones = (state.start..state.stop)
            .filter(|&idx| shard.get_record_at(idx).is_tombstone())
            .count();

        RangeTally {
            records,
            tombstones,
        }
    }

    fn local_buffer(
        buffer: &BufferView<R>,
        state: &Self::BufferState,
        params: &Self::Parameters,
    ) -> Self::LocalResult {
        let mut tally = RangeTally::default();
        for idx in 0..state.cutoff {
            let w = buffer.get(idx);
            if *w.key() >= params.lower && *w.key() <= params.upper {
                tally.records += 1;
                if w.is_tombstone() {
                    tally.tombstones += 1;
                }
            }
        }
        tally
    }

    fn combine(
        results: Vec<Self::LocalResult>,
        _global: &Self::GlobalState,
        _params: &mut Self::Parameters,
    ) -> Result<Self::FinalResult, QueryError> {
        let records: usize = results.iter().map(|t| t.records).sum();
        let tombstones: usize = results.iter().map(|t| t.tombstones).sum();
        Ok(records.saturating_sub(tombstones))
    }
}

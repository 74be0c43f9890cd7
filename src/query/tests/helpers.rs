use std::sync::Arc;

use crate::buffer::{BufferView, MutableBuffer};
use crate::query::Query;
use crate::record::{KeyValue, Record};
use crate::shard::{Shard, SortedShard};

pub type Rec = KeyValue<u64, u64>;

/// Builds a buffer view from `(key, value, tombstone)` triples.
pub fn view_of<R: Record>(entries: Vec<(R, bool)>) -> BufferView<R> {
    let mut buffer = MutableBuffer::new(entries.len().max(1));
    for (rec, tombstone) in entries {
        buffer.append(rec, tombstone).unwrap();
    }
    buffer.view()
}

/// An empty buffer view.
pub fn empty_view<R: Record>() -> BufferView<R> {
    MutableBuffer::new(1).view()
}

pub fn kv_view(entries: &[(u64, u64, bool)]) -> BufferView<Rec> {
    view_of(
        entries
            .iter()
            .map(|&(k, v, t)| (KeyValue::new(k, v), t))
            .collect(),
    )
}

/// A shard holding `(k, k)` for every key in `range`.
pub fn sequential_shard(range: std::ops::Range<u64>) -> Arc<SortedShard<Rec>> {
    let view = kv_view(&range.map(|k| (k, k, false)).collect::<Vec<_>>());
    Arc::new(SortedShard::from_buffer(&view).unwrap())
}

pub fn shard_of(entries: &[(u64, u64, bool)]) -> Arc<SortedShard<Rec>> {
    Arc::new(SortedShard::from_buffer(&kv_view(entries)).unwrap())
}

/// Runs the full protocol sequentially over `shards` (newest first) and
/// `buffer`, exactly as the dispatcher would without early aborts.
pub fn run_query<Q, R, S>(
    shards: &[Arc<S>],
    buffer: &BufferView<R>,
    params: &mut Q::Parameters,
) -> Result<Q::FinalResult, crate::query::QueryError>
where
    R: Record,
    S: Shard<R>,
    Q: Query<R, S>,
{
    let (states, buffer_state, global) = Q::preprocess(shards, buffer, params);

    let mut results = Vec::with_capacity(shards.len() + 1);
    results.push(Q::local_buffer(buffer, &buffer_state, params));
    for (shard, state) in shards.iter().zip(states.iter()) {
        results.push(Q::local(shard, state, params));
    }

    Q::combine(results, &global, params)
}

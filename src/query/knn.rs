//! k-nearest neighbors: the `k` live records closest to a target.
//!
//! Preprocess totals the tombstones visible across all sources and asks
//! every local stage for its `k + tombstones` best entries (tombstones
//! included). The over-fetch makes cancellation lossless: a live record
//! among the global `k` nearest can be preceded, within its own source,
//! by at most `k - 1` closer lives and every tombstone in existence, so
//! it is always surfaced. Combine merges the partials by distance,
//! cancels live matches claimed by tombstones from newer-or-same
//! sources, and keeps the closest `k` survivors.

use std::sync::Arc;

use crate::buffer::BufferView;
use crate::query::{Query, QueryError};
use crate::record::{MetricRecord, Wrapped};
use crate::shard::{MetricShard, Shard};

/// The k-nearest-neighbor query class.
pub struct KnnQuery;

/// Query target and neighbor count.
#[derive(Debug, Clone)]
pub struct KnnParams<R> {
    pub target: R,
    pub k: usize,
}

impl<R> KnnParams<R> {
    pub fn new(target: R, k: usize) -> Self {
        Self { target, k }
    }
}

/// Candidate count each local stage must surface.
#[derive(Debug, Clone, Copy)]
pub struct FetchDepth {
    pub count: usize,
}

/// A scored candidate: distance to the target plus the stored entry.
pub type ScoredEntry<R> = (f64, Wrapped<R>);

impl<R, S> Query<R, S> for KnnQuery
where
    R: MetricRecord,
    S: MetricShard<R>,
{
    type Parameters = KnnParams<R>;
    type LocalState = FetchDepth;
    type BufferState = FetchDepth;
    type GlobalState = ();
    type LocalResult = Vec<ScoredEntry<R>>;
    type FinalResult = Vec<R>;

    const SKIP_DELETE_FILTER: bool = false;

    fn preprocess(
        shards: &[Arc<S>],
        buffer: &BufferView<R>,
        params: &Self::Parameters,
    ) -> (Vec<Self::LocalState>, Self::BufferState, Self::GlobalState) {
        let tombstones: usize = shards
            .iter()
            .map(|s| s.tombstone_count())
            .sum::<usize>()
            + buffer.tombstone_count();
        let depth = FetchDepth {
            count: params.k + tombstones,
        };

        (vec![depth; shards.len()], depth, ())
    }

    fn local(
        shard: &Arc<S>,
        state: &Self::LocalState,
        params: &Self::Parameters,
    ) -> Self::LocalResult {
        shard
            .nearest(&params.target, state.count)
            .into_iter()
            .map(|(dist, w)| (dist, w.clone()))
            .collect()
    }

    fn local_buffer(
        buffer: &BufferView<R>,
        state: &Self::BufferState,
        params: &Self::Parameters,
    ) -> Self::LocalResult {
        let mut scored: Vec<ScoredEntry<R>> = buffer
            .iter()
            .map(|w| (w.record().distance(&params.target), w.clone()))
            .collect();
        scored.sort_by(|a, b| a.0.total_cmp(&b.0));
        scored.truncate(state.count);
        scored
    }

    fn combine(
        results: Vec<Self::LocalResult>,
        _global: &Self::GlobalState,
        params: &mut Self::Parameters,
    ) -> Result<Self::FinalResult, QueryError> {
        // Flatten the partials, remembering which source each entry
        // came from (0 = buffer = newest).
        let mut entries: Vec<(f64, usize, Wrapped<R>)> = Vec::new();
        for (source, partial) in results.into_iter().enumerate() {
            for (dist, w) in partial {
                entries.push((dist, source, w));
            }
        }

        // Cancel live matches claimed by tombstones from newer-or-same
        // sources; the candidate sets are small.
        let mut cancelled = vec![false; entries.len()];
        for t in 0..entries.len() {
            if !entries[t].2.is_tombstone() {
                continue;
            }
            let (t_src, t_ts) = (entries[t].1, entries[t].2.timestamp());

            let mut partner: Option<usize> = None;
            for (i, entry) in entries.iter().enumerate() {
                if cancelled[i] || entry.2.is_tombstone() || !entry.2.matches(&entries[t].2) {
                    continue;
                }
                let older = entry.1 > t_src || (entry.1 == t_src && entry.2.timestamp() < t_ts);
                if older {
                    partner = Some(i);
                    break;
                }
            }
            if let Some(live) = partner {
                cancelled[live] = true;
                cancelled[t] = true;
            }
        }

        let mut survivors: Vec<(f64, Wrapped<R>)> = entries
            .into_iter()
            .zip(cancelled)
            .filter(|((_, _, w), dead)| !dead && !w.is_tombstone())
            .map(|((dist, _, w), _)| (dist, w))
            .collect();
        survivors.sort_by(|a, b| a.0.total_cmp(&b.0));
        survivors.truncate(params.k);

        Ok(survivors.into_iter().map(|(_, w)| w.into_record()).collect())
    }
}

//! Point lookup: the newest live record for a key, if any.
//!
//! Runs under EARLY_ABORT dispatch — sources are probed newest first and
//! the scan stops at the first hit. A tombstone hit is just as
//! conclusive as a live one: it proves the key was deleted above every
//! older copy.

use std::sync::Arc;

use crate::buffer::BufferView;
use crate::query::range::BufferCutoff;
use crate::query::{Query, QueryError};
use crate::record::{Record, Wrapped};
use crate::shard::Shard;

/// The point lookup query class.
pub struct PointLookup;

/// Key to search for. Tombstone suppression matches by key alone.
#[derive(Debug, Clone)]
pub struct LookupParams<K> {
    pub key: K,
}

impl<K> LookupParams<K> {
    pub fn new(key: K) -> Self {
        Self { key }
    }
}

impl<R, S> Query<R, S> for PointLookup
where
    R: Record,
    S: Shard<R>,
{
    type Parameters = LookupParams<R::Key>;
    type LocalState = ();
    type BufferState = BufferCutoff;
    type GlobalState = ();
    type LocalResult = Option<Wrapped<R>>;
    type FinalResult = Option<R>;

    const EARLY_ABORT: bool = true;

    fn preprocess(
        shards: &[Arc<S>],
        buffer: &BufferView<R>,
        _params: &Self::Parameters,
    ) -> (Vec<Self::LocalState>, Self::BufferState, Self::GlobalState) {
        (
            vec![(); shards.len()],
            BufferCutoff { cutoff: buffer.len() },
            (),
        )
    }

    fn local(
        shard: &Arc<S>,
        _state: &Self::LocalState,
        params: &Self::Parameters,
    ) -> Self::LocalResult {
        shard.point_lookup(&params.key).cloned()
    }

    fn local_buffer(
        buffer: &BufferView<R>,
        state: &Self::BufferState,
        params: &Self::Parameters,
    ) -> Self::LocalResult {
        // Scan backwards so the most recent append for the key wins.
        (0..state.cutoff)
            .rev()
            .map(|idx| buffer.get(idx))
            .find(|w| w.key() == &params.key)
            .cloned()
    }

    fn is_conclusive(result: &Self::LocalResult) -> bool {
        result.is_some()
    }

    fn combine(
        results: Vec<Self::LocalResult>,
        _global: &Self::GlobalState,
        _params: &mut Self::Parameters,
    ) -> Result<Self::FinalResult, QueryError> {
        match results.into_iter().flatten().next() {
            Some(hit) if hit.is_tombstone() => Ok(None),
            Some(hit) => Ok(Some(hit.into_record())),
            None => Ok(None),
        }
    }
}

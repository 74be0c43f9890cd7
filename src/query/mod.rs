//! # Query Protocol Module
//!
//! The generic three-stage execution contract every query class
//! implements, plus the cancellation token and query-level errors.
//!
//! ## Execution Model
//!
//! A query runs in three stages over an immutable snapshot of the
//! extension (buffer view + every shard, newest to oldest):
//!
//! 1. **`preprocess`** — sees all sources at once and produces one local
//!    state per shard, one buffer state, and a global state (e.g. total
//!    sampling weight) that is threaded through to `combine`.
//! 2. **`local` / `local_buffer`** — examines exactly one source and
//!    produces a partial answer. Local stages never share state, so the
//!    dispatcher may run them on worker threads.
//! 3. **`combine`** — merges the partials into the final answer. The
//!    partials arrive newest-source-first: index 0 is the buffer,
//!    followed by the shards.
//!
//! ## Class Flags
//!
//! - [`Query::EARLY_ABORT`] — the dispatcher runs local stages
//!   sequentially newest-first and stops at the first partial for which
//!   [`Query::is_conclusive`] returns true (point lookup).
//! - [`Query::SKIP_DELETE_FILTER`] — declares where tombstone
//!   reconciliation happens: `true` means the combine merge pass fully
//!   cancels deleted records (range query, range count, point lookup);
//!   `false` means the class rejects and redraws individual candidates
//!   against newer sources instead (the sampling classes, k-NN).
//!
//! ## Query Classes
//!
//! | Class | Module | Shard capability |
//! |-------|--------|------------------|
//! | Range query | [`range`] | [`OrderedShard`](crate::shard::OrderedShard) |
//! | Range count | [`count`] | [`OrderedShard`](crate::shard::OrderedShard) |
//! | Point lookup | [`lookup`] | [`Shard`](crate::shard::Shard) |
//! | Weighted set sampling | [`wss`] | [`WeightedShard`](crate::shard::WeightedShard) |
//! | Independent range sampling | [`irs`] | [`OrderedShard`](crate::shard::OrderedShard) |
//! | k-nearest neighbors | [`knn`] | [`MetricShard`](crate::shard::MetricShard) |

#[cfg(test)]
mod tests;

pub mod count;
pub mod irs;
pub mod knn;
pub mod lookup;
pub mod range;
pub mod wss;

use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};

use thiserror::Error;

use crate::buffer::BufferView;
use crate::record::Record;
use crate::shard::Shard;

// ------------------------------------------------------------------------------------------------
// Error Types
// ------------------------------------------------------------------------------------------------

/// Errors a query can surface.
#[derive(Debug, Error)]
pub enum QueryError {
    /// The cancellation token fired between stages.
    #[error("query cancelled")]
    Cancelled,

    /// A sampling class could not collect the requested sample within
    /// its retry budget.
    #[error("sampling exhausted after {attempts} attempts: {obtained}/{requested} samples")]
    SamplingExhausted {
        requested: usize,
        obtained: usize,
        attempts: usize,
    },
}

// ------------------------------------------------------------------------------------------------
// CancellationToken
// ------------------------------------------------------------------------------------------------

/// A cooperative cancellation flag threaded into query dispatch.
///
/// The dispatcher checks the token between local stages (per-shard
/// granularity) and before combine; a fired token surfaces as
/// [`QueryError::Cancelled`].
#[derive(Debug, Clone, Default)]
pub struct CancellationToken(Arc<AtomicBool>);

impl CancellationToken {
    pub fn new() -> Self {
        Self::default()
    }

    /// Requests cancellation. Safe to call from any thread.
    pub fn cancel(&self) {
        self.0.store(true, Ordering::Relaxed);
    }

    pub fn is_cancelled(&self) -> bool {
        self.0.load(Ordering::Relaxed)
    }
}

// ------------------------------------------------------------------------------------------------
// Query trait
// ------------------------------------------------------------------------------------------------

/// A query class: associated types plus the three execution stages.
///
/// Implementations are stateless unit types; all per-execution state
/// lives in the associated types. Stages must be deterministic given
/// their inputs (sampling classes draw exclusively from the RNG carried
/// in their parameters).
pub trait Query<R: Record, S: Shard<R>> {
    /// Caller-supplied query arguments. Mutably borrowed by `combine`
    /// only, which is how sampling classes advance their RNG.
    type Parameters: Send + Sync;

    /// Per-shard state produced by `preprocess`.
    type LocalState: Send + Sync;

    /// Buffer-view state produced by `preprocess`.
    type BufferState: Send + Sync;

    /// Cross-source state produced by `preprocess` and handed to
    /// `combine` out of band — parameters are never mutated in between.
    type GlobalState: Send + Sync;

    /// A partial answer from one source.
    type LocalResult: Send;

    /// The merged answer.
    type FinalResult;

    /// When true, the dispatcher short-circuits local stages at the
    /// first conclusive partial.
    const EARLY_ABORT: bool = false;

    /// When true, the combine merge pass fully reconciles tombstones;
    /// when false, the class rejects individual candidates against
    /// newer sources instead.
    const SKIP_DELETE_FILTER: bool = true;

    /// Computes per-source states and the global state.
    ///
    /// `shards` is ordered newest to oldest, matching the order the
    /// dispatcher feeds partials to [`Query::combine`].
    fn preprocess(
        shards: &[Arc<S>],
        buffer: &BufferView<R>,
        params: &Self::Parameters,
    ) -> (Vec<Self::LocalState>, Self::BufferState, Self::GlobalState);

    /// Produces one shard's partial answer.
    fn local(
        shard: &Arc<S>,
        state: &Self::LocalState,
        params: &Self::Parameters,
    ) -> Self::LocalResult;

    /// Produces the buffer's partial answer.
    fn local_buffer(
        buffer: &BufferView<R>,
        state: &Self::BufferState,
        params: &Self::Parameters,
    ) -> Self::LocalResult;

    /// Whether a partial already settles the query. Only consulted when
    /// [`Query::EARLY_ABORT`] is set.
    fn is_conclusive(_result: &Self::LocalResult) -> bool {
        false
    }

    /// Merges the partials — `results[0]` is the buffer, followed by the
    /// shards newest to oldest. Under EARLY_ABORT dispatch the vector
    /// may be shorter than the source count.
    fn combine(
        results: Vec<Self::LocalResult>,
        global: &Self::GlobalState,
        params: &mut Self::Parameters,
    ) -> Result<Self::FinalResult, QueryError>;
}

/// Retry budget multiplier for the sampling classes: a query for `k`
/// samples may spend `SAMPLING_RETRY_FACTOR * k` draw attempts before
/// failing with [`QueryError::SamplingExhausted`].
pub const SAMPLING_RETRY_FACTOR: usize = 3;

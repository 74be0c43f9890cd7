//! # Dynamic Extension Module
//!
//! The top-level orchestrator that turns a static shard type into a
//! dynamic index: it routes inserts and deletes through the mutable
//! buffer, reshapes overflowing data down the shard cascade, and
//! dispatches the generic query protocol across every source.
//!
//! ## Design Overview
//!
//! Data lives in two places, queried newest-first:
//!
//! 1. **Mutable buffer** — a bounded append-only staging area absorbing
//!    writes (inserts and tombstones alike).
//! 2. **Shard cascade** — immutable shards arranged in levels of
//!    geometrically growing capacity, rebuilt by merge whenever a tier
//!    overflows.
//!
//! When the buffer reaches capacity its snapshot becomes a fresh shard
//! at level 0. Overflow at tier *i* triggers a reconstruction into tier
//! *i+1* under the configured [`ReconstructionPolicy`]; a shard whose
//! tombstone proportion exceeds [`ExtensionConfig::max_tombstone_proportion`]
//! keeps cascading until the bound holds or it lands in a fresh bottom
//! level (where unmatched tombstones are dropped outright).
//!
//! ## Concurrency Model
//!
//! All state is protected by a single `Arc<RwLock<ExtensionInner>>`.
//! Writers take the write lock; queries take the read lock only long
//! enough to copy a buffer view and clone the cascade pointer, then run
//! without it. The cascade is immutable once published — a flush edits
//! a shallow clone and swaps the `Arc` — so in-flight queries keep a
//! consistent snapshot and old shards are reclaimed when the last
//! reader drops its reference.
//!
//! The supported discipline is single-writer / multi-reader; the lock
//! makes concurrent writers safe regardless (they serialize).
//!
//! ## Guarantees
//!
//! - **No silent data loss:** a failed reconstruction leaves the
//!   pre-flush cascade and the full buffer in place and readable.
//! - **Bounded staging:** at most `buffer_capacity` entries are ever
//!   buffered; the flush runs synchronously inside the triggering write.
//! - **Linearizable reads:** a query observes every write that
//!   completed before it began, and never a torn buffer or a
//!   half-installed shard.

use std::mem;
use std::sync::{Arc, RwLock};

use thiserror::Error;
use tracing::{debug, info, trace};

use crate::buffer::MutableBuffer;
use crate::level::{Cascade, Level, ReconstructionPolicy};
use crate::query::{CancellationToken, Query, QueryError};
use crate::record::{Record, Wrapped};
use crate::shard::{Shard, ShardError, TombstonePolicy};

#[cfg(test)]
mod tests;

// ------------------------------------------------------------------------------------------------
// Error Types
// ------------------------------------------------------------------------------------------------

/// Errors surfaced by extension operations.
#[derive(Debug, Error)]
pub enum ExtensionError {
    /// A shard constructor failed; the layout is unchanged.
    #[error("shard error: {0}")]
    Shard(#[from] ShardError),

    /// A query-level failure (cancellation, sampling exhaustion).
    #[error("query error: {0}")]
    Query(#[from] QueryError),

    /// `max_tombstone_proportion` is zero, so no shard may ever hold a
    /// tombstone and deletes cannot be accepted.
    #[error("max tombstone proportion is zero; deletes are unsupported")]
    TombstoneBoundUnsatisfiable,

    /// Rejected configuration value.
    #[error("invalid configuration: {0}")]
    Config(String),

    /// Internal invariant violation (poisoned lock, worker panic, etc.).
    #[error("internal error: {0}")]
    Internal(String),
}

// ------------------------------------------------------------------------------------------------
// Configuration
// ------------------------------------------------------------------------------------------------

/// Configuration for a [`DynamicExtension`], fixed at construction.
#[derive(Debug, Clone)]
pub struct ExtensionConfig {
    /// Buffer capacity *C*: entries staged before a flush.
    pub buffer_capacity: usize,

    /// Scale factor *s* (≥ 2): growth rate of level capacities, and the
    /// shard fan-in under tiering.
    pub scale_factor: usize,

    /// Max tolerable tombstone proportion δ per shard, in `[0, 1]`.
    /// A shard exceeding it keeps cascading downward. Zero disables
    /// deletes entirely.
    pub max_tombstone_proportion: f64,

    /// Reconstruction discipline for the cascade.
    pub policy: ReconstructionPolicy,

    /// Fan local query stages out across worker threads. Queries under
    /// EARLY_ABORT dispatch stay sequential regardless.
    pub parallel_queries: bool,
}

impl Default for ExtensionConfig {
    fn default() -> Self {
        Self {
            buffer_capacity: 12_000,
            scale_factor: 6,
            max_tombstone_proportion: 0.05,
            policy: ReconstructionPolicy::Tiering,
            parallel_queries: false,
        }
    }
}

impl ExtensionConfig {
    fn validate(&self) -> Result<(), ExtensionError> {
        if self.buffer_capacity == 0 {
            return Err(ExtensionError::Config(
                "buffer_capacity must be positive".into(),
            ));
        }
        if self.scale_factor < 2 {
            return Err(ExtensionError::Config(
                "scale_factor must be at least 2".into(),
            ));
        }
        if !(0.0..=1.0).contains(&self.max_tombstone_proportion) {
            return Err(ExtensionError::Config(
                "max_tombstone_proportion must be in [0, 1]".into(),
            ));
        }
        Ok(())
    }
}

// ------------------------------------------------------------------------------------------------
// Statistics
// ------------------------------------------------------------------------------------------------

/// Per-level statistics snapshot.
#[derive(Debug, Clone)]
pub struct LevelStats {
    pub index: usize,
    pub shard_count: usize,
    pub record_count: usize,
    pub tombstone_count: usize,
}

/// Extension-wide statistics snapshot returned by [`DynamicExtension::stats`].
#[derive(Debug, Clone)]
pub struct ExtensionStats {
    /// Entries currently staged in the buffer, tombstones included.
    pub buffered_records: usize,
    /// Tombstones currently staged in the buffer.
    pub buffered_tombstones: usize,
    /// Total shards across all levels.
    pub shard_count: usize,
    /// Number of allocated levels.
    pub level_count: usize,
    /// Per-level breakdown, shallow to deep.
    pub levels: Vec<LevelStats>,
}

// ------------------------------------------------------------------------------------------------
// DynamicExtension
// ------------------------------------------------------------------------------------------------

struct ExtensionInner<R: Record, S: Shard<R>> {
    /// Write staging area.
    buffer: MutableBuffer<R>,

    /// Published level/shard layout. Replaced wholesale on flush;
    /// queries clone the pointer and read without the lock.
    cascade: Arc<Cascade<R, S>>,

    config: ExtensionConfig,
}

/// The dynamic index handle.
///
/// Thread-safe — can be cloned and shared across threads via the
/// internal `Arc<RwLock<_>>`.
pub struct DynamicExtension<R: Record, S: Shard<R>> {
    inner: Arc<RwLock<ExtensionInner<R, S>>>,
}

impl<R: Record, S: Shard<R>> Clone for DynamicExtension<R, S> {
    fn clone(&self) -> Self {
        Self {
            inner: Arc::clone(&self.inner),
        }
    }
}

impl<R: Record, S: Shard<R>> DynamicExtension<R, S> {
    /// Creates an empty extension with the given configuration.
    pub fn new(config: ExtensionConfig) -> Result<Self, ExtensionError> {
        config.validate()?;

        info!(
            buffer_capacity = config.buffer_capacity,
            scale_factor = config.scale_factor,
            max_tombstone_proportion = config.max_tombstone_proportion,
            policy = ?config.policy,
            "initializing dynamic extension"
        );

        let inner = ExtensionInner {
            buffer: MutableBuffer::new(config.buffer_capacity),
            cascade: Arc::new(Cascade::new()),
            config,
        };

        Ok(Self {
            inner: Arc::new(RwLock::new(inner)),
        })
    }

    /// Inserts a record.
    ///
    /// Flushes the buffer first when it is full; the flush (and any
    /// reconstruction it cascades into) runs synchronously inside this
    /// call.
    pub fn insert(&self, rec: R) -> Result<(), ExtensionError> {
        self.write(rec, false)
    }

    /// Deletes a record by appending a tombstone for its key + value.
    ///
    /// Existence is not verified; a tombstone with no matching live
    /// copy floats harmlessly until a bottom-level merge discards it.
    pub fn erase(&self, rec: R) -> Result<(), ExtensionError> {
        self.write(rec, true)
    }

    fn write(&self, rec: R, tombstone: bool) -> Result<(), ExtensionError> {
        let mut inner = self
            .inner
            .write()
            .map_err(|_| ExtensionError::Internal("RwLock poisoned".into()))?;

        if tombstone && inner.config.max_tombstone_proportion == 0.0 {
            return Err(ExtensionError::TombstoneBoundUnsatisfiable);
        }

        if inner.buffer.is_full() {
            Self::flush_inner(&mut inner)?;
        }

        inner
            .buffer
            .append(rec, tombstone)
            .map_err(|e| ExtensionError::Internal(format!("append after flush failed: {e}")))
    }

    /// Forces the buffered entries into a level-0 shard immediately.
    ///
    /// A no-op on an empty buffer. Mostly useful for tests and for
    /// bounding query fan-out before a read-heavy phase.
    pub fn flush(&self) -> Result<(), ExtensionError> {
        let mut inner = self
            .inner
            .write()
            .map_err(|_| ExtensionError::Internal("RwLock poisoned".into()))?;
        Self::flush_inner(&mut inner)
    }

    /// Snapshot → shard → install → publish → reset, in that order, so
    /// any failure leaves the previous layout and the buffer intact.
    fn flush_inner(inner: &mut ExtensionInner<R, S>) -> Result<(), ExtensionError> {
        let view = inner.buffer.snapshot();
        if view.is_empty() {
            inner.buffer.reset();
            return Ok(());
        }

        debug!(
            records = view.len(),
            tombstones = view.tombstone_count(),
            epoch = view.epoch(),
            "flushing buffer"
        );

        let shard = S::from_buffer(&view)?;
        if shard.record_count() == 0 {
            // Everything cancelled within the snapshot.
            inner.buffer.reset();
            return Ok(());
        }

        let mut cascade = Cascade::clone(&inner.cascade);
        Self::install(&mut cascade, Arc::new(shard), &inner.config)?;

        inner.cascade = Arc::new(cascade);
        inner.buffer.reset();
        Ok(())
    }

    /// Installs `incoming` at level `0`, cascading reconstructions
    /// downward per the policy until every touched tier respects its
    /// capacity and the tombstone proportion bound.
    fn install(
        cascade: &mut Cascade<R, S>,
        mut incoming: Arc<S>,
        config: &ExtensionConfig,
    ) -> Result<(), ExtensionError> {
        let delta = config.max_tombstone_proportion;
        let mut idx = 0;

        loop {
            if idx == cascade.level_count() {
                cascade.levels_mut().push(Level::new(idx));
                info!(level = idx, "created cascade level");
            }

            let violates = incoming.tombstone_proportion() > delta;

            match config.policy {
                ReconstructionPolicy::Tiering => {
                    let full = cascade.levels()[idx].at_tiering_capacity(config.scale_factor);
                    if !full && !violates {
                        cascade.levels_mut()[idx].push_newest(incoming);
                        return Ok(());
                    }

                    // Merge the incoming shard with the whole stack and
                    // push the result one tier down.
                    let policy = if cascade.has_data_below(idx) {
                        TombstonePolicy::Retain
                    } else {
                        TombstonePolicy::DropUnmatched
                    };
                    let mut sources = vec![incoming];
                    sources.extend(cascade.levels_mut()[idx].take_shards());

                    debug!(
                        level = idx,
                        fan_in = sources.len(),
                        tombstone_overflow = violates,
                        "tiering reconstruction"
                    );

                    incoming = Arc::new(S::from_shards(&sources, policy)?);
                    if incoming.record_count() == 0 {
                        // Everything cancelled; nothing left to install.
                        return Ok(());
                    }
                    idx += 1;
                }

                ReconstructionPolicy::Leveling => {
                    let capacity = cascade.levels()[idx]
                        .record_capacity(config.buffer_capacity, config.scale_factor);
                    let policy = if cascade.has_data_below(idx) {
                        TombstonePolicy::Retain
                    } else {
                        TombstonePolicy::DropUnmatched
                    };

                    let resident = cascade.levels_mut()[idx].take_shards();
                    let merged = if resident.is_empty() {
                        if !violates && incoming.record_count() <= capacity {
                            cascade.levels_mut()[idx].push_newest(incoming);
                            return Ok(());
                        }
                        // Rewrite alone — at the bottom this strips the
                        // offending tombstones.
                        Arc::new(S::from_shards(&[incoming], policy)?)
                    } else {
                        let mut sources = vec![incoming];
                        sources.extend(resident);

                        debug!(level = idx, "leveling reconstruction");
                        Arc::new(S::from_shards(&sources, policy)?)
                    };

                    if merged.record_count() == 0 {
                        return Ok(());
                    }
                    if merged.record_count() <= capacity && merged.tombstone_proportion() <= delta
                    {
                        cascade.levels_mut()[idx].push_newest(merged);
                        return Ok(());
                    }
                    incoming = merged;
                    idx += 1;
                }
            }
        }
    }

    // --------------------------------------------------------------------------------------------
    // Query dispatch
    // --------------------------------------------------------------------------------------------

    /// Runs query class `Q` over a consistent snapshot of the extension.
    pub fn query<Q>(&self, params: &mut Q::Parameters) -> Result<Q::FinalResult, ExtensionError>
    where
        Q: Query<R, S>,
    {
        self.query_with::<Q>(params, &CancellationToken::new())
    }

    /// Like [`DynamicExtension::query`], with cooperative cancellation.
    /// The token is checked between local stages (per-shard
    /// granularity) and before combine.
    pub fn query_with<Q>(
        &self,
        params: &mut Q::Parameters,
        token: &CancellationToken,
    ) -> Result<Q::FinalResult, ExtensionError>
    where
        Q: Query<R, S>,
    {
        // Snapshot the sources, then release the lock for the duration
        // of the query.
        let (view, cascade, parallel) = {
            let inner = self
                .inner
                .read()
                .map_err(|_| ExtensionError::Internal("RwLock poisoned".into()))?;
            (
                inner.buffer.view(),
                Arc::clone(&inner.cascade),
                inner.config.parallel_queries,
            )
        };
        let shards = cascade.shards_newest_first();

        trace!(
            shards = shards.len(),
            buffered = view.len(),
            early_abort = Q::EARLY_ABORT,
            skip_delete_filter = Q::SKIP_DELETE_FILTER,
            "dispatching query"
        );

        let (states, buffer_state, global) = Q::preprocess(&shards, &view, params);

        let mut results: Vec<Q::LocalResult> = Vec::with_capacity(shards.len() + 1);

        if token.is_cancelled() {
            return Err(QueryError::Cancelled.into());
        }
        let buffer_result = Q::local_buffer(&view, &buffer_state, params);
        let conclusive = Q::EARLY_ABORT && Q::is_conclusive(&buffer_result);
        results.push(buffer_result);

        if !conclusive {
            if Q::EARLY_ABORT || !parallel {
                for (shard, state) in shards.iter().zip(states.iter()) {
                    if token.is_cancelled() {
                        return Err(QueryError::Cancelled.into());
                    }
                    let result = Q::local(shard, state, params);
                    let conclusive = Q::EARLY_ABORT && Q::is_conclusive(&result);
                    results.push(result);
                    if conclusive {
                        break;
                    }
                }
            } else {
                results.extend(Self::parallel_locals::<Q>(&shards, &states, params)?);
            }
        }

        if token.is_cancelled() {
            return Err(QueryError::Cancelled.into());
        }
        Q::combine(results, &global, params).map_err(Into::into)
    }

    /// Fans the per-shard local stages out on scoped worker threads,
    /// preserving newest-first result order.
    fn parallel_locals<Q>(
        shards: &[Arc<S>],
        states: &[Q::LocalState],
        params: &Q::Parameters,
    ) -> Result<Vec<Q::LocalResult>, ExtensionError>
    where
        Q: Query<R, S>,
    {
        crossbeam::thread::scope(|scope| {
            let handles: Vec<_> = shards
                .iter()
                .zip(states.iter())
                .map(|(shard, state)| scope.spawn(move |_| Q::local(shard, state, params)))
                .collect();

            handles
                .into_iter()
                .map(|handle| {
                    handle
                        .join()
                        .map_err(|_| ExtensionError::Internal("query worker panicked".into()))
                })
                .collect::<Result<Vec<_>, _>>()
        })
        .map_err(|_| ExtensionError::Internal("query scope panicked".into()))?
    }

    // --------------------------------------------------------------------------------------------
    // Introspection
    // --------------------------------------------------------------------------------------------

    /// Total stored entries (buffer + shards), tombstones included.
    pub fn record_count(&self) -> Result<usize, ExtensionError> {
        let inner = self
            .inner
            .read()
            .map_err(|_| ExtensionError::Internal("RwLock poisoned".into()))?;
        Ok(inner.buffer.record_count() + inner.cascade.record_count())
    }

    /// Total stored tombstone entries (buffer + shards).
    pub fn tombstone_count(&self) -> Result<usize, ExtensionError> {
        let inner = self
            .inner
            .read()
            .map_err(|_| ExtensionError::Internal("RwLock poisoned".into()))?;
        Ok(inner.buffer.tombstone_count() + inner.cascade.tombstone_count())
    }

    /// Approximate heap footprint: shard memory plus the buffer's
    /// reserved capacity.
    pub fn memory_usage(&self) -> Result<usize, ExtensionError> {
        let inner = self
            .inner
            .read()
            .map_err(|_| ExtensionError::Internal("RwLock poisoned".into()))?;
        Ok(inner.cascade.memory_usage()
            + inner.buffer.capacity() * mem::size_of::<Wrapped<R>>())
    }

    /// Returns a statistics snapshot.
    pub fn stats(&self) -> Result<ExtensionStats, ExtensionError> {
        let inner = self
            .inner
            .read()
            .map_err(|_| ExtensionError::Internal("RwLock poisoned".into()))?;

        let levels: Vec<LevelStats> = inner
            .cascade
            .levels()
            .iter()
            .map(|level| LevelStats {
                index: level.index(),
                shard_count: level.shard_count(),
                record_count: level.record_count(),
                tombstone_count: level.tombstone_count(),
            })
            .collect();

        Ok(ExtensionStats {
            buffered_records: inner.buffer.record_count(),
            buffered_tombstones: inner.buffer.tombstone_count(),
            shard_count: inner.cascade.shard_count(),
            level_count: inner.cascade.level_count(),
            levels,
        })
    }
}

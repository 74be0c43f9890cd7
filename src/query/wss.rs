//! Weighted set sampling: draw `k` records with probability
//! proportional to their weight.
//!
//! Preprocess totals each source's live weight; combine builds an alias
//! table over those totals, apportions per-source sample counts from it,
//! and lets each source draw its share. A drawn candidate is rejected —
//! and its slot redrawn in the next round — when it is itself a
//! tombstone or when a newer source holds a matching tombstone. The
//! retry budget is [`SAMPLING_RETRY_FACTOR`] times the requested sample
//! size; running dry surfaces [`QueryError::SamplingExhausted`].

use std::sync::Arc;

use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};

use crate::alias::Alias;
use crate::buffer::BufferView;
use crate::query::{Query, QueryError, SAMPLING_RETRY_FACTOR};
use crate::record::{WeightedRecord, Wrapped};
use crate::shard::{Shard, WeightedShard};

/// The weighted set sampling query class.
pub struct WeightedSetSample;

/// Sample size plus the RNG driving every draw. The RNG is part of the
/// parameters so runs are reproducible from a seed.
#[derive(Debug)]
pub struct WssParams {
    pub sample_size: usize,
    pub rng: StdRng,
}

impl WssParams {
    /// Parameters drawing from OS entropy.
    pub fn new(sample_size: usize) -> Self {
        Self {
            sample_size,
            rng: StdRng::from_entropy(),
        }
    }

    /// Deterministic parameters for tests and reproducible workloads.
    pub fn seeded(sample_size: usize, seed: u64) -> Self {
        Self {
            sample_size,
            rng: StdRng::seed_from_u64(seed),
        }
    }
}

/// Live-weight summary of the buffer view.
#[derive(Debug, Clone, Copy)]
pub struct BufferWeight {
    pub total: f64,
    pub max: f64,
}

/// Per-source live weights, index-aligned with the combine partials
/// (buffer first, then shards newest to oldest).
#[derive(Debug, Clone)]
pub struct SourceWeights {
    pub weights: Vec<f64>,
    pub total: f64,
}

/// A sampleable handle on one source.
pub enum WssSource<R: WeightedRecord, S> {
    Shard { shard: Arc<S> },
    Buffer { view: BufferView<R>, max_weight: f64 },
}

impl<R, S> WssSource<R, S>
where
    R: WeightedRecord,
    S: WeightedShard<R>,
{
    /// One weighted draw attempt. `None` means the attempt was rejected
    /// (buffer rejection sampling) or the source has no live weight.
    fn draw<'a>(&'a self, rng: &mut StdRng) -> Option<&'a Wrapped<R>> {
        match self {
            WssSource::Shard { shard } => shard.draw(rng),
            WssSource::Buffer { view, max_weight } => {
                if view.is_empty() || *max_weight <= 0.0 {
                    return None;
                }
                let candidate = view.get(rng.gen_range(0..view.len()));
                let weight = if candidate.is_tombstone() {
                    0.0
                } else {
                    candidate.record().weight()
                };
                if rng.gen_range(0.0..1.0) < weight / max_weight {
                    Some(candidate)
                } else {
                    None
                }
            }
        }
    }

    /// Whether this source holds a tombstone shadowing the candidate.
    /// For the candidate's own source only strictly newer buffer
    /// entries count — a shard-resident tombstone next to a surviving
    /// live copy is always the older of the two, so shards participate
    /// in the strictly-newer check alone.
    fn shadows(&self, candidate: &Wrapped<R>, same_source: bool) -> bool {
        match self {
            WssSource::Shard { shard } => {
                !same_source && shard.has_tombstone(candidate.key(), candidate.value())
            }
            WssSource::Buffer { view, .. } => view.iter().any(|w| {
                w.is_tombstone()
                    && w.matches(candidate)
                    && (!same_source || w.timestamp() > candidate.timestamp())
            }),
        }
    }
}

/// Returns true when `candidate`, drawn from `sources[idx]`, is
/// shadowed by a tombstone in a newer-or-same source.
fn is_deleted<R, S>(sources: &[WssSource<R, S>], idx: usize, candidate: &Wrapped<R>) -> bool
where
    R: WeightedRecord,
    S: WeightedShard<R>,
{
    sources[..=idx]
        .iter()
        .enumerate()
        .any(|(i, source)| source.shadows(candidate, i == idx))
}

impl<R, S> Query<R, S> for WeightedSetSample
where
    R: WeightedRecord,
    S: WeightedShard<R>,
{
    type Parameters = WssParams;
    type LocalState = ();
    type BufferState = BufferWeight;
    type GlobalState = SourceWeights;
    type LocalResult = WssSource<R, S>;
    type FinalResult = Vec<R>;

    const SKIP_DELETE_FILTER: bool = false;

    fn preprocess(
        shards: &[Arc<S>],
        buffer: &BufferView<R>,
        _params: &Self::Parameters,
    ) -> (Vec<Self::LocalState>, Self::BufferState, Self::GlobalState) {
        let mut buffer_weight = BufferWeight {
            total: 0.0,
            max: 0.0,
        };
        for w in buffer.iter().filter(|w| !w.is_tombstone()) {
            let weight = w.record().weight();
            buffer_weight.total += weight;
            buffer_weight.max = buffer_weight.max.max(weight);
        }

        let mut weights = Vec::with_capacity(shards.len() + 1);
        weights.push(buffer_weight.total);
        weights.extend(shards.iter().map(|s| s.total_weight()));
        let total = weights.iter().sum();

        (
            vec![(); shards.len()],
            buffer_weight,
            SourceWeights { weights, total },
        )
    }

    fn local(
        shard: &Arc<S>,
        _state: &Self::LocalState,
        _params: &Self::Parameters,
    ) -> Self::LocalResult {
        WssSource::Shard {
            shard: Arc::clone(shard),
        }
    }

    fn local_buffer(
        buffer: &BufferView<R>,
        state: &Self::BufferState,
        _params: &Self::Parameters,
    ) -> Self::LocalResult {
        WssSource::Buffer {
            view: buffer.clone(),
            max_weight: state.max,
        }
    }

    fn combine(
        results: Vec<Self::LocalResult>,
        global: &Self::GlobalState,
        params: &mut Self::Parameters,
    ) -> Result<Self::FinalResult, QueryError> {
        let requested = params.sample_size;
        if requested == 0 || global.total <= 0.0 {
            return Ok(Vec::new());
        }
        let Some(source_alias) = Alias::from_weights(&global.weights) else {
            return Ok(Vec::new());
        };

        let budget = SAMPLING_RETRY_FACTOR * requested;
        let mut samples = Vec::with_capacity(requested);
        let mut attempts = 0;

        while samples.len() < requested && attempts < budget {
            // Apportion the outstanding draws across sources, then let
            // each source sample its share.
            let outstanding = requested - samples.len();
            let mut counts = vec![0usize; results.len()];
            for _ in 0..outstanding {
                counts[source_alias.draw(&mut params.rng)] += 1;
            }

            for (idx, &count) in counts.iter().enumerate() {
                for _ in 0..count {
                    if attempts >= budget || samples.len() == requested {
                        break;
                    }
                    attempts += 1;

                    let Some(candidate) = results[idx].draw(&mut params.rng) else {
                        continue;
                    };
                    if candidate.is_tombstone() || is_deleted(&results, idx, candidate) {
                        continue;
                    }
                    samples.push(candidate.record().clone());
                }
            }
        }

        if samples.len() < requested {
            return Err(QueryError::SamplingExhausted {
                requested,
                obtained: samples.len(),
                attempts,
            });
        }
        Ok(samples)
    }
}

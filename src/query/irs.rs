//! Independent range sampling: draw `k` records uniformly from the live
//! records with key in `[lower, upper]`, each draw independent.
//!
//! Preprocess narrows every source to its in-range interval; the
//! interval sizes become the apportioning weights, so a source
//! contributes draws in proportion to how many in-range entries it
//! holds. Rejection and retries follow the same discipline as weighted
//! set sampling.

use std::sync::Arc;

use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};

use crate::alias::Alias;
use crate::buffer::BufferView;
use crate::query::range::ShardInterval;
use crate::query::{Query, QueryError, SAMPLING_RETRY_FACTOR};
use crate::record::{Record, Wrapped};
use crate::shard::{OrderedShard, Shard};

/// The independent range sampling query class.
pub struct IndependentRangeSample;

/// Inclusive key interval, sample size, and the RNG driving the draws.
#[derive(Debug)]
pub struct IrsParams<K> {
    pub lower: K,
    pub upper: K,
    pub sample_size: usize,
    pub rng: StdRng,
}

impl<K> IrsParams<K> {
    /// Parameters drawing from OS entropy.
    pub fn new(lower: K, upper: K, sample_size: usize) -> Self {
        Self {
            lower,
            upper,
            sample_size,
            rng: StdRng::from_entropy(),
        }
    }

    /// Deterministic parameters for tests and reproducible workloads.
    pub fn seeded(lower: K, upper: K, sample_size: usize, seed: u64) -> Self {
        Self {
            lower,
            upper,
            sample_size,
            rng: StdRng::seed_from_u64(seed),
        }
    }
}

/// Buffer positions whose keys fall inside the interval.
#[derive(Debug, Clone)]
pub struct BufferMatches {
    pub indices: Vec<usize>,
}

/// Per-source in-range entry counts, index-aligned with the combine
/// partials.
#[derive(Debug, Clone)]
pub struct SourceCounts {
    pub counts: Vec<f64>,
    pub total: usize,
}

/// A sampleable handle on one source's in-range entries.
pub enum IrsSource<R: Record, S> {
    Shard {
        shard: Arc<S>,
        interval: ShardInterval,
    },
    Buffer {
        view: BufferView<R>,
        indices: Vec<usize>,
    },
}

impl<R, S> IrsSource<R, S>
where
    R: Record,
    S: OrderedShard<R>,
{
    /// Uniform draw from the source's in-range entries.
    fn draw<'a>(&'a self, rng: &mut StdRng) -> Option<&'a Wrapped<R>> {
        match self {
            IrsSource::Shard { shard, interval } => {
                if interval.start >= interval.stop {
                    return None;
                }
                Some(shard.get_record_at(rng.gen_range(interval.start..interval.stop)))
            }
            IrsSource::Buffer { view, indices } => {
                if indices.is_empty() {
                    return None;
                }
                Some(view.get(indices[rng.gen_range(0..indices.len())]))
            }
        }
    }

    /// Whether this source holds a tombstone shadowing the candidate;
    /// same-source checks apply only to strictly newer buffer entries.
    fn shadows(&self, candidate: &Wrapped<R>, same_source: bool) -> bool {
        match self {
            IrsSource::Shard { shard, .. } => {
                !same_source && shard.has_tombstone(candidate.key(), candidate.value())
            }
            IrsSource::Buffer { view, .. } => view.iter().any(|w| {
                w.is_tombstone()
                    && w.matches(candidate)
                    && (!same_source || w.timestamp() > candidate.timestamp())
            }),
        }
    }
}

fn is_deleted<R, S>(sources: &[IrsSource<R, S>], idx: usize, candidate: &Wrapped<R>) -> bool
where
    R: Record,
    S: OrderedShard<R>,
{
    sources[..=idx]
        .iter()
        .enumerate()
        .any(|(i, source)| source.shadows(candidate, i == idx))
}

impl<R, S> Query<R, S> for IndependentRangeSample
where
    R: Record,
    S: OrderedShard<R>,
{
    type Parameters = IrsParams<R::Key>;
    type LocalState = ShardInterval;
    type BufferState = BufferMatches;
    type GlobalState = SourceCounts;
    type LocalResult = IrsSource<R, S>;
    type FinalResult = Vec<R>;

    const SKIP_DELETE_FILTER: bool = false;

    fn preprocess(
        shards: &[Arc<S>],
        buffer: &BufferView<R>,
        params: &Self::Parameters,
    ) -> (Vec<Self::LocalState>, Self::BufferState, Self::GlobalState) {
        let states: Vec<ShardInterval> = shards
            .iter()
            .map(|shard| ShardInterval {
                start: shard.lower_bound(&params.lower),
                stop: shard.upper_bound(&params.upper),
            })
            .collect();

        let indices: Vec<usize> = (0..buffer.len())
            .filter(|&idx| {
                let key = buffer.get(idx).key();
                *key >= params.lower && *key <= params.upper
            })
            .collect();

        let mut counts = Vec::with_capacity(states.len() + 1);
        counts.push(indices.len() as f64);
        counts.extend(
            states
                .iter()
                .map(|s| s.stop.saturating_sub(s.start) as f64),
        );
        let total = counts.iter().sum::<f64>() as usize;

        (states, BufferMatches { indices }, SourceCounts { counts, total })
    }

    fn local(
        shard: &Arc<S>,
        state: &Self::LocalState,
        _params: &Self::Parameters,
    ) -> Self::LocalResult {
        IrsSource::Shard {
            shard: Arc::clone(shard),
            interval: *state,
        }
    }

    fn local_buffer(
        buffer: &BufferView<R>,
        state: &Self::BufferState,
        _params: &Self::Parameters,
    ) -> Self::LocalResult {
        IrsSource::Buffer {
            view: buffer.clone(),
            indices: state.indices.clone(),
        }
    }

    fn combine(
        results: Vec<Self::LocalResult>,
        global: &Self::GlobalState,
        params: &mut Self::Parameters,
    ) -> Result<Self::FinalResult, QueryError> {
        let requested = params.sample_size;
        if requested == 0 || global.total == 0 {
            return Ok(Vec::new());
        }
        let Some(source_alias) = Alias::from_weights(&global.counts) else {
            return Ok(Vec::new());
        };

        let budget = SAMPLING_RETRY_FACTOR * requested;
        let mut samples = Vec::with_capacity(requested);
        let mut attempts = 0;

        while samples.len() < requested && attempts < budget {
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

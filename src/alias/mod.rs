//! # Alias Module
//!
//! Walker's alias structure for weighted categorical sampling: after an
//! O(n) build over n normalized weights, each draw costs O(1) and two
//! uniform random numbers.
//!
//! The sampling query classes use one alias table to apportion samples
//! across sources and (inside [`AliasShard`](crate::shard::AliasShard))
//! another to pick records within a source.

#[cfg(test)]
mod tests;

use rand::Rng;

/// Walker alias table over a normalized weight vector.
///
/// Construction partitions the scaled weights into *overfull* (`n·p > 1`)
/// and *underfull* (`n·p < 1`) slots, then repeatedly pairs one of each:
/// the underfull slot's alias is pointed at the overfull index and the
/// overfull residual shrinks by the donated mass. The loop ends when
/// either list empties.
#[derive(Debug, Clone)]
pub struct Alias {
    alias: Vec<usize>,
    cutoff: Vec<f64>,
}

impl Alias {
    /// Builds the table. `weights` must be normalized (sum to 1); use
    /// [`Alias::from_weights`] for raw weights.
    pub fn new(weights: &[f64]) -> Self {
        let n = weights.len();
        let mut alias = vec![0usize; n];
        let mut cutoff = vec![0f64; n];

        let mut overfull = Vec::with_capacity(n);
        let mut underfull = Vec::with_capacity(n);

        for (i, &w) in weights.iter().enumerate() {
            cutoff[i] = n as f64 * w;
            if cutoff[i] > 1.0 {
                overfull.push(i);
            } else if cutoff[i] < 1.0 {
                underfull.push(i);
            } else {
                alias[i] = i;
            }
        }

        while let (Some(i), Some(j)) = (overfull.pop(), underfull.pop()) {
            alias[j] = i;
            cutoff[i] = cutoff[i] + cutoff[j] - 1.0;

            if cutoff[i] > 1.0 {
                overfull.push(i);
            } else if cutoff[i] < 1.0 {
                underfull.push(i);
            }
        }

        Self { alias, cutoff }
    }

    /// Normalizes `weights` and builds the table. Returns `None` when
    /// the weights are empty or their sum is not positive.
    pub fn from_weights(weights: &[f64]) -> Option<Self> {
        let total: f64 = weights.iter().sum();
        if weights.is_empty() || total <= 0.0 || !total.is_finite() {
            return None;
        }
        let normalized: Vec<f64> = weights.iter().map(|w| w / total).collect();
        Some(Self::new(&normalized))
    }

    /// Draws an index with probability proportional to its weight.
    pub fn draw<G: Rng + ?Sized>(&self, rng: &mut G) -> usize {
        let n = self.alias.len();
        let coin1: f64 = rng.gen_range(0.0..1.0);
        let coin2: f64 = rng.gen_range(0.0..1.0);

        let k = ((n as f64 * coin1) as usize).min(n - 1);
        if coin2 < self.cutoff[k] { k } else { self.alias[k] }
    }

    /// Number of categories in the table.
    pub fn len(&self) -> usize {
        self.alias.len()
    }

    pub fn is_empty(&self) -> bool {
        self.alias.is_empty()
    }
}

//! # Record Module
//!
//! Defines the record contract the framework consumes and the per-copy
//! wrapper the framework stores.
//!
//! - [`Record`] — a user-supplied key/value payload. Keys carry a total
//!   order (for order-based query classes), values carry equality (for
//!   tombstone matching).
//! - [`WeightedRecord`] — a record with a sampling weight, consumed by
//!   weighted set sampling.
//! - [`MetricRecord`] — a record with a pairwise distance, consumed by
//!   nearest-neighbor queries.
//! - [`Wrapped`] — a record copy plus its deletion flag and insertion
//!   timestamp. Every entry stored in the buffer or in a shard is a
//!   `Wrapped<R>`.
//!
//! Two wrapped copies *match* when they agree on key **and** value,
//! ignoring the deletion flag — this is the pairing rule tombstone
//! cancellation uses throughout the crate.


use std::cmp::Ordering;
use std::fmt::Debug;

// ------------------------------------------------------------------------------------------------
// Record contracts
// ------------------------------------------------------------------------------------------------

/// The payload type stored by the framework.
///
/// Records are cheap-to-clone value types. The key must be totally
/// ordered; the value only needs equality. Records are compared by
/// key + value for tombstone matching and ordered by key for sorted
/// shards.
pub trait Record: Clone + Send + Sync + 'static {
    /// Key component; totally ordered.
    type Key: Ord + Clone + Debug + Send + Sync;

    /// Value component; compared for equality during cancellation.
    type Value: PartialEq + Clone + Debug + Send + Sync;

    /// Returns the record's key.
    fn key(&self) -> &Self::Key;

    /// Returns the record's value.
    fn value(&self) -> &Self::Value;
}

/// A record carrying a non-negative sampling weight.
///
/// Required by the weighted set sampling query class and by
/// [`AliasShard`](crate::shard::AliasShard).
pub trait WeightedRecord: Record {
    /// The record's sampling weight. Must be finite and `>= 0`.
    fn weight(&self) -> f64;
}

/// A record embedded in a metric space.
///
/// Required by the nearest-neighbor query class.
pub trait MetricRecord: Record {
    /// Distance between two records. Must be finite, non-negative, and
    /// symmetric.
    fn distance(&self, other: &Self) -> f64;
}

// ------------------------------------------------------------------------------------------------
// Wrapped — per-copy metadata
// ------------------------------------------------------------------------------------------------

/// A record copy as stored by the framework: the payload plus a
/// deletion flag and an insertion timestamp.
///
/// The timestamp is assigned by the mutable buffer at append time and
/// increases monotonically over the extension's lifetime, so it orders
/// copies that end up in the same shard.
#[derive(Debug, Clone)]
pub struct Wrapped<R: Record> {
    rec: R,
    timestamp: u32,
    tombstone: bool,
}

impl<R: Record> Wrapped<R> {
    /// Wraps a record with the given deletion flag and timestamp.
    pub fn new(rec: R, tombstone: bool, timestamp: u32) -> Self {
        Self {
            rec,
            timestamp,
            tombstone,
        }
    }

    /// Returns `true` iff this copy is a deletion marker.
    pub fn is_tombstone(&self) -> bool {
        self.tombstone
    }

    /// The timestamp assigned at append time.
    pub fn timestamp(&self) -> u32 {
        self.timestamp
    }

    /// Borrows the wrapped record.
    pub fn record(&self) -> &R {
        &self.rec
    }

    /// Unwraps into the record payload.
    pub fn into_record(self) -> R {
        self.rec
    }

    /// The wrapped record's key.
    pub fn key(&self) -> &R::Key {
        self.rec.key()
    }

    /// The wrapped record's value.
    pub fn value(&self) -> &R::Value {
        self.rec.value()
    }

    /// Returns `true` when both copies carry the same key and value,
    /// ignoring the deletion flag. A tombstone cancels a live copy iff
    /// they match.
    pub fn matches(&self, other: &Wrapped<R>) -> bool {
        self.key() == other.key() && self.value() == other.value()
    }

    /// Ordering used when laying out a sorted run: key ascending, and
    /// for equal keys live copies before tombstones, oldest timestamp
    /// first. Placing the live copy ahead of a matching tombstone lets
    /// the cancelling merge see the live one first.
    pub fn run_order(&self, other: &Wrapped<R>) -> Ordering {
        self.key()
            .cmp(other.key())
            .then(self.tombstone.cmp(&other.tombstone))
            .then(self.timestamp.cmp(&other.timestamp))
    }
}

impl<R: Record> PartialEq for Wrapped<R> {
    /// Key + value equality, ignoring the deletion flag.
    fn eq(&self, other: &Self) -> bool {
        self.matches(other)
    }
}

// ------------------------------------------------------------------------------------------------
// Concrete records
// ------------------------------------------------------------------------------------------------

/// The plain key-value record most query classes operate on.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct KeyValue<K, V> {
    pub key: K,
    pub value: V,
}

impl<K, V> KeyValue<K, V> {
    pub fn new(key: K, value: V) -> Self {
        Self { key, value }
    }
}

impl<K, V> Record for KeyValue<K, V>
where
    K: Ord + Clone + Debug + Send + Sync + 'static,
    V: PartialEq + Clone + Debug + Send + Sync + 'static,
{
    type Key = K;
    type Value = V;

    fn key(&self) -> &K {
        &self.key
    }

    fn value(&self) -> &V {
        &self.value
    }
}

/// A key-value record with a sampling weight, for weighted set sampling.
#[derive(Debug, Clone, PartialEq)]
pub struct WeightedPair<K, V> {
    pub key: K,
    pub value: V,
    pub weight: f64,
}

impl<K, V> WeightedPair<K, V> {
    pub fn new(key: K, value: V, weight: f64) -> Self {
        Self { key, value, weight }
    }
}

impl<K, V> Record for WeightedPair<K, V>
where
    K: Ord + Clone + Debug + Send + Sync + 'static,
    V: PartialEq + Clone + Debug + Send + Sync + 'static,
{
    type Key = K;
    type Value = V;

    fn key(&self) -> &K {
        &self.key
    }

    fn value(&self) -> &V {
        &self.value
    }
}

impl<K, V> WeightedRecord for WeightedPair<K, V>
where
    K: Ord + Clone + Debug + Send + Sync + 'static,
    V: PartialEq + Clone + Debug + Send + Sync + 'static,
{
    fn weight(&self) -> f64 {
        self.weight
    }
}

/// A two-dimensional point identified by an id, for nearest-neighbor
/// queries. The id doubles as the (order-only) key; the coordinates are
/// the value.
#[derive(Debug, Clone, PartialEq)]
pub struct SpatialPoint {
    pub id: u64,
    pub coords: [f64; 2],
}

impl SpatialPoint {
    pub fn new(id: u64, x: f64, y: f64) -> Self {
        Self { id, coords: [x, y] }
    }
}

impl Record for SpatialPoint {
    type Key = u64;
    type Value = [f64; 2];

    fn key(&self) -> &u64 {
        &self.id
    }

    fn value(&self) -> &[f64; 2] {
        &self.coords
    }
}

impl MetricRecord for SpatialPoint {
    /// Euclidean distance in the plane.
    fn distance(&self, other: &Self) -> f64 {
        let dx = self.coords[0] - other.coords[0];
        let dy = self.coords[1] - other.coords[1];
        (dx * dx + dy * dy).sqrt()
    }
}

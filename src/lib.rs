//! # Dynamis
//!
//! An embeddable **dynamization framework**: take any static, immutable
//! index structure (a "shard"), and Dynamis wraps it into a dynamic
//! index supporting inserts and deletes while preserving the query
//! semantics — range queries, range counts, point lookups, weighted and
//! independent-range sampling, and nearest-neighbor search.
//!
//! ## Architecture
//!
//! ```text
//! ┌───────────────────────────────────────────────────────┐
//! │                  DynamicExtension                     │
//! │  ┌────────────┐   ┌─────────────────────────────────┐ │
//! │  │  Mutable   │   │         Shard cascade           │ │
//! │  │  buffer    │   │  L0: [shard][shard]             │ │
//! │  │ (bounded,  │   │  L1: [  shard  ]                │ │
//! │  │  freezable)│   │  L2: [     shard      ]         │ │
//! │  └─────┬──────┘   └──────────┬──────────────────────┘ │
//! │        │  flush (snapshot →  │  merge-reconstruct     │
//! │        └────────► shard) ────┘  on overflow / δ       │
//! │                                                       │
//! │  query: preprocess → local per source → combine       │
//! └───────────────────────────────────────────────────────┘
//! ```
//!
//! Writes land in the buffer; a full buffer freezes into a level-0
//! shard; overflowing levels merge downward under a tiering or leveling
//! discipline. Deletes are tombstones that cancel matching live copies
//! during merges and are reconciled by every query class.
//!
//! ## Modules
//!
//! | Module | Purpose |
//! |--------|---------|
//! | [`extension`] | Top-level orchestrator — insert, erase, query dispatch, reconstruction |
//! | [`record`] | Record contracts and the wrapped per-copy metadata |
//! | [`buffer`] | Bounded append-only staging area with owned snapshots |
//! | [`shard`] | Shard contracts, cancelling merge, and the reference shard types |
//! | [`level`] | Cascade tiers, capacity policies, and the published layout snapshot |
//! | [`query`] | The preprocess / local / combine protocol and the six query classes |
//! | [`alias`] | Walker's alias structure for O(1) weighted draws |
//!
//! ## Key Properties
//!
//! - **Immutable shards** — once built, a shard is never mutated; flush
//!   publishes a new layout by pointer swap, so readers never block.
//! - **Tombstone deletes** — erases append deletion markers that cancel
//!   exactly one matching live copy at or below them; a per-shard
//!   tombstone proportion bound δ keeps shards clean by cascading
//!   over-deleted shards downward.
//! - **Pluggable shards and queries** — anything implementing the
//!   [`shard::Shard`] contract slots in; query classes implement the
//!   three-stage [`query::Query`] protocol.
//!
//! ## Quick Start
//!
//! ```rust
//! use dynamis::query::range::{RangeParams, RangeQuery};
//! use dynamis::record::KeyValue;
//! use dynamis::shard::SortedShard;
//! use dynamis::{DynamicExtension, ExtensionConfig};
//!
//! type Rec = KeyValue<u64, u64>;
//!
//! let index: DynamicExtension<Rec, SortedShard<Rec>> =
//!     DynamicExtension::new(ExtensionConfig::default()).unwrap();
//!
//! for k in 0..100u64 {
//!     index.insert(KeyValue::new(k, k * 2)).unwrap();
//! }
//! index.erase(KeyValue::new(7, 14)).unwrap();
//!
//! let mut params = RangeParams::new(0, 9);
//! let hits = index.query::<RangeQuery>(&mut params).unwrap();
//! assert_eq!(hits.len(), 9); // key 7 is gone
//! ```

pub mod alias;
pub mod buffer;
pub mod extension;
pub mod level;
pub mod query;
pub mod record;
pub mod shard;

pub use extension::{DynamicExtension, ExtensionConfig, ExtensionError, ExtensionStats};
pub use level::ReconstructionPolicy;
pub use query::{CancellationToken, Query, QueryError};
pub use record::{KeyValue, MetricRecord, Record, SpatialPoint, WeightedPair, WeightedRecord, Wrapped};
pub use shard::{
    AliasShard, MetricShard, OrderedShard, Shard, ShardError, SortedShard, TombstonePolicy,
    WeightedShard,
};

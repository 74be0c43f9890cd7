use tracing_subscriber::EnvFilter;

use crate::extension::{DynamicExtension, ExtensionConfig};
use crate::level::ReconstructionPolicy;
use crate::query::range::{RangeParams, RangeQuery};
use crate::record::KeyValue;
use crate::shard::SortedShard;

pub type Rec = KeyValue<u64, u64>;
pub type Ext = DynamicExtension<Rec, SortedShard<Rec>>;

/// Initialize tracing subscriber controlled by `RUST_LOG` env var.
/// Safe to call multiple times — only the first call takes effect.
pub fn init_tracing() {
    let _ = tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::from_default_env())
        .with_test_writer()
        .try_init();
}

/// Tiny tiering setup that reshapes constantly: C=4, s=2, δ=0.5.
pub fn tiny_config() -> ExtensionConfig {
    init_tracing();
    ExtensionConfig {
        buffer_capacity: 4,
        scale_factor: 2,
        max_tombstone_proportion: 0.5,
        policy: ReconstructionPolicy::Tiering,
        parallel_queries: false,
    }
}

/// Same shape under the leveling discipline.
pub fn tiny_leveling_config() -> ExtensionConfig {
    ExtensionConfig {
        policy: ReconstructionPolicy::Leveling,
        ..tiny_config()
    }
}

/// Large buffer — everything stays buffered, no reshaping.
pub fn buffer_only_config() -> ExtensionConfig {
    init_tracing();
    ExtensionConfig {
        buffer_capacity: 64 * 1024,
        scale_factor: 4,
        max_tombstone_proportion: 0.5,
        policy: ReconstructionPolicy::Tiering,
        parallel_queries: false,
    }
}

pub fn ext(config: ExtensionConfig) -> Ext {
    DynamicExtension::new(config).expect("construct extension")
}

/// Inserts `(k, k)` for every key in `range`.
pub fn insert_range(ext: &Ext, range: std::ops::RangeInclusive<u64>) {
    for k in range {
        ext.insert(KeyValue::new(k, k)).expect("insert");
    }
}

/// Collects the live keys in `[lower, upper]`.
pub fn range_keys(ext: &Ext, lower: u64, upper: u64) -> Vec<u64> {
    let mut params = RangeParams::new(lower, upper);
    ext.query::<RangeQuery>(&mut params)
        .expect("range query")
        .into_iter()
        .map(|r| r.key)
        .collect()
}

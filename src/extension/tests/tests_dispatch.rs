//! Query dispatch: cancellation, parallel local stages, and concurrent
//! readers.

#[cfg(test)]
mod tests {
    use std::thread;

    use crate::extension::tests::helpers::*;
    use crate::extension::{DynamicExtension, ExtensionConfig, ExtensionError};
    use crate::query::range::{RangeParams, RangeQuery};
    use crate::query::{CancellationToken, QueryError};
    use crate::record::KeyValue;

    #[test]
    fn pre_cancelled_query_fails_fast() {
        let ext = ext(tiny_config());
        insert_range(&ext, 1..=20);

        let token = CancellationToken::new();
        token.cancel();

        let mut params = RangeParams::new(1, 20);
        let err = ext
            .query_with::<RangeQuery>(&mut params, &token)
            .unwrap_err();
        assert!(matches!(
            err,
            ExtensionError::Query(QueryError::Cancelled)
        ));
    }

    #[test]
    fn fresh_token_does_not_interfere() {
        let ext = ext(tiny_config());
        insert_range(&ext, 1..=20);

        let token = CancellationToken::new();
        let mut params = RangeParams::new(1, 20);
        let hits = ext.query_with::<RangeQuery>(&mut params, &token).unwrap();
        assert_eq!(hits.len(), 20);
    }

    #[test]
    fn parallel_dispatch_matches_sequential_results() {
        let sequential = ext(tiny_config());
        let parallel = ext(ExtensionConfig {
            parallel_queries: true,
            ..tiny_config()
        });

        insert_range(&sequential, 1..=100);
        for k in 1..=100u64 {
            parallel.insert(KeyValue::new(k, k)).unwrap();
        }

        let mut p1 = RangeParams::new(10, 90);
        let mut p2 = RangeParams::new(10, 90);
        assert_eq!(
            sequential.query::<RangeQuery>(&mut p1).unwrap(),
            parallel.query::<RangeQuery>(&mut p2).unwrap()
        );
    }

    #[test]
    fn readers_run_concurrently_with_a_writer() {
        let ext = ext(tiny_config());
        insert_range(&ext, 1..=50);

        let writer = {
            let ext = ext.clone();
            thread::spawn(move || {
                for k in 51..=300u64 {
                    ext.insert(KeyValue::new(k, k)).unwrap();
                }
            })
        };

        let readers: Vec<_> = (0..4)
            .map(|_| {
                let ext = ext.clone();
                thread::spawn(move || {
                    for _ in 0..50 {
                        // The first 50 keys are fully installed before
                        // the writer starts; every snapshot must show
                        // them all.
                        let mut params = RangeParams::new(1, 50);
                        let hits = ext.query::<RangeQuery>(&mut params).unwrap();
                        assert_eq!(hits.len(), 50);
                    }
                })
            })
            .collect();

        writer.join().unwrap();
        for reader in readers {
            reader.join().unwrap();
        }

        assert_eq!(range_keys(&ext, 1, 300).len(), 300);
    }

    #[test]
    fn query_snapshot_is_stable_across_a_flush() {
        let ext = ext(tiny_config());
        insert_range(&ext, 1..=4);

        // Trigger a flush while an old snapshot is alive: the new
        // layout replaces the pointer, old shards stay readable until
        // the snapshot drops (refcounted), and fresh queries see the
        // union.
        insert_range(&ext, 5..=13);
        assert_eq!(range_keys(&ext, 1, 13).len(), 13);
    }

    #[test]
    fn stats_reflect_a_quiescent_extension() {
        type WExt = DynamicExtension<Rec, crate::shard::SortedShard<Rec>>;
        let ext: WExt = DynamicExtension::new(tiny_config()).unwrap();
        let stats = ext.stats().unwrap();
        assert_eq!(stats.shard_count, 0);
        assert_eq!(stats.level_count, 0);
        assert_eq!(stats.buffered_records, 0);
    }
}

//! Erase-path correctness tests.

#[cfg(test)]
mod tests {
    use crate::extension::tests::helpers::*;
    use crate::query::lookup::{LookupParams, PointLookup};
    use crate::record::KeyValue;

    fn lookup(ext: &Ext, key: u64) -> Option<u64> {
        let mut params = LookupParams::new(key);
        ext.query::<PointLookup>(&mut params).unwrap().map(|r| r.value)
    }

    // ----------------------------------------------------------------
    // Buffer-only
    // ----------------------------------------------------------------

    #[test]
    fn erase_existing_record() {
        let ext = ext(buffer_only_config());
        ext.insert(KeyValue::new(1, 1)).unwrap();
        assert_eq!(lookup(&ext, 1), Some(1));

        ext.erase(KeyValue::new(1, 1)).unwrap();
        assert_eq!(lookup(&ext, 1), None);
        assert!(range_keys(&ext, 0, 10).is_empty());
    }

    #[test]
    fn erase_nonexistent_record_is_harmless() {
        let ext = ext(buffer_only_config());
        ext.erase(KeyValue::new(9, 9)).unwrap();

        assert_eq!(lookup(&ext, 9), None);
        assert!(range_keys(&ext, 0, 10).is_empty());
        assert_eq!(ext.tombstone_count().unwrap(), 1);
    }

    #[test]
    fn erase_then_reinsert_resurrects() {
        let ext = ext(buffer_only_config());
        ext.insert(KeyValue::new(1, 1)).unwrap();
        ext.erase(KeyValue::new(1, 1)).unwrap();
        ext.insert(KeyValue::new(1, 1)).unwrap();

        assert_eq!(lookup(&ext, 1), Some(1));
        assert_eq!(range_keys(&ext, 1, 1), vec![1]);
    }

    #[test]
    fn erase_accounting_in_buffer() {
        let ext = ext(buffer_only_config());
        ext.insert(KeyValue::new(1, 1)).unwrap();
        ext.erase(KeyValue::new(1, 1)).unwrap();

        // Both copies are physically staged until a flush cancels them.
        assert_eq!(ext.record_count().unwrap(), 2);
        assert_eq!(ext.tombstone_count().unwrap(), 1);
    }

    // ----------------------------------------------------------------
    // Across shards
    // ----------------------------------------------------------------

    #[test]
    fn erase_record_resident_in_shard() {
        let ext = ext(tiny_config());
        insert_range(&ext, 1..=9); // keys 1..=8 now live in shards

        ext.erase(KeyValue::new(3, 3)).unwrap();
        assert_eq!(lookup(&ext, 3), None);
        assert_eq!(
            range_keys(&ext, 1, 9),
            vec![1, 2, 4, 5, 6, 7, 8, 9]
        );
    }

    #[test]
    fn erase_only_cancels_matching_value() {
        let ext = ext(buffer_only_config());
        ext.insert(KeyValue::new(1, 10)).unwrap();
        ext.erase(KeyValue::new(1, 99)).unwrap(); // wrong value

        assert_eq!(range_keys(&ext, 1, 1), vec![1]);
    }

    #[test]
    fn erase_every_record() {
        let ext = ext(tiny_config());
        insert_range(&ext, 1..=20);
        for k in 1..=20u64 {
            ext.erase(KeyValue::new(k, k)).unwrap();
        }

        assert!(range_keys(&ext, 1, 20).is_empty());
        for k in 1..=20u64 {
            assert_eq!(lookup(&ext, k), None, "key {k}");
        }
    }

    #[test]
    fn double_erase_hides_record_once() {
        let ext = ext(tiny_config());
        insert_range(&ext, 1..=8);
        ext.erase(KeyValue::new(5, 5)).unwrap();
        ext.erase(KeyValue::new(5, 5)).unwrap();

        assert_eq!(lookup(&ext, 5), None);
        assert_eq!(range_keys(&ext, 5, 5), Vec::<u64>::new());
    }

    #[test]
    fn second_tombstone_waits_for_second_copy() {
        // δ = 1.0 so the leftover tombstone may stay resident instead
        // of being stripped by a bottom-level rewrite.
        let mut config = buffer_only_config();
        config.max_tombstone_proportion = 1.0;
        let ext = ext(config);
        ext.insert(KeyValue::new(5, 5)).unwrap();
        ext.erase(KeyValue::new(5, 5)).unwrap();
        ext.erase(KeyValue::new(5, 5)).unwrap();
        ext.flush().unwrap();

        // One pair cancelled at the flush; the second tombstone rides on.
        assert_eq!(ext.record_count().unwrap(), 1);
        assert_eq!(ext.tombstone_count().unwrap(), 1);

        // It cancels the next matching copy it meets below it.
        ext.insert(KeyValue::new(5, 5)).unwrap();
        assert_eq!(range_keys(&ext, 5, 5), vec![5]);
    }
}

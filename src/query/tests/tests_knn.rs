//! Nearest-neighbor protocol tests over planar points.

#[cfg(test)]
mod tests {
    use std::sync::Arc;

    use crate::query::knn::{KnnParams, KnnQuery};
    use crate::query::tests::helpers::{empty_view, run_query, view_of};
    use crate::record::SpatialPoint;
    use crate::shard::{Shard, SortedShard};

    fn point_shard(points: &[(u64, f64, f64, bool)]) -> Arc<SortedShard<SpatialPoint>> {
        let view = view_of(
            points
                .iter()
                .map(|&(id, x, y, t)| (SpatialPoint::new(id, x, y), t))
                .collect(),
        );
        Arc::new(SortedShard::from_buffer(&view).unwrap())
    }

    fn target(x: f64, y: f64) -> SpatialPoint {
        SpatialPoint::new(u64::MAX, x, y)
    }

    #[test]
    fn returns_k_closest_in_distance_order() {
        let shard = point_shard(&[
            (1, 0.0, 0.0, false),
            (2, 1.0, 0.0, false),
            (3, 5.0, 0.0, false),
            (4, 10.0, 0.0, false),
        ]);
        let mut params = KnnParams::new(target(0.0, 0.0), 2);

        let hits = run_query::<KnnQuery, _, _>(&[shard], &empty_view(), &mut params).unwrap();
        let ids: Vec<u64> = hits.iter().map(|p| p.id).collect();
        assert_eq!(ids, vec![1, 2]);
    }

    #[test]
    fn merges_candidates_across_sources() {
        let newer = point_shard(&[(1, 3.0, 0.0, false)]);
        let older = point_shard(&[(2, 1.0, 0.0, false), (3, 9.0, 0.0, false)]);
        let view = view_of(vec![(SpatialPoint::new(4, 2.0, 0.0), false)]);
        let mut params = KnnParams::new(target(0.0, 0.0), 3);

        let hits = run_query::<KnnQuery, _, _>(&[newer, older], &view, &mut params).unwrap();
        let ids: Vec<u64> = hits.iter().map(|p| p.id).collect();
        assert_eq!(ids, vec![2, 4, 1]);
    }

    #[test]
    fn deleted_neighbor_is_skipped() {
        let newer = point_shard(&[(1, 0.0, 0.0, true)]);
        let older = point_shard(&[(1, 0.0, 0.0, false), (2, 4.0, 0.0, false)]);
        let mut params = KnnParams::new(target(0.0, 0.0), 1);

        let hits =
            run_query::<KnnQuery, _, _>(&[newer, older], &empty_view(), &mut params).unwrap();
        let ids: Vec<u64> = hits.iter().map(|p| p.id).collect();
        assert_eq!(ids, vec![2]);
    }

    #[test]
    fn buffer_tombstone_cancels_shard_neighbor() {
        let shard = point_shard(&[(1, 0.0, 0.0, false), (2, 4.0, 0.0, false)]);
        let view = view_of(vec![(SpatialPoint::new(1, 0.0, 0.0), true)]);
        let mut params = KnnParams::new(target(0.0, 0.0), 2);

        let hits = run_query::<KnnQuery, _, _>(&[shard], &view, &mut params).unwrap();
        let ids: Vec<u64> = hits.iter().map(|p| p.id).collect();
        assert_eq!(ids, vec![2]);
    }

    #[test]
    fn fewer_than_k_records_returns_all_live() {
        let shard = point_shard(&[(1, 1.0, 1.0, false)]);
        let mut params = KnnParams::new(target(0.0, 0.0), 10);

        let hits = run_query::<KnnQuery, _, _>(&[shard], &empty_view(), &mut params).unwrap();
        assert_eq!(hits.len(), 1);
    }

    #[test]
    fn empty_sources_return_nothing() {
        let mut params = KnnParams::new(target(0.0, 0.0), 5);
        let hits = run_query::<KnnQuery, SpatialPoint, SortedShard<SpatialPoint>>(
            &[],
            &empty_view(),
            &mut params,
        )
        .unwrap();
        assert!(hits.is_empty());
    }
}

use approx::relative_eq;
use liquid_kmeans::dataset::{decode_row, encode_chunks, infer_schema, RawColumn};
use liquid_kmeans::kmeans::{closest, squared_distance, KMeansPartial};
use proptest::prelude::*;

const K: usize = 3;
const DIM: usize = 2;

fn partial() -> impl Strategy<Value = KMeansPartial> {
    (
        prop::collection::vec(prop::collection::vec(-1e3f64..1e3, DIM), K),
        prop::collection::vec(0u64..100, K),
        0f64..1e3,
        0u64..10,
    )
        .prop_map(|(sums, counts, error, skipped)| KMeansPartial {
            sums,
            counts,
            error,
            skipped,
        })
}

fn close(a: &KMeansPartial, b: &KMeansPartial) -> bool {
    a.counts == b.counts
        && a.skipped == b.skipped
        && relative_eq!(a.error, b.error, epsilon = 1e-6)
        && a.sums.iter().zip(&b.sums).all(|(x, y)| {
            x.iter()
                .zip(y)
                .all(|(x, y)| relative_eq!(*x, *y, epsilon = 1e-6))
        })
}

proptest! {
    #[test]
    fn prop_merge_commutes(a in partial(), b in partial()) {
        let ab = a.clone().merge(b.clone());
        let ba = b.merge(a);
        prop_assert!(close(&ab, &ba));
    }

    #[test]
    fn prop_merge_associates(a in partial(), b in partial(), c in partial()) {
        let left = a.clone().merge(b.clone()).merge(c.clone());
        let right = a.merge(b.merge(c));
        prop_assert!(close(&left, &right));
    }

    #[test]
    fn prop_closest_matches_brute_force(
        point in prop::collection::vec(-10i32..10, DIM),
        centroids in prop::collection::vec(prop::collection::vec(-10i32..10, DIM), 1..6),
    ) {
        // small integer coordinates make ties common
        let point: Vec<f64> = point.into_iter().map(f64::from).collect();
        let centroids: Vec<Vec<f64>> = centroids
            .into_iter()
            .map(|c| c.into_iter().map(f64::from).collect())
            .collect();
        let dists: Vec<f64> =
            centroids.iter().map(|c| squared_distance(&point, c)).collect();
        let mut best = 0;
        for (i, d) in dists.iter().enumerate() {
            if *d < dists[best] {
                best = i;
            }
        }
        let got = closest(&point, &centroids).unwrap();
        prop_assert_eq!(got.cluster, best);
        prop_assert_eq!(got.dist, dists[best]);
    }

    #[test]
    fn prop_decode_is_idempotent(
        values in prop::collection::vec(prop::option::of(-1e6f64..1e6), 1..40),
        rows_per_chunk in 1usize..8,
    ) {
        let raw = vec![RawColumn::new(Some("v"), values.clone())];
        let schema = infer_schema(&raw).unwrap();
        let chunks = encode_chunks(&schema, &raw, rows_per_chunk).unwrap();
        for chunk in &chunks {
            for row in 0..chunk.n_rows() {
                let first = decode_row(chunk, row, &[0]).unwrap();
                let second = decode_row(chunk, row, &[0]).unwrap();
                prop_assert_eq!(first[0].to_bits(), second[0].to_bits());
                let original = values[chunk.start_row() + row];
                prop_assert_eq!(first[0].is_nan(), original.is_none());
            }
        }
    }
}

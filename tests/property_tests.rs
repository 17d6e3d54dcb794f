//! Property-based tests for the similarity, quantization and row codecs.
//!
//! These tests verify invariants that should hold regardless of input:
//! - Self-similarity is extremal and the similarity is bounded and symmetric,
//!   from subnormal magnitudes up to the top of the `f32` range
//! - Encoding picks the codes a query's own distance table ranks highest
//! - K-means from fixed initial centroids is deterministic
//! - Persisted vector rows read back bit for bit

use proptest::prelude::*;

prop_compose! {
    fn arb_vector(dim: usize)(vec in prop::collection::vec(-10.0f32..10.0, dim)) -> Vec<f32> {
        vec
    }
}

prop_compose! {
    /// A vector scaled anywhere from near-underflow to near-overflow.
    fn arb_scaled_vector(dim: usize)(
        vec in prop::collection::vec(-10.0f32..10.0, dim),
        scale in prop::sample::select(vec![1e-35f32, 1e-15, 1e-6, 1.0, 1e6, 1e15, 1e35]),
    ) -> Vec<f32> {
        vec.into_iter().map(|x| x * scale).collect()
    }
}

fn has_norm(v: &[f32]) -> bool {
    forge_ivfpq::distance::norm(v) > 1e-3
}

fn non_zero(v: &[f32]) -> bool {
    !forge_ivfpq::distance::is_zero(v)
}

mod similarity_props {
    use super::*;
    use forge_ivfpq::distance::similarity;
    use forge_ivfpq::IvfPqError;

    proptest! {
        #![proptest_config(ProptestConfig::with_cases(200))]

        #[test]
        fn self_similarity_is_extremal(a in arb_vector(16), b in arb_vector(16)) {
            prop_assume!(has_norm(&a) && has_norm(&b));
            let own = similarity(&a, &a).unwrap();
            let other = similarity(&a, &b).unwrap();
            prop_assert!(own >= other - 1e-5, "self {} below other {}", own, other);
            prop_assert!((own - 1.0).abs() < 1e-5);
        }

        #[test]
        fn similarity_is_bounded_and_symmetric(a in arb_vector(32), b in arb_vector(32)) {
            prop_assume!(has_norm(&a) && has_norm(&b));
            let ab = similarity(&a, &b).unwrap();
            let ba = similarity(&b, &a).unwrap();
            prop_assert!((-1.0 - 1e-5..=1.0 + 1e-5).contains(&ab));
            prop_assert!((ab - ba).abs() < 1e-6);
        }

        #[test]
        fn similarity_ignores_positive_scale(a in arb_vector(8), b in arb_vector(8), s in 0.1f32..100.0) {
            prop_assume!(has_norm(&a) && has_norm(&b));
            let scaled: Vec<f32> = a.iter().map(|x| x * s).collect();
            let base = similarity(&a, &b).unwrap();
            let after = similarity(&scaled, &b).unwrap();
            prop_assert!((base - after).abs() < 1e-4);
        }

        #[test]
        fn extreme_magnitudes_stay_bounded(a in arb_scaled_vector(16), b in arb_scaled_vector(16)) {
            prop_assume!(non_zero(&a) && non_zero(&b));
            let own = similarity(&a, &a).unwrap();
            let ab = similarity(&a, &b).unwrap();
            let ba = similarity(&b, &a).unwrap();
            prop_assert!((own - 1.0).abs() < 1e-5, "self similarity {}", own);
            prop_assert!((-1.0..=1.0).contains(&ab), "similarity {} out of range", ab);
            prop_assert!((ab - ba).abs() < 1e-6);
        }

        #[test]
        fn rescaling_keeps_similarity(
            a in arb_vector(8),
            b in arb_vector(8),
            s in prop::sample::select(vec![1e-30f32, 1e-12, 1e12, 1e30]),
        ) {
            prop_assume!(has_norm(&a) && has_norm(&b));
            let scaled: Vec<f32> = a.iter().map(|x| x * s).collect();
            let base = similarity(&a, &b).unwrap();
            let after = similarity(&scaled, &b).unwrap();
            prop_assert!((base - after).abs() < 1e-4, "{} vs {} at scale {}", base, after, s);
        }

        #[test]
        fn non_finite_operand_fails(
            a in arb_vector(8),
            pos in 0usize..8,
            bad in prop::sample::select(vec![f32::NAN, f32::INFINITY, f32::NEG_INFINITY]),
        ) {
            let mut poisoned = a.clone();
            poisoned[pos] = bad;
            prop_assert!(matches!(similarity(&poisoned, &a), Err(IvfPqError::NonFiniteValue)));
            prop_assert!(matches!(similarity(&a, &poisoned), Err(IvfPqError::NonFiniteValue)));
        }

        #[test]
        fn zero_operand_is_degenerate(a in arb_vector(8)) {
            let zero = vec![0.0f32; 8];
            prop_assert!(matches!(similarity(&a, &zero), Err(IvfPqError::DegenerateVector)));
        }
    }
}

mod codebook_props {
    use super::*;
    use forge_ivfpq::{Codebook, VectorSet};

    const SEGMENTS: usize = 4;
    const SEGMENT_DIM: usize = 3;
    const PQ_NUM: usize = 5;

    prop_compose! {
        fn arb_codebook()(
            entries in prop::collection::vec(arb_vector(SEGMENT_DIM), SEGMENTS * PQ_NUM)
        ) -> Vec<Vec<f32>> {
            entries
        }
    }

    fn build(entries: &[Vec<f32>]) -> Codebook {
        let segments = entries
            .chunks(PQ_NUM)
            .map(|rows| VectorSet::from_rows(rows).unwrap())
            .collect();
        Codebook::new(segments).unwrap()
    }

    proptest! {
        #![proptest_config(ProptestConfig::with_cases(100))]

        #[test]
        fn own_codes_score_highest(
            entries in arb_codebook(),
            v in arb_vector(SEGMENTS * SEGMENT_DIM),
            other in prop::collection::vec(0u16..PQ_NUM as u16, SEGMENTS),
        ) {
            prop_assume!(entries.iter().all(|e| has_norm(e)));
            prop_assume!(v.chunks(SEGMENT_DIM).all(has_norm));

            let codebook = build(&entries);
            let codes = codebook.encode(&v).unwrap();
            let table = codebook.distance_table(&v).unwrap();
            prop_assert!(table.score(&codes) >= table.score(&other));
        }

        #[test]
        fn codes_stay_in_range(entries in arb_codebook(), v in arb_vector(SEGMENTS * SEGMENT_DIM)) {
            prop_assume!(entries.iter().all(|e| has_norm(e)));
            let codebook = build(&entries);
            let codes = codebook.encode(&v).unwrap();
            prop_assert_eq!(codes.len(), SEGMENTS);
            prop_assert!(codes.iter().all(|&c| (c as usize) < PQ_NUM));
            prop_assert_eq!(codebook.decode(&codes).unwrap().len(), SEGMENTS * SEGMENT_DIM);
        }
    }
}

mod kmeans_props {
    use super::*;
    use forge_ivfpq::{KMeans, VectorSet};

    proptest! {
        #![proptest_config(ProptestConfig::with_cases(30))]

        #[test]
        fn fixed_init_is_deterministic(rows in prop::collection::vec(arb_vector(4), 12..40)) {
            prop_assume!(rows.iter().all(|r| has_norm(r)));
            let data = VectorSet::from_rows(&rows).unwrap();
            let initial = VectorSet::from_rows(&rows[..3]).unwrap();

            let mut first = KMeans::new(3, 20);
            first.fit_from(&data, initial.clone()).unwrap();
            let mut second = KMeans::new(3, 20);
            second.fit_from(&data, initial).unwrap();

            prop_assert_eq!(first.centroids(), second.centroids());
            prop_assert_eq!(first.assign(&data).unwrap(), second.assign(&data).unwrap());
        }
    }
}

mod row_props {
    use super::*;
    use forge_ivfpq::persistence::rows::{parse_vector_row, write_vector_row};

    proptest! {
        #[test]
        fn vector_rows_are_exact(id in any::<u64>(), v in prop::collection::vec(any::<f32>().prop_filter("finite", |x| x.is_finite()), 1..16)) {
            let mut buf = Vec::new();
            write_vector_row(&mut buf, id, &v).unwrap();
            let line = String::from_utf8(buf).unwrap();
            let (parsed_id, parsed) = parse_vector_row(line.trim_end(), v.len()).unwrap();
            prop_assert_eq!(parsed_id, id);
            prop_assert_eq!(parsed, v);
        }
    }
}

mod recall_props {
    use super::*;
    use forge_ivfpq::recall_at_k;

    proptest! {
        #[test]
        fn recall_is_a_fraction(
            predicted in prop::collection::vec(0u64..50, 0..20),
            truth in prop::collection::vec(0u64..50, 0..20),
            k in 1usize..20,
        ) {
            let recall = recall_at_k(&predicted, &truth, k);
            prop_assert!((0.0..=1.0).contains(&recall));
        }
    }
}

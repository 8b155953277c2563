//! Property-based tests for kernel-sweep
//!
//! - Enumeration size and order invariants
//! - Aggregator sample-count law and warm-up exclusion
//! - Result matrix shape under arbitrary failures
//! - Run with ProptestConfig::with_cases(100)

use kernel_sweep::aggregate::aggregate;
use kernel_sweep::config::{SweepConfig, SweepKind, VariantSpec};
use kernel_sweep::space::{enumerate, row_keys};
use kernel_sweep::store::{Cell, ResultMatrix};
use kernel_sweep::telemetry::{self, RepetitionRecord};
use kernel_sweep::{Error, FailureKind};
use proptest::prelude::*;
use std::collections::BTreeSet;

// ============================================================================
// Strategies
// ============================================================================

/// Distinct, sorted axis values
fn arb_axis<T: Ord + Clone + std::fmt::Debug>(
    values: impl Strategy<Value = T>,
    max: usize,
) -> impl Strategy<Value = Vec<T>> {
    proptest::collection::btree_set(values, 1..=max).prop_map(|s: BTreeSet<T>| s.into_iter().collect())
}

fn arb_config() -> impl Strategy<Value = SweepConfig> {
    (
        arb_axis(1u64..100_000_000, 6),
        arb_axis(1u32..4096, 3),
        1usize..5,
        2u32..12,
    )
        .prop_map(|(array_lens, nb_bins, variants, nb_repeat)| {
            let mut config = SweepConfig::histogram_variants();
            config.kind = SweepKind::Variants {
                variants: (0..variants)
                    .map(|i| VariantSpec::new(format!("V{i}"), format!("./v{i}")))
                    .collect(),
            };
            config.array_lens = array_lens;
            config.nb_bins = nb_bins;
            config.nb_repeat = nb_repeat;
            config
        })
}

fn arb_timings(len: usize) -> impl Strategy<Value = Vec<f64>> {
    proptest::collection::vec(1e-6f64..10.0, len)
}

fn records(timings: &[f64]) -> Vec<RepetitionRecord> {
    timings
        .iter()
        .enumerate()
        .map(|(i, &t)| RepetitionRecord::new(i as u64, t, 0))
        .collect()
}

proptest! {
    #![proptest_config(ProptestConfig::with_cases(100))]

    // ========================================================================
    // ConfigSpace
    // ========================================================================

    /// Property: one point per axis combination, row-major order
    #[test]
    fn prop_enumeration_is_full_product(config in arb_config()) {
        let points = enumerate(&config);
        let columns = config.columns();
        prop_assert_eq!(points.len(), config.array_lens.len() * config.nb_bins.len() * columns.len());

        let keys = row_keys(&config);
        for (i, point) in points.iter().enumerate() {
            prop_assert_eq!(point.row_key(), keys[i / columns.len()]);
            prop_assert_eq!(&point.variant, &columns[i % columns.len()]);
        }
    }

    /// Property: enumeration is a pure function of the axis lists
    #[test]
    fn prop_enumeration_is_deterministic(config in arb_config()) {
        prop_assert_eq!(enumerate(&config), enumerate(&config.clone()));
    }

    // ========================================================================
    // Aggregator
    // ========================================================================

    /// Property: exactly R records give exactly R-1 samples
    #[test]
    fn prop_exact_repeat_uses_r_minus_one(timings in (2usize..30).prop_flat_map(arb_timings)) {
        let r = timings.len();
        let result = aggregate(&records(&timings), r).unwrap();
        prop_assert_eq!(result.samples(), r - 1);
    }

    /// Property: fewer than R records is always rejected
    #[test]
    fn prop_fewer_than_repeat_rejected(timings in (1usize..20).prop_flat_map(arb_timings), extra in 1usize..5) {
        let r = timings.len() + extra;
        let err = aggregate(&records(&timings), r).unwrap_err();
        let is_insufficient = matches!(err, Error::InsufficientSamples { expected, parsed } if expected == r && parsed == timings.len());
        prop_assert!(is_insufficient);
    }

    /// Property: the warm-up value never changes the mean
    #[test]
    fn prop_warm_up_value_irrelevant(
        timings in (2usize..20).prop_flat_map(arb_timings),
        warm_up in prop_oneof![Just(0.0), Just(1e9), 0.0f64..1e6],
    ) {
        let mut with_outlier = timings.clone();
        with_outlier[0] = warm_up;
        let a = aggregate(&records(&timings), timings.len()).unwrap();
        let b = aggregate(&records(&with_outlier), timings.len()).unwrap();
        prop_assert_eq!(a.mean_seconds(), b.mean_seconds());
    }

    /// Property: the mean lies within the measured samples' range
    #[test]
    fn prop_mean_bounded_by_samples(timings in (2usize..20).prop_flat_map(arb_timings)) {
        let result = aggregate(&records(&timings), timings.len()).unwrap();
        let measured = &timings[1..];
        let min = measured.iter().copied().fold(f64::INFINITY, f64::min);
        let max = measured.iter().copied().fold(f64::NEG_INFINITY, f64::max);
        prop_assert!(result.mean_seconds() >= min * (1.0 - 1e-12));
        prop_assert!(result.mean_seconds() <= max * (1.0 + 1e-12));
    }

    // ========================================================================
    // TelemetryParser
    // ========================================================================

    /// Property: parser never fails on in-order streams with junk rows mixed in
    #[test]
    fn prop_parser_skips_junk(timings in (0usize..15).prop_flat_map(arb_timings), junk in 0usize..5) {
        let mut out = String::from("rep,timing,check_status\n");
        for (i, t) in timings.iter().enumerate() {
            out.push_str(&format!("{i},{t:e},0\n"));
            if i < junk {
                out.push_str("not,a,row\n");
            }
        }
        let parsed = telemetry::parse(&out).unwrap();
        prop_assert_eq!(parsed.records().len(), timings.len());
        prop_assert_eq!(parsed.unparsed_rows(), junk.min(timings.len()));
    }

    // ========================================================================
    // ResultStore
    // ========================================================================

    /// Property: CSV stays rectangular whatever cells fail
    #[test]
    fn prop_matrix_always_rectangular(config in arb_config(), failed in proptest::collection::vec(any::<bool>(), 0..64)) {
        let keys = row_keys(&config);
        let columns = config.columns();
        let mut matrix = ResultMatrix::new(&keys, columns.clone());
        let ok = aggregate(&records(&[1.0, 2.0]), 2).unwrap();
        for (i, point) in enumerate(&config).iter().enumerate() {
            let cell = if failed.get(i).copied().unwrap_or(false) {
                Cell::Missing(FailureKind::ProcessTimeout)
            } else {
                Cell::Measured(ok)
            };
            matrix.set(point.row_key(), &point.variant, cell).unwrap();
        }

        let csv = matrix.to_csv();
        let lines: Vec<&str> = csv.lines().collect();
        prop_assert_eq!(lines.len(), keys.len() + 1);
        let width = lines[0].split(',').count();
        prop_assert!(lines.iter().all(|l| l.split(',').count() == width));
    }
}

//! End-to-end checks on the six-vector reference dataset.
//!
//! Flows 1-2, 3-4 and 5-6 start close together and share a displacement, so
//! origin-anchored weights show strong positive autocorrelation. Golden values
//! are pinned for row-standardized inverse-distance weights with exponent -1.5
//! and every pair connected.

use approx::assert_relative_eq;
use odflow_algorithms::statistics::{
    moments, vector_morans_i, MoranParams, PermutationStatus, VectorMoran,
};
use odflow_core::io::parse_vectors;
use odflow_core::{
    Algorithm, Anchor, DenseWeights, Error, InverseDistanceParams, SpatialWeights, VectorSample,
    WeightTransform,
};
use odflow_parallel::ProcessingMode;

const REFERENCE: &str = "\
id,origin_x,origin_y,dest_x,dest_y
1,55,60,100,500
2,60,55,105,501
3,500,55,155,500
4,505,60,160,500
5,105,950,105,500
6,155,950,155,499
";

fn reference() -> VectorSample {
    parse_vectors(REFERENCE).unwrap()
}

fn weights_for(sample: &VectorSample, anchor: Anchor) -> DenseWeights {
    DenseWeights::inverse_distance(
        &sample.anchor_points(anchor),
        &InverseDistanceParams {
            exponent: -1.5,
            threshold: Some(10_000.0),
            transform: WeightTransform::Row,
        },
    )
    .unwrap()
}

fn analytical_only() -> MoranParams {
    MoranParams {
        permutations: 0,
        ..Default::default()
    }
}

// ---------------------------------------------------------------------------
// Golden values
// ---------------------------------------------------------------------------

#[test]
fn origin_anchored_golden() {
    let sample = reference();
    let w = weights_for(&sample, Anchor::Origin);

    assert_relative_eq!(w.s0(), 6.0, epsilon = 1e-12);
    assert_relative_eq!(w.s1(), 11.545630528992207, epsilon = 1e-10);
    assert_relative_eq!(w.s2(), 24.006047038514314, epsilon = 1e-10);

    let r = vector_morans_i(&sample, &w, analytical_only()).unwrap();
    assert_eq!(r.n, 6);
    assert_relative_eq!(r.i, 0.9560440278319524, epsilon = 1e-10);
    assert_relative_eq!(r.ei, -0.2, epsilon = 1e-15);
    assert_relative_eq!(r.vi_norm, 0.2612749339782806, epsilon = 1e-10);
    assert_relative_eq!(r.vi_rand, 0.39045094318917517, epsilon = 1e-10);
    assert_relative_eq!(r.z_norm, 2.261650542990555, epsilon = 1e-9);
    assert_relative_eq!(r.z_rand, 1.8500826754047701, epsilon = 1e-9);
    assert_relative_eq!(r.p_norm, 0.023719002630242292, epsilon = 1e-6);
    assert_relative_eq!(r.p_rand, 0.06430163451715565, epsilon = 1e-6);

    assert!(r.i > 0.0, "similar neighbouring displacements give positive I");
    assert!(r.p_norm < 0.05);
    assert!(r.p_rand < 0.1);
}

#[test]
fn destination_anchored_golden() {
    let sample = reference();
    let w = weights_for(&sample, Anchor::Destination);
    let r = vector_morans_i(&sample, &w, analytical_only()).unwrap();

    assert_relative_eq!(r.i, -0.5865670299522687, epsilon = 1e-10);
    assert_relative_eq!(r.vi_norm, 0.14799194717404252, epsilon = 1e-10);
    assert_relative_eq!(r.vi_rand, 0.21447229473797205, epsilon = 1e-10);
    assert_relative_eq!(r.p_norm, 0.3149640341031686, epsilon = 1e-6);
    assert_relative_eq!(r.p_rand, 0.4038771187331299, epsilon = 1e-6);
}

#[test]
fn kurtosis_uses_componentwise_fourth_moments() {
    let sample = reference();
    let w = weights_for(&sample, Anchor::Origin);
    let m = moments(&sample, &w).unwrap();

    assert_eq!(m.u, vec![145.0, 145.0, -245.0, -245.0, 100.0, 100.0]);
    assert_eq!(m.v, vec![295.0, 301.0, 300.0, 295.0, -595.0, -596.0]);
    assert_relative_eq!(m.kurtosis, 1.1256355193696383, epsilon = 1e-12);
}

// ---------------------------------------------------------------------------
// Permutation inference
// ---------------------------------------------------------------------------

#[test]
fn permutation_p_value_tracks_exact_enumeration() {
    // Exact enumeration of all 720 orderings gives 34 with I >= observed.
    let exact = 34.0 / 720.0;
    let sample = reference();
    let w = weights_for(&sample, Anchor::Origin);
    let params = MoranParams {
        permutations: 999,
        two_tailed: true,
        seed: Some(42),
        mode: ProcessingMode::Parallel,
    };
    let r = vector_morans_i(&sample, &w, params).unwrap();
    let sim = r.simulation.expect("permutations requested");

    assert_eq!(sim.status, PermutationStatus::Complete);
    assert_eq!(sim.sim.len(), 999);
    assert!(
        (sim.p_sim - exact).abs() < 0.03,
        "p_sim = {}, exact = {}",
        sim.p_sim,
        exact
    );
    assert!((sim.p_sim - r.p_rand).abs() < 0.05);
    assert_relative_eq!(sim.ei_sim, -0.2, epsilon = 0.06);
    assert_relative_eq!(sim.se_i_sim, 0.5132713778366146, epsilon = 0.06);
    assert!(sim.z_sim > 0.0);
    assert!(sim.p_z_sim < 0.5);
}

// ---------------------------------------------------------------------------
// Invariants
// ---------------------------------------------------------------------------

#[test]
fn joint_relabelling_preserves_statistic() {
    let sample = reference();
    let w = weights_for(&sample, Anchor::Origin);
    let order = [4, 2, 0, 5, 1, 3];

    let relabelled = sample.permuted(&order).unwrap();
    let w_relabelled = w.permuted(&order).unwrap();

    let a = vector_morans_i(&sample, &w, analytical_only()).unwrap();
    let b = vector_morans_i(&relabelled, &w_relabelled, analytical_only()).unwrap();
    assert_relative_eq!(a.i, b.i, epsilon = 1e-12);
    assert_relative_eq!(a.vi_norm, b.vi_norm, epsilon = 1e-12);
    assert_relative_eq!(a.vi_rand, b.vi_rand, epsilon = 1e-12);

    // Rebuilding weights from the relabelled points gives the same matrix
    let rebuilt = weights_for(&relabelled, Anchor::Origin);
    let c = vector_morans_i(&relabelled, &rebuilt, analytical_only()).unwrap();
    assert_relative_eq!(a.i, c.i, epsilon = 1e-12);
}

#[test]
fn statistic_is_transform_agnostic_input() {
    let sample = reference();
    let base = weights_for(&sample, Anchor::Origin);
    for transform in [
        WeightTransform::Row,
        WeightTransform::Doubly,
        WeightTransform::Untransformed,
        WeightTransform::VarianceStabilizing,
    ] {
        let w = base.transformed(transform);
        let r = vector_morans_i(&sample, &w, analytical_only()).unwrap();
        assert!(r.i.is_finite(), "transform {}", transform);
        assert!(r.p_norm > 0.0 && r.p_norm <= 1.0);
        assert!(r.p_rand > 0.0 && r.p_rand <= 1.0);
    }
}

#[test]
fn doubly_standardized_scale_invariance() {
    // I depends on W only through W / s0, so D and U agree.
    let sample = reference();
    let base = weights_for(&sample, Anchor::Origin);
    let u = vector_morans_i(&sample, &base.transformed(WeightTransform::Untransformed), analytical_only()).unwrap();
    let d = vector_morans_i(&sample, &base.transformed(WeightTransform::Doubly), analytical_only()).unwrap();
    assert_relative_eq!(u.i, d.i, epsilon = 1e-10);
    assert_relative_eq!(u.vi_norm, d.vi_norm, epsilon = 1e-10);
}

#[test]
fn one_tailed_halves_p_values() {
    let sample = reference();
    let w = weights_for(&sample, Anchor::Origin);
    let two = vector_morans_i(&sample, &w, analytical_only()).unwrap();
    let one = vector_morans_i(
        &sample,
        &w,
        MoranParams {
            permutations: 0,
            two_tailed: false,
            ..Default::default()
        },
    )
    .unwrap();
    assert_relative_eq!(one.p_norm * 2.0, two.p_norm, epsilon = 1e-15);
    assert_relative_eq!(one.p_rand * 2.0, two.p_rand, epsilon = 1e-15);
}

#[test]
fn algorithm_trait_matches_function() {
    let sample = reference();
    let w = weights_for(&sample, Anchor::Origin);
    let direct = vector_morans_i(&sample, &w, analytical_only()).unwrap();
    let via_trait = VectorMoran.execute((sample, w), analytical_only()).unwrap();
    assert_eq!(direct.i, via_trait.i);
    assert_eq!(direct.p_rand, via_trait.p_rand);
}

#[test]
fn truncated_sample_is_rejected() {
    let sample = reference();
    let first_three = VectorSample::new(sample.as_slice()[..3].to_vec()).unwrap();
    let w = weights_for(&first_three, Anchor::Origin);
    assert!(matches!(
        vector_morans_i(&first_three, &w, analytical_only()),
        Err(Error::InsufficientSampleSize { n: 3, .. })
    ));

    let first_four = VectorSample::new(sample.as_slice()[..4].to_vec()).unwrap();
    let w = weights_for(&first_four, Anchor::Origin);
    assert!(vector_morans_i(&first_four, &w, analytical_only()).is_ok());
}

#[test]
fn result_serializes_to_json_fields() {
    let sample = reference();
    let w = weights_for(&sample, Anchor::Origin);
    let params = MoranParams {
        permutations: 99,
        seed: Some(9),
        ..Default::default()
    };
    let r = vector_morans_i(&sample, &w, params).unwrap();
    let json = serde_json::to_value(&r).unwrap();
    for key in ["i", "ei", "vi_norm", "se_i_norm", "z_norm", "p_norm", "vi_rand", "se_i_rand", "z_rand", "p_rand"] {
        assert!(json.get(key).is_some_and(|v| v.is_number()), "missing {}", key);
    }
    let sim = &json["simulation"];
    assert_eq!(sim["status"]["state"], "complete");
    assert_eq!(sim["sim"].as_array().map(|a| a.len()), Some(99));
}

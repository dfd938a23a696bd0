use approx::assert_relative_eq;
use localorder::api::{build_index, cluster_by_bond_threshold, reduce_over_neighbors};
use localorder::{ClusterParams, DotNormalization, PeriodicBox, TranslationalKernel};
use num_complex::Complex64;

#[test]
fn test_reduce_simple() {
    let positions = [[1.0, 1.0, 1.0], [2.0, 1.0, 1.0]];
    let sim_box = PeriodicBox::cube(10.0).unwrap();
    let index = build_index(&sim_box, &positions, 1.5).unwrap();

    let kernel = TranslationalKernel::new(1.0).unwrap();
    let result = reduce_over_neighbors(&index, &positions, 1.5, &kernel).unwrap();

    // each particle sees the other one unit away along x
    assert_eq!(result.len(), 2);
    assert_relative_eq!(result[0].re, 1.0, epsilon = 1e-12);
    assert_relative_eq!(result[1].re, -1.0, epsilon = 1e-12);
}

#[test]
fn test_reduce_pbc() {
    let positions = [[1.0, 1.0, 1.0], [9.0, 1.0, 1.0]];
    let sim_box = PeriodicBox::cube(10.0).unwrap();
    let index = build_index(&sim_box, &positions, 2.5).unwrap();

    let kernel = TranslationalKernel::new(1.0).unwrap();
    let result = reduce_over_neighbors(&index, &positions, 2.5, &kernel).unwrap();

    // 9.0 - 10.0 = -1.0, two units behind particle 0
    assert_relative_eq!(result[0].re, -2.0, epsilon = 1e-12);
    assert_relative_eq!(result[1].re, 2.0, epsilon = 1e-12);
}

#[test]
fn test_cluster_square() {
    let positions = [
        [1.0, 1.0, 1.0],
        [2.0, 1.0, 1.0],
        [1.0, 2.0, 1.0],
        [2.0, 2.0, 1.0],
    ];
    let sim_box = PeriodicBox::cube(10.0).unwrap();
    let index = build_index(&sim_box, &positions, 1.5).unwrap();

    let coefficients = vec![vec![Complex64::new(0.5, 0.5); 3]; 4];
    let params = ClusterParams::direct(1.5, 1.5, 0.9, 3, DotNormalization::Normalized);
    let result = cluster_by_bond_threshold(&index, &positions, &coefficients, &params).unwrap();

    assert_eq!(result.num_clusters(), 1);
    assert_eq!(result.largest_cluster_size(), 4);
}

#[test]
fn test_empty_input() {
    let sim_box = PeriodicBox::cube(10.0).unwrap();
    let index = build_index(&sim_box, &[], 2.0).unwrap();

    let kernel = TranslationalKernel::new(1.0).unwrap();
    assert!(reduce_over_neighbors(&index, &[], 2.0, &kernel).unwrap().is_empty());

    let params = ClusterParams::direct(2.0, 2.0, 0.5, 1, DotNormalization::Raw);
    let result = cluster_by_bond_threshold(&index, &[], &[], &params).unwrap();
    assert_eq!(result.num_clusters(), 0);
    assert!(result.cluster_ids().is_empty());
}

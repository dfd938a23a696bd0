use approx::assert_relative_eq;
use localorder::config;
use localorder::{HexaticOrder, LocalQlm, Normalization, PeriodicBox, TranslationalOrder};
use nalgebra::Vector3;
use std::f64::consts::PI;

fn square_lattice(n: usize, a: f64) -> (PeriodicBox, Vec<Vector3<f64>>) {
    let sim_box = PeriodicBox::square(n as f64 * a, n as f64 * a).unwrap();
    let mut positions = Vec::with_capacity(n * n);
    for i in 0..n {
        for j in 0..n {
            positions.push(Vector3::new(i as f64 * a, j as f64 * a, 0.0));
        }
    }
    (sim_box, positions)
}

#[test]
fn test_square_lattice_fourfold_order() {
    let (sim_box, positions) = square_lattice(8, 1.0);
    let mut psi4 = HexaticOrder::new(1.1, 4).unwrap();
    let mut psi6 = HexaticOrder::new(1.1, 6).unwrap();

    for p in psi4.compute(&sim_box, &positions).unwrap() {
        assert_relative_eq!(p.re, 1.0, epsilon = 1e-9);
        assert_relative_eq!(p.im, 0.0, epsilon = 1e-9);
    }
    // exp(6i * k pi/2) alternates sign and cancels over four bonds
    for p in psi6.compute(&sim_box, &positions).unwrap() {
        assert_relative_eq!(p.norm(), 0.0, epsilon = 1e-9);
    }
}

#[test]
fn test_single_bond_phase() {
    let sim_box = PeriodicBox::square(8.0, 8.0).unwrap();
    let angle: f64 = 0.3;
    let (s, c) = angle.sin_cos();
    // a single bond at angle a gives psi_4 = exp(4ia) / 4
    let pair = vec![Vector3::new(1.0, 1.0, 0.0), Vector3::new(1.0 + c, 1.0 + s, 0.0)];
    let mut psi = HexaticOrder::new(1.1, 4).unwrap();
    let values = psi.compute(&sim_box, &pair).unwrap();
    assert_relative_eq!(values[0].norm(), 0.25, epsilon = 1e-12);
    assert_relative_eq!(values[0].arg(), 4.0 * angle, epsilon = 1e-12);
}

#[test]
fn test_translational_order_in_triclinic_box() {
    let sim_box = PeriodicBox::triclinic(10.0, 10.0, 10.0, 0.2, 0.0, 0.0).unwrap();
    let positions = vec![Vector3::new(5.0, 5.0, 5.0), Vector3::new(5.5, 5.5, 5.0)];
    let mut op = TranslationalOrder::new(1.0, 1.0).unwrap();
    let values = op.compute(&sim_box, &positions).unwrap();
    assert_relative_eq!(values[0].re, 0.5, epsilon = 1e-12);
    assert_relative_eq!(values[0].im, 0.5, epsilon = 1e-12);
    assert_relative_eq!(values[1].re, -0.5, epsilon = 1e-12);
}

#[test]
fn test_qlm_rotational_invariant_matches_simple_cubic() {
    let n = 6;
    let mut positions = Vec::new();
    for i in 0..n {
        for j in 0..n {
            for k in 0..n {
                positions.push(Vector3::new(i as f64, j as f64, k as f64));
            }
        }
    }
    let sim_box = PeriodicBox::cube(n as f64).unwrap();
    let mut qlm = LocalQlm::new(1.2, 4, Normalization::NeighborCount).unwrap();
    let values = qlm.compute(&sim_box, &positions).unwrap();

    // Q4 = sqrt(4 pi / 9 * sum_m |q_4m|^2) = sqrt(7/12) for simple cubic
    for q in values {
        let sum: f64 = q.iter().map(|c| c.norm_sqr()).sum();
        let q4 = (4.0 * PI / 9.0 * sum).sqrt();
        assert_relative_eq!(q4, (7.0f64 / 12.0).sqrt(), epsilon = 1e-9);
    }
}

#[test]
fn test_parallel_and_serial_paths_agree() {
    let (sim_box, positions) = square_lattice(40, 1.0);
    let jittered: Vec<Vector3<f64>> = positions
        .iter()
        .enumerate()
        .map(|(i, p)| {
            let t = i as f64;
            p + Vector3::new((t * 0.91).sin() * 0.1, (t * 0.37).cos() * 0.1, 0.0)
        })
        .collect();
    let mut op = HexaticOrder::new(1.5, 6).unwrap();
    let parallel = op.compute(&sim_box, &jittered).unwrap().to_vec();

    let saved = config::get_parallel_threshold();
    config::set_parallel_threshold(usize::MAX);
    let serial = op.compute(&sim_box, &jittered).unwrap().to_vec();
    config::set_parallel_threshold(saved);

    assert_eq!(parallel.len(), 1600);
    for (a, b) in parallel.iter().zip(&serial) {
        assert_eq!(a.re.to_bits(), b.re.to_bits());
        assert_eq!(a.im.to_bits(), b.im.to_bits());
    }
}

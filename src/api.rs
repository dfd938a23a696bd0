//! Entry points taking positions as plain `[x, y, z]` rows.

use crate::cluster::{self, ClusterParams, ClusterResult};
use crate::error::Result;
use crate::periodic::PeriodicBox;
use crate::query::NeighborQuery;
use crate::reduce::{self, NeighborKernel};
use crate::search::CellList;
use nalgebra::Vector3;
use num_complex::Complex64;
use std::borrow::Cow;

/// Views `rows` as vectors without copying when the layout allows it.
pub fn positions_from_rows(rows: &[[f64; 3]]) -> Cow<'_, [Vector3<f64>]> {
    if let Ok(cast) = bytemuck::try_cast_slice::<[f64; 3], Vector3<f64>>(rows) {
        return Cow::Borrowed(cast);
    }
    // Fallback: Copy
    Cow::Owned(rows.iter().map(|r| Vector3::new(r[0], r[1], r[2])).collect())
}

pub fn build_index(sim_box: &PeriodicBox, positions: &[[f64; 3]], cutoff: f64) -> Result<CellList> {
    let positions = positions_from_rows(positions);
    Ok(CellList::build(sim_box, &positions, cutoff)?)
}

/// Runs `kernel` over every particle of a snapshot already assigned to `index`.
pub fn reduce_over_neighbors<K: NeighborKernel>(
    index: &CellList,
    positions: &[[f64; 3]],
    radius: f64,
    kernel: &K,
) -> Result<Vec<K::Output>> {
    let positions = positions_from_rows(positions);
    let query = NeighborQuery::new(index, &positions)?;
    reduce::reduce_over_neighbors(&query, radius, kernel)
}

pub fn cluster_by_bond_threshold(
    index: &CellList,
    positions: &[[f64; 3]],
    coefficients: &[Vec<Complex64>],
    params: &ClusterParams,
) -> Result<ClusterResult> {
    let positions = positions_from_rows(positions);
    let query = NeighborQuery::new(index, &positions)?;
    cluster::cluster_by_bond_threshold(&query, coefficients, params)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::cluster::DotNormalization;
    use crate::order::HexaticKernel;

    #[test]
    fn test_rows_are_borrowed() {
        let rows = [[1.0, 2.0, 3.0], [4.0, 5.0, 6.0]];
        let positions = positions_from_rows(&rows);
        assert!(matches!(positions, Cow::Borrowed(_)));
        assert_eq!(positions[1], Vector3::new(4.0, 5.0, 6.0));
    }

    #[test]
    fn test_flat_pipeline() {
        let sim_box = PeriodicBox::cube(10.0).unwrap();
        let rows = [[1.0, 1.0, 1.0], [1.8, 1.0, 1.0], [6.0, 6.0, 6.0], [6.0, 6.8, 6.0]];
        let index = build_index(&sim_box, &rows, 1.0).unwrap();

        let psi = reduce_over_neighbors(&index, &rows, 1.0, &HexaticKernel::new(4).unwrap()).unwrap();
        assert_eq!(psi.len(), 4);

        let coefficients = vec![vec![Complex64::new(1.0, 0.0)]; 4];
        let params = ClusterParams::direct(1.0, 1.0, 0.5, 1, DotNormalization::Normalized);
        let result = cluster_by_bond_threshold(&index, &rows, &coefficients, &params).unwrap();
        assert_eq!(result.num_clusters(), 2);
        assert_eq!(result.cluster_size_histogram(), vec![2, 2]);
    }

    #[test]
    fn test_index_errors() {
        let sim_box = PeriodicBox::cube(4.0).unwrap();
        let err = build_index(&sim_box, &[[0.0; 3]], 2.5).unwrap_err();
        assert!(err.is_config());

        let index = build_index(&sim_box, &[[0.0; 3]], 1.0).unwrap();
        let err = reduce_over_neighbors(&index, &[[0.0; 3]; 2], 1.0, &HexaticKernel::new(6).unwrap())
            .unwrap_err();
        assert!(!err.is_config());
    }
}

//! Solid/liquid classification by clustering particles with correlated
//! local bond-orientational order.

use crate::cluster::{
    Bond, ClusterParams, ClusterResult, DotNormalization, SharedCount, cluster_by_bond_threshold,
};
use crate::error::{ConfigError, Result, check_radius, check_threshold};
use crate::order::{Normalization, SphericalHarmonicKernel};
use crate::periodic::PeriodicBox;
use crate::query::NeighborQuery;
use crate::reduce::reduce_over_neighbors;
use crate::search::CellList;
use nalgebra::Vector3;
use num_complex::Complex64;
use tracing::info;

#[derive(Debug)]
pub struct SolidLiquid {
    r_max: f64,
    r_cluster: f64,
    q_threshold: f64,
    s_threshold: usize,
    kernel: SphericalHarmonicKernel,
    index: Option<CellList>,
    qlm: Vec<Vec<Complex64>>,
    result: ClusterResult,
}

impl SolidLiquid {
    /// `r_max` bounds the neighbors contributing to `q_lm` and to bond scores.
    /// A bond is solid-like when its score exceeds `q_threshold`; a particle
    /// is solid-like with at least `s_threshold` such bonds. `l` must be even
    /// and positive. The clustering radius starts equal to `r_max`.
    pub fn new(r_max: f64, q_threshold: f64, s_threshold: usize, l: u32) -> Result<Self, ConfigError> {
        check_radius("r_max", r_max)?;
        check_threshold("q_threshold", q_threshold)?;
        let kernel = SphericalHarmonicKernel::new(l, Normalization::None)?;
        Ok(Self {
            r_max,
            r_cluster: r_max,
            q_threshold,
            s_threshold,
            kernel,
            index: None,
            qlm: Vec::new(),
            result: ClusterResult::default(),
        })
    }

    pub fn set_clustering_radius(&mut self, r_cluster: f64) -> Result<(), ConfigError> {
        check_radius("clustering radius", r_cluster)?;
        self.r_cluster = r_cluster;
        Ok(())
    }

    /// Direct policy with normalized bond scores.
    pub fn compute(&mut self, sim_box: &PeriodicBox, positions: &[Vector3<f64>]) -> Result<()> {
        let params = self.direct_params(DotNormalization::Normalized);
        self.run(sim_box, positions, &params)
    }

    /// Direct policy with raw dot products as bond scores.
    pub fn compute_no_norm(&mut self, sim_box: &PeriodicBox, positions: &[Vector3<f64>]) -> Result<()> {
        let params = self.direct_params(DotNormalization::Raw);
        self.run(sim_box, positions, &params)
    }

    /// Clusters pairs sharing more than `s_threshold` solid-like neighbors.
    pub fn compute_shared_neighbors(
        &mut self,
        sim_box: &PeriodicBox,
        positions: &[Vector3<f64>],
    ) -> Result<()> {
        let params = ClusterParams::shared_neighbors(
            self.r_max,
            self.r_cluster,
            self.q_threshold,
            self.s_threshold,
            self.s_threshold,
        );
        self.run(sim_box, positions, &params)
    }

    fn direct_params(&self, normalization: DotNormalization) -> ClusterParams {
        ClusterParams::direct(
            self.r_max,
            self.r_cluster,
            self.q_threshold,
            self.s_threshold,
            normalization,
        )
    }

    fn run(
        &mut self,
        sim_box: &PeriodicBox,
        positions: &[Vector3<f64>],
        params: &ClusterParams,
    ) -> Result<()> {
        let cutoff = self.r_max.max(self.r_cluster);
        let mut index = match self.index.take() {
            Some(cl) if cl.matches(sim_box, cutoff) => cl,
            _ => CellList::for_particles(sim_box, cutoff, positions.len())?,
        };
        index.rebuild(positions);
        let outcome = NeighborQuery::new(&index, positions).and_then(|query| {
            let qlm = reduce_over_neighbors(&query, self.r_max, &self.kernel)?;
            let result = cluster_by_bond_threshold(&query, &qlm, params)?;
            Ok((qlm, result))
        });
        self.index = Some(index);
        let (qlm, result) = outcome?;

        info!(
            n_particles = positions.len(),
            num_clusters = result.num_clusters(),
            largest = result.largest_cluster_size(),
            "solid-liquid clustering done"
        );
        self.qlm = qlm;
        self.result = result;
        Ok(())
    }

    pub fn r_max(&self) -> f64 {
        self.r_max
    }

    pub fn clustering_radius(&self) -> f64 {
        self.r_cluster
    }

    /// Un-normalized `q_lm` per particle, `m = -l..=l`.
    pub fn qlm(&self) -> &[Vec<Complex64>] {
        &self.qlm
    }

    pub fn cluster_ids(&self) -> &[usize] {
        self.result.cluster_ids()
    }

    pub fn num_clusters(&self) -> usize {
        self.result.num_clusters()
    }

    pub fn number_of_connections(&self) -> &[usize] {
        self.result.number_of_connections()
    }

    pub fn number_of_shared_connections(&self) -> &[SharedCount] {
        self.result.shared_counts()
    }

    pub fn bond_scores(&self) -> &[Bond] {
        self.result.bonds()
    }

    pub fn largest_cluster_size(&self) -> usize {
        self.result.largest_cluster_size()
    }

    pub fn cluster_sizes(&self) -> Vec<usize> {
        self.result.cluster_size_histogram()
    }

    pub fn result(&self) -> &ClusterResult {
        &self.result
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use approx::assert_relative_eq;

    fn fcc(cells: usize, a: f64) -> (PeriodicBox, Vec<Vector3<f64>>) {
        let basis = [
            Vector3::new(0.0, 0.0, 0.0),
            Vector3::new(0.5, 0.5, 0.0),
            Vector3::new(0.5, 0.0, 0.5),
            Vector3::new(0.0, 0.5, 0.5),
        ];
        let mut positions = Vec::new();
        for i in 0..cells {
            for j in 0..cells {
                for k in 0..cells {
                    let origin = Vector3::new(i as f64, j as f64, k as f64);
                    for b in &basis {
                        positions.push((origin + b) * a);
                    }
                }
            }
        }
        (PeriodicBox::cube(cells as f64 * a).unwrap(), positions)
    }

    #[test]
    fn test_perfect_crystal_is_one_cluster() {
        let (sim_box, positions) = fcc(4, 1.0);
        let mut sl = SolidLiquid::new(0.8, 0.7, 6, 6).unwrap();
        sl.compute(&sim_box, &positions).unwrap();

        assert_eq!(sl.qlm().len(), positions.len());
        // every site has twelve identical environments at distance a / sqrt(2)
        assert!(sl.number_of_connections().iter().all(|&c| c == 12));
        assert_eq!(sl.num_clusters(), 1);
        assert_eq!(sl.largest_cluster_size(), positions.len());
        assert_eq!(sl.cluster_sizes(), vec![positions.len()]);
        for bond in sl.bond_scores() {
            assert_relative_eq!(bond.score.re, 1.0, epsilon = 1e-9);
        }
    }

    #[test]
    fn test_modes_agree_on_crystal() {
        let (sim_box, positions) = fcc(3, 1.0);
        // nearest neighbors in fcc share four nearest neighbors
        let mut sl = SolidLiquid::new(0.8, 0.5, 3, 6).unwrap();

        sl.compute_shared_neighbors(&sim_box, &positions).unwrap();
        assert_eq!(sl.num_clusters(), 1);
        assert!(!sl.number_of_shared_connections().is_empty());

        sl.compute_no_norm(&sim_box, &positions).unwrap();
        assert_eq!(sl.num_clusters(), 1);
        assert!(sl.number_of_shared_connections().is_empty());
    }

    #[test]
    fn test_dilute_gas_has_no_solid() {
        let sim_box = PeriodicBox::cube(20.0).unwrap();
        let positions: Vec<Vector3<f64>> = (0..8)
            .map(|i| Vector3::new(2.5 * i as f64, 3.0 * i as f64 % 20.0, 1.0))
            .collect();
        let mut sl = SolidLiquid::new(1.5, 0.7, 4, 6).unwrap();
        sl.compute(&sim_box, &positions).unwrap();

        assert_eq!(sl.num_clusters(), positions.len());
        assert_eq!(sl.largest_cluster_size(), 0);
        assert!(sl.cluster_sizes().is_empty());
        assert!(sl.qlm().iter().flatten().all(|c| c.norm() == 0.0));
    }

    #[test]
    fn test_clustering_radius_sets_cutoff() {
        let (sim_box, positions) = fcc(4, 1.0);
        let mut sl = SolidLiquid::new(0.8, 0.7, 6, 6).unwrap();
        assert_eq!(sl.clustering_radius(), 0.8);
        sl.set_clustering_radius(2.5).unwrap();
        let err = sl.compute(&sim_box, &positions).unwrap_err();
        assert!(err.is_config());
        assert!(sl.set_clustering_radius(-1.0).is_err());
        assert_eq!(sl.clustering_radius(), 2.5);
    }

    #[test]
    fn test_empty_snapshot() {
        let sim_box = PeriodicBox::cube(10.0).unwrap();
        let mut sl = SolidLiquid::new(1.5, 0.7, 4, 6).unwrap();
        sl.compute(&sim_box, &[]).unwrap();
        assert_eq!(sl.num_clusters(), 0);
        assert!(sl.cluster_ids().is_empty());
    }

    #[test]
    fn test_construction_errors() {
        assert!(matches!(
            SolidLiquid::new(1.5, 0.7, 4, 5),
            Err(ConfigError::InvalidDegree(5))
        ));
        assert!(SolidLiquid::new(1.5, 0.7, 4, 0).is_err());
        assert!(SolidLiquid::new(0.0, 0.7, 4, 6).is_err());
        assert!(matches!(
            SolidLiquid::new(1.5, -0.1, 4, 6),
            Err(ConfigError::NegativeThreshold { .. })
        ));
    }
}

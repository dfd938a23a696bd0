use crate::error::{ConfigError, Result, check_radius};
use crate::harmonics::{direction_angles, fill_spherical_harmonics};
use crate::periodic::PeriodicBox;
use crate::query::{Neighbor, NeighborQuery};
use crate::reduce::{NeighborKernel, reduce_into};
use crate::search::CellList;
use nalgebra::Vector3;
use num_complex::Complex64;
use tracing::debug;

/// k-fold bond-orientational order in the xy plane:
/// `psi_i = (1/k) * sum_j exp(i k theta_ij)`.
#[derive(Clone, Copy, Debug, PartialEq)]
pub struct HexaticKernel {
    k: u32,
}

impl HexaticKernel {
    pub fn new(k: u32) -> Result<Self, ConfigError> {
        if k == 0 {
            return Err(ConfigError::InvalidCoordination(0.0));
        }
        Ok(Self { k })
    }

    pub fn k(&self) -> u32 {
        self.k
    }
}

impl NeighborKernel for HexaticKernel {
    type Accumulator = Complex64;
    type Output = Complex64;

    fn init(&self) -> Complex64 {
        Complex64::new(0.0, 0.0)
    }

    fn fold(&self, acc: &mut Complex64, neighbor: &Neighbor) {
        let theta = neighbor.delta.y.atan2(neighbor.delta.x);
        *acc += Complex64::from_polar(1.0, self.k as f64 * theta);
    }

    fn finalize(&self, acc: Complex64) -> Complex64 {
        acc / self.k as f64
    }
}

/// Translational order: `(1/k) * sum_j (dx_ij + i dy_ij)`.
#[derive(Clone, Copy, Debug, PartialEq)]
pub struct TranslationalKernel {
    k: f64,
}

impl TranslationalKernel {
    pub fn new(k: f64) -> Result<Self, ConfigError> {
        if !k.is_finite() || k <= 0.0 {
            return Err(ConfigError::InvalidCoordination(k));
        }
        Ok(Self { k })
    }

    pub fn k(&self) -> f64 {
        self.k
    }
}

impl NeighborKernel for TranslationalKernel {
    type Accumulator = Complex64;
    type Output = Complex64;

    fn init(&self) -> Complex64 {
        Complex64::new(0.0, 0.0)
    }

    fn fold(&self, acc: &mut Complex64, neighbor: &Neighbor) {
        *acc += Complex64::new(neighbor.delta.x, neighbor.delta.y);
    }

    fn finalize(&self, acc: Complex64) -> Complex64 {
        acc / self.k
    }
}

/// How summed spherical-harmonic coefficients are scaled.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub enum Normalization {
    /// Divide by the number of neighbors (left at zero without neighbors).
    #[default]
    NeighborCount,
    /// Keep the raw sum.
    None,
}

/// Per-particle `q_lm = sum_j Y_lm(theta_ij, phi_ij)`, m = -l..=l.
#[derive(Clone, Copy, Debug, PartialEq)]
pub struct SphericalHarmonicKernel {
    l: u32,
    normalization: Normalization,
}

impl SphericalHarmonicKernel {
    /// `l` must be even and positive.
    pub fn new(l: u32, normalization: Normalization) -> Result<Self, ConfigError> {
        if l == 0 || l % 2 == 1 {
            return Err(ConfigError::InvalidDegree(l));
        }
        Ok(Self { l, normalization })
    }

    pub fn l(&self) -> u32 {
        self.l
    }

    pub fn num_coefficients(&self) -> usize {
        2 * self.l as usize + 1
    }
}

pub struct QlmAccumulator {
    sum: Vec<Complex64>,
    scratch: Vec<Complex64>,
    count: usize,
}

impl NeighborKernel for SphericalHarmonicKernel {
    type Accumulator = QlmAccumulator;
    type Output = Vec<Complex64>;

    fn init(&self) -> QlmAccumulator {
        let zero = Complex64::new(0.0, 0.0);
        QlmAccumulator {
            sum: vec![zero; self.num_coefficients()],
            scratch: vec![zero; self.num_coefficients()],
            count: 0,
        }
    }

    fn fold(&self, acc: &mut QlmAccumulator, neighbor: &Neighbor) {
        let d = &neighbor.delta;
        let (theta, phi) = direction_angles(d.x, d.y, d.z, neighbor.distance_sq.sqrt());
        fill_spherical_harmonics(self.l, theta, phi, &mut acc.scratch);
        for (s, y) in acc.sum.iter_mut().zip(&acc.scratch) {
            *s += y;
        }
        acc.count += 1;
    }

    fn finalize(&self, acc: QlmAccumulator) -> Vec<Complex64> {
        let mut sum = acc.sum;
        if self.normalization == Normalization::NeighborCount && acc.count > 0 {
            let inv = 1.0 / acc.count as f64;
            for s in &mut sum {
                *s *= inv;
            }
        }
        sum
    }
}

/// Stateful per-particle descriptor computation.
///
/// Every [`OrderParameter::compute`] fully overwrites the stored values; the
/// allocation is reused when the particle count allows it. The cell grid is
/// kept while the box stays the same.
#[derive(Debug)]
pub struct OrderParameter<K: NeighborKernel> {
    kernel: K,
    r_max: f64,
    index: Option<CellList>,
    values: Vec<K::Output>,
}

pub type HexaticOrder = OrderParameter<HexaticKernel>;
pub type TranslationalOrder = OrderParameter<TranslationalKernel>;
pub type LocalQlm = OrderParameter<SphericalHarmonicKernel>;

impl<K: NeighborKernel> OrderParameter<K> {
    pub fn with_kernel(kernel: K, r_max: f64) -> Result<Self, ConfigError> {
        check_radius("r_max", r_max)?;
        Ok(Self {
            kernel,
            r_max,
            index: None,
            values: Vec::new(),
        })
    }

    pub fn compute(
        &mut self,
        sim_box: &PeriodicBox,
        positions: &[Vector3<f64>],
    ) -> Result<&[K::Output]> {
        let mut index = match self.index.take() {
            Some(cl) if cl.matches(sim_box, self.r_max) => cl,
            _ => CellList::for_particles(sim_box, self.r_max, positions.len())?,
        };
        index.rebuild(positions);
        let result = NeighborQuery::new(&index, positions)
            .and_then(|query| reduce_into(&query, self.r_max, &self.kernel, &mut self.values));
        self.index = Some(index);
        result?;
        debug!(n_particles = self.values.len(), "order parameter computed");
        Ok(&self.values)
    }

    pub fn kernel(&self) -> &K {
        &self.kernel
    }

    pub fn r_max(&self) -> f64 {
        self.r_max
    }

    /// Results of the last successful compute.
    pub fn values(&self) -> &[K::Output] {
        &self.values
    }

    pub fn len(&self) -> usize {
        self.values.len()
    }

    pub fn is_empty(&self) -> bool {
        self.values.is_empty()
    }

    /// Box of the last compute, if any.
    pub fn sim_box(&self) -> Option<&PeriodicBox> {
        self.index.as_ref().map(CellList::sim_box)
    }
}

impl OrderParameter<HexaticKernel> {
    pub fn new(r_max: f64, k: u32) -> Result<Self, ConfigError> {
        Self::with_kernel(HexaticKernel::new(k)?, r_max)
    }
}

impl OrderParameter<TranslationalKernel> {
    pub fn new(r_max: f64, k: f64) -> Result<Self, ConfigError> {
        Self::with_kernel(TranslationalKernel::new(k)?, r_max)
    }
}

impl OrderParameter<SphericalHarmonicKernel> {
    pub fn new(r_max: f64, l: u32, normalization: Normalization) -> Result<Self, ConfigError> {
        Self::with_kernel(SphericalHarmonicKernel::new(l, normalization)?, r_max)
    }
}

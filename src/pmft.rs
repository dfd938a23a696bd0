use crate::error::{ConfigError, Result, check_len, check_radius};
use crate::periodic::PeriodicBox;
use crate::query::{COINCIDENT_DISTANCE_SQ, NeighborQuery};
use crate::reduce::histogram_over_references;
use crate::search::CellList;
use nalgebra::Vector3;
use tracing::debug;

/// Pair histogram of 2D particles resolved by relative position and
/// relative orientation, in the reference particle's frame.
///
/// Bins run over `x in [-max_x, max_x)`, `y in [-max_y, max_y)` and
/// `t in [-max_t, max_t)`. Counts accumulate across calls until [`PmftXyt::reset`].
#[derive(Debug)]
pub struct PmftXyt {
    sim_box: PeriodicBox,
    max: [f64; 3],
    width: [f64; 3],
    n_bins: [usize; 3],
    centers: [Vec<f64>; 3],
    counts: Vec<u64>,
    index: Option<CellList>,
}

impl PmftXyt {
    pub fn new(
        sim_box: &PeriodicBox,
        max_x: f64,
        max_y: f64,
        max_t: f64,
        dx: f64,
        dy: f64,
        dt: f64,
    ) -> Result<Self, ConfigError> {
        for (name, value) in [
            ("max_x", max_x),
            ("max_y", max_y),
            ("max_t", max_t),
            ("dx", dx),
            ("dy", dy),
            ("dt", dt),
        ] {
            check_radius(name, value)?;
        }
        for (axis, d, max) in [("x", dx, max_x), ("y", dy, max_y), ("t", dt, max_t)] {
            if d > max {
                return Err(ConfigError::InvalidBinning(format!(
                    "bin width d{axis} = {d} exceeds max_{axis} = {max}"
                )));
            }
        }
        if !sim_box.is_2d() {
            return Err(ConfigError::Inconsistent2D("PMFT XYT requires a 2D box"));
        }
        let widths = sim_box.perpendicular_widths();
        if max_x > 0.5 * widths.x || max_y > 0.5 * widths.y {
            return Err(ConfigError::InvalidBinning(format!(
                "max_x = {max_x} and max_y = {max_y} must not exceed half the box ({}, {})",
                0.5 * widths.x,
                0.5 * widths.y
            )));
        }

        let max = [max_x, max_y, max_t];
        let width = [dx, dy, dt];
        let n_bins = [0, 1, 2].map(|a| 2 * (max[a] / width[a]).floor() as usize);
        let centers: [Vec<f64>; 3] = [0, 1, 2].map(|a| {
            (0..n_bins[a])
                .map(|i| -max[a] + (i as f64 + 0.5) * width[a])
                .collect()
        });

        Ok(Self {
            sim_box: sim_box.clone(),
            max,
            width,
            n_bins,
            counts: vec![0; n_bins[0] * n_bins[1] * n_bins[2]],
            centers,
            index: None,
        })
    }

    pub fn sim_box(&self) -> &PeriodicBox {
        &self.sim_box
    }

    /// Bin counts along x, y and t.
    pub fn n_bins(&self) -> [usize; 3] {
        self.n_bins
    }

    pub fn x_centers(&self) -> &[f64] {
        &self.centers[0]
    }

    pub fn y_centers(&self) -> &[f64] {
        &self.centers[1]
    }

    pub fn t_centers(&self) -> &[f64] {
        &self.centers[2]
    }

    /// Flat counts, laid out as `(ix * ny + iy) * nt + it`.
    pub fn counts(&self) -> &[u64] {
        &self.counts
    }

    pub fn count(&self, ix: usize, iy: usize, it: usize) -> u64 {
        self.counts[self.flat_bin(ix, iy, it)]
    }

    pub fn total_count(&self) -> u64 {
        self.counts.iter().sum()
    }

    pub fn reset(&mut self) {
        self.counts.fill(0);
    }

    /// Radius enclosing the whole xy window.
    pub fn r_max(&self) -> f64 {
        self.max[0].hypot(self.max[1])
    }

    fn flat_bin(&self, ix: usize, iy: usize, it: usize) -> usize {
        (ix * self.n_bins[1] + iy) * self.n_bins[2] + it
    }

    fn uses_cells(&self) -> bool {
        self.r_max() < self.sim_box.min_width() / 3.0
    }

    /// Adds every (reference, point) pair falling inside the window.
    ///
    /// Orientations are angles in the xy plane. Coincident pairs are skipped.
    pub fn accumulate(
        &mut self,
        ref_points: &[Vector3<f64>],
        ref_orientations: &[f64],
        points: &[Vector3<f64>],
        orientations: &[f64],
    ) -> Result<()> {
        check_len("reference orientations", ref_points.len(), ref_orientations.len())?;
        check_len("orientations", points.len(), orientations.len())?;

        let n_total = self.counts.len();
        let bins = if self.uses_cells() {
            let r_max = self.r_max();
            let mut index = match self.index.take() {
                Some(cl) => cl,
                None => CellList::for_particles(&self.sim_box, r_max, points.len())?,
            };
            index.rebuild(points);
            let query = NeighborQuery::new(&index, points);
            let bins = query.map(|query| {
                histogram_over_references(ref_points.len(), n_total, |i, local| {
                    query.for_each_neighbor_of_point_unchecked(&ref_points[i], r_max, |nb| {
                        self.bin_pair(&nb.delta, ref_orientations[i], orientations[nb.index], local);
                    });
                })
            });
            self.index = Some(index);
            bins?
        } else {
            histogram_over_references(ref_points.len(), n_total, |i, local| {
                for (j, point) in points.iter().enumerate() {
                    let delta = self.sim_box.wrap(&(point - ref_points[i]));
                    if delta.norm_squared() > COINCIDENT_DISTANCE_SQ {
                        self.bin_pair(&delta, ref_orientations[i], orientations[j], local);
                    }
                }
            })
        };

        for (total, count) in self.counts.iter_mut().zip(bins) {
            *total += count;
        }
        debug!(
            n_refs = ref_points.len(),
            n_points = points.len(),
            cells = self.uses_cells(),
            "pmft accumulated"
        );
        Ok(())
    }

    fn bin_pair(&self, delta: &Vector3<f64>, ref_angle: f64, angle: f64, local: &mut [u64]) {
        let (sin, cos) = (-ref_angle).sin_cos();
        let x = cos * delta.x - sin * delta.y + self.max[0];
        let y = sin * delta.x + cos * delta.y + self.max[1];
        let t = delta.y.atan2(delta.x) - ref_angle + (-delta.y).atan2(-delta.x) - angle + self.max[2];

        let mut bin = [0usize; 3];
        for (axis, value) in [x, y, t].into_iter().enumerate() {
            let b = (value / self.width[axis]).floor();
            if b < 0.0 || b >= self.n_bins[axis] as f64 {
                return;
            }
            bin[axis] = b as usize;
        }
        local[self.flat_bin(bin[0], bin[1], bin[2])] += 1;
    }
}

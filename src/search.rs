use crate::error::{ConfigError, check_radius};
use crate::periodic::PeriodicBox;
use nalgebra::Vector3;
use rayon::prelude::*;
use tracing::{debug, info_span};

/// Upper bound on grid cells for a list laid out without a particle count.
pub const MAX_CELLS: usize = 1 << 18;

/// Smallest cell budget granted by [`CellList::for_particles`].
const MIN_CELL_BUDGET: usize = 64;

/// Cell list over one particle snapshot.
///
/// Cell geometry and the neighbor-cell table depend only on the box and the
/// cutoff; they are computed once in [`CellList::new`] and kept across
/// [`CellList::rebuild`] calls.
#[derive(Clone, Debug)]
pub struct CellList {
    sim_box: PeriodicBox,
    cutoff: f64,
    num_bins: Vector3<usize>,
    /// Maps linear bin index (bx + nx*(by + ny*bz)) to Morton rank
    bin_ranks: Vec<usize>,
    /// neighbor_cells[neighbor_starts[c]..neighbor_starts[c + 1]] = sorted
    /// linear indices of cells adjacent to cell c, c included
    neighbor_starts: Vec<usize>,
    neighbor_cells: Vec<usize>,
    /// particles[slot] = original_idx, grouped by cell rank
    particles: Vec<usize>,
    /// cell_starts[bin_rank] = start slot in particles
    cell_starts: Vec<usize>,
}

impl CellList {
    /// Lays out the cell grid for `sim_box` and `cutoff` with no particles.
    ///
    /// Fails if the cutoff exceeds half of the smallest box width, since a
    /// neighbor search would then need to wrap more than once. At most
    /// [`MAX_CELLS`] cells are laid out.
    pub fn new(sim_box: &PeriodicBox, cutoff: f64) -> Result<Self, ConfigError> {
        Self::with_cell_limit(sim_box, cutoff, MAX_CELLS)
    }

    /// Like [`CellList::new`], with a cell budget sized for `n_particles`.
    pub fn for_particles(
        sim_box: &PeriodicBox,
        cutoff: f64,
        n_particles: usize,
    ) -> Result<Self, ConfigError> {
        Self::with_cell_limit(sim_box, cutoff, n_particles.clamp(MIN_CELL_BUDGET, MAX_CELLS))
    }

    /// Lays out at most `max_cells` cells. Cells wider than the cutoff only
    /// cost extra distance checks.
    pub fn with_cell_limit(
        sim_box: &PeriodicBox,
        cutoff: f64,
        max_cells: usize,
    ) -> Result<Self, ConfigError> {
        check_radius("cutoff", cutoff)?;
        let max = 0.5 * sim_box.min_width();
        if cutoff > max {
            return Err(ConfigError::CutoffTooLarge { cutoff, max });
        }

        let _span = info_span!("CellList::new", cutoff).entered();
        let perp_widths = sim_box.perpendicular_widths();
        let nx = (perp_widths.x / cutoff).floor() as usize;
        let ny = (perp_widths.y / cutoff).floor() as usize;
        let nz = if sim_box.is_2d() {
            1
        } else {
            (perp_widths.z / cutoff).floor() as usize
        };
        let num_bins = limit_bins(
            Vector3::new(nx.max(1), ny.max(1), nz.max(1)),
            max_cells.max(1),
        );
        let total_bins = num_bins.x * num_bins.y * num_bins.z;

        let mut bin_ranks = vec![0; total_bins];
        let mut bin_morton: Vec<(u64, usize)> = (0..total_bins)
            .map(|i| {
                let (bx, by, bz) = unravel(i, &num_bins);
                (
                    interleave_3(bx as u64)
                        | (interleave_3(by as u64) << 1)
                        | (interleave_3(bz as u64) << 2),
                    i,
                )
            })
            .collect();
        bin_morton.sort_unstable_by_key(|&(z, _)| z);
        for (rank, &(_z, linear_idx)) in bin_morton.iter().enumerate() {
            bin_ranks[linear_idx] = rank;
        }

        let n_search = Vector3::new(
            (cutoff * num_bins.x as f64 / perp_widths.x).ceil() as i32,
            (cutoff * num_bins.y as f64 / perp_widths.y).ceil() as i32,
            if sim_box.is_2d() {
                0
            } else {
                (cutoff * num_bins.z as f64 / perp_widths.z).ceil() as i32
            },
        );

        let mut neighbor_starts = Vec::with_capacity(total_bins + 1);
        let mut neighbor_cells = Vec::new();
        let mut scratch = Vec::new();
        for i in 0..total_bins {
            neighbor_starts.push(neighbor_cells.len());
            neighbor_bins(i, &num_bins, &n_search, &mut scratch);
            neighbor_cells.extend_from_slice(&scratch);
        }
        neighbor_starts.push(neighbor_cells.len());

        debug!(
            nx = num_bins.x,
            ny = num_bins.y,
            nz = num_bins.z,
            table_len = neighbor_cells.len(),
            "cell grid laid out"
        );

        Ok(Self {
            sim_box: sim_box.clone(),
            cutoff,
            num_bins,
            bin_ranks,
            neighbor_starts,
            neighbor_cells,
            particles: Vec::new(),
            cell_starts: vec![0; total_bins + 1],
        })
    }

    /// Lays out the grid and assigns `positions` to cells.
    pub fn build(
        sim_box: &PeriodicBox,
        positions: &[Vector3<f64>],
        cutoff: f64,
    ) -> Result<Self, ConfigError> {
        let mut cl = Self::for_particles(sim_box, cutoff, positions.len())?;
        cl.rebuild(positions);
        Ok(cl)
    }

    /// Whether this grid was laid out for exactly `sim_box` and `cutoff`.
    pub fn matches(&self, sim_box: &PeriodicBox, cutoff: f64) -> bool {
        self.cutoff == cutoff && &self.sim_box == sim_box
    }

    /// Reassigns every particle to its cell. Previous assignments are dropped.
    pub fn rebuild(&mut self, positions: &[Vector3<f64>]) {
        let _span = info_span!("CellList::rebuild", n_particles = positions.len()).entered();
        let total_bins = self.bin_ranks.len();

        let ranks: Vec<usize> = positions
            .par_iter()
            .map(|pos| self.bin_ranks[self.cell_of(pos)])
            .collect();

        let mut counts = vec![0; total_bins];
        for &rank in &ranks {
            counts[rank] += 1;
        }

        self.cell_starts.clear();
        self.cell_starts.resize(total_bins + 1, 0);
        let mut accum = 0;
        for (rank, &count) in counts.iter().enumerate() {
            self.cell_starts[rank] = accum;
            accum += count;
        }
        self.cell_starts[total_bins] = accum;

        // Filling in index order keeps each cell's particles ascending.
        self.particles.clear();
        self.particles.resize(positions.len(), 0);
        let mut current_fill = self.cell_starts.clone();
        for (original_idx, &rank) in ranks.iter().enumerate() {
            self.particles[current_fill[rank]] = original_idx;
            current_fill[rank] += 1;
        }
    }

    pub fn sim_box(&self) -> &PeriodicBox {
        &self.sim_box
    }

    pub fn cutoff(&self) -> f64 {
        self.cutoff
    }

    pub fn cell_dims(&self) -> Vector3<usize> {
        self.num_bins
    }

    pub fn num_cells(&self) -> usize {
        self.bin_ranks.len()
    }

    /// Number of particles assigned by the last rebuild.
    pub fn len(&self) -> usize {
        self.particles.len()
    }

    pub fn is_empty(&self) -> bool {
        self.particles.is_empty()
    }

    /// Linear cell index of a bin coordinate.
    pub fn cell_id(&self, bx: usize, by: usize, bz: usize) -> usize {
        bx + self.num_bins.x * (by + self.num_bins.y * bz)
    }

    /// Linear cell index containing `pos`, after folding it into the box.
    pub fn cell_of(&self, pos: &Vector3<f64>) -> usize {
        let frac = self.sim_box.unit_fractional(pos);
        let bx = ((frac.x * self.num_bins.x as f64) as usize).min(self.num_bins.x - 1);
        let by = ((frac.y * self.num_bins.y as f64) as usize).min(self.num_bins.y - 1);
        let bz = ((frac.z * self.num_bins.z as f64) as usize).min(self.num_bins.z - 1);
        self.cell_id(bx, by, bz)
    }

    /// Adjacent cells of `cell`, including itself, with periodic wrap-around.
    pub fn neighbor_cells(&self, cell: usize) -> &[usize] {
        &self.neighbor_cells[self.neighbor_starts[cell]..self.neighbor_starts[cell + 1]]
    }

    /// Particles in `cell` as of the last rebuild.
    pub fn particles_in(&self, cell: usize) -> &[usize] {
        if cell >= self.bin_ranks.len() {
            return &[];
        }
        let rank = self.bin_ranks[cell];
        &self.particles[self.cell_starts[rank]..self.cell_starts[rank + 1]]
    }
}

fn unravel(i: usize, num_bins: &Vector3<usize>) -> (usize, usize, usize) {
    let bx = i % num_bins.x;
    let by = (i / num_bins.x) % num_bins.y;
    let bz = i / (num_bins.x * num_bins.y);
    (bx, by, bz)
}

/// Shrinks the grid uniformly until it holds at most `max_cells` cells.
fn limit_bins(num_bins: Vector3<usize>, max_cells: usize) -> Vector3<usize> {
    let total = num_bins.x * num_bins.y * num_bins.z;
    if total <= max_cells {
        return num_bins;
    }
    let dims = num_bins.iter().filter(|&&n| n > 1).count().max(1);
    let scale = (max_cells as f64 / total as f64).powf(1.0 / dims as f64);
    let mut bins = num_bins.map(|n| ((n as f64 * scale).floor() as usize).max(1));
    // Floating-point rounding can leave the product above the budget.
    while bins.x * bins.y * bins.z > max_cells {
        let axis = (0..3).max_by_key(|&a| bins[a]).unwrap_or(0);
        bins[axis] -= 1;
    }
    bins
}

fn neighbor_bins(
    i: usize,
    num_bins: &Vector3<usize>,
    n_search: &Vector3<i32>,
    out: &mut Vec<usize>,
) {
    let (bx, by, bz) = unravel(i, num_bins);
    out.clear();
    for dx in -n_search.x..=n_search.x {
        for dy in -n_search.y..=n_search.y {
            for dz in -n_search.z..=n_search.z {
                let nbx = wrap_bin(bx as i32 + dx, num_bins.x as i32);
                let nby = wrap_bin(by as i32 + dy, num_bins.y as i32);
                let nbz = wrap_bin(bz as i32 + dz, num_bins.z as i32);
                out.push(nbx + num_bins.x * (nby + num_bins.y * nbz));
            }
        }
    }
    // Axes with fewer than three cells reach the same cell more than once.
    out.sort_unstable();
    out.dedup();
}

fn wrap_bin(val: i32, max: i32) -> usize {
    val.rem_euclid(max) as usize
}

fn interleave_3(mut x: u64) -> u64 {
    x &= 0x1fffff;
    x = (x | x << 32) & 0x1f00000000ffffu64;
    x = (x | x << 16) & 0x1f0000ff0000ffu64;
    x = (x | x << 8) & 0x100f00f00f00f00fu64;
    x = (x | x << 4) & 0x10c30c30c30c30c3u64;
    x = (x | x << 2) & 0x1249249249249249u64;
    x
}

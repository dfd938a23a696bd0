use crate::error::{ConfigError, Result, check_len, check_radius};
use crate::periodic::PeriodicBox;
use crate::search::CellList;
use nalgebra::Vector3;

/// Squared separations at or below this are treated as coincident points and skipped.
pub const COINCIDENT_DISTANCE_SQ: f64 = 1e-6;

/// One neighbor of a reference point.
#[derive(Clone, Copy, Debug, PartialEq)]
pub struct Neighbor {
    pub index: usize,
    /// Minimum-image displacement from the reference point to the neighbor.
    pub delta: Vector3<f64>,
    pub distance_sq: f64,
}

/// Read-only view pairing a cell list with the snapshot it was built from.
#[derive(Clone, Copy, Debug)]
pub struct NeighborQuery<'a> {
    index: &'a CellList,
    positions: &'a [Vector3<f64>],
}

impl<'a> NeighborQuery<'a> {
    pub fn new(index: &'a CellList, positions: &'a [Vector3<f64>]) -> Result<Self> {
        check_len("positions", index.len(), positions.len())?;
        Ok(Self { index, positions })
    }

    pub fn index(&self) -> &'a CellList {
        self.index
    }

    pub fn sim_box(&self) -> &'a PeriodicBox {
        self.index.sim_box()
    }

    pub fn positions(&self) -> &'a [Vector3<f64>] {
        self.positions
    }

    pub fn len(&self) -> usize {
        self.positions.len()
    }

    pub fn is_empty(&self) -> bool {
        self.positions.is_empty()
    }

    /// Rejects radii the cell grid cannot serve without missing pairs.
    pub fn check_radius(&self, radius: f64) -> Result<(), ConfigError> {
        check_radius("query radius", radius)?;
        if radius > self.index.cutoff() {
            return Err(ConfigError::QueryRadiusTooLarge {
                radius,
                cutoff: self.index.cutoff(),
            });
        }
        Ok(())
    }

    /// Visits every indexed particle other than `i` within `radius` of particle `i`.
    ///
    /// Fails with [`ConfigError::QueryRadiusTooLarge`] when `radius` exceeds the
    /// index cutoff.
    pub fn for_each_neighbor<F>(&self, i: usize, radius: f64, visit: F) -> Result<(), ConfigError>
    where
        F: FnMut(Neighbor),
    {
        self.check_radius(radius)?;
        self.for_each_neighbor_unchecked(i, radius, visit);
        Ok(())
    }

    /// Visits every indexed particle within `radius` of an arbitrary point.
    pub fn for_each_neighbor_of_point<F>(
        &self,
        point: &Vector3<f64>,
        radius: f64,
        visit: F,
    ) -> Result<(), ConfigError>
    where
        F: FnMut(Neighbor),
    {
        self.check_radius(radius)?;
        self.for_each_neighbor_of_point_unchecked(point, radius, visit);
        Ok(())
    }

    /// Lazy form of [`NeighborQuery::for_each_neighbor`].
    pub fn neighbors(&self, i: usize, radius: f64) -> Result<Neighbors<'a>, ConfigError> {
        self.check_radius(radius)?;
        let origin = self.positions[i];
        let cells = self.index.neighbor_cells(self.index.cell_of(&origin));
        Ok(Neighbors {
            query: *self,
            origin,
            exclude: Some(i),
            radius_sq: radius * radius,
            cells,
            cell_pos: 0,
            members: &[],
        })
    }

    /// Per-particle loop for callers that ran [`NeighborQuery::check_radius`] up front.
    pub(crate) fn for_each_neighbor_unchecked<F>(&self, i: usize, radius: f64, visit: F)
    where
        F: FnMut(Neighbor),
    {
        self.visit_point(&self.positions[i], Some(i), radius, visit);
    }

    pub(crate) fn for_each_neighbor_of_point_unchecked<F>(
        &self,
        point: &Vector3<f64>,
        radius: f64,
        visit: F,
    ) where
        F: FnMut(Neighbor),
    {
        self.visit_point(point, None, radius, visit);
    }

    fn visit_point<F>(
        &self,
        point: &Vector3<f64>,
        exclude: Option<usize>,
        radius: f64,
        mut visit: F,
    ) where
        F: FnMut(Neighbor),
    {
        let radius_sq = radius * radius;
        let sim_box = self.index.sim_box();
        for &cell in self.index.neighbor_cells(self.index.cell_of(point)) {
            for &j in self.index.particles_in(cell) {
                if exclude == Some(j) {
                    continue;
                }
                let delta = sim_box.wrap(&(self.positions[j] - point));
                let distance_sq = delta.norm_squared();
                if distance_sq < radius_sq && distance_sq > COINCIDENT_DISTANCE_SQ {
                    visit(Neighbor {
                        index: j,
                        delta,
                        distance_sq,
                    });
                }
            }
        }
    }
}

/// Iterator over the neighbors of one particle, walking cells on demand.
pub struct Neighbors<'a> {
    query: NeighborQuery<'a>,
    origin: Vector3<f64>,
    exclude: Option<usize>,
    radius_sq: f64,
    cells: &'a [usize],
    cell_pos: usize,
    members: &'a [usize],
}

impl Iterator for Neighbors<'_> {
    type Item = Neighbor;

    fn next(&mut self) -> Option<Neighbor> {
        loop {
            while let Some((&j, rest)) = self.members.split_first() {
                self.members = rest;
                if self.exclude == Some(j) {
                    continue;
                }
                let delta = self
                    .query
                    .sim_box()
                    .wrap(&(self.query.positions[j] - self.origin));
                let distance_sq = delta.norm_squared();
                if distance_sq < self.radius_sq && distance_sq > COINCIDENT_DISTANCE_SQ {
                    return Some(Neighbor {
                        index: j,
                        delta,
                        distance_sq,
                    });
                }
            }
            let &cell = self.cells.get(self.cell_pos)?;
            self.cell_pos += 1;
            self.members = self.query.index.particles_in(cell);
        }
    }
}

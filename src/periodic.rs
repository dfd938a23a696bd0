use crate::error::ConfigError;
use nalgebra::{Matrix3, Vector3};

/// Periodic simulation box, possibly triclinic, in two or three dimensions.
///
/// Lattice vectors are the columns of `h`:
/// `a1 = (Lx, 0, 0)`, `a2 = (xy*Ly, Ly, 0)`, `a3 = (xz*Lz, yz*Lz, Lz)`.
/// A 2D box is periodic in x and y only and never couples to z.
#[derive(Clone, Debug, PartialEq)]
pub struct PeriodicBox {
    h: Matrix3<f64>,
    h_inv: Matrix3<f64>,
    is_2d: bool,
}

impl PeriodicBox {
    pub fn cube(l: f64) -> Result<Self, ConfigError> {
        Self::orthorhombic(l, l, l)
    }

    pub fn orthorhombic(lx: f64, ly: f64, lz: f64) -> Result<Self, ConfigError> {
        Self::triclinic(lx, ly, lz, 0.0, 0.0, 0.0)
    }

    /// Two-dimensional rectangular box in the xy plane.
    pub fn square(lx: f64, ly: f64) -> Result<Self, ConfigError> {
        check_length("Lx", lx)?;
        check_length("Ly", ly)?;
        let h = Matrix3::new(lx, 0.0, 0.0, 0.0, ly, 0.0, 0.0, 0.0, 1.0);
        Self::from_matrix(h, true)
    }

    pub fn triclinic(
        lx: f64,
        ly: f64,
        lz: f64,
        xy: f64,
        xz: f64,
        yz: f64,
    ) -> Result<Self, ConfigError> {
        check_length("Lx", lx)?;
        check_length("Ly", ly)?;
        check_length("Lz", lz)?;
        let h = Matrix3::new(lx, xy * ly, xz * lz, 0.0, ly, yz * lz, 0.0, 0.0, lz);
        Self::from_matrix(h, false)
    }

    /// Builds a box from a column-major lattice matrix.
    ///
    /// A 2D box must not couple the third axis to x or y.
    pub fn from_matrix(h: Matrix3<f64>, is_2d: bool) -> Result<Self, ConfigError> {
        if is_2d
            && (h[(0, 2)] != 0.0 || h[(1, 2)] != 0.0 || h[(2, 0)] != 0.0 || h[(2, 1)] != 0.0)
        {
            return Err(ConfigError::Inconsistent2D(
                "third lattice vector must be orthogonal to the xy plane",
            ));
        }
        let widths = [("Lx", h[(0, 0)]), ("Ly", h[(1, 1)]), ("Lz", h[(2, 2)])];
        for (axis, value) in widths {
            check_length(axis, value)?;
        }
        let h_inv = h.try_inverse().ok_or(ConfigError::NotInvertible)?;
        Ok(Self { h, h_inv, is_2d })
    }

    pub fn h(&self) -> &Matrix3<f64> {
        &self.h
    }

    pub fn h_inv(&self) -> &Matrix3<f64> {
        &self.h_inv
    }

    pub fn is_2d(&self) -> bool {
        self.is_2d
    }

    /// Edge lengths `(Lx, Ly, Lz)`. `Lz` is meaningless for a 2D box.
    pub fn lengths(&self) -> Vector3<f64> {
        Vector3::new(self.h[(0, 0)], self.h[(1, 1)], self.h[(2, 2)])
    }

    pub fn to_fractional(&self, cart: &Vector3<f64>) -> Vector3<f64> {
        self.h_inv * cart
    }

    pub fn to_cartesian(&self, frac: &Vector3<f64>) -> Vector3<f64> {
        self.h * frac
    }

    /// Returns the perpendicular widths of the box (distances between parallel faces).
    /// d_i = 1 / |h_inv.row(i)|
    pub fn perpendicular_widths(&self) -> Vector3<f64> {
        Vector3::new(
            1.0 / self.h_inv.row(0).norm(),
            1.0 / self.h_inv.row(1).norm(),
            1.0 / self.h_inv.row(2).norm(),
        )
    }

    /// Smallest perpendicular width over the periodic axes.
    pub fn min_width(&self) -> f64 {
        let w = self.perpendicular_widths();
        if self.is_2d {
            w.x.min(w.y)
        } else {
            w.x.min(w.y).min(w.z)
        }
    }

    /// Minimum-image displacement equivalent to `delta`.
    ///
    /// For 2D boxes the z component of the result is always zero.
    pub fn wrap(&self, delta: &Vector3<f64>) -> Vector3<f64> {
        let mut frac = self.to_fractional(delta);
        frac.x -= frac.x.round();
        frac.y -= frac.y.round();
        if self.is_2d {
            frac.z = 0.0;
        } else {
            frac.z -= frac.z.round();
        }
        self.to_cartesian(&frac)
    }

    /// Image of `pos` inside the primary cell, fractional coordinates in [0, 1).
    pub fn wrap_into_box(&self, pos: &Vector3<f64>) -> Vector3<f64> {
        let mut frac = self.to_fractional(pos);
        frac.x -= frac.x.floor();
        frac.y -= frac.y.floor();
        if !self.is_2d {
            frac.z -= frac.z.floor();
        }
        self.to_cartesian(&frac)
    }

    /// Fractional coordinates of `pos` folded into [0, 1) along periodic axes.
    /// The z coordinate of a 2D box is pinned to zero.
    pub(crate) fn unit_fractional(&self, pos: &Vector3<f64>) -> Vector3<f64> {
        let mut frac = self.to_fractional(pos);
        frac.x -= frac.x.floor();
        frac.y -= frac.y.floor();
        if self.is_2d {
            frac.z = 0.0;
        } else {
            frac.z -= frac.z.floor();
        }
        frac
    }
}

fn check_length(axis: &'static str, value: f64) -> Result<(), ConfigError> {
    if !value.is_finite() || value <= 0.0 {
        return Err(ConfigError::NonPositiveDimension { axis, value });
    }
    Ok(())
}

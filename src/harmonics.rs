//! Orthonormal complex spherical harmonics.
//!
//! Convention: `theta` is the polar angle in [0, π], `phi` the azimuth, the
//! Condon–Shortley phase is included, and `Y_l,-m = (-1)^m conj(Y_lm)`.

use crate::error::{Result, check_len};
use num_complex::Complex64;
use std::f64::consts::PI;

/// Fills `out[m + l]` with `Y_lm(theta, phi)` for `m = -l..=l`.
///
/// Uses the fully normalized associated-Legendre recurrence, which stays
/// stable for the degrees used in bond-order analysis. `out` must hold
/// exactly `2l + 1` coefficients.
pub fn spherical_harmonics(l: u32, theta: f64, phi: f64, out: &mut [Complex64]) -> Result<()> {
    check_len("harmonic coefficients", 2 * l as usize + 1, out.len())?;
    fill_spherical_harmonics(l, theta, phi, out);
    Ok(())
}

/// [`spherical_harmonics`] for buffers already sized `2l + 1`.
pub(crate) fn fill_spherical_harmonics(l: u32, theta: f64, phi: f64, out: &mut [Complex64]) {
    let l = l as usize;

    let x = theta.cos();
    let s = theta.sin();

    // P̄_m^m, carried from one m to the next.
    let mut pmm = (1.0 / (4.0 * PI)).sqrt();
    for m in 0..=l {
        if m > 0 {
            let mf = m as f64;
            pmm *= -((2.0 * mf + 1.0) / (2.0 * mf)).sqrt() * s;
        }
        let plm = legendre_up_to(l, m, x, pmm);
        let y = Complex64::from_polar(plm, m as f64 * phi);
        out[l + m] = y;
        if m > 0 {
            let sign = if m % 2 == 0 { 1.0 } else { -1.0 };
            out[l - m] = y.conj() * sign;
        }
    }
}

/// Raises P̄_m^m to P̄_l^m at fixed order `m`.
fn legendre_up_to(l: usize, m: usize, x: f64, pmm: f64) -> f64 {
    if l == m {
        return pmm;
    }
    let mf = m as f64;
    let mut prev = pmm;
    let mut cur = (2.0 * mf + 3.0).sqrt() * x * pmm;
    for ll in (m + 2)..=l {
        let lf = ll as f64;
        let a = ((4.0 * lf * lf - 1.0) / (lf * lf - mf * mf)).sqrt();
        let b = (((lf - 1.0) * (lf - 1.0) - mf * mf) / (4.0 * (lf - 1.0) * (lf - 1.0) - 1.0)).sqrt();
        let next = a * (x * cur - b * prev);
        prev = cur;
        cur = next;
    }
    cur
}

/// Polar and azimuthal angles of a displacement. `r` must be nonzero.
pub fn direction_angles(dx: f64, dy: f64, dz: f64, r: f64) -> (f64, f64) {
    let theta = (dz / r).clamp(-1.0, 1.0).acos();
    let phi = dy.atan2(dx);
    (theta, phi)
}

#[cfg(test)]
mod tests {
    use super::*;
    use approx::assert_relative_eq;

    fn ylm(l: u32, theta: f64, phi: f64) -> Vec<Complex64> {
        let mut out = vec![Complex64::new(0.0, 0.0); 2 * l as usize + 1];
        spherical_harmonics(l, theta, phi, &mut out).unwrap();
        out
    }

    #[test]
    fn test_degree_zero() {
        let y = ylm(0, 0.7, 1.3);
        assert_relative_eq!(y[0].re, 0.5 / PI.sqrt(), epsilon = 1e-14);
        assert_relative_eq!(y[0].im, 0.0);
    }

    #[test]
    fn test_degree_one() {
        let (theta, phi) = (0.9, -0.4);
        let y = ylm(1, theta, phi);
        assert_relative_eq!(y[1].re, (3.0 / (4.0 * PI)).sqrt() * theta.cos(), epsilon = 1e-14);
        let y11 = Complex64::from_polar(-(3.0 / (8.0 * PI)).sqrt() * theta.sin(), phi);
        assert_relative_eq!(y[2].re, y11.re, epsilon = 1e-14);
        assert_relative_eq!(y[2].im, y11.im, epsilon = 1e-14);
        // Y_1,-1 = -conj(Y_11)
        assert_relative_eq!(y[0].re, -y11.re, epsilon = 1e-14);
        assert_relative_eq!(y[0].im, y11.im, epsilon = 1e-14);
    }

    #[test]
    fn test_degree_six_closed_form() {
        let (theta, phi) = (1.1, 2.3);
        let y = ylm(6, theta, phi);
        let x = theta.cos();
        let y60 = (13.0 / PI).sqrt() / 32.0
            * (231.0 * x.powi(6) - 315.0 * x.powi(4) + 105.0 * x.powi(2) - 5.0);
        assert_relative_eq!(y[6].re, y60, epsilon = 1e-12);

        let y66 = Complex64::from_polar((3003.0 / PI).sqrt() / 64.0 * theta.sin().powi(6), 6.0 * phi);
        assert_relative_eq!(y[12].re, y66.re, epsilon = 1e-12);
        assert_relative_eq!(y[12].im, y66.im, epsilon = 1e-12);

        let y63 = Complex64::from_polar(
            -(1365.0 / PI).sqrt() / 32.0 * theta.sin().powi(3) * (11.0 * x.powi(3) - 3.0 * x),
            3.0 * phi,
        );
        assert_relative_eq!(y[9].re, y63.re, epsilon = 1e-12);
        assert_relative_eq!(y[9].im, y63.im, epsilon = 1e-12);
    }

    #[test]
    fn test_addition_theorem() {
        // Σ_m |Y_lm|² = (2l+1) / 4π for every direction.
        for l in [2u32, 4, 6, 8, 12] {
            for &(theta, phi) in &[(0.0, 0.0), (0.3, 1.0), (1.57, -2.0), (3.0, 0.5)] {
                let sum: f64 = ylm(l, theta, phi).iter().map(|c| c.norm_sqr()).sum();
                assert_relative_eq!(sum, (2 * l + 1) as f64 / (4.0 * PI), epsilon = 1e-10);
            }
        }
    }

    #[test]
    fn test_direction_angles() {
        let (theta, phi) = direction_angles(0.0, 1.0, 0.0, 1.0);
        assert_relative_eq!(theta, PI / 2.0);
        assert_relative_eq!(phi, PI / 2.0);
        let (theta, _) = direction_angles(0.0, 0.0, -2.0, 2.0);
        assert_relative_eq!(theta, PI);
    }

    #[test]
    fn test_wrong_buffer_length() {
        let mut out = vec![Complex64::new(0.0, 0.0); 12];
        let err = spherical_harmonics(6, 0.3, 0.1, &mut out).unwrap_err();
        assert!(matches!(
            err,
            crate::error::Error::SizeMismatch {
                expected: 13,
                got: 12,
                ..
            }
        ));
        assert!(out.iter().all(|c| c.norm() == 0.0));
    }
}

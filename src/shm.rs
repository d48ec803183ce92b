//! Real symmetric spherical harmonics
//!
//! Fiber ODFs from constrained spherical deconvolution are stored as
//! coefficients of the real, antipodally symmetric SH basis of Descoteaux
//! et al. (2007). Only even orders appear, so an order-`L` fit has
//! `(L+1)(L+2)/2` coefficients per voxel.
//!
//! Reference:
//! Descoteaux, M., Angelino, E., Fitzgibbons, S., Deriche, R. (2007).
//! "Regularized, fast, and robust analytical Q-ball imaging."
//! Magnetic Resonance in Medicine, 58(3):497-510.

use std::f64::consts::PI;

use crate::error::{Result, TrackingError};
use crate::sphere::Sphere;

/// Maximum SH order for a symmetric basis with `n_coeffs` coefficients
///
/// Solves `n = (L+1)(L+2)/2` for `L`; `L` must be a non-negative even integer.
pub fn calculate_max_order(n_coeffs: usize) -> Result<usize> {
    let l = (-3.0 + (1.0 + 8.0 * n_coeffs as f64).sqrt()) / 2.0;
    let rounded = l.round();
    if n_coeffs == 0 || (l - rounded).abs() > 1e-9 || rounded < 0.0 {
        return Err(TrackingError::InvalidShOrder(n_coeffs));
    }
    let order = rounded as usize;
    if order % 2 != 0 {
        return Err(TrackingError::InvalidShOrder(n_coeffs));
    }
    Ok(order)
}

/// Number of coefficients of the symmetric basis up to `order`
pub fn n_coeffs(order: usize) -> usize {
    (order + 1) * (order + 2) / 2
}

/// `(m, n)` pairs in basis order: even `n` ascending, `m` from `-n` to `n`
pub fn sph_harm_ind_list(order: usize) -> Vec<(i32, u32)> {
    let mut out = Vec::with_capacity(n_coeffs(order));
    for n in (0..=order as u32).step_by(2) {
        for m in -(n as i32)..=(n as i32) {
            out.push((m, n));
        }
    }
    out
}

/// Associated Legendre function `P_n^m(x)` for `m >= 0`, Condon-Shortley phase included
pub fn assoc_legendre(m: u32, n: u32, x: f64) -> f64 {
    if m > n {
        return 0.0;
    }
    let somx2 = ((1.0 - x) * (1.0 + x)).max(0.0).sqrt();

    // P_m^m = (-1)^m (2m-1)!! (1-x^2)^(m/2)
    let mut pmm = 1.0;
    let mut fact = 1.0;
    for _ in 0..m {
        pmm *= -fact * somx2;
        fact += 2.0;
    }
    if n == m {
        return pmm;
    }

    let mut pmmp1 = x * (2 * m + 1) as f64 * pmm;
    if n == m + 1 {
        return pmmp1;
    }

    let mut pll = 0.0;
    for l in (m + 2)..=n {
        pll = ((2 * l - 1) as f64 * x * pmmp1 - (l + m - 1) as f64 * pmm) / (l - m) as f64;
        pmm = pmmp1;
        pmmp1 = pll;
    }
    pll
}

/// Real symmetric SH basis function of degree `m`, order `n`
///
/// `theta` is the polar angle from +z, `phi` the azimuth.
pub fn real_sph_harm(m: i32, n: u32, theta: f64, phi: f64) -> f64 {
    let am = m.unsigned_abs();
    if am > n {
        return 0.0;
    }

    // (n - |m|)! / (n + |m|)!
    let mut ratio = 1.0;
    for k in (n - am + 1)..=(n + am) {
        ratio /= k as f64;
    }
    let norm = ((2 * n + 1) as f64 / (4.0 * PI) * ratio).sqrt();
    let p = norm * assoc_legendre(am, n, theta.cos());

    if m > 0 {
        std::f64::consts::SQRT_2 * p * (am as f64 * phi).sin()
    } else if m < 0 {
        std::f64::consts::SQRT_2 * p * (am as f64 * phi).cos()
    } else {
        p
    }
}

/// SH-to-sphere projection matrix, one row per sphere vertex
#[derive(Clone, Debug)]
pub struct ShBasis {
    /// Row-major `n_vertices x n_coeffs`
    pub matrix: Vec<f64>,
    pub n_vertices: usize,
    pub n_coeffs: usize,
    pub order: usize,
}

impl ShBasis {
    /// Evaluate an SH coefficient vector on every vertex
    pub fn sh_to_sf(&self, coeffs: &[f64]) -> Vec<f64> {
        let mut out = vec![0.0; self.n_vertices];
        self.sh_to_sf_into(coeffs, &mut out);
        out
    }

    /// Same as [`ShBasis::sh_to_sf`] writing into a caller buffer
    pub fn sh_to_sf_into(&self, coeffs: &[f64], out: &mut [f64]) {
        debug_assert_eq!(coeffs.len(), self.n_coeffs);
        for (v, o) in out.iter_mut().enumerate().take(self.n_vertices) {
            let row = &self.matrix[v * self.n_coeffs..(v + 1) * self.n_coeffs];
            *o = row.iter().zip(coeffs).map(|(&b, &c)| b * c).sum();
        }
    }
}

/// Build the projection matrix of the symmetric basis up to `order`
pub fn sh_to_sf_matrix(sphere: &Sphere, order: usize) -> ShBasis {
    let ind = sph_harm_ind_list(order);
    let n_c = ind.len();
    let angles = sphere.theta_phi();
    let mut matrix = Vec::with_capacity(angles.len() * n_c);
    for &(theta, phi) in &angles {
        for &(m, n) in &ind {
            matrix.push(real_sph_harm(m, n, theta, phi));
        }
    }
    ShBasis {
        matrix,
        n_vertices: angles.len(),
        n_coeffs: n_c,
        order,
    }
}

//! Probability mass function generators
//!
//! A PMF generator returns, for any point in voxel coordinates, a non-negative
//! weight for each sphere vertex. Direction getters turn that PMF into a
//! propagation direction.

use crate::error::{Result, TrackingError};
use crate::model::ParamsImage;
use crate::shm::{sh_to_sf_matrix, ShBasis};
use crate::sphere::Sphere;
use crate::utils::interpolation::trilinear_features;

/// Source of per-vertex weights at arbitrary voxel-space points
pub trait PmfGen: Send + Sync {
    /// Interpolated PMF at `point`, `None` when the point is outside the volume
    fn get_pmf(&self, point: &[f64; 3]) -> Option<Vec<f64>>;

    /// Sphere the PMF is defined on
    fn sphere(&self) -> &Sphere;
}

/// PMF from a precomputed voxel-major volume (`pmf[voxel * n_vertices + v]`)
pub struct SimplePmfGen {
    pmf: Vec<f64>,
    dims: (usize, usize, usize),
    sphere: Sphere,
}

impl SimplePmfGen {
    pub fn new(pmf: Vec<f64>, dims: (usize, usize, usize), sphere: Sphere) -> Result<Self> {
        let expected = dims.0 * dims.1 * dims.2 * sphere.len();
        if pmf.len() != expected {
            return Err(TrackingError::shape_mismatch(
                "pmf volume",
                &[dims.0, dims.1, dims.2, sphere.len()],
                &[pmf.len()],
            ));
        }
        if pmf.iter().any(|&v| v < 0.0) {
            return Err(TrackingError::NegativePmf);
        }
        Ok(Self { pmf, dims, sphere })
    }
}

impl PmfGen for SimplePmfGen {
    fn get_pmf(&self, point: &[f64; 3]) -> Option<Vec<f64>> {
        let mut out = vec![0.0; self.sphere.len()];
        if trilinear_features(&self.pmf, self.dims, self.sphere.len(), point, &mut out) {
            Some(out)
        } else {
            None
        }
    }

    fn sphere(&self) -> &Sphere {
        &self.sphere
    }
}

/// PMF evaluated on the fly from interpolated SH coefficients
///
/// Negative lobes produced by the SH fit are clipped to zero.
pub struct ShCoeffPmfGen {
    coeffs: Vec<f64>,
    dims: (usize, usize, usize),
    basis: ShBasis,
    sphere: Sphere,
}

impl ShCoeffPmfGen {
    /// Build from a parameter volume holding SH coefficients of even `order`
    pub fn new(params: &ParamsImage, order: usize, sphere: Sphere) -> Result<Self> {
        let basis = sh_to_sf_matrix(&sphere, order);
        if basis.n_coeffs != params.n_features() {
            return Err(TrackingError::shape_mismatch(
                "SH coefficients",
                &[basis.n_coeffs],
                &[params.n_features()],
            ));
        }
        Ok(Self {
            coeffs: params.to_voxel_major(params.n_features()),
            dims: params.spatial_dims(),
            basis,
            sphere,
        })
    }
}

impl PmfGen for ShCoeffPmfGen {
    fn get_pmf(&self, point: &[f64; 3]) -> Option<Vec<f64>> {
        let mut c = vec![0.0; self.basis.n_coeffs];
        if !trilinear_features(&self.coeffs, self.dims, self.basis.n_coeffs, point, &mut c) {
            return None;
        }
        let mut pmf = self.basis.sh_to_sf(&c);
        for v in pmf.iter_mut() {
            if *v < 0.0 {
                *v = 0.0;
            }
        }
        Some(pmf)
    }

    fn sphere(&self) -> &Sphere {
        &self.sphere
    }
}

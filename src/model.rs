//! Model parameter volumes and model-type dispatch
//!
//! A parameter volume is 4D: three spatial axes plus one feature axis. The
//! length of the feature axis decides how the volume is interpreted:
//!
//! - 12 features: diffusion tensor fit (3 eigenvalues + 3x3 eigenvectors)
//! - 27 features: kurtosis tensor fit (tensor part + 15 kurtosis terms);
//!   only the tensor part drives tracking
//! - `(L+1)(L+2)/2` features with even `L`: spherical harmonic fiber ODF

use crate::error::{Result, TrackingError};
use crate::shm::calculate_max_order;

/// In-memory 4D parameter volume
///
/// `data` is Fortran ordered with each feature's 3D volume stored
/// contiguously: index = x + y*nx + z*nx*ny + c*nx*ny*nz.
#[derive(Clone, Debug)]
pub struct ParamsImage {
    pub data: Vec<f64>,
    /// (nx, ny, nz, n_features)
    pub dims: (usize, usize, usize, usize),
    pub voxel_size: (f64, f64, f64),
    /// Voxel to world transform, 4x4 row-major
    pub affine: [f64; 16],
}

impl ParamsImage {
    /// Wrap a volume, checking that the data length matches `dims`
    pub fn new(
        data: Vec<f64>,
        dims: (usize, usize, usize, usize),
        voxel_size: (f64, f64, f64),
        affine: [f64; 16],
    ) -> Result<Self> {
        let (nx, ny, nz, nc) = dims;
        let expected = nx * ny * nz * nc;
        if data.len() != expected {
            return Err(TrackingError::shape_mismatch("parameter volume", &[expected], &[data.len()]));
        }
        Ok(Self { data, dims, voxel_size, affine })
    }

    /// Spatial shape (nx, ny, nz)
    pub fn spatial_dims(&self) -> (usize, usize, usize) {
        (self.dims.0, self.dims.1, self.dims.2)
    }

    pub fn n_voxels(&self) -> usize {
        self.dims.0 * self.dims.1 * self.dims.2
    }

    pub fn n_features(&self) -> usize {
        self.dims.3
    }

    /// Feature vector of one voxel (linear Fortran index)
    pub fn voxel_features(&self, voxel: usize) -> Vec<f64> {
        let n_vox = self.n_voxels();
        (0..self.n_features()).map(|c| self.data[voxel + c * n_vox]).collect()
    }

    /// Re-layout the first `n_keep` features voxel-major: `out[voxel * n_keep + c]`
    pub fn to_voxel_major(&self, n_keep: usize) -> Vec<f64> {
        let n_vox = self.n_voxels();
        let n_keep = n_keep.min(self.n_features());
        let mut out = vec![0.0; n_vox * n_keep];
        for c in 0..n_keep {
            let src = &self.data[c * n_vox..(c + 1) * n_vox];
            for (voxel, &v) in src.iter().enumerate() {
                out[voxel * n_keep + c] = v;
            }
        }
        out
    }
}

/// Biophysical parameterization of a parameter volume
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum ModelKind {
    /// Tensor-derived ODF (12 or 27 features)
    Odf,
    /// Symmetric spherical harmonics of the given even order
    Shm { order: usize },
}

/// Infer the model from the feature count
pub fn detect_model(n_features: usize) -> Result<ModelKind> {
    if n_features == 12 || n_features == 27 {
        return Ok(ModelKind::Odf);
    }
    match calculate_max_order(n_features) {
        Ok(order) => Ok(ModelKind::Shm { order }),
        Err(_) => Err(TrackingError::UnsupportedModel { n_features }),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::utils::affine::IDENTITY;

    #[test]
    fn test_detect_tensor_models() {
        assert_eq!(detect_model(12).unwrap(), ModelKind::Odf);
        assert_eq!(detect_model(27).unwrap(), ModelKind::Odf);
    }

    #[test]
    fn test_detect_shm_models() {
        assert_eq!(detect_model(1).unwrap(), ModelKind::Shm { order: 0 });
        assert_eq!(detect_model(15).unwrap(), ModelKind::Shm { order: 4 });
        assert_eq!(detect_model(45).unwrap(), ModelKind::Shm { order: 8 });
    }

    #[test]
    fn test_detect_unsupported() {
        for n in [2, 3, 5, 10, 13] {
            assert!(
                matches!(detect_model(n), Err(TrackingError::UnsupportedModel { n_features }) if n_features == n),
                "{} features should be unsupported",
                n
            );
        }
    }

    #[test]
    fn test_params_image_shape_check() {
        assert!(ParamsImage::new(vec![0.0; 23], (2, 2, 2, 3), (1.0, 1.0, 1.0), IDENTITY).is_err());
        assert!(ParamsImage::new(vec![0.0; 24], (2, 2, 2, 3), (1.0, 1.0, 1.0), IDENTITY).is_ok());
    }

    #[test]
    fn test_voxel_major_layout() {
        // 2x1x1 volume with 3 features: feature c of voxel v = 10c + v
        let data = vec![0.0, 1.0, 10.0, 11.0, 20.0, 21.0];
        let img = ParamsImage::new(data, (2, 1, 1, 3), (1.0, 1.0, 1.0), IDENTITY).unwrap();
        assert_eq!(img.voxel_features(1), vec![1.0, 11.0, 21.0]);
        assert_eq!(img.to_voxel_major(3), vec![0.0, 10.0, 20.0, 1.0, 11.0, 21.0]);
        assert_eq!(img.to_voxel_major(2), vec![0.0, 10.0, 1.0, 11.0]);
    }
}

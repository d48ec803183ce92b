//! Diffusion tensor ODF
//!
//! The ODF of a Gaussian diffusion tensor D evaluated at unit direction `u`:
//!
//! ```text
//! odf(u) = 1 / (4*pi*sqrt(det D) * (u^T D^-1 u)^(3/2))
//! ```
//!
//! Written in the eigenbasis, `u^T D^-1 u = |p|^2` with
//! `p_j = (u . e_j) / sqrt(lambda_j)`.
//!
//! Parameter layout per voxel: `[l1, l2, l3, E00, E01, E02, E10, ..., E22]`
//! where `E[i][j]` is component `i` of eigenvector `j`.

use std::f64::consts::PI;

use log::debug;

use crate::model::ParamsImage;
use crate::sphere::Sphere;

/// Number of leading features describing the tensor
pub const TENSOR_FEATURES: usize = 12;

/// Tensor ODF on every sphere vertex for one voxel
///
/// Voxels with any non-positive eigenvalue get an all-zero ODF.
pub fn tensor_odf(evals: &[f64; 3], evecs: &[f64; 9], sphere: &Sphere) -> Vec<f64> {
    let mut odf = vec![0.0; sphere.len()];
    tensor_odf_into(evals, evecs, sphere, &mut odf);
    odf
}

fn tensor_odf_into(evals: &[f64; 3], evecs: &[f64; 9], sphere: &Sphere, out: &mut [f64]) {
    if !(evals[0] > 0.0 && evals[1] > 0.0 && evals[2] > 0.0) {
        out.iter_mut().for_each(|v| *v = 0.0);
        return;
    }
    let lower = 4.0 * PI * (evals[0] * evals[1] * evals[2]).sqrt();
    let sqrt_evals = [evals[0].sqrt(), evals[1].sqrt(), evals[2].sqrt()];

    for (o, v) in out.iter_mut().zip(&sphere.vertices) {
        let mut norm2 = 0.0;
        for j in 0..3 {
            let proj = (v[0] * evecs[j] + v[1] * evecs[3 + j] + v[2] * evecs[6 + j]) / sqrt_evals[j];
            norm2 += proj * proj;
        }
        *o = norm2.powf(-1.5) / lower;
    }
}

/// Tensor ODF over a whole parameter volume
///
/// Uses the first 12 features of each voxel. Output is voxel-major:
/// `odf[voxel * n_vertices + v]`.
pub fn tensor_odf_volume(params: &ParamsImage, sphere: &Sphere) -> Vec<f64> {
    let n_vox = params.n_voxels();
    let nv = sphere.len();
    let tensors = params.to_voxel_major(TENSOR_FEATURES);
    let mut odf = vec![0.0; n_vox * nv];

    let mut n_valid = 0usize;
    for voxel in 0..n_vox {
        let t = &tensors[voxel * TENSOR_FEATURES..(voxel + 1) * TENSOR_FEATURES];
        let evals = [t[0], t[1], t[2]];
        let mut evecs = [0.0; 9];
        evecs.copy_from_slice(&t[3..12]);
        if evals.iter().all(|&e| e > 0.0) {
            n_valid += 1;
        }
        tensor_odf_into(&evals, &evecs, sphere, &mut odf[voxel * nv..(voxel + 1) * nv]);
    }
    debug!("Tensor ODF: {} of {} voxels with positive eigenvalues", n_valid, n_vox);

    odf
}

#[cfg(test)]
mod tests {
    use super::*;

    const EYE: [f64; 9] = [1.0, 0.0, 0.0, 0.0, 1.0, 0.0, 0.0, 0.0, 1.0];

    #[test]
    fn test_isotropic_tensor_is_flat() {
        let sphere = Sphere::icosphere(1);
        let odf = tensor_odf(&[1.0, 1.0, 1.0], &EYE, &sphere);
        let expected = 1.0 / (4.0 * PI);
        for &v in &odf {
            assert!((v - expected).abs() < 1e-12);
        }
    }

    #[test]
    fn test_prolate_tensor_peaks_along_principal_axis() {
        let sphere = Sphere::icosphere(2);
        // Principal eigenvector along y
        let evecs = [0.0, 1.0, 0.0, 1.0, 0.0, 0.0, 0.0, 0.0, 1.0];
        let odf = tensor_odf(&[1.7e-3, 0.3e-3, 0.3e-3], &evecs, &sphere);
        let (imax, _) = odf
            .iter()
            .enumerate()
            .fold((0, f64::MIN), |(bi, bv), (i, &v)| if v > bv { (i, v) } else { (bi, bv) });
        let peak = sphere.vertices[imax];
        assert!(peak[1].abs() > 0.99, "peak {:?} should lie along y", peak);
    }

    #[test]
    fn test_degenerate_tensor_gives_zero() {
        let sphere = Sphere::icosphere(0);
        let odf = tensor_odf(&[1.0, 0.0, 1.0], &EYE, &sphere);
        assert!(odf.iter().all(|&v| v == 0.0));
    }

    #[test]
    fn test_odf_volume_layout() {
        use crate::utils::affine::IDENTITY;
        // Two voxels: first isotropic, second all zeros
        let mut data = vec![0.0; 2 * 12];
        let n_vox = 2;
        for c in 0..3 {
            data[c * n_vox] = 1.0;
        }
        for (c, &e) in EYE.iter().enumerate() {
            data[(3 + c) * n_vox] = e;
        }
        let img = ParamsImage::new(data, (2, 1, 1, 12), (1.0, 1.0, 1.0), IDENTITY).unwrap();
        let sphere = Sphere::icosphere(0);
        let odf = tensor_odf_volume(&img, &sphere);
        assert_eq!(odf.len(), 2 * 12);
        assert!(odf[..12].iter().all(|&v| (v - 1.0 / (4.0 * PI)).abs() < 1e-12));
        assert!(odf[12..].iter().all(|&v| v == 0.0));
    }
}

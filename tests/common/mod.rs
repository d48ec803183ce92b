//! Common test utilities for tracto-core integration tests

#![allow(dead_code)]

use std::path::PathBuf;

use tracto_core::shm::{sh_to_sf_matrix, sph_harm_ind_list};
use tracto_core::sphere::Sphere;
use tracto_core::utils::affine::IDENTITY;
use tracto_core::ParamsImage;

/// Tensor fit whose principal eigenvector is the given unit axis everywhere
///
/// `axis` is 0, 1 or 2. Feature layout: 3 eigenvalues then the 3x3
/// eigenvector block, component `i` of vector `j` at `3 + 3*i + j`.
pub fn tensor_field(dims: (usize, usize, usize), axis: usize, affine: [f64; 16]) -> ParamsImage {
    let n = dims.0 * dims.1 * dims.2;
    let mut features = [0.0; 12];
    features[0] = 1.7e-3;
    features[1] = 0.3e-3;
    features[2] = 0.3e-3;
    // Eigenvector j = basis vector (axis + j) % 3
    for j in 0..3 {
        let i = (axis + j) % 3;
        features[3 + 3 * i + j] = 1.0;
    }

    let mut data = Vec::with_capacity(n * 12);
    for f in features {
        data.extend(std::iter::repeat(f).take(n));
    }
    ParamsImage::new(data, (dims.0, dims.1, dims.2, 12), voxel_size_of(&affine), affine).unwrap()
}

/// Order-2 SH fit with an axially symmetric lobe along z everywhere
pub fn sh_z_field(dims: (usize, usize, usize)) -> ParamsImage {
    let n = dims.0 * dims.1 * dims.2;
    let index = sph_harm_ind_list(2);
    let mut data = Vec::with_capacity(n * index.len());
    for &(m, order) in &index {
        let c = match (m, order) {
            (0, 0) => 1.0,
            (0, 2) => 0.5,
            _ => 0.0,
        };
        data.extend(std::iter::repeat(c).take(n));
    }
    ParamsImage::new(data, (dims.0, dims.1, dims.2, index.len()), (1.0, 1.0, 1.0), IDENTITY).unwrap()
}

/// Order-4 SH fit of two fibers crossing along x and z everywhere
///
/// The coefficients are the least-squares fit of `x^4 + z^4` sampled on a
/// dense icosphere, which the order-4 basis represents exactly.
pub fn sh_crossing_field(dims: (usize, usize, usize)) -> ParamsImage {
    let sphere = Sphere::icosphere(3);
    let basis = sh_to_sf_matrix(&sphere, 4);
    let values: Vec<f64> = sphere.vertices.iter().map(|v| v[0].powi(4) + v[2].powi(4)).collect();
    let coeffs = least_squares(&basis.matrix, basis.n_vertices, basis.n_coeffs, &values);

    let n = dims.0 * dims.1 * dims.2;
    let mut data = Vec::with_capacity(n * coeffs.len());
    for c in &coeffs {
        data.extend(std::iter::repeat(*c).take(n));
    }
    ParamsImage::new(data, (dims.0, dims.1, dims.2, coeffs.len()), (1.0, 1.0, 1.0), IDENTITY).unwrap()
}

/// Solve `min |A x - b|` through the normal equations (row-major `A`)
fn least_squares(a: &[f64], rows: usize, cols: usize, b: &[f64]) -> Vec<f64> {
    // Augmented [A^T A | A^T b]
    let mut m = vec![0.0; cols * (cols + 1)];
    for r in 0..rows {
        let row = &a[r * cols..(r + 1) * cols];
        for i in 0..cols {
            for j in 0..cols {
                m[i * (cols + 1) + j] += row[i] * row[j];
            }
            m[i * (cols + 1) + cols] += row[i] * b[r];
        }
    }

    // Gaussian elimination with partial pivoting
    for col in 0..cols {
        let pivot = (col..cols)
            .max_by(|&x, &y| m[x * (cols + 1) + col].abs().total_cmp(&m[y * (cols + 1) + col].abs()))
            .unwrap();
        for k in 0..=cols {
            m.swap(col * (cols + 1) + k, pivot * (cols + 1) + k);
        }
        let d = m[col * (cols + 1) + col];
        for r in 0..cols {
            if r == col {
                continue;
            }
            let f = m[r * (cols + 1) + col] / d;
            for k in col..=cols {
                m[r * (cols + 1) + k] -= f * m[col * (cols + 1) + k];
            }
        }
    }
    (0..cols).map(|i| m[i * (cols + 1) + cols] / m[i * (cols + 1) + i]).collect()
}

/// Stop map that is 1 for voxels with x <= `last_x`, 0 beyond
pub fn x_cutoff_mask(dims: (usize, usize, usize), last_x: usize) -> Vec<f64> {
    let mut mask = vec![0.0; dims.0 * dims.1 * dims.2];
    for k in 0..dims.2 {
        for j in 0..dims.1 {
            for i in 0..=last_x.min(dims.0 - 1) {
                mask[i + j * dims.0 + k * dims.0 * dims.1] = 1.0;
            }
        }
    }
    mask
}

fn voxel_size_of(affine: &[f64; 16]) -> (f64, f64, f64) {
    let col = |c: usize| (affine[c].powi(2) + affine[4 + c].powi(2) + affine[8 + c].powi(2)).sqrt();
    (col(0), col(1), col(2))
}

/// Unique path in the system temp directory
pub fn temp_path(name: &str) -> PathBuf {
    std::env::temp_dir().join(format!("tracto_{}_{}", std::process::id(), name))
}

/// Assert two point sequences agree within `tol`
pub fn assert_streamlines_close(a: &[Vec<[f64; 3]>], b: &[Vec<[f64; 3]>], tol: f64) {
    assert_eq!(a.len(), b.len(), "streamline count mismatch");
    for (s, (x, y)) in a.iter().zip(b).enumerate() {
        assert_eq!(x.len(), y.len(), "length mismatch in streamline {}", s);
        for (p, q) in x.iter().zip(y) {
            for k in 0..3 {
                assert!(
                    (p[k] - q[k]).abs() < tol,
                    "streamline {}: {:?} vs {:?}",
                    s, p, q
                );
            }
        }
    }
}

//! Affine transform helpers
//!
//! Affines are 4x4 row-major `[f64; 16]` arrays mapping voxel indices to
//! world (scanner) millimetres, as read from the NIfTI sform.

use crate::error::{Result, TrackingError};

/// Identity affine (1 mm isotropic voxels at the origin)
pub const IDENTITY: [f64; 16] = [
    1.0, 0.0, 0.0, 0.0,
    0.0, 1.0, 0.0, 0.0,
    0.0, 0.0, 1.0, 0.0,
    0.0, 0.0, 0.0, 1.0,
];

/// Apply an affine to a 3D point
#[inline]
pub fn apply_affine(affine: &[f64; 16], p: &[f64; 3]) -> [f64; 3] {
    [
        affine[0] * p[0] + affine[1] * p[1] + affine[2] * p[2] + affine[3],
        affine[4] * p[0] + affine[5] * p[1] + affine[6] * p[2] + affine[7],
        affine[8] * p[0] + affine[9] * p[1] + affine[10] * p[2] + affine[11],
    ]
}

/// Invert an affine whose last row is `[0, 0, 0, 1]`
///
/// Inverts the 3x3 linear block by cofactors and maps the translation
/// through it.
pub fn invert_affine(affine: &[f64; 16]) -> Result<[f64; 16]> {
    let a = affine[0];
    let b = affine[1];
    let c = affine[2];
    let d = affine[4];
    let e = affine[5];
    let f = affine[6];
    let g = affine[8];
    let h = affine[9];
    let i = affine[10];

    let co_a = e * i - f * h;
    let co_b = -(d * i - f * g);
    let co_c = d * h - e * g;
    let det = a * co_a + b * co_b + c * co_c;
    if det.abs() < 1e-12 {
        return Err(TrackingError::SingularAffine);
    }
    let inv_det = 1.0 / det;

    let m = [
        co_a * inv_det,
        -(b * i - c * h) * inv_det,
        (b * f - c * e) * inv_det,
        co_b * inv_det,
        (a * i - c * g) * inv_det,
        -(a * f - c * d) * inv_det,
        co_c * inv_det,
        -(a * h - b * g) * inv_det,
        (a * e - b * d) * inv_det,
    ];

    let t = [affine[3], affine[7], affine[11]];
    let tx = -(m[0] * t[0] + m[1] * t[1] + m[2] * t[2]);
    let ty = -(m[3] * t[0] + m[4] * t[1] + m[5] * t[2]);
    let tz = -(m[6] * t[0] + m[7] * t[1] + m[8] * t[2]);

    Ok([
        m[0], m[1], m[2], tx,
        m[3], m[4], m[5], ty,
        m[6], m[7], m[8], tz,
        0.0, 0.0, 0.0, 1.0,
    ])
}

/// Voxel sizes implied by an affine (column norms of the linear block)
pub fn voxel_sizes(affine: &[f64; 16]) -> [f64; 3] {
    let mut vs = [0.0; 3];
    for (col, v) in vs.iter_mut().enumerate() {
        let x = affine[col];
        let y = affine[4 + col];
        let z = affine[8 + col];
        *v = (x * x + y * y + z * z).sqrt();
    }
    vs
}

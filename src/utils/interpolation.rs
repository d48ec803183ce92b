//! Trilinear interpolation on voxel grids
//!
//! Points are in voxel coordinates with voxel centres at integer positions.
//! A point is inside the grid when `-0.5 <= p < n - 0.5` on every axis; at the
//! border half-voxel the nearest edge voxel is used for both neighbours.

/// Linear voxel indices and weights of the 8 interpolation neighbours
///
/// Returns `None` when the point lies outside the grid.
pub fn trilinear_corners(
    dims: (usize, usize, usize),
    p: &[f64; 3],
) -> Option<[(usize, f64); 8]> {
    let (nx, ny, nz) = dims;
    let n = [nx, ny, nz];

    let mut lo = [0usize; 3];
    let mut hi = [0usize; 3];
    let mut w = [0.0f64; 3];

    for a in 0..3 {
        let v = p[a];
        if !(v >= -0.5 && v < n[a] as f64 - 0.5) {
            return None;
        }
        let flr = v.floor();
        let rem = v - flr;
        let f = flr as i64;
        lo[a] = if f < 0 { 0 } else { f as usize };
        hi[a] = if f + 1 > n[a] as i64 - 1 { n[a] - 1 } else { (f + 1) as usize };
        w[a] = rem;
    }

    // Fortran order: x + y*nx + z*nx*ny
    let idx = |i: usize, j: usize, k: usize| i + j * nx + k * nx * ny;

    let mut out = [(0usize, 0.0f64); 8];
    let mut c = 0;
    for (k, wz) in [(lo[2], 1.0 - w[2]), (hi[2], w[2])] {
        for (j, wy) in [(lo[1], 1.0 - w[1]), (hi[1], w[1])] {
            for (i, wx) in [(lo[0], 1.0 - w[0]), (hi[0], w[0])] {
                out[c] = (idx(i, j, k), wx * wy * wz);
                c += 1;
            }
        }
    }
    Some(out)
}

/// Trilinear interpolation of a 3D scalar volume
pub fn trilinear_3d(data: &[f64], dims: (usize, usize, usize), p: &[f64; 3]) -> Option<f64> {
    let corners = trilinear_corners(dims, p)?;
    Some(corners.iter().map(|&(i, w)| data[i] * w).sum())
}

/// Trilinear interpolation of a voxel-major 4D volume
///
/// `data[voxel * n_features + f]` holds feature `f`. The interpolated feature
/// vector is written into `out` (length `n_features`).
pub fn trilinear_features(
    data: &[f64],
    dims: (usize, usize, usize),
    n_features: usize,
    p: &[f64; 3],
    out: &mut [f64],
) -> bool {
    let corners = match trilinear_corners(dims, p) {
        Some(c) => c,
        None => return false,
    };
    out.iter_mut().for_each(|v| *v = 0.0);
    for &(voxel, w) in corners.iter() {
        if w == 0.0 {
            continue;
        }
        let base = voxel * n_features;
        for (o, &d) in out.iter_mut().zip(&data[base..base + n_features]) {
            *o += w * d;
        }
    }
    true
}

/// Nearest voxel index for a point, `None` outside the grid
pub fn nearest_voxel(dims: (usize, usize, usize), p: &[f64; 3]) -> Option<usize> {
    let (nx, ny, nz) = dims;
    let n = [nx, ny, nz];
    let mut ijk = [0usize; 3];
    for a in 0..3 {
        if !(p[a] >= -0.5 && p[a] < n[a] as f64 - 0.5) {
            return None;
        }
        ijk[a] = (p[a] + 0.5).floor().max(0.0) as usize;
    }
    Some(ijk[0] + ijk[1] * nx + ijk[2] * nx * ny)
}

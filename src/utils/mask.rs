//! Mask utilities
//!
//! Seed and ROI masks are flattened `u8` volumes in Fortran order
//! (index = x + y*nx + z*nx*ny), nonzero meaning "inside".

/// Binarize a scalar volume: values strictly above `threshold` become 1
pub fn binarize(data: &[f64], threshold: f64) -> Vec<u8> {
    data.iter().map(|&v| if v > threshold { 1 } else { 0 }).collect()
}

/// Number of nonzero voxels in a mask
pub fn count_nonzero(mask: &[u8]) -> usize {
    mask.iter().filter(|&&m| m != 0).count()
}

/// Create a binary sphere mask on a 3D volume
///
/// Voxels within `radius` (in voxels) of the centre are set to 1. Useful as a
/// spherical seeding ROI.
pub fn create_sphere_mask(
    nx: usize, ny: usize, nz: usize,
    center_x: f64, center_y: f64, center_z: f64,
    radius: f64,
) -> Vec<u8> {
    let mut mask = vec![0u8; nx * ny * nz];
    let r2 = radius * radius;

    for k in 0..nz {
        for j in 0..ny {
            for i in 0..nx {
                let dx = i as f64 - center_x;
                let dy = j as f64 - center_y;
                let dz = k as f64 - center_z;
                if dx * dx + dy * dy + dz * dz <= r2 {
                    mask[i + j * nx + k * nx * ny] = 1;
                }
            }
        }
    }

    mask
}

/// Single-voxel mask, handy for seeding one location
pub fn single_voxel_mask(
    dims: (usize, usize, usize),
    i: usize, j: usize, k: usize,
) -> Vec<u8> {
    let (nx, ny, nz) = dims;
    let mut mask = vec![0u8; nx * ny * nz];
    if i < nx && j < ny && k < nz {
        mask[i + j * nx + k * nx * ny] = 1;
    }
    mask
}

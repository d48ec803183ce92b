//! Seed generation
//!
//! Seeds are starting points for streamline propagation, in world (affine)
//! coordinates. They are either supplied explicitly or sampled inside the
//! nonzero voxels of a mask.

use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};
use serde::{Deserialize, Serialize};

use crate::error::{Result, TrackingError};
use crate::utils::affine::apply_affine;

/// Seeding strategy
///
/// In JSON a bare integer is a density, `{"random_per_voxel": n}` asks for
/// random seeds and an array of `[x, y, z]` triples is an explicit
/// coordinate list.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum SeedSpec {
    /// Seeds per voxel along each axis (2 => 8 seeds per voxel)
    Density(usize),
    /// Uniformly random seeds, this many per voxel
    Random { random_per_voxel: usize },
    /// Explicit world-space seed coordinates
    Coordinates(Vec<[f64; 3]>),
}

impl Default for SeedSpec {
    fn default() -> Self {
        SeedSpec::Density(2)
    }
}

fn check_mask(mask: &[u8], dims: (usize, usize, usize)) -> Result<()> {
    let (nx, ny, nz) = dims;
    if mask.len() != nx * ny * nz {
        return Err(TrackingError::shape_mismatch("seed mask", &[nx, ny, nz], &[mask.len()]));
    }
    Ok(())
}

/// Evenly spaced seeds in every nonzero mask voxel
///
/// Each voxel gets `density[0] * density[1] * density[2]` seeds at offsets
/// `(i + 0.5) / d - 0.5` from its centre. Voxels are visited with x slowest
/// and z fastest; inside a voxel the x offset varies fastest.
pub fn seeds_from_mask(
    mask: &[u8],
    dims: (usize, usize, usize),
    density: [usize; 3],
    affine: &[f64; 16],
) -> Result<Vec<[f64; 3]>> {
    check_mask(mask, dims)?;
    if density.iter().any(|&d| d == 0) {
        return Err(TrackingError::invalid_parameter("seed density must be at least 1"));
    }
    let (nx, ny, nz) = dims;

    let mut grid = Vec::with_capacity(density[0] * density[1] * density[2]);
    for c in 0..density[2] {
        for b in 0..density[1] {
            for a in 0..density[0] {
                grid.push([
                    (a as f64 + 0.5) / density[0] as f64 - 0.5,
                    (b as f64 + 0.5) / density[1] as f64 - 0.5,
                    (c as f64 + 0.5) / density[2] as f64 - 0.5,
                ]);
            }
        }
    }

    let mut seeds = Vec::new();
    for i in 0..nx {
        for j in 0..ny {
            for k in 0..nz {
                if mask[i + j * nx + k * nx * ny] == 0 {
                    continue;
                }
                for g in &grid {
                    let p = [i as f64 + g[0], j as f64 + g[1], k as f64 + g[2]];
                    seeds.push(apply_affine(affine, &p));
                }
            }
        }
    }
    Ok(seeds)
}

/// Uniformly random seeds in every nonzero mask voxel
///
/// Reproducible for a given `rng_seed`.
pub fn random_seeds_from_mask(
    mask: &[u8],
    dims: (usize, usize, usize),
    seeds_per_voxel: usize,
    affine: &[f64; 16],
    rng_seed: u64,
) -> Result<Vec<[f64; 3]>> {
    check_mask(mask, dims)?;
    let (nx, ny, nz) = dims;
    let mut rng = StdRng::seed_from_u64(rng_seed);

    let mut seeds = Vec::new();
    for i in 0..nx {
        for j in 0..ny {
            for k in 0..nz {
                if mask[i + j * nx + k * nx * ny] == 0 {
                    continue;
                }
                for _ in 0..seeds_per_voxel {
                    let p = [
                        i as f64 + rng.gen::<f64>() - 0.5,
                        j as f64 + rng.gen::<f64>() - 0.5,
                        k as f64 + rng.gen::<f64>() - 0.5,
                    ];
                    seeds.push(apply_affine(affine, &p));
                }
            }
        }
    }
    Ok(seeds)
}

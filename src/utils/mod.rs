//! Shared volume utilities: affines, interpolation and masks.

pub mod affine;
pub mod interpolation;
pub mod mask;

pub use affine::{apply_affine, invert_affine, voxel_sizes, IDENTITY};
pub use interpolation::{nearest_voxel, trilinear_3d, trilinear_corners, trilinear_features};
pub use mask::{binarize, count_nonzero, create_sphere_mask, single_voxel_mask};

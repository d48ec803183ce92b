//! Tracto-Core: local fiber tractography on diffusion model volumes
//!
//! This crate propagates streamlines through tensor or spherical-harmonic
//! parameter volumes, starting from seeds and stopping at tissue boundaries.
//!
//! # Modules
//! - `tracking`: the `track` entry point and its configuration
//! - `model`: parameter volumes and model-type dispatch
//! - `sphere`, `shm`, `tensor`: direction discretization and ODF evaluation
//! - `pmf`, `direction`: PMF generators and direction getters
//! - `tissue`: stopping criteria
//! - `seeds`, `chunking`, `parallel`: seeding and chunked parallel execution
//! - `local_tracking`: step-by-step streamline propagation
//! - `nifti_io`, `streamline_io`: NIfTI input and TrackVis output
//! - `utils`: affine transforms, interpolation, masks

pub mod error;

// Geometry and models
pub mod sphere;
pub mod shm;
pub mod tensor;
pub mod model;

// Tracking machinery
pub mod pmf;
pub mod direction;
pub mod tissue;
pub mod seeds;
pub mod local_tracking;

// Execution
pub mod chunking;
pub mod parallel;
pub mod tracking;

pub mod utils;

// I/O modules
pub mod nifti_io;
pub mod streamline_io;

pub use error::{Result, TrackingError};
pub use local_tracking::Streamline;
pub use model::ParamsImage;
pub use tracking::{track, track_image, ParamsSource, TrackingInputs, TrackingParams};

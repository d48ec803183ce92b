//! Whole-brain tracking entry point
//!
//! [`track`] wires the pipeline together: load the model parameters, build
//! seeds, pick a direction getter from the model type, build the stopping
//! criterion, then propagate streamlines serially or over chunks of seeds in
//! parallel.

use std::path::{Path, PathBuf};

use log::{debug, info, warn};
use rand::rngs::StdRng;
use rand::SeedableRng;
use serde::{Deserialize, Serialize};

use crate::chunking::{flatten_chunks, partition_seeds};
use crate::direction::{DirectionKind, PmfDirectionGetter, DEFAULT_PMF_THRESHOLD};
use crate::error::{Result, TrackingError};
use crate::local_tracking::{LocalTracking, Streamline, DEFAULT_MAX_LENGTH};
use crate::model::{detect_model, ModelKind, ParamsImage};
use crate::nifti_io::read_params_file;
use crate::parallel::{parfor, Backend, Engine};
use crate::seeds::{random_seeds_from_mask, seeds_from_mask, SeedSpec};
use crate::sphere::{default_sphere, Sphere};
use crate::tensor::tensor_odf_volume;
use crate::tissue::{BinaryTissueClassifier, ThresholdTissueClassifier, TissueClassifier};
use crate::utils::mask::{binarize, count_nonzero};

/// Scalar tracking configuration
///
/// Every field has a default, so a JSON config only needs the fields it
/// changes.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct TrackingParams {
    /// Deterministic or probabilistic direction getter
    pub directions: DirectionKind,
    /// Maximum turning angle between steps, degrees
    pub max_angle: f64,
    /// Sphere vertices below this fraction of the PMF maximum are never chosen
    pub pmf_threshold: f64,
    /// Seed density per axis, or explicit world coordinates
    pub seeds: SeedSpec,
    /// Tracking continues where the stop map is above this value
    pub stop_threshold: f64,
    /// Step size in mm
    pub step_size: f64,
    /// Worker count; -1 uses every CPU
    pub n_jobs: i32,
    /// Number of seed chunks for the parallel engine
    pub n_chunks: usize,
    pub backend: Backend,
    pub engine: Engine,
    /// Base seed for probabilistic tracking; chunk `i` uses `rng_seed + i`
    pub rng_seed: u64,
    /// Maximum steps per half streamline
    pub max_length: usize,
    /// Keep streamlines regardless of how they ended
    pub return_all: bool,
    /// Maximum number of initial directions tracked per seed
    pub max_cross: Option<usize>,
    /// Binarize the stop map at `stop_threshold` and stop on the nearest voxel
    /// instead of interpolating it
    pub binary_stop: bool,
}

impl Default for TrackingParams {
    fn default() -> Self {
        Self {
            directions: DirectionKind::Deterministic,
            max_angle: 30.0,
            pmf_threshold: DEFAULT_PMF_THRESHOLD,
            seeds: SeedSpec::default(),
            stop_threshold: 0.2,
            step_size: 0.5,
            n_jobs: -1,
            n_chunks: 100,
            backend: Backend::Rayon,
            engine: Engine::Parallel,
            rng_seed: 0,
            max_length: DEFAULT_MAX_LENGTH,
            return_all: true,
            max_cross: None,
            binary_stop: false,
        }
    }
}

impl TrackingParams {
    /// Load from a JSON file; missing fields keep their defaults
    pub fn from_json_file(path: &Path) -> Result<Self> {
        let text = std::fs::read_to_string(path)?;
        Self::from_json_str(&text)
    }

    pub fn from_json_str(text: &str) -> Result<Self> {
        serde_json::from_str(text).map_err(|e| TrackingError::Config(e.to_string()))
    }
}

/// Where the model parameters come from
#[derive(Clone, Debug)]
pub enum ParamsSource {
    /// A .nii / .nii.gz file holding the 4D parameter volume
    Path(PathBuf),
    /// An already loaded volume
    Image(ParamsImage),
}

impl From<ParamsImage> for ParamsSource {
    fn from(image: ParamsImage) -> Self {
        ParamsSource::Image(image)
    }
}

impl From<PathBuf> for ParamsSource {
    fn from(path: PathBuf) -> Self {
        ParamsSource::Path(path)
    }
}

/// Array inputs of a tracking run
#[derive(Clone, Debug, Default)]
pub struct TrackingInputs {
    /// Seeding region (nonzero voxels), defaults to the whole volume
    pub seed_mask: Option<Vec<u8>>,
    /// Stopping map (e.g. FA), defaults to all ones
    pub stop_mask: Option<Vec<f64>>,
    /// Sphere used to discretize directions, defaults to [`default_sphere`]
    pub sphere: Option<Sphere>,
}

/// Compute streamlines from a model parameter volume
///
/// Streamlines come back in seed order whichever engine runs them.
pub fn track(source: ParamsSource, inputs: &TrackingInputs, params: &TrackingParams) -> Result<Vec<Streamline>> {
    let image = match source {
        ParamsSource::Path(path) => {
            info!("Loading model parameters from {}", path.display());
            read_params_file(&path)?
        }
        ParamsSource::Image(image) => image,
    };
    track_image(&image, inputs, params)
}

/// [`track`] over a borrowed volume
pub fn track_image(image: &ParamsImage, inputs: &TrackingInputs, params: &TrackingParams) -> Result<Vec<Streamline>> {
    let dims = image.spatial_dims();
    let n_vox = image.n_voxels();
    let affine = image.affine;

    let ones;
    let seed_mask = match &inputs.seed_mask {
        Some(mask) => {
            if mask.len() != n_vox {
                return Err(TrackingError::shape_mismatch("seed mask", &[dims.0, dims.1, dims.2], &[mask.len()]));
            }
            mask.as_slice()
        }
        None => {
            ones = vec![1u8; n_vox];
            ones.as_slice()
        }
    };
    let seeds = match &params.seeds {
        SeedSpec::Density(density) => {
            debug!("Seeding {} mask voxels at density {}", count_nonzero(seed_mask), density);
            seeds_from_mask(seed_mask, dims, [*density; 3], &affine)?
        }
        SeedSpec::Random { random_per_voxel } => {
            random_seeds_from_mask(seed_mask, dims, *random_per_voxel, &affine, params.rng_seed)?
        }
        SeedSpec::Coordinates(coords) => coords.clone(),
    };
    if seeds.is_empty() {
        warn!("No seeds to track from");
    }

    let sphere = inputs.sphere.clone().unwrap_or_else(default_sphere);
    let model = detect_model(image.n_features())?;
    info!(
        "Tracking {} seeds on a {:?} volume: model {:?}, {} getter, {} sphere vertices",
        seeds.len(),
        image.dims,
        model,
        params.directions,
        sphere.len()
    );

    let dg = match model {
        ModelKind::Shm { .. } => PmfDirectionGetter::from_shcoeff(image, params.max_angle, sphere, params.directions)?,
        ModelKind::Odf => {
            let odf = tensor_odf_volume(image, &sphere);
            PmfDirectionGetter::from_pmf(odf, dims, params.max_angle, sphere, params.directions)?
        }
    };
    let dg = dg.with_pmf_threshold(params.pmf_threshold)?;

    let stop_mask = match &inputs.stop_mask {
        Some(mask) => {
            if mask.len() != n_vox {
                return Err(TrackingError::shape_mismatch("stop mask", &[dims.0, dims.1, dims.2], &[mask.len()]));
            }
            mask.clone()
        }
        None => vec![1.0; n_vox],
    };
    let classifier: Box<dyn TissueClassifier> = if params.binary_stop {
        Box::new(BinaryTissueClassifier::new(binarize(&stop_mask, params.stop_threshold), dims)?)
    } else {
        Box::new(ThresholdTissueClassifier::new(stop_mask, dims, params.stop_threshold)?)
    };

    let tracker = LocalTracking::new(&dg, classifier.as_ref(), affine, params.step_size)?
        .with_max_length(params.max_length)
        .with_max_cross(params.max_cross)
        .with_return_all(params.return_all);

    let streamlines = match params.engine {
        Engine::Serial => {
            let mut rng = StdRng::seed_from_u64(params.rng_seed);
            tracker.track_seeds(&seeds, &mut rng)
        }
        Engine::Parallel => {
            let chunks = partition_seeds(&seeds, params.n_chunks);
            debug!("Dispatching {} chunks on the {} backend", chunks.len(), params.backend);
            let per_chunk = parfor(
                |i, chunk: &&[[f64; 3]]| {
                    let mut rng = StdRng::seed_from_u64(params.rng_seed.wrapping_add(i as u64));
                    Ok(tracker.track_seeds(chunk, &mut rng))
                },
                &chunks,
                params.n_jobs,
                params.engine,
                params.backend,
            )?;
            flatten_chunks(per_chunk)
        }
    };

    info!("Generated {} streamlines", streamlines.len());
    Ok(streamlines)
}

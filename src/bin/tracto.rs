use anyhow::{Context, Result};
use clap::Parser;
use log::{info, warn};
use std::path::PathBuf;

use tracto_core::direction::DirectionKind;
use tracto_core::nifti_io::{read_mask_file, read_nifti_file, read_params_file};
use tracto_core::parallel::{Backend, Engine};
use tracto_core::seeds::SeedSpec;
use tracto_core::utils::mask::create_sphere_mask;
use tracto_core::streamline_io::{filter_by_length, save_trk};
use tracto_core::{track_image, TrackingInputs, TrackingParams};

#[derive(Parser)]
#[command(name = "tracto")]
#[command(about = "Local fiber tractography on tensor or spherical harmonic parameter volumes")]
struct Cli {
    /// 4D model parameter volume (.nii or .nii.gz)
    params: PathBuf,

    /// Output TrackVis file
    #[arg(short, long, default_value = "tracks.trk")]
    output: PathBuf,

    /// Seeding mask (nonzero voxels are seeded)
    #[arg(long)]
    seed_mask: Option<PathBuf>,

    /// Spherical seeding ROI in voxel coordinates: "x,y,z,radius"
    #[arg(long, value_parser = parse_sphere, conflicts_with = "seed_mask")]
    seed_sphere: Option<[f64; 4]>,

    /// Stopping map, tracking continues above --stop-threshold
    #[arg(long)]
    stop_mask: Option<PathBuf>,

    /// JSON tracking configuration; flags below override it
    #[arg(short, long)]
    config: Option<PathBuf>,

    /// Direction getter (det, prob)
    #[arg(long)]
    directions: Option<DirectionKind>,

    /// Maximum turning angle in degrees
    #[arg(long)]
    max_angle: Option<f64>,

    /// Ignore directions below this fraction of the PMF maximum
    #[arg(long)]
    pmf_threshold: Option<f64>,

    /// Seeds per voxel along each axis
    #[arg(long, conflicts_with = "random_seeds")]
    density: Option<usize>,

    /// Random seeds per voxel instead of a regular grid
    #[arg(long)]
    random_seeds: Option<usize>,

    /// Stop on the nearest voxel of the binarized stop map
    #[arg(long)]
    binary_stop: bool,

    #[arg(long)]
    stop_threshold: Option<f64>,

    /// Step size in mm
    #[arg(long)]
    step_size: Option<f64>,

    /// Worker threads (-1 for all CPUs)
    #[arg(long, allow_hyphen_values = true)]
    n_jobs: Option<i32>,

    #[arg(long)]
    n_chunks: Option<usize>,

    /// Execution engine (serial, parallel)
    #[arg(long)]
    engine: Option<Engine>,

    /// Parallel backend (rayon, threads)
    #[arg(long)]
    backend: Option<Backend>,

    #[arg(long)]
    rng_seed: Option<u64>,

    /// Drop streamlines shorter than this (mm)
    #[arg(long, default_value_t = 0.0)]
    min_length: f64,

    /// Drop streamlines longer than this (mm)
    #[arg(long, default_value_t = f64::INFINITY)]
    max_streamline_length: f64,
}

impl Cli {
    fn tracking_params(&self) -> Result<TrackingParams> {
        let mut params = match &self.config {
            Some(path) => TrackingParams::from_json_file(path)
                .with_context(|| format!("reading config {}", path.display()))?,
            None => TrackingParams::default(),
        };
        if let Some(v) = self.directions {
            params.directions = v;
        }
        if let Some(v) = self.max_angle {
            params.max_angle = v;
        }
        if let Some(v) = self.pmf_threshold {
            params.pmf_threshold = v;
        }
        if let Some(v) = self.density {
            params.seeds = SeedSpec::Density(v);
        }
        if let Some(v) = self.random_seeds {
            params.seeds = SeedSpec::Random { random_per_voxel: v };
        }
        if self.binary_stop {
            params.binary_stop = true;
        }
        if let Some(v) = self.stop_threshold {
            params.stop_threshold = v;
        }
        if let Some(v) = self.step_size {
            params.step_size = v;
        }
        if let Some(v) = self.n_jobs {
            params.n_jobs = v;
        }
        if let Some(v) = self.n_chunks {
            params.n_chunks = v;
        }
        if let Some(v) = self.engine {
            params.engine = v;
        }
        if let Some(v) = self.backend {
            params.backend = v;
        }
        if let Some(v) = self.rng_seed {
            params.rng_seed = v;
        }
        Ok(params)
    }
}

fn parse_sphere(s: &str) -> std::result::Result<[f64; 4], String> {
    let parts: Vec<f64> = s
        .split(',')
        .map(|p| p.trim().parse::<f64>().map_err(|e| format!("'{}': {}", p, e)))
        .collect::<std::result::Result<_, _>>()?;
    match parts.as_slice() {
        &[x, y, z, r] if r >= 0.0 => Ok([x, y, z, r]),
        _ => Err(format!("expected x,y,z,radius with radius >= 0, got '{}'", s)),
    }
}

fn main() -> Result<()> {
    env_logger::init();

    let cli = Cli::parse();
    let params = cli.tracking_params()?;

    let image = read_params_file(&cli.params)
        .with_context(|| format!("reading parameters {}", cli.params.display()))?;
    let dims = image.spatial_dims();
    info!("Parameter volume {:?}, voxel size {:?}", image.dims, image.voxel_size);

    let mut inputs = TrackingInputs::default();
    if let Some(path) = &cli.seed_mask {
        let (mask, mask_dims) = read_mask_file(path)
            .with_context(|| format!("reading seed mask {}", path.display()))?;
        if mask_dims != dims {
            anyhow::bail!("Seed mask shape {:?} does not match parameters {:?}", mask_dims, dims);
        }
        inputs.seed_mask = Some(mask);
    }
    if let Some([x, y, z, r]) = cli.seed_sphere {
        inputs.seed_mask = Some(create_sphere_mask(dims.0, dims.1, dims.2, x, y, z, r));
    }
    if let Some(path) = &cli.stop_mask {
        let nii = read_nifti_file(path)
            .with_context(|| format!("reading stop mask {}", path.display()))?;
        if nii.dims != dims {
            anyhow::bail!("Stop mask shape {:?} does not match parameters {:?}", nii.dims, dims);
        }
        inputs.stop_mask = Some(nii.data);
    }

    let streamlines = track_image(&image, &inputs, &params)?;
    let n_tracked = streamlines.len();
    let streamlines = filter_by_length(streamlines, cli.min_length, cli.max_streamline_length);
    if streamlines.len() < n_tracked {
        info!("Length filter kept {} of {} streamlines", streamlines.len(), n_tracked);
    }
    if streamlines.is_empty() {
        warn!("No streamlines to write");
    }

    save_trk(&cli.output, &streamlines, &image.affine, dims)
        .with_context(|| format!("writing {}", cli.output.display()))?;
    println!("{} streamlines -> {}", streamlines.len(), cli.output.display());

    Ok(())
}

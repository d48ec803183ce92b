//! Direction getters
//!
//! Given the current position and the previous step direction, a direction
//! getter chooses the next propagation direction from the local PMF,
//! restricted to a cone of half-angle `max_angle` around the previous
//! direction. Both sphere hemispheres are treated as the same fiber
//! orientation; the chosen vertex is flipped to agree with `prev`.
//!
//! - Deterministic: the vertex with the largest PMF in the cone.
//! - Probabilistic: a vertex drawn with probability proportional to its PMF.

use std::fmt;
use std::str::FromStr;

use rand::rngs::StdRng;
use rand::Rng;
use serde::{Deserialize, Serialize};

use crate::error::{Result, TrackingError};
use crate::model::ParamsImage;
use crate::pmf::{PmfGen, ShCoeffPmfGen, SimplePmfGen};
use crate::shm::calculate_max_order;
use crate::sphere::{dot, Sphere};

/// Default relative PMF threshold below which vertices are ignored
pub const DEFAULT_PMF_THRESHOLD: f64 = 0.1;
/// Peaks weaker than this fraction of the strongest peak are not seeded
pub const RELATIVE_PEAK_THRESHOLD: f64 = 0.5;
/// Minimum angle between two distinct initial directions, degrees
pub const MIN_SEPARATION_ANGLE: f64 = 25.0;

/// How tracking directions are determined
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize, Default)]
pub enum DirectionKind {
    #[default]
    #[serde(rename = "det", alias = "deterministic")]
    Deterministic,
    #[serde(rename = "prob", alias = "probabilistic")]
    Probabilistic,
}

impl FromStr for DirectionKind {
    type Err = TrackingError;

    fn from_str(s: &str) -> Result<Self> {
        match s.to_ascii_lowercase().as_str() {
            "det" | "deterministic" => Ok(Self::Deterministic),
            "prob" | "probabilistic" => Ok(Self::Probabilistic),
            _ => Err(TrackingError::UnknownDirections(s.to_string())),
        }
    }
}

impl fmt::Display for DirectionKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Deterministic => write!(f, "det"),
            Self::Probabilistic => write!(f, "prob"),
        }
    }
}

/// Chooses propagation directions during tracking
pub trait DirectionGetter: Send + Sync {
    /// Fiber directions to start from at a seed (voxel coordinates)
    fn initial_directions(&self, point: &[f64; 3]) -> Vec<[f64; 3]>;

    /// Next direction given the previous one, `None` to stop
    fn get_direction(&self, point: &[f64; 3], prev: &[f64; 3], rng: &mut StdRng) -> Option<[f64; 3]>;
}

/// Direction getter driven by a [`PmfGen`]
pub struct PmfDirectionGetter {
    pmf_gen: Box<dyn PmfGen>,
    kind: DirectionKind,
    cos_similarity: f64,
    pmf_threshold: f64,
    cos_separation: f64,
}

impl PmfDirectionGetter {
    pub fn new(pmf_gen: Box<dyn PmfGen>, max_angle: f64, kind: DirectionKind) -> Result<Self> {
        if !(max_angle > 0.0 && max_angle <= 90.0) {
            return Err(TrackingError::invalid_parameter(format!(
                "max_angle must be in (0, 90] degrees, got {}",
                max_angle
            )));
        }
        Ok(Self {
            pmf_gen,
            kind,
            cos_similarity: max_angle.to_radians().cos(),
            pmf_threshold: DEFAULT_PMF_THRESHOLD,
            cos_separation: MIN_SEPARATION_ANGLE.to_radians().cos(),
        })
    }

    /// Direction getter over a precomputed voxel-major PMF volume
    pub fn from_pmf(
        pmf: Vec<f64>,
        dims: (usize, usize, usize),
        max_angle: f64,
        sphere: Sphere,
        kind: DirectionKind,
    ) -> Result<Self> {
        let gen = SimplePmfGen::new(pmf, dims, sphere)?;
        Self::new(Box::new(gen), max_angle, kind)
    }

    /// Direction getter over SH coefficients (order inferred from the feature count)
    pub fn from_shcoeff(
        params: &ParamsImage,
        max_angle: f64,
        sphere: Sphere,
        kind: DirectionKind,
    ) -> Result<Self> {
        let order = calculate_max_order(params.n_features())?;
        let gen = ShCoeffPmfGen::new(params, order, sphere)?;
        Self::new(Box::new(gen), max_angle, kind)
    }

    /// Override the relative PMF threshold, a fraction of the PMF maximum in `[0, 1]`
    pub fn with_pmf_threshold(mut self, pmf_threshold: f64) -> Result<Self> {
        if !(0.0..=1.0).contains(&pmf_threshold) {
            return Err(TrackingError::invalid_parameter(format!(
                "pmf_threshold must be in [0, 1], got {}",
                pmf_threshold
            )));
        }
        self.pmf_threshold = pmf_threshold;
        Ok(self)
    }

    /// PMF restricted to the cone around `prev` with weak vertices zeroed
    fn masked_pmf(&self, point: &[f64; 3], prev: &[f64; 3]) -> Option<Vec<f64>> {
        let mut pmf = self.pmf_gen.get_pmf(point)?;
        let max = pmf.iter().cloned().fold(0.0, f64::max);
        let cutoff = self.pmf_threshold * max;
        let vertices = &self.pmf_gen.sphere().vertices;
        for (p, v) in pmf.iter_mut().zip(vertices) {
            if *p < cutoff || dot(v, prev).abs() < self.cos_similarity {
                *p = 0.0;
            }
        }
        Some(pmf)
    }

    fn oriented(&self, idx: usize, prev: &[f64; 3]) -> [f64; 3] {
        let v = self.pmf_gen.sphere().vertices[idx];
        if dot(&v, prev) > 0.0 {
            v
        } else {
            [-v[0], -v[1], -v[2]]
        }
    }
}

impl DirectionGetter for PmfDirectionGetter {
    fn initial_directions(&self, point: &[f64; 3]) -> Vec<[f64; 3]> {
        match self.pmf_gen.get_pmf(point) {
            Some(pmf) => find_peaks(&pmf, self.pmf_gen.sphere(), RELATIVE_PEAK_THRESHOLD, self.cos_separation),
            None => Vec::new(),
        }
    }

    fn get_direction(&self, point: &[f64; 3], prev: &[f64; 3], rng: &mut StdRng) -> Option<[f64; 3]> {
        let pmf = self.masked_pmf(point, prev)?;

        let idx = match self.kind {
            DirectionKind::Deterministic => {
                let (idx, best) = pmf
                    .iter()
                    .enumerate()
                    .fold((0, 0.0), |(bi, bv), (i, &v)| if v > bv { (i, v) } else { (bi, bv) });
                if best <= 0.0 {
                    return None;
                }
                idx
            }
            DirectionKind::Probabilistic => {
                let mut cdf = pmf;
                let mut total = 0.0;
                for c in cdf.iter_mut() {
                    total += *c;
                    *c = total;
                }
                if total <= 0.0 {
                    return None;
                }
                let r = rng.gen::<f64>() * total;
                // First vertex whose cumulative weight exceeds r
                let idx = cdf.partition_point(|&c| c <= r);
                idx.min(cdf.len() - 1)
            }
        };

        Some(self.oriented(idx, prev))
    }
}

/// Distinct PMF peaks as unit directions, strongest first
///
/// A vertex is a peak when no vertex within the separation cone (either
/// hemisphere) is larger and it reaches `relative_threshold` of the strongest
/// value above the PMF floor. Antipodal duplicates are dropped.
pub fn find_peaks(pmf: &[f64], sphere: &Sphere, relative_threshold: f64, cos_separation: f64) -> Vec<[f64; 3]> {
    if pmf.is_empty() {
        return Vec::new();
    }
    let floor = pmf.iter().cloned().fold(f64::INFINITY, f64::min).max(0.0);
    let max = pmf.iter().cloned().fold(f64::NEG_INFINITY, f64::max);
    let range = max - floor;
    if !(range > 1e-12 * max.abs().max(1e-300)) {
        return Vec::new();
    }
    let cutoff = floor + relative_threshold * range;

    let vertices = &sphere.vertices;
    let mut candidates: Vec<usize> = (0..pmf.len())
        .filter(|&i| pmf[i] >= cutoff)
        .filter(|&i| {
            vertices
                .iter()
                .zip(pmf)
                .all(|(w, &pw)| pw <= pmf[i] || dot(&vertices[i], w).abs() < cos_separation)
        })
        .collect();
    candidates.sort_by(|&a, &b| pmf[b].total_cmp(&pmf[a]).then(a.cmp(&b)));

    let mut peaks: Vec<[f64; 3]> = Vec::new();
    for i in candidates {
        let v = vertices[i];
        if peaks.iter().all(|p| dot(p, &v).abs() < cos_separation) {
            peaks.push(v);
        }
    }
    peaks
}

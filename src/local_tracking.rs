//! Local (step-by-step) streamline propagation
//!
//! From every seed, each initial fiber direction is followed in both senses
//! with a fixed step until the tissue classifier stops it, the direction
//! getter finds no admissible direction, or the maximum length is reached.
//! The two halves are joined into one streamline running
//! backward-end -> seed -> forward-end.
//!
//! Propagation happens in voxel coordinates; seeds come in and streamlines go
//! out in world coordinates through the affine.

use log::{debug, warn};
use rand::rngs::StdRng;

use crate::direction::DirectionGetter;
use crate::error::{Result, TrackingError};
use crate::tissue::{TissueClass, TissueClassifier};
use crate::utils::affine::{apply_affine, invert_affine, voxel_sizes};

/// A streamline: world-space points
pub type Streamline = Vec<[f64; 3]>;

/// Default maximum number of steps per half streamline
pub const DEFAULT_MAX_LENGTH: usize = 500;

/// Streamline generator over a direction getter and a tissue classifier
pub struct LocalTracking<'a> {
    dg: &'a dyn DirectionGetter,
    classifier: &'a dyn TissueClassifier,
    affine: [f64; 16],
    inv_affine: [f64; 16],
    voxel_size: [f64; 3],
    step_size: f64,
    max_length: usize,
    max_cross: Option<usize>,
    return_all: bool,
}

impl<'a> LocalTracking<'a> {
    /// `step_size` is in world millimetres
    pub fn new(
        dg: &'a dyn DirectionGetter,
        classifier: &'a dyn TissueClassifier,
        affine: [f64; 16],
        step_size: f64,
    ) -> Result<Self> {
        if !(step_size > 0.0) || !step_size.is_finite() {
            return Err(TrackingError::invalid_parameter(format!(
                "step_size must be positive, got {}",
                step_size
            )));
        }
        let inv_affine = invert_affine(&affine)?;
        Ok(Self {
            dg,
            classifier,
            affine,
            inv_affine,
            voxel_size: voxel_sizes(&affine),
            step_size,
            max_length: DEFAULT_MAX_LENGTH,
            max_cross: None,
            return_all: true,
        })
    }

    /// Maximum number of steps in each half streamline (at least 1)
    ///
    /// A half holds up to `max_length + 1` points counting the seed.
    pub fn with_max_length(mut self, max_length: usize) -> Self {
        self.max_length = max_length.max(1);
        self
    }

    /// Track at most this many initial directions per seed
    pub fn with_max_cross(mut self, max_cross: Option<usize>) -> Self {
        self.max_cross = max_cross;
        self
    }

    /// When false, keep only streamlines that end in valid tissue (or leave the image) at both ends
    pub fn with_return_all(mut self, return_all: bool) -> Self {
        self.return_all = return_all;
        self
    }

    /// Track every seed, streamlines in seed order
    pub fn track_seeds(&self, seeds: &[[f64; 3]], rng: &mut StdRng) -> Vec<Streamline> {
        if seeds.is_empty() {
            warn!("Local tracking called with no seeds");
        }
        let mut out = Vec::new();
        for seed in seeds {
            self.track_seed(seed, rng, &mut out);
        }
        debug!("Tracked {} seeds into {} streamlines", seeds.len(), out.len());
        out
    }

    /// Track one world-space seed, appending its streamlines to `out`
    pub fn track_seed(&self, seed: &[f64; 3], rng: &mut StdRng, out: &mut Vec<Streamline>) {
        let s = apply_affine(&self.inv_affine, seed);
        let mut directions = self.dg.initial_directions(&s);

        if directions.is_empty() {
            if self.return_all {
                out.push(vec![*seed]);
            }
            return;
        }
        if let Some(max_cross) = self.max_cross {
            directions.truncate(max_cross);
        }

        for first_step in directions {
            let (forward, f_class) = self.local_tracker(&s, &first_step, rng);
            if !(self.return_all || is_valid_end(f_class)) {
                continue;
            }
            let back_step = [-first_step[0], -first_step[1], -first_step[2]];
            let (backward, b_class) = self.local_tracker(&s, &back_step, rng);
            if !(self.return_all || is_valid_end(b_class)) {
                continue;
            }

            let mut streamline = Vec::with_capacity(backward.len() + forward.len() - 1);
            streamline.extend(backward.iter().skip(1).rev().map(|p| apply_affine(&self.affine, p)));
            streamline.extend(forward.iter().map(|p| apply_affine(&self.affine, p)));
            out.push(streamline);
        }
    }

    /// Follow one half streamline from `seed` (voxel space)
    ///
    /// Returns the visited points (seed first) and the class that stopped it.
    /// A half that runs out of admissible directions reports `Trackpoint`.
    fn local_tracker(
        &self,
        seed: &[f64; 3],
        first_step: &[f64; 3],
        rng: &mut StdRng,
    ) -> (Vec<[f64; 3]>, TissueClass) {
        let mut points = Vec::with_capacity(64);
        points.push(*seed);

        let mut point = *seed;
        let mut direction = *first_step;
        let mut class = TissueClass::Trackpoint;

        while points.len() <= self.max_length {
            direction = match self.dg.get_direction(&point, &direction, rng) {
                Some(d) => d,
                None => break,
            };
            for a in 0..3 {
                point[a] += direction[a] / self.voxel_size[a] * self.step_size;
            }

            class = self.classifier.check_point(&point);
            match class {
                TissueClass::Trackpoint => points.push(point),
                TissueClass::Endpoint | TissueClass::InvalidPoint => {
                    points.push(point);
                    break;
                }
                TissueClass::OutsideImage => break,
            }
        }

        (points, class)
    }
}

fn is_valid_end(class: TissueClass) -> bool {
    matches!(class, TissueClass::Endpoint | TissueClass::OutsideImage)
}

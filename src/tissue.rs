//! Tissue classifiers (stopping criteria)
//!
//! After each step the tracker asks the classifier what kind of tissue the
//! new point lies in and stops propagating at anything but `Trackpoint`.

use crate::error::{Result, TrackingError};
use crate::utils::interpolation::{nearest_voxel, trilinear_3d};

/// Classification of a point in voxel coordinates
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum TissueClass {
    /// Keep tracking
    Trackpoint,
    /// Valid end of a streamline (kept as its last point)
    Endpoint,
    /// Left the image (last point dropped)
    OutsideImage,
    /// Non-finite position or stop map value (kept as its last point)
    InvalidPoint,
}

/// Decides whether tracking may continue at a point
pub trait TissueClassifier: Send + Sync {
    fn check_point(&self, point: &[f64; 3]) -> TissueClass;
}

fn check_len(what: &'static str, len: usize, dims: (usize, usize, usize)) -> Result<()> {
    let expected = dims.0 * dims.1 * dims.2;
    if len != expected {
        return Err(TrackingError::shape_mismatch(what, &[dims.0, dims.1, dims.2], &[len]));
    }
    Ok(())
}

/// Stops where an interpolated scalar map (e.g. FA) drops to `threshold`
pub struct ThresholdTissueClassifier {
    metric: Vec<f64>,
    dims: (usize, usize, usize),
    threshold: f64,
}

impl ThresholdTissueClassifier {
    pub fn new(metric: Vec<f64>, dims: (usize, usize, usize), threshold: f64) -> Result<Self> {
        check_len("stop mask", metric.len(), dims)?;
        Ok(Self { metric, dims, threshold })
    }
}

fn is_finite_point(point: &[f64; 3]) -> bool {
    point.iter().all(|c| c.is_finite())
}

impl TissueClassifier for ThresholdTissueClassifier {
    fn check_point(&self, point: &[f64; 3]) -> TissueClass {
        if !is_finite_point(point) {
            return TissueClass::InvalidPoint;
        }
        match trilinear_3d(&self.metric, self.dims, point) {
            None => TissueClass::OutsideImage,
            Some(v) if v.is_nan() => TissueClass::InvalidPoint,
            Some(v) if v > self.threshold => TissueClass::Trackpoint,
            Some(_) => TissueClass::Endpoint,
        }
    }
}

/// Stops when the nearest voxel of a binary mask is zero
pub struct BinaryTissueClassifier {
    mask: Vec<u8>,
    dims: (usize, usize, usize),
}

impl BinaryTissueClassifier {
    pub fn new(mask: Vec<u8>, dims: (usize, usize, usize)) -> Result<Self> {
        check_len("binary stop mask", mask.len(), dims)?;
        Ok(Self { mask, dims })
    }
}

impl TissueClassifier for BinaryTissueClassifier {
    fn check_point(&self, point: &[f64; 3]) -> TissueClass {
        if !is_finite_point(point) {
            return TissueClass::InvalidPoint;
        }
        match nearest_voxel(self.dims, point) {
            None => TissueClass::OutsideImage,
            Some(i) if self.mask[i] != 0 => TissueClass::Trackpoint,
            Some(_) => TissueClass::Endpoint,
        }
    }
}

//! Error types for tractography operations.
//!
//! Every fallible function in the crate returns [`Result`], so callers can
//! match on the failure kind instead of parsing message strings.

use thiserror::Error;

/// Main error type for tractography operations.
#[derive(Error, Debug)]
pub enum TrackingError {
    /// Filesystem failure.
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    /// NIfTI decoding or encoding failure.
    #[error("NIfTI error: {0}")]
    Nifti(String),

    /// TrackVis file decoding failure.
    #[error("TRK error: {0}")]
    Trk(String),

    /// JSON configuration failure.
    #[error("Config error: {0}")]
    Config(String),

    /// The last dimension of the parameter volume matches no known model.
    #[error("Unsupported model: {n_features} features per voxel is neither a tensor fit (12 or 27) nor a symmetric SH fit")]
    UnsupportedModel { n_features: usize },

    /// Coefficient count is not `(L+1)(L+2)/2` for an even `L`.
    #[error("Invalid SH order: {0} coefficients do not form a symmetric basis of even order")]
    InvalidShOrder(usize),

    /// PMF volume holds negative values.
    #[error("PMF should not have negative values")]
    NegativePmf,

    /// Affine cannot be inverted.
    #[error("Affine matrix is singular")]
    SingularAffine,

    /// Unknown direction getter name.
    #[error("Unknown direction getter '{0}' (expected 'det' or 'prob')")]
    UnknownDirections(String),

    /// Unknown execution engine name.
    #[error("Unknown engine '{0}' (expected 'serial' or 'parallel')")]
    UnknownEngine(String),

    /// Unknown parallel backend name.
    #[error("Unknown backend '{0}' (expected 'rayon' or 'threads')")]
    UnknownBackend(String),

    /// Invalid scalar configuration.
    #[error("Invalid parameter: {0}")]
    InvalidParameter(String),

    /// Worker pool could not be created.
    #[error("Thread pool error: {0}")]
    ThreadPool(String),

    /// Shape mismatch between volumes.
    #[error("Shape mismatch for {what}: expected {expected:?}, got {actual:?}")]
    ShapeMismatch {
        what: &'static str,
        expected: Vec<usize>,
        actual: Vec<usize>,
    },
}

/// Result type for tractography operations.
pub type Result<T> = std::result::Result<T, TrackingError>;

impl TrackingError {
    /// Create a NIfTI error.
    pub fn nifti(msg: impl Into<String>) -> Self {
        Self::Nifti(msg.into())
    }

    /// Create a TRK error.
    pub fn trk(msg: impl Into<String>) -> Self {
        Self::Trk(msg.into())
    }

    /// Create an invalid parameter error.
    pub fn invalid_parameter(msg: impl Into<String>) -> Self {
        Self::InvalidParameter(msg.into())
    }

    /// Create a shape mismatch error.
    pub fn shape_mismatch(what: &'static str, expected: &[usize], actual: &[usize]) -> Self {
        Self::ShapeMismatch {
            what,
            expected: expected.to_vec(),
            actual: actual.to_vec(),
        }
    }
}

use thiserror::Error;

/// I/O errors that can occur when fetching mask images from a source
#[derive(Debug, Clone, Error)]
pub enum IoError {
    /// Error from S3 or S3-compatible storage
    #[error("S3 error: {0}")]
    S3(String),

    /// Error from an HTTP image server
    #[error("HTTP error: {0}")]
    Http(String),

    /// Local filesystem error
    #[error("Filesystem error: {0}")]
    Filesystem(String),

    /// Network or connection error
    #[error("Connection error: {0}")]
    Connection(String),

    /// Object not found
    #[error("Object not found: {0}")]
    NotFound(String),

    /// Locator could not be understood by any source
    #[error("Invalid locator '{locator}': {reason}")]
    InvalidLocator { locator: String, reason: String },
}

/// Which side of a comparison a loaded raster belongs to.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Timepoint {
    Baseline,
    FollowUp,
}

impl std::fmt::Display for Timepoint {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Timepoint::Baseline => write!(f, "baseline"),
            Timepoint::FollowUp => write!(f, "follow-up"),
        }
    }
}

/// One or both source images failed to fetch or decode.
#[derive(Debug, Clone, Error)]
pub enum LoadError {
    /// The image bytes could not be fetched
    #[error("failed to fetch {timepoint} image '{locator}': {source}")]
    Fetch {
        timepoint: Timepoint,
        locator: String,
        #[source]
        source: IoError,
    },

    /// The image bytes could not be decoded
    #[error("failed to decode {timepoint} image '{locator}': {message}")]
    Decode {
        timepoint: Timepoint,
        locator: String,
        message: String,
    },

    /// The decode task panicked or was cancelled
    #[error("{timepoint} image '{locator}' load task aborted: {message}")]
    Aborted {
        timepoint: Timepoint,
        locator: String,
        message: String,
    },
}

impl LoadError {
    /// The side of the comparison that failed.
    pub fn timepoint(&self) -> Timepoint {
        match self {
            LoadError::Fetch { timepoint, .. }
            | LoadError::Decode { timepoint, .. }
            | LoadError::Aborted { timepoint, .. } => *timepoint,
        }
    }

    /// Whether the failure was a missing source object.
    pub fn is_not_found(&self) -> bool {
        matches!(
            self,
            LoadError::Fetch {
                source: IoError::NotFound(_),
                ..
            }
        )
    }
}

/// Errors raised by the synchronous diff pipeline.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum DiffError {
    /// Masks or rasters do not share identical dimensions
    #[error(
        "Dimension mismatch: baseline is {baseline_width}x{baseline_height}, \
         follow-up is {follow_up_width}x{follow_up_height}"
    )]
    DimensionMismatch {
        baseline_width: u32,
        baseline_height: u32,
        follow_up_width: u32,
        follow_up_height: u32,
    },

    /// Overlay construction or encoding failed
    #[error("Overlay render failed: {message}")]
    Render { message: String },
}

/// Errors for a full comparison request.
#[derive(Debug, Clone, Error)]
pub enum CompareError {
    /// One or both source images could not be loaded
    #[error("Load error: {0}")]
    Load(#[from] LoadError),

    /// Diff pipeline failure
    #[error("Diff error: {0}")]
    Diff(#[from] DiffError),

    /// A newer comparison was submitted for the same viewer
    #[error("Comparison {baseline} -> {follow_up} was superseded by a newer request")]
    Superseded { baseline: String, follow_up: String },
}

/// Errors from the study-record provider.
#[derive(Debug, Clone, Error)]
pub enum CatalogError {
    /// Patient is not known to the catalog
    #[error("Patient not found: {0}")]
    PatientNotFound(String),

    /// Study is not known for the patient
    #[error("Study {study_id} not found for patient {patient_id}")]
    StudyNotFound {
        patient_id: String,
        study_id: String,
    },

    /// Study has no segmentation mask recorded
    #[error("Study {study_id} has no segmentation mask")]
    MaskMissing { study_id: String },

    /// Not enough studies to pick a default comparison pair
    #[error("Patient {patient_id} has {count} studies; at least 2 are required to compare")]
    NotEnoughStudies { patient_id: String, count: usize },

    /// Catalog file could not be read or parsed
    #[error("Catalog unavailable: {0}")]
    Unavailable(String),
}

/// Errors constructing a raster buffer.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum RasterError {
    /// Width or height is zero
    #[error("Raster dimensions must be non-zero, got {width}x{height}")]
    EmptyDimensions { width: u32, height: u32 },

    /// Unsupported channel count (1-4 are supported)
    #[error("Unsupported channel count: {0} (expected 1-4)")]
    InvalidChannels(u8),

    /// Buffer length does not match width x height x channels
    #[error("Buffer size mismatch: expected {expected} bytes, got {actual}")]
    BufferSize { expected: usize, actual: usize },
}

//! Error types for the livability pipeline.
//!
//! Every failure belongs to one of four kinds (see [`ErrorKind`]). An
//! undefined accuracy is not an error: it travels as
//! [`crate::evaluate::Accuracy::Undefined`].

use std::fmt;

use thiserror::Error;

/// Pipeline stage that produced an error.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Stage {
    Covariates,
    FeatureStack,
    Labeling,
    Sampling,
    Splitting,
    Training,
    Evaluation,
    CrossValidation,
    Prediction,
    Export,
}

impl fmt::Display for Stage {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            Stage::Covariates => "covariates",
            Stage::FeatureStack => "feature stack",
            Stage::Labeling => "proxy labeling",
            Stage::Sampling => "sampling",
            Stage::Splitting => "splitting",
            Stage::Training => "training",
            Stage::Evaluation => "evaluation",
            Stage::CrossValidation => "cross-validation",
            Stage::Prediction => "prediction",
            Stage::Export => "export",
        };
        f.write_str(name)
    }
}

/// Coarse error taxonomy.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ErrorKind {
    /// Missing or misaligned input band, bad feature list, invalid parameter.
    Configuration,
    /// Empty sample sets, empty regions, collaborator failures.
    Data,
    /// Degenerate training input.
    Training,
    /// Model output outside the trained label domain.
    Prediction,
}

/// Main error type for livability operations.
#[derive(Error, Debug)]
pub enum Error {
    #[error("required band '{band}' is missing from the feature stack")]
    MissingBand { band: String },

    #[error("feature field list is empty")]
    EmptyFeatureList,

    #[error("band '{band}' appears more than once")]
    DuplicateBand { band: String },

    #[error("invalid parameter: {name} = {value} ({reason})")]
    InvalidParameter {
        name: &'static str,
        value: String,
        reason: String,
    },

    #[error("grid mismatch: expected {expected_width}x{expected_height}, got {width}x{height}")]
    GridMismatch {
        expected_width: usize,
        expected_height: usize,
        width: usize,
        height: usize,
    },

    #[error("feature vector bands {got:?} do not match model bands {expected:?}")]
    BandMismatch { expected: Vec<String>, got: Vec<String> },

    #[error("empty sample set reached {stage}")]
    EmptySampleSet { stage: Stage },

    #[error("region mask has zero eligible pixels")]
    EmptyRegion,

    #[error("sample at pixel {pixel} has no partition key")]
    MissingPartitionKey { pixel: usize },

    #[error("data source error: {0}")]
    Source(String),

    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    #[error("training set is empty")]
    EmptyTrainingSet,

    #[error("training set contains a single class ({label})")]
    SingleClass { label: u8 },

    #[error("training samples lack required feature field '{field}'")]
    MissingFeature { field: String },

    #[error("sample at pixel {pixel} has {got} feature values for {expected} bands")]
    FeatureLength { pixel: usize, expected: usize, got: usize },

    #[error("model predicted label {label} at ({row}, {col}), outside the trained domain")]
    LabelOutOfDomain { label: u8, row: usize, col: usize },

    #[error("{stage} stage failed: {source}")]
    Stage {
        stage: Stage,
        #[source]
        source: Box<Error>,
    },
}

impl Error {
    /// Taxonomy kind, looking through stage wrappers.
    pub fn kind(&self) -> ErrorKind {
        match self {
            Error::MissingBand { .. }
            | Error::EmptyFeatureList
            | Error::DuplicateBand { .. }
            | Error::InvalidParameter { .. }
            | Error::GridMismatch { .. }
            | Error::BandMismatch { .. } => ErrorKind::Configuration,
            Error::EmptySampleSet { .. }
            | Error::EmptyRegion
            | Error::MissingPartitionKey { .. }
            | Error::FeatureLength { .. }
            | Error::Source(_)
            | Error::Json(_) => ErrorKind::Data,
            Error::EmptyTrainingSet | Error::SingleClass { .. } | Error::MissingFeature { .. } => {
                ErrorKind::Training
            }
            Error::LabelOutOfDomain { .. } => ErrorKind::Prediction,
            Error::Stage { source, .. } => source.kind(),
        }
    }

    /// Stage that failed, if the error was raised inside the pipeline.
    pub fn stage(&self) -> Option<Stage> {
        match self {
            Error::Stage { stage, .. } => Some(*stage),
            _ => None,
        }
    }

    pub(crate) fn invalid(name: &'static str, value: impl ToString, reason: &str) -> Self {
        Error::InvalidParameter {
            name,
            value: value.to_string(),
            reason: reason.to_string(),
        }
    }
}

/// Attach a pipeline stage to a fallible result.
pub(crate) trait StageExt<T> {
    fn at(self, stage: Stage) -> Result<T>;
}

impl<T> StageExt<T> for Result<T> {
    fn at(self, stage: Stage) -> Result<T> {
        self.map_err(|e| match e {
            already @ Error::Stage { .. } => already,
            other => Error::Stage {
                stage,
                source: Box::new(other),
            },
        })
    }
}

/// Result type alias for livability operations.
pub type Result<T> = std::result::Result<T, Error>;

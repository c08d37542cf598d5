use std::fmt;
use thiserror::Error;

/// Pipeline stage an error originated from
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Stage {
    Dataset,
    Extraction,
    Vectorization,
    Combination,
    Training,
    Tuning,
    Persistence,
    Configuration,
}

impl fmt::Display for Stage {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            Stage::Dataset => "dataset",
            Stage::Extraction => "extraction",
            Stage::Vectorization => "vectorization",
            Stage::Combination => "combination",
            Stage::Training => "training",
            Stage::Tuning => "tuning",
            Stage::Persistence => "persistence",
            Stage::Configuration => "configuration",
        };
        f.write_str(name)
    }
}

/// Pipeline error types
#[derive(Error, Debug)]
pub enum PipelineError {
    /// URL could not be structurally parsed; callers of the non-failing
    /// extractor never see this, it is replaced by all-zero features
    #[error("[extraction] URL could not be parsed: {url}")]
    ParseDegraded { url: String },

    /// Row counts of two aligned blocks disagree
    #[error("[{stage}] shape mismatch: {left} has {left_rows} rows, {right} has {right_rows} rows")]
    ShapeMismatch {
        stage: Stage,
        left: &'static str,
        left_rows: usize,
        right: &'static str,
        right_rows: usize,
    },

    /// Input has zero rows
    #[error("[{stage}] empty dataset")]
    EmptyDataset { stage: Stage },

    /// Label outside {0, 1}
    #[error("[{stage}] invalid label {label} at row {row}, expected 0 or 1")]
    InvalidLabel { stage: Stage, row: usize, label: u8 },

    /// A classifier family failed to fit or predict
    #[error("[{stage}] {family} failed: {message}")]
    Training {
        stage: Stage,
        family: String,
        message: String,
    },

    /// Family name outside the supported set
    #[error("[tuning] unsupported model family: {0}")]
    UnsupportedFamily(String),

    /// Grid search could not be carried out
    #[error("[tuning] {0}")]
    Tuning(String),

    /// Transform requested before fit
    #[error("[{stage}] {component} must be fitted before transform")]
    NotFitted {
        stage: Stage,
        component: &'static str,
    },

    /// Configuration errors
    #[error("[configuration] {0}")]
    Configuration(String),

    /// Dataset provider errors
    #[error("[dataset] {0}")]
    Dataset(String),

    /// Serialization errors
    #[error("[{stage}] serialization error: {message}")]
    Serialization { stage: Stage, message: String },

    /// IO errors
    #[error("[{stage}] IO error: {source}")]
    Io {
        stage: Stage,
        #[source]
        source: std::io::Error,
    },
}

impl PipelineError {
    /// Stage that produced this error
    pub fn stage(&self) -> Stage {
        match self {
            PipelineError::ParseDegraded { .. } => Stage::Extraction,
            PipelineError::ShapeMismatch { stage, .. }
            | PipelineError::EmptyDataset { stage }
            | PipelineError::InvalidLabel { stage, .. }
            | PipelineError::Training { stage, .. }
            | PipelineError::NotFitted { stage, .. }
            | PipelineError::Serialization { stage, .. }
            | PipelineError::Io { stage, .. } => *stage,
            PipelineError::UnsupportedFamily(_) | PipelineError::Tuning(_) => Stage::Tuning,
            PipelineError::Configuration(_) => Stage::Configuration,
            PipelineError::Dataset(_) => Stage::Dataset,
        }
    }

    /// Get error code string
    pub fn error_code(&self) -> &str {
        match self {
            PipelineError::ParseDegraded { .. } => "PARSE_DEGRADED",
            PipelineError::ShapeMismatch { .. } => "SHAPE_MISMATCH",
            PipelineError::EmptyDataset { .. } => "EMPTY_DATASET",
            PipelineError::InvalidLabel { .. } => "INVALID_LABEL",
            PipelineError::Training { .. } => "TRAINING_ERROR",
            PipelineError::UnsupportedFamily(_) => "UNSUPPORTED_FAMILY",
            PipelineError::Tuning(_) => "TUNING_ERROR",
            PipelineError::NotFitted { .. } => "NOT_FITTED",
            PipelineError::Configuration(_) => "CONFIGURATION_ERROR",
            PipelineError::Dataset(_) => "DATASET_ERROR",
            PipelineError::Serialization { .. } => "SERIALIZATION_ERROR",
            PipelineError::Io { .. } => "IO_ERROR",
        }
    }

    pub(crate) fn training(family: impl fmt::Display, message: impl fmt::Display) -> Self {
        PipelineError::Training {
            stage: Stage::Training,
            family: family.to_string(),
            message: message.to_string(),
        }
    }

    pub(crate) fn io(stage: Stage, source: std::io::Error) -> Self {
        PipelineError::Io { stage, source }
    }

    /// Re-tag an error raised inside a shared helper with the calling stage
    pub(crate) fn at_stage(self, new_stage: Stage) -> Self {
        match self {
            PipelineError::ShapeMismatch {
                left,
                left_rows,
                right,
                right_rows,
                ..
            } => PipelineError::ShapeMismatch {
                stage: new_stage,
                left,
                left_rows,
                right,
                right_rows,
            },
            PipelineError::EmptyDataset { .. } => PipelineError::EmptyDataset { stage: new_stage },
            PipelineError::InvalidLabel { row, label, .. } => PipelineError::InvalidLabel {
                stage: new_stage,
                row,
                label,
            },
            PipelineError::Training {
                family, message, ..
            } => PipelineError::Training {
                stage: new_stage,
                family,
                message,
            },
            PipelineError::Io { source, .. } => PipelineError::Io {
                stage: new_stage,
                source,
            },
            other => other,
        }
    }
}

/// Conversion from std::io::Error; model files are the default IO target
impl From<std::io::Error> for PipelineError {
    fn from(err: std::io::Error) -> Self {
        PipelineError::Io {
            stage: Stage::Persistence,
            source: err,
        }
    }
}

/// Conversion from serde_json::Error
impl From<serde_json::Error> for PipelineError {
    fn from(err: serde_json::Error) -> Self {
        PipelineError::Serialization {
            stage: Stage::Dataset,
            message: err.to_string(),
        }
    }
}

/// Conversion from bincode::Error
impl From<bincode::Error> for PipelineError {
    fn from(err: bincode::Error) -> Self {
        PipelineError::Serialization {
            stage: Stage::Persistence,
            message: err.to_string(),
        }
    }
}

/// Conversion from config::ConfigError
impl From<config::ConfigError> for PipelineError {
    fn from(err: config::ConfigError) -> Self {
        PipelineError::Configuration(err.to_string())
    }
}

/// Result type alias
pub type Result<T> = std::result::Result<T, PipelineError>;

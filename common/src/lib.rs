use arrow::error::ArrowError;
use datafusion::error::DataFusionError;
use thiserror::Error;

pub mod config;

pub type Result<T> = std::result::Result<T, Error>;

#[derive(Error, Debug)]
pub enum Error {
    #[error("Source unavailable: {0}")]
    SourceUnavailable(String),

    #[error("Sink unavailable: {0}")]
    SinkUnavailable(String),

    #[error("Sink rejected write to '{table}': {reason}")]
    SinkWriteRejected { table: String, reason: String },

    /// One or more blocking quality checks failed. `detail` is the JSON
    /// rendering of the failing check results.
    #[error("Validation failed at stage {stage} ({}): {detail}", checks.join(", "))]
    ValidationFailed {
        stage: String,
        checks: Vec<String>,
        detail: String,
    },

    /// `None` in `keys` is the group of rows whose key is NULL.
    #[error("Conflicting dimension rows in '{dimension}' for keys {keys:?}")]
    ConflictingDimensionRow {
        dimension: String,
        keys: Vec<Option<i64>>,
    },

    #[error("Run timed out before stage {stage} (limit {limit_secs}s)")]
    TimedOut { stage: String, limit_secs: u64 },

    #[error("Stage {stage} failed: {source}")]
    StageFailed {
        stage: String,
        #[source]
        source: Box<Error>,
    },

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    #[error("Configuration error: {0}")]
    Config(#[from] ::config::ConfigError),

    #[error("Arrow error: {0}")]
    Arrow(#[from] ArrowError),

    #[error("DataFusion error: {0}")]
    DataFusion(#[from] DataFusionError),

    #[error("Invalid input: {0}")]
    InvalidInput(String),

    #[error("Schema mismatch: {0}")]
    SchemaMismatch(String),

    #[error("{0}")]
    Other(String),
}

impl Error {
    /// Process exit code for the CLI: 2 for data-quality failures, 1 for
    /// everything else.
    pub fn exit_code(&self) -> i32 {
        match self {
            Error::ValidationFailed { .. } | Error::ConflictingDimensionRow { .. } => 2,
            Error::StageFailed { source, .. } => source.exit_code(),
            _ => 1,
        }
    }

    /// Tags the error with the pipeline stage it came from, unless it already
    /// names one.
    pub fn at_stage(self, stage: &str) -> Self {
        match self {
            Error::ValidationFailed { .. } | Error::TimedOut { .. } | Error::StageFailed { .. } => {
                self
            }
            other => Error::StageFailed {
                stage: stage.to_string(),
                source: Box::new(other),
            },
        }
    }

    /// The innermost error, past any stage tag.
    pub fn root(&self) -> &Error {
        match self {
            Error::StageFailed { source, .. } => source.root(),
            other => other,
        }
    }
}

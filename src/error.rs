use thiserror::Error;

pub type Result<T> = std::result::Result<T, PipelineError>;

/// Failures that abort a run. Nothing here is recoverable mid-pipeline; the
/// caller fixes the input and re-runs from scratch.
#[derive(Debug, Error)]
pub enum PipelineError {
    #[error("failed to access {path}: {source}")]
    Io {
        path: String,
        #[source]
        source: std::io::Error,
    },

    #[error("malformed CSV in {path}: {source}")]
    Csv {
        path: String,
        #[source]
        source: csv::Error,
    },

    #[error("{path} is missing required column `{column}`")]
    MissingColumn { path: String, column: &'static str },

    #[error("{path} row {row}: invalid {column} value {value:?}")]
    InvalidValue {
        path: String,
        row: usize,
        column: &'static str,
        value: String,
    },

    #[error("{path} row {row}: duplicate key {key}")]
    DuplicateKey {
        path: String,
        row: usize,
        key: String,
    },

    #[error("configuration error: {0}")]
    Config(String),
}

impl PipelineError {
    pub fn invalid(path: &str, row: usize, column: &'static str, value: &str) -> Self {
        Self::InvalidValue {
            path: path.to_string(),
            row,
            column,
            value: value.to_string(),
        }
    }
}

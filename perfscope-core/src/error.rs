//! Failure kinds shared by the perfscope crates

use thiserror::Error;

pub type PerfResult<T> = Result<T, PerfError>;

#[derive(Error, Debug)]
pub enum PerfError {
    /// The backend could not be asked, or its answer was not understood
    #[error("Query failed: {0}")]
    Query(String),

    /// The backend answered with `"status": "error"`
    #[error("Backend returned error status: {error_type}: {message}")]
    Backend { error_type: String, message: String },

    #[error("No data returned for query: {0}")]
    NoData(String),

    #[error("Cannot parse {0}")]
    Parse(String),

    #[error("Invalid input: {0}")]
    Validation(String),

    #[error("Bad configuration: {0}")]
    Configuration(String),

    #[error("Bad time window: {0}")]
    TimeRange(String),

    #[error("Missing column: {0}")]
    MissingColumn(String),

    #[error("Cannot reach backend: {0}")]
    Connection(String),

    #[error("Backend did not answer within {timeout_ms}ms")]
    Timeout { timeout_ms: u64 },

    #[error(transparent)]
    Io(#[from] std::io::Error),

    #[error(transparent)]
    Json(#[from] serde_json::Error),
}

impl PerfError {
    pub fn query(message: impl Into<String>) -> Self {
        PerfError::Query(message.into())
    }

    pub fn no_data(query: impl Into<String>) -> Self {
        PerfError::NoData(query.into())
    }

    pub fn parse(message: impl Into<String>) -> Self {
        PerfError::Parse(message.into())
    }

    pub fn validation(message: impl Into<String>) -> Self {
        PerfError::Validation(message.into())
    }

    pub fn missing_column(name: impl Into<String>) -> Self {
        PerfError::MissingColumn(name.into())
    }

    /// Short label used as a structured logging field
    pub fn category(&self) -> &'static str {
        use PerfError::*;
        match self {
            Query(_) => "query",
            Backend { .. } => "backend",
            NoData(_) => "no_data",
            Parse(_) => "parse",
            Validation(_) => "validation",
            Configuration(_) => "configuration",
            TimeRange(_) => "time_range",
            MissingColumn(_) => "missing_column",
            Connection(_) => "connection",
            Timeout { .. } => "timeout",
            Io(_) => "io",
            Json(_) => "json",
        }
    }
}

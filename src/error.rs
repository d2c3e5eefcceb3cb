use thiserror::Error;

/// Reasons a telemetry item is rejected at ingestion.
#[derive(Debug, Clone, PartialEq, Error)]
pub enum ValidationError {
    #[error("missing required field `{0}`")]
    MissingField(String),
    #[error("field `{0}` is not a finite number")]
    NonFinite(String),
    #[error("field `{field}` carries sentinel value `{value}`")]
    Sentinel { field: String, value: String },
    #[error("field `{field}` has unexpected type, expected {expected}")]
    TypeMismatch { field: String, expected: &'static str },
    #[error("telemetry item is empty")]
    Empty,
}

#[derive(Debug, Error)]
pub enum MonitorError {
    #[error("unknown unit `{0}`")]
    UnknownUnit(String),
    #[error("unit `{0}` is already registered")]
    DuplicateUnit(String),
    #[error("unknown fault scenario `{0}`")]
    UnknownScenario(String),
    #[error("invalid configuration: {0}")]
    InvalidConfig(String),
    #[error("configuration parse error: {0}")]
    ConfigParse(#[from] serde_json::Error),
    #[error("i/o error: {0}")]
    Io(#[from] std::io::Error),
    #[error("scheduling error: {0}")]
    Scheduling(&'static str),
}

pub type Result<T> = core::result::Result<T, MonitorError>;

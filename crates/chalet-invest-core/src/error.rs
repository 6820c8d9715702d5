use thiserror::Error;

#[derive(Debug, Error)]
pub enum ChaletError {
    #[error("Invalid input: {field}: {reason}")]
    InvalidInput { field: String, reason: String },

    #[error("Missing required field '{field}' in section '{section}'")]
    MissingField { section: String, field: String },

    #[error("Invalid distribution for '{variable}': {reason}")]
    InvalidDistribution { variable: String, reason: String },

    #[error("Invalid correlation matrix: {0}")]
    InvalidCorrelation(String),

    #[error("Division by zero in {context}")]
    DivisionByZero { context: String },

    #[error("Insufficient data: {0}")]
    InsufficientData(String),

    #[error("Serialization error: {0}")]
    SerializationError(String),
}

impl ChaletError {
    pub(crate) fn invalid(field: impl Into<String>, reason: impl Into<String>) -> Self {
        ChaletError::InvalidInput {
            field: field.into(),
            reason: reason.into(),
        }
    }
}

impl From<serde_json::Error> for ChaletError {
    fn from(e: serde_json::Error) -> Self {
        ChaletError::SerializationError(e.to_string())
    }
}

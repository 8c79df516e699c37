use crate::target::Target;
use thiserror::Error;

pub type AirqResult<T> = std::result::Result<T, AirqError>;

#[derive(Debug, Error)]
pub enum AirqError {
    #[error("not enough valid samples for {target}: {valid} < {required}")]
    InsufficientData { target: Target, valid: usize, required: usize },

    #[error("no trained model for {0}")]
    MissingModel(Target),

    #[error("artifact version not found: {0}")]
    ArtifactNotFound(String),

    #[error("feature schema mismatch: {0}")]
    SchemaMismatch(String),

    #[error("invalid observation record: {0}")]
    InvalidRecord(String),

    #[error("model error: {0}")]
    Model(String),

    #[error("artifact error: {0}")]
    Artifact(String),

    #[error("configuration error: {0}")]
    Config(String),

    #[error("training run cancelled")]
    Cancelled,

    #[error(transparent)]
    Io(#[from] std::io::Error),

    #[error(transparent)]
    Json(#[from] serde_json::Error),

    #[error(transparent)]
    Other(#[from] anyhow::Error),
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_insufficient_data_message_names_target() {
        let err = AirqError::InsufficientData { target: Target::Pm25, valid: 3, required: 10 };
        assert_eq!(err.to_string(), "not enough valid samples for pm2_5: 3 < 10");
    }

    #[test]
    fn test_io_error_conversion() {
        let io_err = std::io::Error::new(std::io::ErrorKind::NotFound, "gone");
        let err: AirqError = io_err.into();
        assert!(matches!(err, AirqError::Io(_)));
    }
}

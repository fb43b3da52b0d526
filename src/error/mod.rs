use crate::storage::StorageError;
use thiserror::Error;

/// Result type for httpfuse operations
pub type Result<T> = std::result::Result<T, FuseError>;

/// Error types surfaced by the guarded client and its setup
#[derive(Error, Debug)]
pub enum FuseError {
    /// The call was rejected by policy. The dependency was never contacted;
    /// callers can branch on this for fallback logic.
    #[error("circuit open for service: {service}")]
    CircuitOpen { service: String },

    #[error("storage backend unavailable: {0}")]
    StorageUnavailable(String),

    #[error("configuration error: {0}")]
    Config(String),

    #[error("duplicate circuit breaker declared for client: {0}")]
    DuplicateDecoration(String),

    #[error("http error: {0}")]
    Http(#[from] reqwest::Error),
}

impl From<StorageError> for FuseError {
    fn from(err: StorageError) -> Self {
        FuseError::StorageUnavailable(err.to_string())
    }
}

impl FuseError {
    /// True when the call was short-circuited rather than attempted
    pub fn is_circuit_open(&self) -> bool {
        matches!(self, FuseError::CircuitOpen { .. })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_circuit_open_display() {
        let err = FuseError::CircuitOpen {
            service: "payments.https://api.example.com/charge_POST".to_string(),
        };
        assert_eq!(
            err.to_string(),
            "circuit open for service: payments.https://api.example.com/charge_POST"
        );
        assert!(err.is_circuit_open());
    }

    #[test]
    fn test_config_error_is_not_circuit_open() {
        let err = FuseError::Config("failure_count_threshold must be greater than zero".to_string());
        assert!(!err.is_circuit_open());
    }

    #[test]
    fn test_storage_error_converts_to_unavailable() {
        let err: FuseError = StorageError::Unavailable("connection refused".to_string()).into();
        assert!(matches!(err, FuseError::StorageUnavailable(_)));
    }
}

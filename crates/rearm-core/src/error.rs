use thiserror::Error;

/// Top-level error type for the Rearm system.
///
/// Subsystem crates define their own error types and implement
/// `From<RearmError>` so that storage and configuration failures travel
/// through `?` without manual wrapping.
#[derive(Debug, Error)]
#[non_exhaustive]
pub enum RearmError {
    #[error("Configuration error: {0}")]
    Config(String),

    #[error("Storage error: {0}")]
    Storage(String),

    #[error("Queue error: {0}")]
    Queue(String),

    #[error("API error: {0}")]
    Api(String),

    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Serialization error: {0}")]
    Serialization(String),

    #[error("Shutdown in progress")]
    ShuttingDown,
}

impl From<toml::de::Error> for RearmError {
    fn from(err: toml::de::Error) -> Self {
        RearmError::Config(err.to_string())
    }
}

impl From<toml::ser::Error> for RearmError {
    fn from(err: toml::ser::Error) -> Self {
        RearmError::Config(err.to_string())
    }
}

impl From<serde_json::Error> for RearmError {
    fn from(err: serde_json::Error) -> Self {
        RearmError::Serialization(err.to_string())
    }
}

/// A specialized `Result` type for Rearm operations.
pub type Result<T> = std::result::Result<T, RearmError>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_error_display() {
        let cases: Vec<(RearmError, &str)> = vec![
            (
                RearmError::Config("bad key".to_string()),
                "Configuration error: bad key",
            ),
            (
                RearmError::Storage("disk full".to_string()),
                "Storage error: disk full",
            ),
            (
                RearmError::Queue("receipt expired".to_string()),
                "Queue error: receipt expired",
            ),
            (RearmError::Api("bind".to_string()), "API error: bind"),
            (
                RearmError::Serialization("invalid json".to_string()),
                "Serialization error: invalid json",
            ),
            (RearmError::ShuttingDown, "Shutdown in progress"),
        ];

        for (error, expected) in cases {
            assert_eq!(error.to_string(), expected);
        }
    }

    #[test]
    fn test_io_error_conversion() {
        let io_err = std::io::Error::new(std::io::ErrorKind::NotFound, "file not found");
        let err: RearmError = io_err.into();
        assert!(matches!(err, RearmError::Io(_)));
        assert!(err.to_string().starts_with("I/O error:"));
    }

    #[test]
    fn test_error_from_toml_de() {
        let err: std::result::Result<toml::Value, _> = toml::from_str("invalid = [[[");
        let err: RearmError = err.unwrap_err().into();
        assert!(matches!(err, RearmError::Config(_)));
    }

    #[test]
    fn test_error_from_serde_json() {
        let err: std::result::Result<serde_json::Value, _> = serde_json::from_str("{ nope }");
        let err: RearmError = err.unwrap_err().into();
        assert!(matches!(err, RearmError::Serialization(_)));
    }

    #[test]
    fn test_result_type_with_question_mark() {
        fn inner() -> Result<String> {
            let io_result: std::result::Result<i32, std::io::Error> = Ok(42);
            let value = io_result?;
            Ok(value.to_string())
        }

        assert_eq!(inner().unwrap(), "42");
    }
}

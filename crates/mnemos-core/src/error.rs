use std::path::PathBuf;

use thiserror::Error;

/// Top-level error type for the Mnemos memory engine.
///
/// Every fallible operation in the workspace returns this type so that the
/// `?` operator works across crate boundaries. Nothing in the engine retries
/// or swallows one of these; they are surfaced to the caller as-is.
#[derive(Debug, Error)]
#[non_exhaustive]
pub enum MnemosError {
    #[error("Dimension mismatch: expected {expected}, got {actual}")]
    DimensionMismatch { expected: usize, actual: usize },

    #[error("Duplicate record id: {0}")]
    DuplicateId(String),

    #[error("Alignment mismatch: {records} records but {vectors} vectors")]
    AlignmentMismatch { records: usize, vectors: usize },

    #[error("Position {position} out of range for store of length {len}")]
    OutOfRange { position: usize, len: usize },

    #[error("Index returned position {position} but the store holds {len} records")]
    PositionOutOfRange { position: usize, len: usize },

    #[error("Empty input")]
    EmptyInput,

    #[error("Invalid k: {0} (must be at least 1)")]
    InvalidK(usize),

    #[error("Not found: {}", .0.display())]
    NotFound(PathBuf),

    #[error("Corrupt data: {0}")]
    CorruptData(String),

    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Configuration error: {0}")]
    Config(String),

    #[error("Serialization error: {0}")]
    Serialization(String),

    #[error("Embedding error: {0}")]
    Embedding(String),
}

impl MnemosError {
    /// Shorthand for building a [`MnemosError::CorruptData`].
    pub fn corrupt(msg: impl Into<String>) -> Self {
        MnemosError::CorruptData(msg.into())
    }
}

impl From<toml::de::Error> for MnemosError {
    fn from(err: toml::de::Error) -> Self {
        MnemosError::Config(err.to_string())
    }
}

impl From<toml::ser::Error> for MnemosError {
    fn from(err: toml::ser::Error) -> Self {
        MnemosError::Config(err.to_string())
    }
}

impl From<serde_json::Error> for MnemosError {
    fn from(err: serde_json::Error) -> Self {
        MnemosError::Serialization(err.to_string())
    }
}

/// A specialized `Result` type for Mnemos operations.
pub type Result<T> = std::result::Result<T, MnemosError>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_error_display() {
        let cases: Vec<(MnemosError, &str)> = vec![
            (
                MnemosError::DimensionMismatch {
                    expected: 384,
                    actual: 2,
                },
                "Dimension mismatch: expected 384, got 2",
            ),
            (
                MnemosError::DuplicateId("conv_0".into()),
                "Duplicate record id: conv_0",
            ),
            (
                MnemosError::OutOfRange {
                    position: 5,
                    len: 3,
                },
                "Position 5 out of range for store of length 3",
            ),
            (MnemosError::EmptyInput, "Empty input"),
            (MnemosError::InvalidK(0), "Invalid k: 0 (must be at least 1)"),
            (
                MnemosError::NotFound(PathBuf::from("/tmp/missing.csv")),
                "Not found: /tmp/missing.csv",
            ),
            (
                MnemosError::corrupt("bad magic"),
                "Corrupt data: bad magic",
            ),
        ];

        for (error, expected) in cases {
            assert_eq!(error.to_string(), expected);
        }
    }

    #[test]
    fn test_io_error_conversion() {
        let io_err = std::io::Error::new(std::io::ErrorKind::PermissionDenied, "access denied");
        let err: MnemosError = io_err.into();
        assert!(matches!(err, MnemosError::Io(_)));
        assert!(err.to_string().starts_with("I/O error:"));
        assert!(err.to_string().contains("access denied"));
    }

    #[test]
    fn test_error_from_toml_de() {
        let err: std::result::Result<toml::Value, _> = toml::from_str("invalid = [[[");
        let err: MnemosError = err.unwrap_err().into();
        assert!(matches!(err, MnemosError::Config(_)));
    }

    #[test]
    fn test_error_from_serde_json() {
        let err: std::result::Result<serde_json::Value, _> = serde_json::from_str("{ nope }");
        let err: MnemosError = err.unwrap_err().into();
        assert!(matches!(err, MnemosError::Serialization(_)));
    }

    #[test]
    fn test_result_type_with_question_mark() {
        fn inner() -> Result<u32> {
            let io_result: std::result::Result<u32, std::io::Error> = Ok(7);
            Ok(io_result? + 1)
        }

        assert_eq!(inner().unwrap(), 8);
    }
}

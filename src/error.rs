//! Error types for the retrieval pipeline

use thiserror::Error;

#[derive(Error, Debug)]
pub enum Error {
    #[error("Required artifact not found: {0}")]
    MissingArtifact(String),

    #[error("Embedding error: {0}")]
    Embedding(String),

    #[error("Entity extraction error: {0}")]
    Extraction(String),

    #[error("Community detection error: {0}")]
    CommunityDetection(String),

    #[error("Relevance scoring error: {0}")]
    Scoring(String),

    #[error("Generation error: {0}")]
    Generation(String),

    #[error("Configuration error: {0}")]
    Config(String),

    #[error("IO error: {0}")]
    IoError(#[from] std::io::Error),

    #[error("Serialization error: {0}")]
    SerializationError(String),

    #[error("Invalid argument: {0}")]
    InvalidArgument(String),

    #[error("Connection error: {0}")]
    ConnectionError(String),
}

pub type Result<T> = std::result::Result<T, Error>;

impl From<serde_json::Error> for Error {
    fn from(err: serde_json::Error) -> Self {
        Error::SerializationError(err.to_string())
    }
}

impl From<serde_yaml::Error> for Error {
    fn from(err: serde_yaml::Error) -> Self {
        Error::SerializationError(err.to_string())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_error_display_missing_artifact() {
        let err = Error::MissingArtifact("processed/chunks.json".to_string());
        assert!(err.to_string().contains("Required artifact not found"));
        assert!(err.to_string().contains("processed/chunks.json"));
    }

    #[test]
    fn test_error_display_generation() {
        let err = Error::Generation("model not loaded".to_string());
        assert!(err.to_string().contains("Generation error"));
        assert!(err.to_string().contains("model not loaded"));
    }

    #[test]
    fn test_error_from_io_error() {
        let io_err = std::io::Error::new(std::io::ErrorKind::NotFound, "file not found");
        let err: Error = io_err.into();
        assert!(matches!(err, Error::IoError(_)));
        assert!(err.to_string().contains("IO error"));
    }

    #[test]
    fn test_error_from_serde_json() {
        let json_err = serde_json::from_str::<i32>("not a number").unwrap_err();
        let err: Error = json_err.into();

        assert!(matches!(err, Error::SerializationError(_)));
        assert!(err.to_string().contains("Serialization error"));
    }

    #[test]
    fn test_error_from_serde_yaml() {
        let yaml_err = serde_yaml::from_str::<Vec<i32>>("{ invalid yaml [").unwrap_err();
        let err: Error = yaml_err.into();

        assert!(matches!(err, Error::SerializationError(_)));
    }

    #[test]
    fn test_error_all_variants_debug() {
        let variants: Vec<Error> = vec![
            Error::MissingArtifact("a".to_string()),
            Error::Embedding("e".to_string()),
            Error::Extraction("x".to_string()),
            Error::CommunityDetection("c".to_string()),
            Error::Scoring("s".to_string()),
            Error::Generation("g".to_string()),
            Error::Config("cfg".to_string()),
            Error::SerializationError("serial".to_string()),
            Error::InvalidArgument("arg".to_string()),
            Error::ConnectionError("conn".to_string()),
        ];

        for err in variants {
            let debug_str = format!("{:?}", err);
            assert!(!debug_str.is_empty());
        }
    }
}

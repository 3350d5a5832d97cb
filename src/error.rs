//! Error types for wiki_rag

use thiserror::Error;

#[derive(Error, Debug)]
pub enum Error {
    #[error("No index found at {0}. Please build the index first.")]
    IndexNotFound(String),

    #[error("Index is locked by another process")]
    IndexLocked,

    #[error("Invalid index: {0}")]
    InvalidIndex(String),

    #[error("Empty input: {0}")]
    EmptyInput(String),

    #[error("Backend unavailable: {0}")]
    BackendUnavailable(String),

    #[error("Malformed backend response: {0}")]
    MalformedResponse(String),

    #[error("GraphQL error: {0}")]
    GraphQl(String),

    #[error("Configuration error: {0}")]
    Config(String),

    #[error("Invalid argument: {0}")]
    InvalidArgument(String),

    #[error("IO error: {0}")]
    IoError(#[from] std::io::Error),

    #[error("Serialization error: {0}")]
    SerializationError(String),
}

pub type Result<T> = std::result::Result<T, Error>;

impl Error {
    /// True when the error means "there is nothing to query yet".
    pub fn is_not_found(&self) -> bool {
        matches!(self, Error::IndexNotFound(_))
    }
}

impl From<serde_json::Error> for Error {
    fn from(err: serde_json::Error) -> Self {
        Error::SerializationError(err.to_string())
    }
}

impl From<reqwest::Error> for Error {
    fn from(err: reqwest::Error) -> Self {
        if err.is_decode() {
            Error::MalformedResponse(err.to_string())
        } else {
            Error::BackendUnavailable(err.to_string())
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_error_display_index_not_found() {
        let err = Error::IndexNotFound("./storage".to_string());
        let msg = err.to_string();
        assert!(msg.contains("No index found at ./storage"));
        assert!(msg.contains("build the index first"));
    }

    #[test]
    fn test_error_display_index_locked() {
        let err = Error::IndexLocked;
        assert!(err.to_string().contains("locked by another process"));
    }

    #[test]
    fn test_error_display_empty_input() {
        let err = Error::EmptyInput("no documents to index".to_string());
        assert!(err.to_string().contains("Empty input"));
        assert!(err.to_string().contains("no documents"));
    }

    #[test]
    fn test_error_display_backend_unavailable() {
        let err = Error::BackendUnavailable("connection refused".to_string());
        let msg = err.to_string();
        assert!(msg.contains("Backend unavailable"));
        assert!(msg.contains("connection refused"));
    }

    #[test]
    fn test_error_display_malformed_response() {
        let err = Error::MalformedResponse("missing field `response`".to_string());
        assert!(err.to_string().contains("Malformed backend response"));
    }

    #[test]
    fn test_error_display_graphql() {
        let err = Error::GraphQl("Forbidden".to_string());
        assert_eq!(err.to_string(), "GraphQL error: Forbidden");
    }

    #[test]
    fn test_is_not_found_only_for_missing_index() {
        assert!(Error::IndexNotFound("x".into()).is_not_found());
        assert!(!Error::IndexLocked.is_not_found());
        assert!(!Error::BackendUnavailable("x".into()).is_not_found());
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
    fn test_error_all_variants_debug() {
        let variants: Vec<Error> = vec![
            Error::IndexNotFound("storage".to_string()),
            Error::IndexLocked,
            Error::InvalidIndex("version".to_string()),
            Error::EmptyInput("docs".to_string()),
            Error::BackendUnavailable("ollama".to_string()),
            Error::MalformedResponse("json".to_string()),
            Error::GraphQl("gql".to_string()),
            Error::Config("cfg".to_string()),
            Error::InvalidArgument("arg".to_string()),
            Error::SerializationError("serial".to_string()),
        ];

        for err in variants {
            let debug_str = format!("{:?}", err);
            assert!(!debug_str.is_empty());
        }
    }
}

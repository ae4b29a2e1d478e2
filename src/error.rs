//! Error types for the agent client.

use thiserror::Error;

use crate::modules::upload::FieldError;

/// Errors that can occur while talking to the chat backend, the module store
/// or the client-side storage.
#[derive(Debug, Error)]
pub enum BabError {
    /// HTTP request failed before a response was received.
    #[error("HTTP request failed: {0}")]
    HttpRequest(#[from] reqwest::Error),

    /// HTTP client configuration error.
    #[error("HTTP client error: {0}")]
    HttpClient(String),

    /// The remote service answered with a non-success status.
    ///
    /// The display form is the bare message so it can be shown to the user as is.
    #[error("{message}")]
    Api {
        /// HTTP status code.
        status: u16,
        /// Message extracted from the response body.
        message: String,
    },

    /// URL parsing error.
    #[error("Invalid URL: {0}")]
    InvalidUrl(#[from] url::ParseError),

    /// JSON parsing error.
    #[error("JSON parsing error: {0}")]
    JsonParse(#[from] serde_json::Error),

    /// The response parsed but did not have the expected shape.
    #[error("Unexpected response: {0}")]
    UnexpectedResponse(String),

    /// Regex error.
    #[error("Regex error: {0}")]
    Regex(#[from] regex::Error),

    /// Configuration error.
    #[error("Configuration error: {0}")]
    Config(String),

    /// Client storage error.
    #[error("Storage error: {0}")]
    Storage(String),

    /// IO error.
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    /// Module upload rejected before submission.
    #[error("Invalid module upload: {}", describe_fields(.0))]
    InvalidUpload(Vec<FieldError>),

    /// A selected module is not owned by the current account.
    #[error("Module {0} is no longer owned")]
    NotOwned(String),

    /// The build configuration does not allow instantiation yet.
    #[error("Cannot instantiate agent: {0}")]
    NotReady(String),
}

fn describe_fields(fields: &[FieldError]) -> String {
    fields
        .iter()
        .map(ToString::to_string)
        .collect::<Vec<_>>()
        .join("; ")
}

/// Convenience result alias for client operations.
pub type BabResult<T> = Result<T, BabError>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_api_error_displays_bare_message() {
        let err = BabError::Api {
            status: 500,
            message: "agent is offline".to_string(),
        };
        assert_eq!(err.to_string(), "agent is offline");
    }

    #[test]
    fn test_not_owned_names_module() {
        let err = BabError::NotOwned("0xabc".to_string());
        assert_eq!(err.to_string(), "Module 0xabc is no longer owned");
    }

    #[test]
    fn test_invalid_upload_lists_fields() {
        let err = BabError::InvalidUpload(vec![
            FieldError::new("name", "name is required"),
            FieldError::new("content", "invalid JSON"),
        ]);
        assert_eq!(
            err.to_string(),
            "Invalid module upload: name: name is required; content: invalid JSON"
        );
    }
}

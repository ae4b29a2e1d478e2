//! Response checking shared by the service clients.

use reqwest::Response;
use serde::Deserialize;

use crate::error::{BabError, BabResult};

/// Message used when an error response carries no usable body.
pub const DEFAULT_ERROR_MESSAGE: &str = "An error occurred.";

/// A payload that may be a single item or a list of items.
#[derive(Clone, Debug, PartialEq, Eq, Deserialize)]
#[serde(untagged)]
pub enum OneOrMany<T> {
    /// A list of items.
    Many(Vec<T>),
    /// A single item.
    One(T),
}

impl<T> OneOrMany<T> {
    /// Normalise to a list.
    #[must_use]
    pub fn into_vec(self) -> Vec<T> {
        match self {
            Self::Many(items) => items,
            Self::One(item) => vec![item],
        }
    }
}

/// Extract a human-readable message from an error response body.
///
/// A JSON body with a string `message` field wins, then the raw body text,
/// then `fallback`.
#[must_use]
pub fn error_message_or(body: &str, fallback: &str) -> String {
    if let Ok(value) = serde_json::from_str::<serde_json::Value>(body) {
        if let Some(message) = value.get("message").and_then(|m| m.as_str()) {
            if !message.is_empty() {
                return message.to_string();
            }
        }
        if value.is_object() {
            return fallback.to_string();
        }
    }

    let trimmed = body.trim();
    if trimmed.is_empty() {
        fallback.to_string()
    } else {
        trimmed.to_string()
    }
}

/// Extract a message with the generic fallback.
#[must_use]
pub fn error_message(body: &str) -> String {
    error_message_or(body, DEFAULT_ERROR_MESSAGE)
}

/// Turn a non-success response into `BabError::Api`.
///
/// # Errors
/// Returns the API error when the status is not a success.
pub async fn ensure_success(response: Response, fallback: &str) -> BabResult<Response> {
    let status = response.status();
    if status.is_success() {
        return Ok(response);
    }

    let body = response.text().await.unwrap_or_default();
    tracing::error!("{fallback} ({status}): {body}");

    Err(BabError::Api {
        status: status.as_u16(),
        message: error_message_or(&body, fallback),
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_json_message_wins() {
        assert_eq!(
            error_message(r#"{"message": "Agent not found", "code": 404}"#),
            "Agent not found"
        );
    }

    #[test]
    fn test_object_without_message_uses_fallback() {
        assert_eq!(error_message(r#"{"error": true}"#), DEFAULT_ERROR_MESSAGE);
    }

    #[test]
    fn test_plain_text_body() {
        assert_eq!(error_message("  Bad Gateway \n"), "Bad Gateway");
    }

    #[test]
    fn test_empty_body() {
        assert_eq!(error_message_or("", "Failed to fetch memory module"), "Failed to fetch memory module");
    }

    #[test]
    fn test_one_or_many() {
        let one: Result<OneOrMany<u8>, _> = serde_json::from_str("3");
        assert_eq!(one.map(OneOrMany::into_vec).ok(), Some(vec![3]));

        let many: Result<OneOrMany<u8>, _> = serde_json::from_str("[1, 2]");
        assert_eq!(many.map(OneOrMany::into_vec).ok(), Some(vec![1, 2]));
    }
}

//! User-supplied module uploads and their validation.

use std::fmt;

use serde::{Deserialize, Serialize};

use crate::modules::kind::ModuleType;

/// A validation problem attached to one form field.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct FieldError {
    /// Name of the offending field.
    pub field: String,
    /// Human-readable description.
    pub message: String,
}

impl FieldError {
    /// Build a field error.
    #[must_use]
    pub fn new(field: impl Into<String>, message: impl Into<String>) -> Self {
        Self {
            field: field.into(),
            message: message.into(),
        }
    }
}

impl fmt::Display for FieldError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}: {}", self.field, self.message)
    }
}

/// Data entered in the upload form before the module is published.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ModuleUpload {
    /// Display name.
    pub name: String,
    /// Module type.
    #[serde(rename = "type")]
    pub module_type: ModuleType,
    /// Description.
    pub description: String,
    /// Image URL, also used as the thumbnail.
    pub image_url: String,
    /// Module content as a JSON string.
    pub content: String,
}

impl ModuleUpload {
    /// Start an upload of the given type with empty fields.
    #[must_use]
    pub fn new(name: impl Into<String>, module_type: ModuleType) -> Self {
        Self {
            name: name.into(),
            module_type,
            description: String::new(),
            image_url: String::new(),
            content: String::new(),
        }
    }

    /// Set the JSON content.
    #[must_use]
    pub fn with_content(mut self, content: impl Into<String>) -> Self {
        self.content = content.into();
        self
    }

    /// Set the description.
    #[must_use]
    pub fn with_description(mut self, description: impl Into<String>) -> Self {
        self.description = description.into();
        self
    }

    /// Set the image URL.
    #[must_use]
    pub fn with_image_url(mut self, url: impl Into<String>) -> Self {
        self.image_url = url.into();
        self
    }

    /// Check every field, returning one error per offending field.
    ///
    /// An empty list means the upload may be submitted.
    #[must_use]
    pub fn validate(&self) -> Vec<FieldError> {
        let mut errors = Vec::new();

        if self.name.trim().is_empty() {
            errors.push(FieldError::new("name", "name is required"));
        }

        if let Err(err) = serde_json::from_str::<serde_json::Value>(&self.content) {
            errors.push(FieldError::new("content", format!("invalid JSON: {err}")));
        }

        if !self.image_url.is_empty() && url::Url::parse(&self.image_url).is_err() {
            errors.push(FieldError::new("imageUrl", "must be an absolute URL"));
        }

        errors
    }
}

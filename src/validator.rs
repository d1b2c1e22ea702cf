//! Validation of incoming request bodies.
//!
//! Runs on the raw JSON value so type mismatches (a numeric title, say) are
//! reported with a field-specific message instead of a generic decode error.
//! The first violated rule wins.

use serde_json::{Map, Value};
use thiserror::Error;
use tracing::debug;
use url::Url;

use crate::config::ValidationConfig;

#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum ValidationError {
    #[error("Request body is required")]
    MissingBody,

    #[error("Request body must be valid JSON")]
    MalformedJson,

    #[error("Request body must be a JSON object")]
    NotAnObject,

    #[error("Invalid URL format")]
    InvalidUrl,

    #[error("Content is required and must be a string")]
    MissingContent,

    #[error("Content is too short to summarize")]
    ContentTooShort,

    #[error("Content is too long. Please provide a shorter text")]
    ContentTooLong,

    #[error("Title must be a string")]
    InvalidTitle,

    #[error("Description must be a string")]
    InvalidDescription,

    #[error("Custom prompt must be a string")]
    InvalidCustomPrompt,

    #[error("HTML is required")]
    MissingHtml,
}

/// Checks summarize bodies against the configured content bounds.
///
/// URL is optional; content is required.
pub struct RequestValidator {
    config: ValidationConfig,
}

impl RequestValidator {
    pub fn new(config: ValidationConfig) -> Self {
        Self { config }
    }

    /// Parses raw request bytes and validates the result.
    pub fn validate_bytes(&self, body: &[u8]) -> Result<Value, ValidationError> {
        if body.iter().all(u8::is_ascii_whitespace) {
            return Err(ValidationError::MissingBody);
        }
        let value: Value = serde_json::from_slice(body).map_err(|e| {
            debug!(error = %e, "Request body is not JSON");
            ValidationError::MalformedJson
        })?;
        self.validate(Some(&value))?;
        Ok(value)
    }

    pub fn validate(&self, body: Option<&Value>) -> Result<(), ValidationError> {
        let fields = match body {
            None | Some(Value::Null) => return Err(ValidationError::MissingBody),
            Some(Value::Object(fields)) => fields,
            Some(_) => return Err(ValidationError::NotAnObject),
        };

        validate_url(fields.get("url"))?;
        self.validate_content(fields.get("content"))?;
        require_string_if_present(fields, "title", ValidationError::InvalidTitle)?;
        require_string_if_present(fields, "description", ValidationError::InvalidDescription)?;
        require_string_if_present(fields, "customPrompt", ValidationError::InvalidCustomPrompt)?;

        Ok(())
    }

    fn validate_content(&self, content: Option<&Value>) -> Result<(), ValidationError> {
        let content = content
            .and_then(Value::as_str)
            .ok_or(ValidationError::MissingContent)?;

        let len = content.chars().count();
        if len < self.config.min_content_chars {
            debug!(len, "Content too short");
            return Err(ValidationError::ContentTooShort);
        }
        if len > self.config.max_content_chars {
            debug!(len, "Content too long");
            return Err(ValidationError::ContentTooLong);
        }
        Ok(())
    }
}

fn validate_url(url: Option<&Value>) -> Result<(), ValidationError> {
    match url {
        None | Some(Value::Null) => Ok(()),
        Some(Value::String(s)) if s.trim().is_empty() => Ok(()),
        Some(Value::String(s)) => match Url::parse(s.trim()) {
            Ok(_) => Ok(()),
            Err(e) => {
                debug!(url = %s, error = %e, "Rejecting malformed URL");
                Err(ValidationError::InvalidUrl)
            }
        },
        Some(_) => Err(ValidationError::InvalidUrl),
    }
}

fn require_string_if_present(
    fields: &Map<String, Value>,
    name: &str,
    err: ValidationError,
) -> Result<(), ValidationError> {
    match fields.get(name) {
        None | Some(Value::Null) | Some(Value::String(_)) => Ok(()),
        Some(_) => Err(err),
    }
}

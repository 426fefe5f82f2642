use serde::{Deserialize, Serialize};
use utoipa::ToSchema;

/// Represents an error response body.
#[derive(Debug, Deserialize, Serialize, PartialEq, Eq, ToSchema)]
pub struct ErrorResponse {
    /// The main error message.
    pub message: String,
    /// Optional additional details about the error.
    pub details: Option<String>,
}

impl ErrorResponse {
    /// Creates a new error response with just a message.
    pub fn new(message: impl Into<String>) -> Self {
        Self {
            message: message.into(),
            details: None,
        }
    }

    /// Creates a new error response with message and details.
    pub fn with_details(message: impl Into<String>, details: impl Into<String>) -> Self {
        Self {
            message: message.into(),
            details: Some(details.into()),
        }
    }
}

impl std::fmt::Display for ErrorResponse {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match &self.details {
            Some(details) => write!(f, "{}: {}", self.message, details),
            None => write!(f, "{}", self.message),
        }
    }
}

impl std::error::Error for ErrorResponse {}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn display_includes_details_when_present() {
        let plain = ErrorResponse::new("boom");
        assert_eq!(plain.to_string(), "boom");

        let detailed = ErrorResponse::with_details("boom", "context");
        assert_eq!(detailed.to_string(), "boom: context");
    }

    #[test]
    fn serializes_null_details() {
        let error = ErrorResponse::new("boom");
        let json = serde_json::to_string(&error).unwrap();
        assert!(json.contains("\"details\":null"));
    }
}

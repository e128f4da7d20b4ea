use reqwest::StatusCode;
use serde_json::Value;
use thiserror::Error;

use crate::auth::StorageError;

#[derive(Error, Debug)]
pub enum ApiError {
    /// The server answered with a non-success status. The body is kept intact.
    #[error("HTTP {status}: {}", truncate_body(.body))]
    Status { status: StatusCode, body: String },

    /// No HTTP response was obtained
    #[error("Network error: {0}")]
    Network(String),

    #[error("Request timed out")]
    Timeout,

    #[error("Invalid response: {0}")]
    InvalidResponse(String),

    #[error("Token storage error: {0}")]
    Storage(#[from] StorageError),

    #[error("Configuration error: {0}")]
    Configuration(String),
}

/// Maximum length for error response bodies in error messages
const MAX_ERROR_BODY_LENGTH: usize = 500;

/// Truncate a response body to avoid logging excessive data
fn truncate_body(body: &str) -> String {
    if body.len() <= MAX_ERROR_BODY_LENGTH {
        return body.to_string();
    }
    let mut end = MAX_ERROR_BODY_LENGTH;
    while !body.is_char_boundary(end) {
        end -= 1;
    }
    format!("{}... (truncated, {} total bytes)", &body[..end], body.len())
}

impl ApiError {
    pub fn from_status(status: StatusCode, body: impl Into<String>) -> Self {
        ApiError::Status {
            status,
            body: body.into(),
        }
    }

    /// HTTP status of the failed response, if there was one
    pub fn status(&self) -> Option<StatusCode> {
        match self {
            ApiError::Status { status, .. } => Some(*status),
            _ => None,
        }
    }

    /// Raw body of the failed response, if there was one
    pub fn body(&self) -> Option<&str> {
        match self {
            ApiError::Status { body, .. } => Some(body),
            _ => None,
        }
    }

    pub fn is_unauthorized(&self) -> bool {
        self.status() == Some(StatusCode::UNAUTHORIZED)
    }
}

impl From<reqwest::Error> for ApiError {
    fn from(error: reqwest::Error) -> Self {
        if error.is_timeout() {
            ApiError::Timeout
        } else if let Some(status) = error.status() {
            ApiError::Status {
                status,
                body: String::new(),
            }
        } else {
            ApiError::Network(error.to_string())
        }
    }
}

/// Extract a human-readable message from an error's JSON body.
///
/// Looks at `detail`, `message`, `nonFieldErrors`/`non_field_errors`, the
/// values of a nested `errors` object, then any other field. Falls back to
/// the raw body when it is plain text, then to `fallback`.
pub fn api_error_message(error: &ApiError, fallback: &str) -> String {
    let Some(body) = error.body() else {
        return fallback.to_string();
    };
    if body.trim().is_empty() {
        return fallback.to_string();
    }

    let payload: Value = match serde_json::from_str(body) {
        Ok(value) => value,
        Err(_) => return body.to_string(),
    };

    let data = match &payload {
        Value::String(s) if !s.trim().is_empty() => return s.clone(),
        Value::Object(map) => map,
        _ => return fallback.to_string(),
    };

    const KNOWN: [&str; 5] = ["detail", "message", "nonFieldErrors", "non_field_errors", "errors"];

    let direct = ["detail", "message", "nonFieldErrors", "non_field_errors"]
        .iter()
        .find_map(|key| data.get(*key).and_then(first_string));
    if let Some(message) = direct {
        return message;
    }

    if let Some(Value::Object(errors)) = data.get("errors") {
        if let Some(message) = errors.values().find_map(first_string) {
            return message;
        }
    }

    data.iter()
        .filter(|(key, _)| !KNOWN.contains(&key.as_str()))
        .find_map(|(_, value)| first_string(value))
        .unwrap_or_else(|| fallback.to_string())
}

fn first_string(value: &Value) -> Option<String> {
    match value {
        Value::String(s) if !s.trim().is_empty() => Some(s.clone()),
        Value::Array(items) => items
            .iter()
            .filter_map(Value::as_str)
            .find(|s| !s.trim().is_empty())
            .map(str::to_string),
        Value::Object(map) => ["detail", "message"]
            .iter()
            .filter_map(|key| map.get(*key).and_then(Value::as_str))
            .find(|s| !s.trim().is_empty())
            .map(str::to_string),
        _ => None,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn status_error(body: &str) -> ApiError {
        ApiError::from_status(StatusCode::BAD_REQUEST, body)
    }

    #[test]
    fn test_status_helpers() {
        let error = ApiError::from_status(StatusCode::UNAUTHORIZED, "nope");
        assert!(error.is_unauthorized());
        assert_eq!(error.status(), Some(StatusCode::UNAUTHORIZED));
        assert_eq!(error.body(), Some("nope"));

        let error = ApiError::Network("refused".to_string());
        assert!(!error.is_unauthorized());
        assert_eq!(error.status(), None);
    }

    #[test]
    fn test_display_truncates_but_body_is_intact() {
        let body = "x".repeat(MAX_ERROR_BODY_LENGTH + 100);
        let error = status_error(&body);
        let message = error.to_string();
        assert!(message.contains("truncated"));
        assert!(message.len() < body.len());
        assert_eq!(error.body().map(str::len), Some(body.len()));
    }

    #[test]
    fn test_truncate_respects_char_boundaries() {
        let body = "é".repeat(MAX_ERROR_BODY_LENGTH);
        assert!(truncate_body(&body).contains("truncated"));
    }

    #[test]
    fn test_message_from_detail() {
        let error = status_error(r#"{"detail": "Token is invalid or expired"}"#);
        assert_eq!(api_error_message(&error, "fallback"), "Token is invalid or expired");
    }

    #[test]
    fn test_message_from_non_field_errors() {
        let error = status_error(r#"{"non_field_errors": ["", "Bad credentials"]}"#);
        assert_eq!(api_error_message(&error, "fallback"), "Bad credentials");
    }

    #[test]
    fn test_message_from_nested_errors() {
        let error = status_error(r#"{"errors": {"email": ["Enter a valid email."]}}"#);
        assert_eq!(api_error_message(&error, "fallback"), "Enter a valid email.");
    }

    #[test]
    fn test_message_from_any_field() {
        let error = status_error(r#"{"password": ["Too short."]}"#);
        assert_eq!(api_error_message(&error, "fallback"), "Too short.");
    }

    #[test]
    fn test_message_follows_document_order() {
        let error = status_error(r#"{"password": ["Too short."], "email": ["Enter a valid email."]}"#);
        assert_eq!(api_error_message(&error, "fallback"), "Too short.");

        let error = status_error(r#"{"errors": {"username": ["Taken."], "email": ["Invalid."]}}"#);
        assert_eq!(api_error_message(&error, "fallback"), "Taken.");
    }

    #[test]
    fn test_message_fallbacks() {
        assert_eq!(api_error_message(&status_error("plain text"), "fb"), "plain text");
        assert_eq!(api_error_message(&status_error(""), "fb"), "fb");
        assert_eq!(api_error_message(&status_error("{}"), "fb"), "fb");
        assert_eq!(api_error_message(&status_error("[1, 2]"), "fb"), "fb");
        assert_eq!(api_error_message(&ApiError::Timeout, "fb"), "fb");
    }
}

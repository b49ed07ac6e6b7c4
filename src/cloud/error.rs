//! Cloud API errors
//!
//! Typed errors for the client layer. Everything above this layer wraps them
//! in `anyhow` with context, and recovers the typed value through
//! [`find_cloud_error`] when it needs to branch on the failure kind.

use serde::Deserialize;
use thiserror::Error;

/// Maximum length of response body to log (to avoid logging sensitive data)
const MAX_LOG_BODY_LENGTH: usize = 200;

/// Longest message `format_error` returns before adding `...`
const MAX_FORMATTED_CHARS: usize = 160;

#[derive(Debug, Error)]
pub enum CloudError {
    #[error("configuration error: {0}")]
    Config(String),

    #[error("service type {0} is invalid or not supported")]
    UnknownService(String),

    #[error("failed to send request: {0}")]
    Transport(#[from] reqwest::Error),

    #[error("API request failed: {status}{}", format_code(.code))]
    Api {
        status: u16,
        code: Option<String>,
        message: Option<String>,
    },

    #[error("failed to parse response JSON: {0}")]
    Decode(#[from] serde_json::Error),

    #[error("unexpected response shape at `{path}`: expected {expected}")]
    UnexpectedShape { path: String, expected: &'static str },

    #[error("field `{0}` is missing from the API response")]
    MissingField(String),
}

fn format_code(code: &Option<String>) -> String {
    code.as_ref()
        .map(|c| format!(" ({})", c))
        .unwrap_or_default()
}

pub type Result<T> = std::result::Result<T, CloudError>;

impl CloudError {
    /// Build an API error from a status code and the raw response body
    pub fn from_response(status: u16, body: &str) -> Self {
        let parsed = serde_json::from_str::<ErrorBody>(body).ok();
        let (code, message) = parsed.map(ErrorBody::into_parts).unwrap_or((None, None));

        CloudError::Api {
            status,
            code,
            message,
        }
    }

    /// HTTP status of an API error
    pub fn status(&self) -> Option<u16> {
        match self {
            CloudError::Api { status, .. } => Some(*status),
            _ => None,
        }
    }

    /// Whether this error means the remote object does not exist
    pub fn is_not_found(&self) -> bool {
        matches!(self, CloudError::Api { status: 404, .. } | CloudError::MissingField(_))
    }
}

/// Error payloads come in two shapes depending on the service:
/// `{"error_code": "...", "error_msg": "..."}` or
/// `{"error": {"code": "...", "message": "..."}}`.
#[derive(Debug, Deserialize)]
struct ErrorBody {
    #[serde(default)]
    error_code: Option<String>,
    #[serde(default)]
    error_msg: Option<String>,
    #[serde(default)]
    error: Option<NestedError>,
}

#[derive(Debug, Deserialize)]
struct NestedError {
    #[serde(default)]
    code: Option<serde_json::Value>,
    #[serde(default)]
    message: Option<String>,
}

impl ErrorBody {
    fn into_parts(self) -> (Option<String>, Option<String>) {
        if self.error_code.is_some() || self.error_msg.is_some() {
            return (self.error_code, self.error_msg);
        }
        match self.error {
            Some(nested) => {
                let code = nested.code.map(|c| match c {
                    serde_json::Value::String(s) => s,
                    other => other.to_string(),
                });
                (code, nested.message)
            }
            None => (None, None),
        }
    }
}

/// Walk an `anyhow` chain and return the first typed cloud error in it
pub fn find_cloud_error(err: &anyhow::Error) -> Option<&CloudError> {
    err.chain().find_map(|e| e.downcast_ref::<CloudError>())
}

/// Sanitize response body for logging
/// Truncates long responses and strips control characters
pub fn sanitize_for_log(body: &str) -> String {
    let truncated = if body.len() > MAX_LOG_BODY_LENGTH {
        let mut cut = MAX_LOG_BODY_LENGTH;
        while !body.is_char_boundary(cut) {
            cut -= 1;
        }
        format!("{}... [truncated, {} bytes total]", &body[..cut], body.len())
    } else {
        body.to_string()
    };

    truncated.replace(|c: char| c.is_control(), "")
}

/// Format an error for display
/// Maps common status codes to short messages and never echoes raw API bodies
pub fn format_error(error: &anyhow::Error) -> String {
    if let Some(status) = find_cloud_error(error).and_then(CloudError::status) {
        return match status {
            400 => "Invalid request. Check your parameters.".to_string(),
            401 => "Authentication failed. Check HW_AUTH_TOKEN or your IAM credentials.".to_string(),
            403 => "Permission denied. Check your IAM policies.".to_string(),
            404 => "Resource not found.".to_string(),
            409 => "Resource conflict. The resource may already exist or be in use.".to_string(),
            429 => "Rate limit exceeded. Please try again later.".to_string(),
            500..=599 => "Service temporarily unavailable. Please try again.".to_string(),
            other => format!("Request failed with status {}.", other),
        };
    }

    let error_str = format!("{:#}", error);
    let printable = error_str.chars().filter(|c| !c.is_control());
    let truncated = printable.clone().count() > MAX_FORMATTED_CHARS;
    let sanitized = printable.take(MAX_FORMATTED_CHARS).collect::<String>();

    if truncated {
        format!("{}...", sanitized)
    } else {
        sanitized
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_from_response_flat_error_body() {
        let err = CloudError::from_response(
            404,
            r#"{"error_code": "ELB.8904", "error_msg": "listener not found"}"#,
        );
        match &err {
            CloudError::Api {
                status,
                code,
                message,
            } => {
                assert_eq!(*status, 404);
                assert_eq!(code.as_deref(), Some("ELB.8904"));
                assert_eq!(message.as_deref(), Some("listener not found"));
            }
            other => panic!("unexpected error: {:?}", other),
        }
        assert!(err.is_not_found());
        assert_eq!(err.to_string(), "API request failed: 404 (ELB.8904)");
    }

    #[test]
    fn test_from_response_nested_error_body() {
        let err = CloudError::from_response(
            403,
            r#"{"error": {"code": 403, "message": "forbidden"}}"#,
        );
        match err {
            CloudError::Api { code, message, .. } => {
                assert_eq!(code.as_deref(), Some("403"));
                assert_eq!(message.as_deref(), Some("forbidden"));
            }
            other => panic!("unexpected error: {:?}", other),
        }
    }

    #[test]
    fn test_from_response_non_json_body() {
        let err = CloudError::from_response(502, "<html>bad gateway</html>");
        assert_eq!(err.status(), Some(502));
        assert!(!err.is_not_found());
    }

    #[test]
    fn test_not_found_survives_context() {
        let err = anyhow::Error::new(CloudError::from_response(404, ""))
            .context("error retrieving event stream");
        assert!(find_cloud_error(&err).is_some_and(CloudError::is_not_found));
        assert_eq!(format_error(&err), "Resource not found.");
    }

    #[test]
    fn test_format_error_truncates_by_printable_chars() {
        let err = anyhow::anyhow!("line one\nline two\ttabbed");
        assert_eq!(format_error(&err), "line oneline twotabbed");

        let err = anyhow::anyhow!("{}", "é".repeat(MAX_FORMATTED_CHARS));
        assert_eq!(format_error(&err), "é".repeat(MAX_FORMATTED_CHARS));

        let err = anyhow::anyhow!("{}", "y".repeat(MAX_FORMATTED_CHARS + 1));
        assert_eq!(format_error(&err), format!("{}...", "y".repeat(MAX_FORMATTED_CHARS)));
    }

    #[test]
    fn test_sanitize_truncates_long_bodies() {
        let body = "x".repeat(500);
        let sanitized = sanitize_for_log(&body);
        assert!(sanitized.starts_with(&"x".repeat(200)));
        assert!(sanitized.contains("500 bytes total"));
        assert_eq!(sanitize_for_log("a\nb"), "ab");
    }
}

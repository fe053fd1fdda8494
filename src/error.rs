use thiserror::Error;

/// Type alias for Result with OrganizerError
pub type Result<T> = std::result::Result<T, OrganizerError>;

/// Error types for the PDF organizer
#[derive(Error, Debug)]
pub enum OrganizerError {
    /// Gmail API returned an error
    #[error("Gmail API error: {0}")]
    ApiError(String),

    /// Authentication failed
    #[error("Authentication failed: {0}")]
    AuthError(String),

    /// Network-related error (connection issues, etc.)
    #[error("Network error: {0}")]
    NetworkError(String),

    /// A bounded wait ran out
    #[error("Timed out after {seconds} seconds: {operation}")]
    Timeout { operation: String, seconds: u64 },

    /// Server returned 5xx error
    #[error("Server error (HTTP {status}): {message}")]
    ServerError { status: u16, message: String },

    /// Resource not found (404)
    #[error("Not found: {0}")]
    NotFound(String),

    /// Bad request (400)
    #[error("Bad request: {0}")]
    BadRequest(String),

    /// Forbidden (403)
    #[error("Access forbidden: {0}")]
    Forbidden(String),

    /// Invalid message format or parsing error
    #[error("Invalid message format: {0}")]
    InvalidMessageFormat(String),

    /// Attachment payload could not be decoded
    #[error("Attachment decode error: {0}")]
    DecodeError(String),

    /// IO error (file operations, etc.)
    #[error("IO error: {0}")]
    IoError(#[from] std::io::Error),

    /// JSON serialization/deserialization error
    #[error("Serialization error: {0}")]
    SerializationError(#[from] serde_json::Error),

    /// Configuration error
    #[error("Configuration error: {0}")]
    ConfigError(String),
}

impl OrganizerError {
    /// Credential or configuration errors; these end a run wherever they
    /// surface
    pub fn is_startup(&self) -> bool {
        matches!(
            self,
            OrganizerError::AuthError(_) | OrganizerError::ConfigError(_)
        )
    }
}

impl From<google_gmail1::Error> for OrganizerError {
    fn from(error: google_gmail1::Error) -> Self {
        match error {
            // HTTP response with status code (non-success responses)
            google_gmail1::Error::Failure(ref response) => {
                let status = response.status();
                let status_code = status.as_u16();
                let message = format!(
                    "HTTP {}: {}",
                    status_code,
                    status.canonical_reason().unwrap_or("Unknown")
                );

                match status_code {
                    404 => OrganizerError::NotFound("Resource not found".to_string()),
                    400 => OrganizerError::BadRequest(message),
                    401 => OrganizerError::AuthError(message),
                    403 => OrganizerError::Forbidden(message),
                    500..=599 => OrganizerError::ServerError {
                        status: status_code,
                        message,
                    },
                    _ => OrganizerError::ApiError(message),
                }
            }
            google_gmail1::Error::BadRequest(ref err) => {
                OrganizerError::BadRequest(format!("{}", err))
            }
            google_gmail1::Error::HttpError(ref err) => {
                OrganizerError::NetworkError(format!("Connection error: {}", err))
            }
            google_gmail1::Error::Io(err) => OrganizerError::NetworkError(err.to_string()),
            // Body did not match the expected schema, including bad base64 payloads
            google_gmail1::Error::JsonDecodeError(body, err) => OrganizerError::DecodeError(
                format!("{} (response was {} bytes)", err, body.len()),
            ),
            google_gmail1::Error::MissingToken(err) => {
                OrganizerError::AuthError(format!("No access token available: {}", err))
            }
            _ => OrganizerError::ApiError(error.to_string()),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_startup_errors() {
        assert!(OrganizerError::ConfigError("bad month".to_string()).is_startup());
        assert!(OrganizerError::AuthError("denied".to_string()).is_startup());
        assert!(!OrganizerError::ApiError("boom".to_string()).is_startup());
    }

    #[test]
    fn test_error_display() {
        let error = OrganizerError::Timeout {
            operation: "authorization code".to_string(),
            seconds: 300,
        };
        let display = format!("{}", error);
        assert!(display.contains("300 seconds"));
        assert!(display.contains("authorization code"));

        let auth_error = OrganizerError::AuthError("Invalid token".to_string());
        assert!(format!("{}", auth_error).contains("Authentication failed"));
    }

    #[test]
    fn test_io_error_conversion() {
        let io = std::io::Error::new(std::io::ErrorKind::PermissionDenied, "read-only");
        let error: OrganizerError = io.into();
        assert!(matches!(error, OrganizerError::IoError(_)));
    }
}

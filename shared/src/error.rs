//! Error types for the support widget client.

use thiserror::Error;

/// Result type alias using our Error type.
pub type Result<T> = std::result::Result<T, Error>;

/// Phrases the backend puts in bodies when question processing blew up.
const SERVER_ERROR_MARKERS: [&str; 3] = [
    "500",
    "Internal Server Error",
    "An error occurred while processing",
];

/// Errors that can occur while talking to the support backend.
#[derive(Error, Debug)]
pub enum Error {
    /// The request never reached the server
    #[error("Connection failed: {0}")]
    Connectivity(String),

    /// The server answered with a non-success status
    #[error("HTTP error {status}: {body}")]
    Http { status: u16, body: String },

    /// The response body was not what we expected
    #[error("Invalid response format from server: {0}")]
    Parse(String),

    /// Serialization error
    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    /// Any other transport failure
    #[error("Request error: {0}")]
    Request(String),

    /// Configuration error
    #[error("Configuration error: {0}")]
    Config(String),

    /// Validation error
    #[error("Validation error: {0}")]
    Validation(String),

    /// A required field was absent from a response
    #[error("Missing field: {0}")]
    MissingField(&'static str),
}

impl Error {
    /// HTTP status code carried by this error, if any.
    pub fn status(&self) -> Option<u16> {
        match self {
            Error::Http { status, .. } => Some(*status),
            _ => None,
        }
    }

    /// True when the backend was unreachable.
    pub fn is_connectivity(&self) -> bool {
        matches!(self, Error::Connectivity(_))
    }

    /// True for 5xx responses or bodies reporting an internal failure.
    pub fn is_server_error(&self) -> bool {
        match self {
            Error::Http { status, body } => {
                *status >= 500 || SERVER_ERROR_MARKERS.iter().any(|m| body.contains(m))
            }
            _ => false,
        }
    }

    /// True when conversation creation collided with an existing user row.
    pub fn is_duplicate_identity(&self) -> bool {
        match self {
            Error::Http { body, .. } => {
                body.contains("duplicate key value")
                    && body.contains("user_")
                    && body.contains("already exists")
            }
            _ => false,
        }
    }
}

impl From<reqwest::Error> for Error {
    fn from(err: reqwest::Error) -> Self {
        if err.is_connect() || err.is_timeout() {
            Error::Connectivity(err.to_string())
        } else if err.is_decode() {
            Error::Parse(err.to_string())
        } else if let Some(status) = err.status() {
            Error::Http {
                status: status.as_u16(),
                body: err.to_string(),
            }
        } else {
            Error::Request(err.to_string())
        }
    }
}

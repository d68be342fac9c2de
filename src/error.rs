// Error handling module
// Defines credential failure classes and HTTP response conversion

use axum::{
    http::StatusCode,
    response::{IntoResponse, Response},
    Json,
};
use serde_json::json;
use thiserror::Error;

/// Longest slice of an issuer error body kept in errors and logs
pub const MAX_ERROR_BODY_LEN: usize = 500;

/// Why a transport-level exchange with the issuer failed
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TransportKind {
    Connect,
    Timeout,
    Other,
}

/// Failures of the credential lifecycle, classified for logging and retry policy.
///
/// None of these ever reach request handlers: the manager absorbs them into
/// either a stale token or an empty one.
#[derive(Error, Debug)]
pub enum AuthError {
    /// Client identity missing; no network I/O was attempted
    #[error("Configuration error: {0}")]
    Configuration(String),

    /// Connection failure or timeout contacting the issuer
    #[error("Transport error ({kind:?}): {message}")]
    Transport { kind: TransportKind, message: String },

    /// Issuer answered with something other than a usable token
    #[error("Protocol error: {0}")]
    Protocol(#[from] ProtocolError),

    /// Snapshot file could not be read or written
    #[error("Persistence error: {0}")]
    Persistence(String),
}

#[derive(Error, Debug, PartialEq)]
pub enum ProtocolError {
    #[error("issuer returned status {status}: {body}")]
    Status { status: u16, body: String },

    #[error("malformed JSON in issuer response: {0}")]
    MalformedBody(String),

    #[error("issuer response missing access_token")]
    MissingAccessToken,
}

impl AuthError {
    /// Stable classification label, used as the `kind` log field
    pub fn kind(&self) -> &'static str {
        match self {
            AuthError::Configuration(_) => "configuration",
            AuthError::Transport { .. } => "transport",
            AuthError::Protocol(_) => "protocol",
            AuthError::Persistence(_) => "persistence",
        }
    }

    pub(crate) fn transport(err: reqwest::Error) -> Self {
        let kind = if err.is_timeout() {
            TransportKind::Timeout
        } else if err.is_connect() {
            TransportKind::Connect
        } else {
            TransportKind::Other
        };
        AuthError::Transport {
            kind,
            message: err.to_string(),
        }
    }
}

/// Cut an error body down to [`MAX_ERROR_BODY_LEN`] characters
pub fn truncate_body(body: &str) -> String {
    body.chars().take(MAX_ERROR_BODY_LEN).collect()
}

/// API errors returned by the HTTP surface
#[derive(Error, Debug)]
pub enum ApiError {
    /// Endpoint exists but is disabled in this mode
    #[error("Forbidden: {0}")]
    Forbidden(String),

    #[error("Not found: {0}")]
    NotFound(String),

    /// No credential has ever been obtained
    #[error("API token unavailable")]
    TokenUnavailable,
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        let (status, error_type) = match &self {
            ApiError::Forbidden(_) => (StatusCode::FORBIDDEN, "forbidden"),
            ApiError::NotFound(_) => (StatusCode::NOT_FOUND, "not_found"),
            ApiError::TokenUnavailable => (StatusCode::SERVICE_UNAVAILABLE, "token_unavailable"),
        };

        let body = Json(json!({
            "error": {
                "message": self.to_string(),
                "type": error_type,
            }
        }));

        (status, body).into_response()
    }
}

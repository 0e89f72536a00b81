//! Error types for Gatehouse.
//!
//! Uses thiserror for ergonomic error definitions that integrate
//! with axum's response system. Every error carries a stable code
//! that clients can switch on independently of the message text.

use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use axum::Json;
use serde_json::json;

pub type Result<T> = std::result::Result<T, Error>;

#[derive(Debug, thiserror::Error)]
pub enum Error {
    // Credential / token errors
    #[error("{0}")]
    AuthenticationFailed(String),

    #[error("Invalid token")]
    InvalidToken,

    #[error("No token provided")]
    NoTokenProvided,

    #[error("Unauthorized: {0}")]
    Unauthorized(String),

    #[error("Account disabled: {0}")]
    Disabled(String),

    // Parameter errors
    #[error("Missing parameter: {0}")]
    MissingParameter(String),

    #[error("Illegal parameter: {0}")]
    IllegalParameter(String),

    // Missing entities
    #[error("No such user: {0}")]
    NoSuchUser(String),

    #[error("No such local user: {0}")]
    NoSuchLocalUser(String),

    #[error("No such token")]
    NoSuchToken,

    #[error("No such role: {0}")]
    NoSuchRole(String),

    #[error("No such identity provider: {0}")]
    NoSuchProvider(String),

    #[error("No such identity: {0}")]
    NoSuchIdentity(String),

    // Conflicts
    #[error("User already exists: {0}")]
    UserExists(String),

    #[error("Identity is already linked")]
    IdentityLinked,

    #[error("Link failed: {0}")]
    LinkFailed(String),

    #[error("Unlink failed: {0}")]
    UnlinkFailed(String),

    // External collaborators
    #[error("Identity retrieval from {provider} failed: {message}")]
    IdentityRetrieval { provider: String, message: String },

    #[error("Storage error: {0}")]
    Storage(String),

    #[error("Configuration error: {0}")]
    ConfigMapping(String),

    // Generic errors
    #[error("Internal error: {0}")]
    Internal(String),

    #[error("{0}")]
    Other(#[from] anyhow::Error),
}

impl Error {
    pub fn status_code(&self) -> StatusCode {
        match self {
            // 401
            Self::AuthenticationFailed(_) | Self::InvalidToken | Self::NoTokenProvided => {
                StatusCode::UNAUTHORIZED
            }

            // 403
            Self::Unauthorized(_) | Self::Disabled(_) => StatusCode::FORBIDDEN,

            // 404
            Self::NoSuchUser(_)
            | Self::NoSuchLocalUser(_)
            | Self::NoSuchToken
            | Self::NoSuchRole(_)
            | Self::NoSuchProvider(_)
            | Self::NoSuchIdentity(_) => StatusCode::NOT_FOUND,

            // 409
            Self::UserExists(_) | Self::IdentityLinked => StatusCode::CONFLICT,

            // 400
            Self::MissingParameter(_)
            | Self::IllegalParameter(_)
            | Self::LinkFailed(_)
            | Self::UnlinkFailed(_) => StatusCode::BAD_REQUEST,

            // 502
            Self::IdentityRetrieval { .. } => StatusCode::BAD_GATEWAY,

            // 500
            Self::Storage(_) | Self::ConfigMapping(_) | Self::Internal(_) | Self::Other(_) => {
                StatusCode::INTERNAL_SERVER_ERROR
            }
        }
    }

    pub fn error_code(&self) -> &'static str {
        match self {
            Self::AuthenticationFailed(_) => "AUTHENTICATION_FAILED",
            Self::InvalidToken => "INVALID_TOKEN",
            Self::NoTokenProvided => "NO_TOKEN_PROVIDED",
            Self::Unauthorized(_) => "UNAUTHORIZED",
            Self::Disabled(_) => "ACCOUNT_DISABLED",
            Self::MissingParameter(_) => "MISSING_PARAMETER",
            Self::IllegalParameter(_) => "ILLEGAL_PARAMETER",
            Self::NoSuchUser(_) => "NO_SUCH_USER",
            Self::NoSuchLocalUser(_) => "NO_SUCH_LOCAL_USER",
            Self::NoSuchToken => "NO_SUCH_TOKEN",
            Self::NoSuchRole(_) => "NO_SUCH_ROLE",
            Self::NoSuchProvider(_) => "NO_SUCH_PROVIDER",
            Self::NoSuchIdentity(_) => "NO_SUCH_IDENTITY",
            Self::UserExists(_) => "USER_EXISTS",
            Self::IdentityLinked => "IDENTITY_LINKED",
            Self::LinkFailed(_) => "LINK_FAILED",
            Self::UnlinkFailed(_) => "UNLINK_FAILED",
            Self::IdentityRetrieval { .. } => "IDENTITY_RETRIEVAL_FAILED",
            Self::Storage(_) => "STORAGE_ERROR",
            Self::ConfigMapping(_) => "CONFIG_ERROR",
            Self::Internal(_) => "INTERNAL_ERROR",
            Self::Other(_) => "UNKNOWN_ERROR",
        }
    }
}

impl IntoResponse for Error {
    fn into_response(self) -> Response {
        let status = self.status_code();
        let code = self.error_code();
        let message = self.to_string();

        let body = Json(json!({
            "error": {
                "code": code,
                "message": message,
            }
        }));

        (status, body).into_response()
    }
}

// Convenience conversions
impl From<sqlx::Error> for Error {
    fn from(err: sqlx::Error) -> Self {
        Self::Storage(err.to_string())
    }
}

impl From<std::io::Error> for Error {
    fn from(err: std::io::Error) -> Self {
        Self::Internal(err.to_string())
    }
}

impl From<reqwest::Error> for Error {
    fn from(err: reqwest::Error) -> Self {
        Self::Internal(format!("HTTP request failed: {}", err))
    }
}

impl From<serde_json::Error> for Error {
    fn from(err: serde_json::Error) -> Self {
        Self::Internal(format!("JSON error: {}", err))
    }
}

//! Protocol Error Types
//!
//! Every failure a caller can observe is one of these kinds. Responses carry
//! only the kind and a safe description (RFC 6749 §5.2 body); store and
//! internal failures never expose their cause.

use axum::{
    http::{header, StatusCode},
    response::{IntoResponse, Json, Response},
};
use serde::Serialize;
use thiserror::Error;
use utoipa::ToSchema;

#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum AuthError {
    #[error("Invalid client: {message}")]
    InvalidClient { message: String },

    #[error("Invalid grant: {message}")]
    InvalidGrant { message: String },

    #[error("Invalid scope: {message}")]
    InvalidScope { message: String },

    #[error("Invalid credentials")]
    InvalidCredentials,

    #[error("Unauthorized: {message}")]
    Unauthorized { message: String },

    #[error("Store unavailable")]
    StoreUnavailable,

    #[error("Internal error: {message}")]
    Internal { message: String },

    #[error("Invalid request: {message}")]
    InvalidRequest { message: String },

    #[error("Unsupported grant type: {grant_type}")]
    UnsupportedGrantType { grant_type: String },

    #[error("Unsupported response type: {response_type}")]
    UnsupportedResponseType { response_type: String },

    #[error("Unauthorized client: {message}")]
    UnauthorizedClient { message: String },

    #[error("Access denied: {message}")]
    AccessDenied { message: String },

    #[error("Consent required")]
    ConsentRequired,

    #[error("Login required")]
    LoginRequired,
}

impl AuthError {
    pub fn invalid_client(message: impl Into<String>) -> Self {
        Self::InvalidClient { message: message.into() }
    }

    pub fn invalid_grant(message: impl Into<String>) -> Self {
        Self::InvalidGrant { message: message.into() }
    }

    pub fn invalid_scope(message: impl Into<String>) -> Self {
        Self::InvalidScope { message: message.into() }
    }

    pub fn unauthorized(message: impl Into<String>) -> Self {
        Self::Unauthorized { message: message.into() }
    }

    pub fn internal(message: impl Into<String>) -> Self {
        Self::Internal { message: message.into() }
    }

    pub fn invalid_request(message: impl Into<String>) -> Self {
        Self::InvalidRequest { message: message.into() }
    }

    pub fn unauthorized_client(message: impl Into<String>) -> Self {
        Self::UnauthorizedClient { message: message.into() }
    }

    pub fn access_denied(message: impl Into<String>) -> Self {
        Self::AccessDenied { message: message.into() }
    }

    /// RFC 6749 / OIDC error code
    pub fn error_code(&self) -> &'static str {
        match self {
            Self::InvalidClient { .. } => "invalid_client",
            Self::InvalidGrant { .. } => "invalid_grant",
            Self::InvalidScope { .. } => "invalid_scope",
            Self::InvalidCredentials => "access_denied",
            Self::Unauthorized { .. } => "invalid_token",
            Self::StoreUnavailable => "temporarily_unavailable",
            Self::Internal { .. } => "server_error",
            Self::InvalidRequest { .. } => "invalid_request",
            Self::UnsupportedGrantType { .. } => "unsupported_grant_type",
            Self::UnsupportedResponseType { .. } => "unsupported_response_type",
            Self::UnauthorizedClient { .. } => "unauthorized_client",
            Self::AccessDenied { .. } => "access_denied",
            Self::ConsentRequired => "consent_required",
            Self::LoginRequired => "login_required",
        }
    }

    /// Description that is safe to hand to the caller
    pub fn safe_description(&self) -> String {
        match self {
            Self::InvalidCredentials => "Invalid username, password or one-time code".to_string(),
            Self::StoreUnavailable => "The service is temporarily unavailable, retry later".to_string(),
            Self::Internal { .. } => "An internal error occurred".to_string(),
            Self::ConsentRequired => "User consent is required".to_string(),
            Self::LoginRequired => "The resource owner must authenticate".to_string(),
            Self::UnsupportedGrantType { grant_type } => {
                format!("Grant type '{}' is not supported", grant_type)
            }
            Self::UnsupportedResponseType { response_type } => {
                format!("Response type '{}' is not supported", response_type)
            }
            Self::InvalidClient { message }
            | Self::InvalidGrant { message }
            | Self::InvalidScope { message }
            | Self::Unauthorized { message }
            | Self::InvalidRequest { message }
            | Self::UnauthorizedClient { message }
            | Self::AccessDenied { message } => message.clone(),
        }
    }

    pub fn status_code(&self) -> StatusCode {
        match self {
            Self::InvalidClient { .. } | Self::Unauthorized { .. } => StatusCode::UNAUTHORIZED,
            Self::AccessDenied { .. } => StatusCode::FORBIDDEN,
            Self::StoreUnavailable => StatusCode::SERVICE_UNAVAILABLE,
            Self::Internal { .. } => StatusCode::INTERNAL_SERVER_ERROR,
            _ => StatusCode::BAD_REQUEST,
        }
    }

    /// Whether the caller may safely repeat the request
    pub fn is_retriable(&self) -> bool {
        matches!(self, Self::StoreUnavailable)
    }
}

pub type Result<T> = std::result::Result<T, AuthError>;

/// Error response body (RFC 6749 §5.2)
#[derive(Debug, Serialize, ToSchema)]
pub struct ErrorResponse {
    pub error: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error_description: Option<String>,
}

impl From<&AuthError> for ErrorResponse {
    fn from(err: &AuthError) -> Self {
        Self {
            error: err.error_code().to_string(),
            error_description: Some(err.safe_description()),
        }
    }
}

impl IntoResponse for AuthError {
    fn into_response(self) -> Response {
        let status = self.status_code();
        let body = ErrorResponse::from(&self);

        match &self {
            Self::InvalidClient { .. } => (
                status,
                [(header::WWW_AUTHENTICATE, "Basic realm=\"token\"")],
                Json(body),
            )
                .into_response(),
            Self::Unauthorized { .. } => (
                status,
                [(header::WWW_AUTHENTICATE, "Bearer error=\"invalid_token\"")],
                Json(body),
            )
                .into_response(),
            Self::StoreUnavailable => (status, [(header::RETRY_AFTER, "1")], Json(body)).into_response(),
            _ => (status, Json(body)).into_response(),
        }
    }
}

use axum::{
    http::{header, StatusCode},
    response::{IntoResponse, Response},
};

use crate::config::ConfigError;

/// Realm advertised in `WWW-Authenticate` on 401 responses.
const AUTH_REALM: &str = r#"Basic realm="internal-acme-dns""#;

/// Errors returned by the challenge endpoints.
///
/// The display text is what the client sees, except for [`ApiError::Config`]
/// whose details are only logged.
#[derive(Debug, thiserror::Error)]
pub enum ApiError {
    #[error("No Authorization header passed")]
    MissingAuthorization,
    #[error("Invalid Authorization header")]
    MalformedAuthorization,
    #[error("Non-basic auth authorization attempted")]
    UnsupportedScheme,
    #[error("Invalid basic auth credentials")]
    InvalidCredentials,
    #[error("This API key is not allowed to request that domain")]
    DomainNotAllowed,
    #[error("Could not decode JSON")]
    InvalidJson,
    #[error("Missing at least one of the fqdn/value keyvals")]
    MissingFields,
    #[error(transparent)]
    Config(#[from] ConfigError),
}

impl ApiError {
    pub fn status(&self) -> StatusCode {
        match self {
            ApiError::MissingAuthorization
            | ApiError::MalformedAuthorization
            | ApiError::UnsupportedScheme
            | ApiError::InvalidCredentials
            | ApiError::DomainNotAllowed => StatusCode::UNAUTHORIZED,
            ApiError::InvalidJson | ApiError::MissingFields => StatusCode::BAD_REQUEST,
            ApiError::Config(_) => StatusCode::INTERNAL_SERVER_ERROR,
        }
    }
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        let status = self.status();
        match &self {
            ApiError::Config(e) => {
                tracing::error!("Internal error: {}", e);
                (status, "Internal server error").into_response()
            }
            _ if status == StatusCode::UNAUTHORIZED => {
                tracing::warn!("Rejected request: {}", self);
                (status, [(header::WWW_AUTHENTICATE, AUTH_REALM)], self.to_string()).into_response()
            }
            _ => {
                tracing::warn!("Bad request: {}", self);
                (status, self.to_string()).into_response()
            }
        }
    }
}

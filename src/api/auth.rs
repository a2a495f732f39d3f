//! HTTP Basic authentication against the credentials file.

use axum::{
    extract::FromRequestParts,
    http::{header, request::Parts},
};
use base64::{engine::general_purpose::STANDARD, Engine};

use super::{ApiError, AppState};
use crate::config::{ApiKeyConfig, Credentials};

/// An API key whose credentials were checked for this request.
#[derive(Debug, Clone)]
pub struct AuthenticatedKey {
    pub name: String,
    pub config: ApiKeyConfig,
}

impl AuthenticatedKey {
    /// Fail unless this key may act on `fqdn`.
    pub fn ensure_allowed(&self, fqdn: &str) -> Result<(), ApiError> {
        if self.config.allows(fqdn) {
            Ok(())
        } else {
            tracing::warn!("Key {} is not allowed to request {}", self.name, fqdn);
            Err(ApiError::DomainNotAllowed)
        }
    }
}

impl FromRequestParts<AppState> for AuthenticatedKey {
    type Rejection = ApiError;

    async fn from_request_parts(parts: &mut Parts, state: &AppState) -> Result<Self, Self::Rejection> {
        let header = parts
            .headers
            .get(header::AUTHORIZATION)
            .ok_or(ApiError::MissingAuthorization)?
            .to_str()
            .map_err(|_| ApiError::MalformedAuthorization)?;

        let (name, secret) = parse_basic(header)?;

        let credentials = Credentials::load_async(&state.config_path).await?;
        let config = credentials
            .authenticate(&name, &secret)
            .cloned()
            .ok_or(ApiError::InvalidCredentials)?;

        tracing::debug!("Authenticated key {}", name);
        Ok(Self { name, config })
    }
}

/// Split an `Authorization: Basic <base64(name:secret)>` header value.
fn parse_basic(header: &str) -> Result<(String, String), ApiError> {
    let tokens: Vec<&str> = header.split(' ').collect();
    let [scheme, token] = tokens[..] else {
        return Err(ApiError::MalformedAuthorization);
    };
    if scheme != "Basic" {
        return Err(ApiError::UnsupportedScheme);
    }

    let decoded = STANDARD
        .decode(token)
        .ok()
        .and_then(|bytes| String::from_utf8(bytes).ok())
        .ok_or(ApiError::InvalidCredentials)?;

    let parts: Vec<&str> = decoded.split(':').collect();
    match parts[..] {
        [name, secret] => Ok((name.to_string(), secret.to_string())),
        _ => Err(ApiError::InvalidCredentials),
    }
}

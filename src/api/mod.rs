//! HTTP API used by ACME clients to publish and withdraw challenge records.

mod auth;
mod error;
mod handlers;

use std::path::PathBuf;

use axum::{
    routing::{get, post},
    Router,
};
use tower_http::trace::TraceLayer;

use crate::store::ValidationStore;

pub use auth::AuthenticatedKey;
pub use error::ApiError;
pub use handlers::ChallengeRequest;

/// Shared state of the HTTP handlers.
#[derive(Clone, Debug)]
pub struct AppState {
    pub store: ValidationStore,
    /// Credentials file, re-read on every authenticated request.
    pub config_path: PathBuf,
}

impl AppState {
    pub fn new(store: ValidationStore, config_path: impl Into<PathBuf>) -> Self {
        Self {
            store,
            config_path: config_path.into(),
        }
    }
}

pub fn create_router(state: AppState) -> Router {
    Router::new()
        .route("/present", post(handlers::present))
        .route("/cleanup", post(handlers::cleanup))
        .route("/health", get(handlers::health))
        .layer(TraceLayer::new_for_http())
        .with_state(state)
}

//! HTTP API application wiring (Axum router + service wiring).
//!
//! - `services.rs`: profile store, gate and record stores
//! - `routes/`: HTTP routes + handlers (one file per area)
//! - `errors.rs`: consistent error responses

use std::sync::Arc;

use axum::{routing::get, Extension, Router};
use tower::ServiceBuilder;

use billforge_infra::{AppConfig, StoreError};

use crate::middleware;

pub mod errors;
pub mod routes;
pub mod services;

/// Build the full HTTP router over already-built services.
pub fn router(services: Arc<AppServices>) -> Router {
    let auth_state = middleware::AuthState {
        tokens: services.tokens.clone(),
    };
    let gate = services.gate.clone();

    Router::new()
        .route("/health", get(routes::system::health))
        .merge(routes::router(&gate))
        .layer(
            ServiceBuilder::new()
                .layer(axum::middleware::from_fn_with_state(
                    auth_state,
                    middleware::auth_middleware,
                ))
                .layer(Extension(services)),
        )
}

/// Build services from `config` and the router over them (public entrypoint
/// used by `main.rs`).
pub async fn build_app(config: &AppConfig) -> Result<Router, StoreError> {
    let services = Arc::new(services::build_services(config).await?);
    Ok(router(services))
}

pub use services::AppServices;

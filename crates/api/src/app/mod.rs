//! HTTP API application wiring (Axum router + service wiring).
//!
//! - `services.rs`: REST clients, mapping store, reconciliation service
//! - `routes/`: HTTP routes + handlers (one file per admin area)
//! - `dto.rs`: response DTOs
//! - `errors.rs`: consistent error responses

use std::sync::Arc;

use axum::{Extension, Router, routing::get};
use tower::ServiceBuilder;

use woosync_infra::config::Secret;

use crate::middleware;

pub mod dto;
pub mod errors;
pub mod routes;
pub mod services;

/// Build the full HTTP router (public entrypoint used by `main.rs`).
pub fn build_app(services: Arc<services::AppServices>, admin_token: Option<Secret>) -> Router {
    let auth = middleware::AdminAuth {
        token: admin_token.map(Arc::new),
    };

    // Admin routes: bearer token when one is configured.
    let admin = routes::router().layer(
        ServiceBuilder::new()
            .layer(Extension(services))
            .layer(axum::middleware::from_fn_with_state(
                auth,
                middleware::admin_auth_middleware,
            )),
    );

    Router::new()
        .route("/health", get(routes::system::health))
        .nest("/admin/api", admin)
}

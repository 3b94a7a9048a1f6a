use axum::Router;

pub mod mapping;
pub mod sync;
pub mod system;
pub mod trash;

/// Router for the admin endpoints (mounted under `/admin/api`).
pub fn router() -> Router {
    Router::new()
        .merge(mapping::router())
        .merge(sync::router())
        .merge(trash::router())
}

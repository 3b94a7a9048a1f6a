use std::sync::Arc;

use axum::{
    extract::State,
    http::{HeaderMap, StatusCode},
    middleware::Next,
    response::Response,
};

use woosync_infra::config::Secret;

use crate::app::errors;

#[derive(Clone)]
pub struct AdminAuth {
    /// `None` leaves the admin surface open.
    pub token: Option<Arc<Secret>>,
}

pub async fn admin_auth_middleware(
    State(auth): State<AdminAuth>,
    req: axum::http::Request<axum::body::Body>,
    next: Next,
) -> Response {
    if let Some(expected) = &auth.token {
        match extract_bearer(req.headers()) {
            Some(token) if token == expected.expose() => {}
            _ => {
                return errors::json_error(
                    StatusCode::UNAUTHORIZED,
                    "unauthorized",
                    "missing or invalid admin token",
                );
            }
        }
    }

    next.run(req).await
}

fn extract_bearer(headers: &HeaderMap) -> Option<&str> {
    let header = headers.get(axum::http::header::AUTHORIZATION)?;
    let token = header.to_str().ok()?.strip_prefix("Bearer ")?.trim();
    if token.is_empty() {
        return None;
    }
    Some(token)
}

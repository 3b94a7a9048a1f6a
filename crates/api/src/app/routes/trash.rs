use std::sync::Arc;

use axum::{
    Json, Router,
    extract::Extension,
    response::IntoResponse,
    routing::post,
};

use crate::app::services::AppServices;
use crate::app::{dto, errors};

pub fn router() -> Router {
    Router::new().route("/empty-trash", post(empty_trash))
}

pub async fn empty_trash(Extension(services): Extension<Arc<AppServices>>) -> axum::response::Response {
    match services.reconciler.empty_trash().await {
        Ok(report) => Json(dto::EmptyTrashResponse::from(report)).into_response(),
        Err(e) => errors::sync_error_to_response(e),
    }
}

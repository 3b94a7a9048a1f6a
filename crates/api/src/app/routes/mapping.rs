use std::sync::Arc;

use axum::{
    Json, Router,
    extract::Extension,
    response::IntoResponse,
    routing::get,
};

use woosync_catalog::MappingDocument;

use crate::app::errors;
use crate::app::services::AppServices;

pub fn router() -> Router {
    Router::new().route("/mapping", get(get_mapping).put(put_mapping))
}

pub async fn get_mapping(Extension(services): Extension<Arc<AppServices>>) -> axum::response::Response {
    match services.reconciler.load_mapping().await {
        Ok(doc) => Json(doc).into_response(),
        Err(e) => errors::sync_error_to_response(e),
    }
}

/// Replace the mapping. Accepts the current document shape or a legacy bare array.
pub async fn put_mapping(
    Extension(services): Extension<Arc<AppServices>>,
    Json(body): Json<serde_json::Value>,
) -> axum::response::Response {
    let doc = match MappingDocument::from_json_value(body) {
        Ok(doc) => doc,
        Err(e) => return errors::domain_error_to_response(e),
    };

    match services.reconciler.save_mapping(doc).await {
        Ok(saved) => Json(saved).into_response(),
        Err(e) => errors::sync_error_to_response(e),
    }
}

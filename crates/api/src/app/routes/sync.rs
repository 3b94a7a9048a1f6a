use std::sync::Arc;

use axum::{
    Json, Router,
    extract::{Extension, Path},
    http::StatusCode,
    response::IntoResponse,
    routing::post,
};

use woosync_catalog::SyncAction;

use crate::app::services::AppServices;
use crate::app::{dto, errors};

pub fn router() -> Router {
    Router::new()
        .route("/preview-sync", post(preview_sync))
        .route("/sync/:action", post(run_sync))
        .route("/cancel-sync", post(cancel_sync))
}

pub async fn preview_sync(Extension(services): Extension<Arc<AppServices>>) -> axum::response::Response {
    match services.reconciler.preview().await {
        Ok(report) => Json(dto::PreviewResponse::from(report)).into_response(),
        Err(e) => errors::sync_error_to_response(e),
    }
}

pub async fn run_sync(
    Extension(services): Extension<Arc<AppServices>>,
    Path(action): Path<String>,
) -> axum::response::Response {
    let action: SyncAction = match action.parse() {
        Ok(a) => a,
        Err(_) => {
            return errors::json_error(
                StatusCode::BAD_REQUEST,
                "invalid_action",
                "action must be one of: create, update, delete",
            );
        }
    };

    match services.reconciler.execute(action).await {
        Ok(result) => Json(dto::SyncResponse::from(result)).into_response(),
        Err(e) => errors::sync_error_to_response(e),
    }
}

pub async fn cancel_sync(Extension(services): Extension<Arc<AppServices>>) -> axum::response::Response {
    let cancelled = services.reconciler.cancel();
    let status = if cancelled {
        StatusCode::ACCEPTED
    } else {
        StatusCode::OK
    };
    (status, Json(dto::CancelResponse { cancelled })).into_response()
}

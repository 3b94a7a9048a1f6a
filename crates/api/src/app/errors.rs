use axum::http::StatusCode;
use axum::response::IntoResponse;
use serde_json::json;

use woosync_core::DomainError;
use woosync_infra::SyncError;

pub fn sync_error_to_response(err: SyncError) -> axum::response::Response {
    match err {
        SyncError::RemoteUnavailable { .. } => {
            tracing::warn!(error = %err, "pass aborted");
            json_error(StatusCode::BAD_GATEWAY, "upstream_unavailable", err.to_string())
        }
        SyncError::Validation(e) => domain_error_to_response(e),
        SyncError::PassInProgress => json_error(StatusCode::CONFLICT, "pass_in_progress", err.to_string()),
        SyncError::Store(e) => {
            tracing::error!(error = %e, "mapping store failure");
            json_error(StatusCode::INTERNAL_SERVER_ERROR, "store_error", e.to_string())
        }
    }
}

pub fn domain_error_to_response(err: DomainError) -> axum::response::Response {
    json_error(StatusCode::BAD_REQUEST, "validation_error", err.to_string())
}

pub fn json_error(
    status: StatusCode,
    code: &'static str,
    message: impl Into<String>,
) -> axum::response::Response {
    (
        status,
        axum::Json(json!({
            "error": code,
            "message": message.into(),
        })),
    )
        .into_response()
}

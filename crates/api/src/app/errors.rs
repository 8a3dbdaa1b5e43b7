use axum::http::StatusCode;
use axum::response::IntoResponse;
use serde_json::json;

use loyalty_infra::pool::PoolError;
use loyalty_infra::storage::StoreError;

pub fn store_error_to_response(err: StoreError) -> axum::response::Response {
    match err {
        StoreError::AlreadyUploaded(number) => json_error(
            StatusCode::OK,
            "already_uploaded",
            format!("order {number} was already uploaded"),
        ),
        StoreError::OwnedByAnotherUser(number) => json_error(
            StatusCode::CONFLICT,
            "conflict",
            format!("order {number} was uploaded by another user"),
        ),
        StoreError::InvalidTransition { .. } => json_error(StatusCode::CONFLICT, "conflict", err.to_string()),
        StoreError::Storage(msg) => json_error(StatusCode::INTERNAL_SERVER_ERROR, "store_error", msg),
    }
}

pub fn pool_error_to_response(err: PoolError) -> axum::response::Response {
    json_error(StatusCode::SERVICE_UNAVAILABLE, "unavailable", err.to_string())
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

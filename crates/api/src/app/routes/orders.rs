use std::sync::Arc;

use axum::{
    extract::{rejection::JsonRejection, Extension, Path},
    http::StatusCode,
    response::IntoResponse,
    Json,
};
use tracing::{info, warn};

use loyalty_core::{Order, OrderNumber, UserId};
use loyalty_infra::storage::StoreError;

use crate::app::services::AppServices;
use crate::app::{dto, errors};

/// Register an uploaded order and start reconciling it.
///
/// 202 for a new order, 200 if this user already uploaded it, 409 if another
/// user did, 422 for a number that fails the checksum, 400 for a bad body.
pub async fn upload_order(
    Extension(services): Extension<Arc<AppServices>>,
    body: Result<Json<dto::UploadOrderRequest>, JsonRejection>,
) -> axum::response::Response {
    let Json(body) = match body {
        Ok(body) => body,
        Err(e) => return errors::json_error(StatusCode::BAD_REQUEST, "invalid_body", e.body_text()),
    };

    let user_id: UserId = match body.user_id.parse() {
        Ok(v) => v,
        Err(_) => return errors::json_error(StatusCode::BAD_REQUEST, "invalid_id", "invalid user id"),
    };
    let number = match OrderNumber::parse_checked(body.number) {
        Ok(v) => v,
        Err(e) => {
            return errors::json_error(StatusCode::UNPROCESSABLE_ENTITY, "invalid_order_number", e.to_string())
        }
    };

    let order = Order::registered(number.clone(), user_id);
    match services.store.register_order(&order).await {
        Ok(()) => {}
        Err(StoreError::AlreadyUploaded(_)) => {
            return (StatusCode::OK, Json(serde_json::json!({"number": number.as_str()}))).into_response();
        }
        Err(e) => return errors::store_error_to_response(e),
    }

    if let Err(e) = services.reconciler.submit(number.clone()).await {
        warn!(order = %number, error = %e, "order registered but not scheduled");
        return errors::pool_error_to_response(e);
    }
    info!(order = %number, user_id = %user_id, "order accepted");

    (
        StatusCode::ACCEPTED,
        Json(serde_json::json!({
            "number": number.as_str(),
            "status": order.status,
        })),
    )
        .into_response()
}

pub async fn get_order(
    Extension(services): Extension<Arc<AppServices>>,
    Path(number): Path<String>,
) -> axum::response::Response {
    let number = match OrderNumber::new(number) {
        Ok(v) => v,
        Err(e) => return errors::json_error(StatusCode::BAD_REQUEST, "invalid_order_number", e.to_string()),
    };

    match services.store.get_order(&number).await {
        Ok(Some(order)) => Json(dto::OrderResponse::from(order)).into_response(),
        Ok(None) => errors::json_error(StatusCode::NOT_FOUND, "not_found", "order not found"),
        Err(e) => errors::store_error_to_response(e),
    }
}

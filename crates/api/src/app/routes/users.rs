use std::sync::Arc;

use axum::{
    extract::{Extension, Path},
    http::StatusCode,
    response::IntoResponse,
    Json,
};

use loyalty_core::UserId;

use crate::app::services::AppServices;
use crate::app::{dto, errors};

fn parse_user(raw: &str) -> Result<UserId, axum::response::Response> {
    raw.parse()
        .map_err(|_| errors::json_error(StatusCode::BAD_REQUEST, "invalid_id", "invalid user id"))
}

/// Orders of a user, oldest first; 204 when there are none.
pub async fn list_orders(
    Extension(services): Extension<Arc<AppServices>>,
    Path(user_id): Path<String>,
) -> axum::response::Response {
    let user_id = match parse_user(&user_id) {
        Ok(v) => v,
        Err(resp) => return resp,
    };

    match services.store.list_user_orders(user_id).await {
        Ok(orders) if orders.is_empty() => StatusCode::NO_CONTENT.into_response(),
        Ok(orders) => {
            let body: Vec<dto::OrderResponse> = orders.into_iter().map(Into::into).collect();
            Json(body).into_response()
        }
        Err(e) => errors::store_error_to_response(e),
    }
}

pub async fn balance(
    Extension(services): Extension<Arc<AppServices>>,
    Path(user_id): Path<String>,
) -> axum::response::Response {
    let user_id = match parse_user(&user_id) {
        Ok(v) => v,
        Err(resp) => return resp,
    };

    match services.store.balance(user_id).await {
        Ok(balance) => Json(dto::BalanceResponse::from(balance)).into_response(),
        Err(e) => errors::store_error_to_response(e),
    }
}

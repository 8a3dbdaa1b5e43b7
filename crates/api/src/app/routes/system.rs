use std::sync::Arc;

use axum::{extract::Extension, http::StatusCode, Json};

use loyalty_infra::reconcile::ReconcilerStats;

use crate::app::services::AppServices;

pub async fn health() -> StatusCode {
    StatusCode::OK
}

pub async fn scheduler_stats(Extension(services): Extension<Arc<AppServices>>) -> Json<ReconcilerStats> {
    Json(services.reconciler.stats())
}

use axum::{
    routing::{get, post},
    Router,
};

pub mod orders;
pub mod system;
pub mod users;

/// Router for everything under `/api`.
pub fn router() -> Router {
    Router::new()
        .route("/orders", post(orders::upload_order))
        .route("/orders/:number", get(orders::get_order))
        .route("/users/:user_id/orders", get(users::list_orders))
        .route("/users/:user_id/balance", get(users::balance))
        .route("/scheduler/stats", get(system::scheduler_stats))
}

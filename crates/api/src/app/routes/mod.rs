use axum::{routing::get, Router};

pub mod admin;
pub mod orders;
pub mod reports;
pub mod system;

/// Router for every endpoint except `/health`.
pub fn router() -> Router {
    Router::new()
        .route("/ready", get(system::ready))
        .nest("/orders", orders::router())
        .nest("/reports", reports::router())
        .nest("/admin", admin::router())
}

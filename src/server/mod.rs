pub mod routes;

use crate::db::SqliteDepot;
use axum::routing::get;
use axum::Router;
use std::sync::Arc;

/// Shared state of the read-only API.
pub struct AppState {
    pub depot: SqliteDepot,
}

impl AppState {
    pub fn new(depot: SqliteDepot) -> Arc<Self> {
        Arc::new(Self { depot })
    }
}

pub fn router(state: Arc<AppState>) -> Router {
    Router::new()
        .route("/api/seasons", get(routes::get_seasons))
        .route("/api/averages", get(routes::get_averages))
        .route("/api/matrix", get(routes::get_matrix))
        .route("/api/counters", get(routes::get_counters))
        .layer(
            tower_http::cors::CorsLayer::new()
                .allow_origin(tower_http::cors::Any)
                .allow_methods(tower_http::cors::Any)
                .allow_headers(tower_http::cors::Any),
        )
        .with_state(state)
}

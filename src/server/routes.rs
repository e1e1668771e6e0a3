use super::AppState;
use crate::db::{self, MatrixAxis, StatDepot};
use crate::state::Horizon;
use axum::extract::{Query, State};
use axum::response::Json;
use std::sync::Arc;

#[derive(serde::Deserialize)]
pub struct AveragesQuery {
    pub horizon: String,
    pub season: Option<String>,
    pub player: Option<String>,
    pub limit: Option<usize>,
}

#[derive(serde::Deserialize)]
pub struct MatrixQuery {
    pub from_season: String,
    pub to_season: String,
    pub axis: Option<MatrixAxis>,
}

/// GET /api/seasons -- known season date ranges
pub async fn get_seasons(State(state): State<Arc<AppState>>) -> Json<serde_json::Value> {
    match state.depot.seasons() {
        Ok(seasons) => Json(serde_json::json!({ "seasons": seasons })),
        Err(e) => Json(serde_json::json!({ "error": e.to_string() })),
    }
}

/// GET /api/averages -- persisted rows of one horizon, newest first
pub async fn get_averages(
    State(state): State<Arc<AppState>>,
    Query(params): Query<AveragesQuery>,
) -> Json<serde_json::Value> {
    let horizon = match params.horizon.parse::<Horizon>() {
        Ok(h) => h,
        Err(e) => return Json(serde_json::json!({ "error": e.to_string() })),
    };
    let limit = params.limit.unwrap_or(100).min(1000);
    match db::get_averages(
        state.depot.pool(),
        horizon,
        params.season.as_deref(),
        params.player.as_deref(),
        limit,
    ) {
        Ok(rows) => Json(serde_json::json!({ "horizon": horizon, "averages": rows })),
        Err(e) => Json(serde_json::json!({ "error": e.to_string() })),
    }
}

/// GET /api/matrix -- per-player feature rows for the classifier
pub async fn get_matrix(
    State(state): State<Arc<AppState>>,
    Query(params): Query<MatrixQuery>,
) -> Json<serde_json::Value> {
    let axis = params.axis.unwrap_or(MatrixAxis::All);
    match db::get_matrix(state.depot.pool(), &params.from_season, &params.to_season, axis) {
        Ok(rows) => Json(serde_json::json!({
            "columns": axis.columns(),
            "horizons": Horizon::ALL,
            "rows": rows,
        })),
        Err(e) => Json(serde_json::json!({ "error": e.to_string() })),
    }
}

#[derive(serde::Deserialize)]
pub struct CountersQuery {
    pub season: Option<String>,
}

/// GET /api/counters -- persisted rows per horizon
pub async fn get_counters(
    State(state): State<Arc<AppState>>,
    Query(params): Query<CountersQuery>,
) -> Json<serde_json::Value> {
    match db::horizon_totals(state.depot.pool(), params.season.as_deref()) {
        Ok(totals) => Json(serde_json::json!({ "horizons": totals })),
        Err(e) => Json(serde_json::json!({ "error": e.to_string() })),
    }
}

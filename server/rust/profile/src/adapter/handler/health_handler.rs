use axum::extract::State;
use axum::response::IntoResponse;
use axum::Json;

use super::AppState;

/// GET /health
pub async fn health(State(state): State<AppState>) -> impl IntoResponse {
    Json(state.get_health_uc.execute())
}

use axum::extract::State;
use axum::response::IntoResponse;
use axum::{Extension, Json};
use profile_auth::Principal;

use super::AppState;

/// GET /me
pub async fn get_me(
    State(state): State<AppState>,
    Extension(principal): Extension<Principal>,
) -> impl IntoResponse {
    Json(state.get_me_uc.execute(&principal))
}

use axum::extract::{Path, State};
use axum::response::{IntoResponse, Response};
use axum::{Extension, Json};
use profile_auth::Principal;

use super::AppState;

/// GET /admin/jobs
pub async fn list_jobs(State(state): State<AppState>) -> impl IntoResponse {
    Json(state.list_jobs_uc.execute().await)
}

/// POST /admin/jobs/{name}/run
pub async fn run_job(
    State(state): State<AppState>,
    principal: Option<Extension<Principal>>,
    Path(name): Path<String>,
) -> Response {
    let actor = principal.map(|Extension(p)| p);
    match state.run_job_uc.execute(actor.as_ref(), &name).await {
        Ok(output) => Json(output).into_response(),
        Err(e) => e.into_response(),
    }
}

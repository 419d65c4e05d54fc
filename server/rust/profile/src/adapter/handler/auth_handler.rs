use axum::extract::{Query, State};
use axum::response::{IntoResponse, Response};
use axum_extra::extract::cookie::CookieJar;
use serde::Deserialize;

use super::{see_other, AppState};

#[derive(Debug, Deserialize)]
pub struct CallbackQuery {
    pub state: Option<String>,
    pub code: Option<String>,
}

/// GET /auth/login
pub async fn login(State(state): State<AppState>, jar: CookieJar) -> Response {
    let mut session = state.session_codec.load(&jar);
    let location = match state.oidc_flow_uc.begin_login(&mut session).await {
        Ok(location) => location,
        Err(e) => return e.into_response(),
    };

    match state.session_codec.store(jar, &session) {
        Ok(jar) => (jar, see_other(&location)).into_response(),
        Err(e) => e.into_response(),
    }
}

/// GET /auth/callback?state&code
///
/// フローのエラーでもセッションの変更（消費・破棄）は Cookie に反映する。
pub async fn callback(
    State(state): State<AppState>,
    jar: CookieJar,
    Query(query): Query<CallbackQuery>,
) -> Response {
    let mut session = state.session_codec.load(&jar);
    let result = state
        .oidc_flow_uc
        .complete_callback(&mut session, query.state.as_deref(), query.code.as_deref())
        .await;

    let jar = match state.session_codec.store(jar, &session) {
        Ok(jar) => jar,
        Err(e) => return e.into_response(),
    };

    match result {
        Ok(_) => (jar, see_other(state.oidc_flow_uc.post_login_redirect())).into_response(),
        Err(e) => (jar, e).into_response(),
    }
}

/// POST /auth/logout
pub async fn logout(State(state): State<AppState>, jar: CookieJar) -> Response {
    let mut session = state.session_codec.load(&jar);
    let location = state.oidc_flow_uc.build_logout(&mut session).await;

    match state.session_codec.store(jar, &session) {
        Ok(jar) => (jar, see_other(&location)).into_response(),
        Err(e) => e.into_response(),
    }
}

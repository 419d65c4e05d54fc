use axum::{
    extract::{Request, State},
    http::header::AUTHORIZATION,
    middleware::Next,
    response::{IntoResponse, Response},
};
use axum_extra::extract::cookie::CookieJar;
use profile_auth::Principal;

use crate::adapter::handler::AppState;
use crate::domain::error::AccessError;

/// auth_middleware はセッション・開発用 ID・Bearer トークンのいずれかから主体を解決し、
/// Request extension に `Principal` と `RawClaims` を格納する axum ミドルウェア。
///
/// 主体が得られなくてもリクエストは続行する。拒否は require_* 側で行う。
pub async fn auth_middleware(
    State(state): State<AppState>,
    mut req: Request,
    next: Next,
) -> Response {
    let session = state
        .session_codec
        .load(&CookieJar::from_headers(req.headers()));
    let authorization = req
        .headers()
        .get(AUTHORIZATION)
        .and_then(|v| v.to_str().ok())
        .map(str::to_string);

    match state
        .resolve_principal_uc
        .execute(&session, authorization.as_deref())
        .await
    {
        Ok(Some(verified)) => {
            req.extensions_mut().insert(verified.principal);
            req.extensions_mut().insert(verified.raw_claims);
            next.run(req).await
        }
        Ok(None) => next.run(req).await,
        Err(e) => e.into_response(),
    }
}

/// require_authenticated は主体が解決されていないリクエストを 401 で拒否する。
pub async fn require_authenticated(req: Request, next: Next) -> Response {
    if req.extensions().get::<Principal>().is_none() {
        return AccessError::Unauthenticated.into_response();
    }
    next.run(req).await
}

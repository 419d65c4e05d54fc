use axum::{
    extract::{Request, State},
    middleware::Next,
    response::{IntoResponse, Response},
};
use profile_auth::Principal;

use crate::adapter::handler::AppState;
use crate::domain::error::AccessError;

/// make_permission_middleware は指定パーミッションを要求する axum ミドルウェアを生成する。
///
/// 主体が無い場合は 401、パーミッションが不足する場合は 403 を返す。
/// 認可サービスの障害は拒否ではなく 503 になる。
pub fn make_permission_middleware(
    permission: &'static str,
) -> impl Fn(
    State<AppState>,
    Request,
    Next,
) -> std::pin::Pin<Box<dyn std::future::Future<Output = Response> + Send>>
       + Clone {
    move |State(state): State<AppState>, req: Request, next: Next| {
        Box::pin(permission_check(state, req, next, permission))
    }
}

/// Core permission check logic. Called from make_permission_middleware.
pub async fn permission_check(
    state: AppState,
    req: Request,
    next: Next,
    permission: &'static str,
) -> Response {
    let Some(principal) = req.extensions().get::<Principal>().cloned() else {
        return AccessError::Unauthenticated.into_response();
    };

    match state.authorization.has_permission(&principal, permission).await {
        Ok(true) => next.run(req).await,
        Ok(false) => {
            tracing::warn!(sub = %principal.subject, permission, "permission denied");
            AccessError::Forbidden.into_response()
        }
        Err(e) => e.into_response(),
    }
}

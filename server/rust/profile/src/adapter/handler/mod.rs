pub mod admin_handler;
pub mod auth_handler;
pub mod health_handler;
pub mod me_handler;

use std::sync::Arc;

use axum::http::{header, HeaderValue, StatusCode};
use axum::middleware;
use axum::response::{IntoResponse, Response};
use axum::routing::{get, post};
use axum::{Json, Router};
use tower::limit::ConcurrencyLimitLayer;
use tower_http::trace::TraceLayer;

use crate::adapter::middleware::auth::{auth_middleware, require_authenticated};
use crate::adapter::middleware::rbac::make_permission_middleware;
use crate::adapter::middleware::security::{
    rate_limit_middleware, with_hardening_headers, SecurityPolicy,
};
use crate::domain::error::AccessError;
use crate::domain::repository::{AuditLogger, JobRegistry, PermissionRepository};
use crate::domain::service::AuthorizationService;
use crate::infrastructure::clock::Clock;
use crate::infrastructure::SessionCookieCodec;
use crate::usecase::{
    GetHealthUseCase, GetMeUseCase, ListJobsUseCase, OidcFlowUseCase, ResolvePrincipalUseCase,
    RunJobUseCase,
};

/// 管理ジョブの実行に必要なパーミッション。
pub const ADMIN_JOBS_RUN: &str = "adminJobs.run";

/// AppState はアプリケーション全体の共有状態を表す。
#[derive(Clone)]
pub struct AppState {
    pub resolve_principal_uc: Arc<ResolvePrincipalUseCase>,
    pub oidc_flow_uc: Arc<OidcFlowUseCase>,
    pub get_me_uc: Arc<GetMeUseCase>,
    pub get_health_uc: Arc<GetHealthUseCase>,
    pub list_jobs_uc: Arc<ListJobsUseCase>,
    pub run_job_uc: Arc<RunJobUseCase>,
    pub authorization: Arc<AuthorizationService>,
    pub session_codec: Arc<SessionCookieCodec>,
    pub security: SecurityPolicy,
}

impl AppState {
    pub fn new(
        resolve_principal_uc: ResolvePrincipalUseCase,
        oidc_flow_uc: OidcFlowUseCase,
        permission_repo: Arc<dyn PermissionRepository>,
        job_registry: Arc<dyn JobRegistry>,
        audit_logger: Arc<dyn AuditLogger>,
        session_codec: SessionCookieCodec,
        security: SecurityPolicy,
        clock: Arc<dyn Clock>,
    ) -> Self {
        Self {
            resolve_principal_uc: Arc::new(resolve_principal_uc),
            oidc_flow_uc: Arc::new(oidc_flow_uc),
            get_me_uc: Arc::new(GetMeUseCase::new()),
            get_health_uc: Arc::new(GetHealthUseCase::new(clock.clone())),
            list_jobs_uc: Arc::new(ListJobsUseCase::new(job_registry.clone())),
            run_job_uc: Arc::new(RunJobUseCase::new(job_registry, audit_logger, clock)),
            authorization: Arc::new(AuthorizationService::new(permission_repo)),
            session_codec: Arc::new(session_codec),
            security,
        }
    }
}

/// Build the REST API router.
pub fn router(state: AppState) -> Router {
    // Admin endpoints: require "adminJobs.run"
    let admin_routes = Router::new()
        .route("/admin/jobs", get(admin_handler::list_jobs))
        .route("/admin/jobs/{name}/run", post(admin_handler::run_job))
        .route_layer(middleware::from_fn_with_state(
            state.clone(),
            make_permission_middleware(ADMIN_JOBS_RUN),
        ));

    let authenticated_routes = Router::new()
        .route("/me", get(me_handler::get_me))
        .route_layer(middleware::from_fn(require_authenticated));

    // OIDC redirect flow and health are public
    let public = Router::new()
        .route("/health", get(health_handler::health))
        .route("/auth/login", get(auth_handler::login))
        .route("/auth/callback", get(auth_handler::callback))
        .route("/auth/logout", post(auth_handler::logout));

    // Every request gets a principal resolution pass before routing
    let app = Router::new()
        .merge(admin_routes)
        .merge(authenticated_routes)
        .merge(public)
        .layer(middleware::from_fn_with_state(state.clone(), auth_middleware))
        .layer(middleware::from_fn_with_state(
            state.security.rate_limiter.clone(),
            rate_limit_middleware,
        ));

    // CORS と硬化ヘッダはレート制限の応答にも付与する
    with_hardening_headers(app)
        .layer(state.security.cors_layer())
        .layer(ConcurrencyLimitLayer::new(
            state.security.max_concurrent_requests,
        ))
        .layer(TraceLayer::new_for_http())
        .with_state(state)
}

/// ErrorResponse は統一エラーレスポンス。
#[derive(Debug, serde::Serialize)]
pub struct ErrorResponse {
    pub error: ErrorBody,
}

#[derive(Debug, serde::Serialize)]
pub struct ErrorBody {
    pub code: String,
    pub message: String,
    pub request_id: String,
    pub details: Vec<String>,
}

impl ErrorResponse {
    pub fn new(code: &str, message: &str) -> Self {
        Self {
            error: ErrorBody {
                code: code.to_string(),
                message: message.to_string(),
                request_id: uuid::Uuid::new_v4().to_string(),
                details: vec![],
            },
        }
    }
}

impl AccessError {
    pub fn status_code(&self) -> StatusCode {
        match self {
            AccessError::InvalidCredential(_)
            | AccessError::CallbackFailed(_)
            | AccessError::Unauthenticated => StatusCode::UNAUTHORIZED,
            AccessError::AuthDisabled
            | AccessError::MissingLoginTransaction
            | AccessError::LoginTransactionExpired
            | AccessError::StateMismatch => StatusCode::BAD_REQUEST,
            AccessError::Forbidden => StatusCode::FORBIDDEN,
            AccessError::NotFound(_) => StatusCode::NOT_FOUND,
            AccessError::RateLimited { .. } => StatusCode::TOO_MANY_REQUESTS,
            AccessError::AuthorizationUnavailable(_) => StatusCode::SERVICE_UNAVAILABLE,
            AccessError::AuthMisconfigured(_) | AccessError::Internal(_) => {
                StatusCode::INTERNAL_SERVER_ERROR
            }
        }
    }
}

impl IntoResponse for AccessError {
    fn into_response(self) -> Response {
        let status = self.status_code();
        match &self {
            AccessError::AuthMisconfigured(detail) => {
                tracing::error!(detail = %detail, "authentication is misconfigured");
            }
            AccessError::AuthorizationUnavailable(detail) | AccessError::Internal(detail) => {
                tracing::error!(detail = %detail, code = self.code(), "request failed");
            }
            _ => {}
        }
        let body = ErrorResponse::new(self.code(), self.public_message());
        let mut response = (status, Json(body)).into_response();
        if let AccessError::RateLimited { retry_after_secs } = self {
            response
                .headers_mut()
                .insert(header::RETRY_AFTER, HeaderValue::from(retry_after_secs));
        }
        response
    }
}

/// 303 See Other のリダイレクト。Location に使えない URI は内部エラーとして返す。
pub fn see_other(location: &str) -> Response {
    match HeaderValue::from_str(location) {
        Ok(value) => (StatusCode::SEE_OTHER, [(header::LOCATION, value)]).into_response(),
        Err(e) => AccessError::Internal(format!("invalid redirect location: {e}")).into_response(),
    }
}

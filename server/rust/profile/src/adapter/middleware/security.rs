//! HTTP セキュリティ層: CORS 許可リスト、応答ヘッダの硬化、レート制限。

use std::net::SocketAddr;
use std::sync::Arc;

use axum::extract::{ConnectInfo, Request, State};
use axum::http::{header, HeaderName, HeaderValue, Method};
use axum::middleware::Next;
use axum::response::{IntoResponse, Response};
use axum::Router;
use tower_http::cors::{AllowOrigin, CorsLayer};
use tower_http::set_header::SetResponseHeaderLayer;

use crate::domain::error::AccessError;
use crate::infrastructure::{FixedWindowRateLimiter, RateDecision};

/// ConnectInfo が無い場合（テストや前段プロキシ無しの in-process 呼び出し）の制限キー。
const UNKNOWN_CLIENT_KEY: &str = "unknown";

const X_RATELIMIT_LIMIT: &str = "x-ratelimit-limit";
const X_RATELIMIT_REMAINING: &str = "x-ratelimit-remaining";

/// すべての応答に付与する硬化ヘッダ。ハンドラが設定済みの値は上書きしない。
pub const HARDENING_HEADERS: &[(&str, &str)] = &[
    (
        "content-security-policy",
        "default-src 'self';base-uri 'self';font-src 'self' https: data:;form-action 'self';\
         frame-ancestors 'self';img-src 'self' data:;object-src 'none';script-src 'self';\
         script-src-attr 'none';style-src 'self' https: 'unsafe-inline';upgrade-insecure-requests",
    ),
    ("cross-origin-opener-policy", "same-origin"),
    ("cross-origin-resource-policy", "same-origin"),
    ("origin-agent-cluster", "?1"),
    ("referrer-policy", "no-referrer"),
    ("strict-transport-security", "max-age=15552000; includeSubDomains"),
    ("x-content-type-options", "nosniff"),
    ("x-dns-prefetch-control", "off"),
    ("x-download-options", "noopen"),
    ("x-frame-options", "SAMEORIGIN"),
    ("x-permitted-cross-domain-policies", "none"),
    ("x-xss-protection", "0"),
];

/// SecurityPolicy はルーター全体に適用するセキュリティ設定。
#[derive(Clone)]
pub struct SecurityPolicy {
    pub cors_origins: Vec<HeaderValue>,
    pub rate_limiter: Arc<FixedWindowRateLimiter>,
    pub max_concurrent_requests: usize,
}

impl SecurityPolicy {
    /// 許可リストに一致する Origin にだけ CORS ヘッダを返す。空リストはすべて不許可。
    pub fn cors_layer(&self) -> CorsLayer {
        CorsLayer::new()
            .allow_origin(AllowOrigin::list(self.cors_origins.clone()))
            .allow_methods([Method::GET, Method::HEAD, Method::POST])
            .allow_headers([header::AUTHORIZATION, header::CONTENT_TYPE])
    }
}

/// 硬化ヘッダをルーターに付与する。
pub fn with_hardening_headers<S>(mut router: Router<S>) -> Router<S>
where
    S: Clone + Send + Sync + 'static,
{
    for &(name, value) in HARDENING_HEADERS {
        router = router.layer(SetResponseHeaderLayer::if_not_present(
            HeaderName::from_static(name),
            HeaderValue::from_static(value),
        ));
    }
    router
}

/// クライアント IP ごとにリクエスト数を制限する。超過時は 429 と Retry-After を返す。
pub async fn rate_limit_middleware(
    State(limiter): State<Arc<FixedWindowRateLimiter>>,
    req: Request,
    next: Next,
) -> Response {
    let key = req
        .extensions()
        .get::<ConnectInfo<SocketAddr>>()
        .map_or_else(|| UNKNOWN_CLIENT_KEY.to_string(), |ci| ci.0.ip().to_string());

    match limiter.check(&key).await {
        RateDecision::Allowed { limit, remaining } => {
            let mut response = next.run(req).await;
            let headers = response.headers_mut();
            headers.insert(X_RATELIMIT_LIMIT, HeaderValue::from(limit));
            headers.insert(X_RATELIMIT_REMAINING, HeaderValue::from(remaining));
            response
        }
        RateDecision::Limited {
            limit,
            retry_after_secs,
        } => {
            tracing::warn!(client = %key, limit, "rate limit exceeded");
            let mut response = AccessError::RateLimited { retry_after_secs }.into_response();
            response
                .headers_mut()
                .insert(X_RATELIMIT_LIMIT, HeaderValue::from(limit));
            response
                .headers_mut()
                .insert(X_RATELIMIT_REMAINING, HeaderValue::from(0u32));
            response
        }
    }
}

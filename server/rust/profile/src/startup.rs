//! 設定からアプリケーションの依存関係を組み立てる。

use std::sync::Arc;

use base64::{engine::general_purpose::URL_SAFE_NO_PAD, Engine};
use profile_auth::{JwksKeyStore, JwksVerifier, Principal};
use rand::RngCore;
use secrecy::{ExposeSecret, SecretString};
use tracing::{info, warn};

use crate::adapter::handler::AppState;
use crate::adapter::middleware::SecurityPolicy;
use crate::adapter::repository::audit_log_postgres::AuditLogPostgresRepository;
use crate::adapter::repository::permission_postgres::PermissionPostgresRepository;
use crate::domain::repository::{AuditLogger, PermissionRepository};
use crate::infrastructure::clock::Clock;
use crate::infrastructure::config::{AuthMode, Config};
use crate::infrastructure::in_memory::{InMemoryAuditLogger, InMemoryPermissionRepository};
use crate::infrastructure::jobs::{InMemoryJobRegistry, SampleCleanupJob};
use crate::infrastructure::permission_cache::CachedPermissionRepository;
use crate::infrastructure::{
    FixedWindowRateLimiter, JwksVerifierAdapter, OidcProviderClient, SessionCookieCodec,
    TokenVerifier,
};
use crate::usecase::{OidcFlowUseCase, ResolvePrincipalUseCase};

/// パーミッションキャッシュの最大エントリ数。
const PERMISSION_CACHE_CAPACITY: u64 = 1000;

/// 検証済みの設定から AppState を組み立てる。
pub async fn build_state(cfg: &Config, clock: Arc<dyn Clock>) -> anyhow::Result<AppState> {
    let mode = cfg.auth_mode();
    let dev_principal = Principal::new(
        &cfg.auth.dev_principal.subject,
        cfg.auth.dev_principal.roles.iter().cloned(),
    )?;

    let session_ttl = chrono::Duration::from_std(cfg.session.ttl())?;
    let (verifier, oidc_flow): (Option<Arc<dyn TokenVerifier>>, OidcFlowUseCase) = match mode {
        AuthMode::Oidc => {
            let oidc = cfg
                .resolved_oidc()
                .ok_or_else(|| anyhow::anyhow!("OIDC settings are incomplete"))?;
            let provider = Arc::new(OidcProviderClient::new(oidc.clone())?);

            let verifier = match &oidc.jwks_uri {
                Some(jwks_uri) => {
                    let keys =
                        JwksKeyStore::new(jwks_uri, oidc.jwks_cache_ttl, oidc.http_timeout);
                    let verifier =
                        JwksVerifier::new(Arc::new(keys), &oidc.issuer, oidc.audience.as_deref());
                    JwksVerifierAdapter::new(verifier, oidc.http_timeout)
                }
                None => JwksVerifierAdapter::discovered(provider.clone(), oidc.http_timeout),
            };

            info!(issuer = %oidc.issuer, client_id = %oidc.client_id, "OIDC authentication enabled");
            (
                Some(Arc::new(verifier)),
                OidcFlowUseCase::new(provider, (&oidc).into(), session_ttl, clock.clone()),
            )
        }
        AuthMode::Disabled => {
            warn!(
                subject = %dev_principal.subject,
                roles = ?dev_principal.roles,
                "authentication disabled; every request runs as the development principal"
            );
            (None, OidcFlowUseCase::disabled(clock.clone()))
        }
    };

    let (permission_repo, audit_logger): (Arc<dyn PermissionRepository>, Arc<dyn AuditLogger>) =
        match &cfg.database {
            Some(db) => {
                let pool = sqlx::postgres::PgPoolOptions::new()
                    .max_connections(db.max_connections)
                    .connect(db.url.expose_secret())
                    .await?;
                info!("database connection pool established");
                (
                    Arc::new(PermissionPostgresRepository::new(pool.clone())),
                    Arc::new(AuditLogPostgresRepository::new(pool)),
                )
            }
            None => {
                info!("no database configured, using in-memory repositories");
                (
                    Arc::new(InMemoryPermissionRepository::new(
                        cfg.permissions.roles.clone(),
                    )),
                    Arc::new(InMemoryAuditLogger::new()),
                )
            }
        };

    let permission_repo: Arc<dyn PermissionRepository> = if cfg.permissions.cache_ttl_secs > 0 {
        Arc::new(CachedPermissionRepository::new(
            permission_repo,
            cfg.permissions.cache_ttl_secs,
            PERMISSION_CACHE_CAPACITY,
        ))
    } else {
        permission_repo
    };

    let job_registry = Arc::new(InMemoryJobRegistry::new().register(Arc::new(SampleCleanupJob)));

    let session_secret = match &cfg.session.secret {
        Some(secret) => secret.clone(),
        None => {
            // disabled モードのみ到達する（oidc は validate で拒否済み）
            warn!("session.secret not set; sessions will not survive a restart");
            ephemeral_secret()
        }
    };
    let session_codec = SessionCookieCodec::new(
        &session_secret,
        &cfg.session.cookie_name,
        cfg.session.ttl(),
        cfg.session.cookie_secure,
    );

    let security = build_security_policy(cfg, clock.clone())?;

    Ok(AppState::new(
        ResolvePrincipalUseCase::new(mode, dev_principal, verifier, clock.clone()),
        oidc_flow,
        permission_repo,
        job_registry,
        audit_logger,
        session_codec,
        security,
        clock,
    ))
}

fn build_security_policy(cfg: &Config, clock: Arc<dyn Clock>) -> anyhow::Result<SecurityPolicy> {
    let security = &cfg.security;
    let cors_origins = security
        .cors_origins
        .iter()
        .map(|origin| axum::http::HeaderValue::from_str(origin))
        .collect::<Result<Vec<_>, _>>()?;
    if cors_origins.is_empty() {
        info!("no CORS origins configured; cross-origin browser requests are refused");
    }

    Ok(SecurityPolicy {
        cors_origins,
        rate_limiter: Arc::new(FixedWindowRateLimiter::new(
            security.rate_limit.max_requests,
            security.rate_limit.window(),
            clock,
        )),
        max_concurrent_requests: security.max_concurrent_requests,
    })
}

fn ephemeral_secret() -> SecretString {
    let mut bytes = [0u8; 32];
    rand::thread_rng().fill_bytes(&mut bytes);
    SecretString::new(URL_SAFE_NO_PAD.encode(bytes))
}

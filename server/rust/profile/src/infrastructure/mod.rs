pub mod clock;
pub mod config;
pub mod in_memory;
pub mod jobs;
pub mod jwks_adapter;
pub mod logging;
pub mod oidc_provider;
pub mod permission_cache;
pub mod rate_limiter;
pub mod session_cookie;

pub use clock::{Clock, SystemClock};
pub use jwks_adapter::JwksVerifierAdapter;
pub use oidc_provider::OidcProviderClient;
pub use rate_limiter::{FixedWindowRateLimiter, RateDecision};
pub use session_cookie::SessionCookieCodec;

use async_trait::async_trait;
use profile_auth::{AuthError, ProviderMetadata, TokenResponse, VerifiedToken};

use crate::domain::error::AccessError;

/// TokenVerifier は Bearer トークン検証のためのトレイト。
/// 検証に失敗したトークンはすべて `AccessError::InvalidCredential` になる。
#[cfg_attr(test, mockall::automock)]
#[async_trait]
pub trait TokenVerifier: Send + Sync {
    async fn verify(&self, credential: &str) -> Result<VerifiedToken, AccessError>;
}

/// OidcProvider は認可コードフローで使う IdP 操作のトレイト。
#[cfg_attr(test, mockall::automock)]
#[async_trait]
pub trait OidcProvider: Send + Sync {
    /// ディスカバリ済みのプロバイダメタデータ。
    async fn metadata(&self) -> Result<ProviderMetadata, AuthError>;

    /// 認可コードをトークンに交換する。
    async fn exchange_code(
        &self,
        code: &str,
        code_verifier: &str,
    ) -> Result<TokenResponse, AuthError>;

    /// ID トークンの署名・issuer・audience を検証する。
    async fn verify_id_token(&self, id_token: &str) -> Result<VerifiedToken, AuthError>;
}

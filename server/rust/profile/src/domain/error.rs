//! 認証・認可コアのエラー種別。

/// AccessError は主体解決・OIDC フロー・認可ガードで発生するエラーを表す。
///
/// IdP 由来のエラーはこの型に変換した時点で詳細を落とし、クライアントへは漏らさない。
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum AccessError {
    /// Bearer トークンが不正・期限切れ・検証不能。リクエストは未認証として続行する。
    #[error("invalid credential: {0}")]
    InvalidCredential(String),

    #[error("authentication is misconfigured: {0}")]
    AuthMisconfigured(String),

    #[error("OIDC is not enabled")]
    AuthDisabled,

    #[error("missing login transaction")]
    MissingLoginTransaction,

    #[error("login transaction expired")]
    LoginTransactionExpired,

    #[error("state mismatch")]
    StateMismatch,

    #[error("OIDC callback failed: {0}")]
    CallbackFailed(String),

    #[error("authentication required")]
    Unauthenticated,

    #[error("forbidden")]
    Forbidden,

    /// パーミッションリポジトリの障害。拒否（Forbidden）とは区別する。
    #[error("authorization unavailable: {0}")]
    AuthorizationUnavailable(String),

    #[error("not found: {0}")]
    NotFound(String),

    #[error("rate limit exceeded; retry after {retry_after_secs}s")]
    RateLimited { retry_after_secs: u64 },

    #[error("internal error: {0}")]
    Internal(String),
}

impl AccessError {
    /// エラーレスポンスのコード。
    pub fn code(&self) -> &'static str {
        match self {
            AccessError::InvalidCredential(_)
            | AccessError::CallbackFailed(_)
            | AccessError::Unauthenticated => "UNAUTHENTICATED",
            AccessError::AuthMisconfigured(_) => "AUTH_MISCONFIGURED",
            AccessError::AuthDisabled => "AUTH_DISABLED",
            AccessError::MissingLoginTransaction
            | AccessError::LoginTransactionExpired
            | AccessError::StateMismatch => "AUTH_FLOW",
            AccessError::Forbidden => "FORBIDDEN",
            AccessError::AuthorizationUnavailable(_) => "AUTHORIZATION_UNAVAILABLE",
            AccessError::NotFound(_) => "NOT_FOUND",
            AccessError::RateLimited { .. } => "RATE_LIMITED",
            AccessError::Internal(_) => "INTERNAL",
        }
    }

    /// クライアントに返すメッセージ。内部の詳細は含めない。
    pub fn public_message(&self) -> &'static str {
        match self {
            AccessError::InvalidCredential(_) => "Invalid credential",
            AccessError::AuthMisconfigured(_) => "Authentication is not configured correctly",
            AccessError::AuthDisabled => "OIDC not enabled",
            AccessError::MissingLoginTransaction => "Missing login transaction",
            AccessError::LoginTransactionExpired => "Login transaction expired",
            AccessError::StateMismatch => "State mismatch",
            AccessError::CallbackFailed(_) => "OIDC callback failed",
            AccessError::Unauthenticated => "Authentication required",
            AccessError::Forbidden => "Forbidden",
            AccessError::AuthorizationUnavailable(_) => "Authorization service unavailable",
            AccessError::NotFound(_) => "Not found",
            AccessError::RateLimited { .. } => "Too many requests",
            AccessError::Internal(_) => "Internal server error",
        }
    }

    /// OIDC コールバックで発生した場合にセッションを破棄すべきエラーかどうか。
    pub fn clears_session(&self) -> bool {
        matches!(
            self,
            AccessError::MissingLoginTransaction
                | AccessError::LoginTransactionExpired
                | AccessError::StateMismatch
                | AccessError::CallbackFailed(_)
        )
    }
}

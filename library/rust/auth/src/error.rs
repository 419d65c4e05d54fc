//! 検証・ディスカバリ・トークン交換で共通に使うエラー型。

/// AuthError は信頼アンカーとのやり取りで発生するエラーを表す。
///
/// 単一フライトで複数の呼び出し元に同じ結果を配るため `Clone` を実装する。
/// IdP 固有のエラーオブジェクトは保持せず、文字列化したメッセージのみを持つ。
#[derive(thiserror::Error, Debug, Clone, PartialEq, Eq)]
pub enum AuthError {
    #[error("token expired")]
    TokenExpired,

    #[error("invalid token: {0}")]
    InvalidToken(String),

    #[error("missing subject claim")]
    MissingSubject,

    #[error("JWKS fetch failed: {0}")]
    JwksFetchFailed(String),

    #[error("OIDC discovery failed: {0}")]
    DiscoveryFailed(String),

    #[error("token endpoint request failed: {0}")]
    TokenEndpoint(String),

    #[error("request timed out after {0} ms")]
    Timeout(u64),
}

impl AuthError {
    /// 設定や IdP 側の問題に起因するエラーかどうかを返す（トークン自体の不正ではない）。
    pub fn is_infrastructure(&self) -> bool {
        matches!(
            self,
            AuthError::JwksFetchFailed(_)
                | AuthError::DiscoveryFailed(_)
                | AuthError::TokenEndpoint(_)
                | AuthError::Timeout(_)
        )
    }
}

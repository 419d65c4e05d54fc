use std::sync::Arc;

use profile_auth::{Principal, RawClaims, VerifiedToken};

use crate::domain::entity::{AuthSession, Session, AUTH_SESSION_KEY};
use crate::domain::error::AccessError;
use crate::infrastructure::clock::Clock;
use crate::infrastructure::config::AuthMode;
use crate::infrastructure::TokenVerifier;

/// ResolvePrincipalUseCase はリクエストごとに主体を 1 つ決定する。
///
/// 優先順位: 有効なセッション → 開発用固定 ID（disabled モード）→ Bearer トークン → なし。
pub struct ResolvePrincipalUseCase {
    mode: AuthMode,
    dev_principal: Principal,
    verifier: Option<Arc<dyn TokenVerifier>>,
    clock: Arc<dyn Clock>,
}

impl ResolvePrincipalUseCase {
    pub fn new(
        mode: AuthMode,
        dev_principal: Principal,
        verifier: Option<Arc<dyn TokenVerifier>>,
        clock: Arc<dyn Clock>,
    ) -> Self {
        Self {
            mode,
            dev_principal,
            verifier,
            clock,
        }
    }

    /// 主体を解決する。証拠が無い・Bearer が不正な場合は `Ok(None)`。
    pub async fn execute(
        &self,
        session: &Session,
        authorization: Option<&str>,
    ) -> Result<Option<VerifiedToken>, AccessError> {
        if let Some(auth) = session.get::<AuthSession>(AUTH_SESSION_KEY) {
            if auth.is_active(self.clock.now()) {
                return Ok(Some(VerifiedToken {
                    principal: auth.principal,
                    raw_claims: RawClaims::new(),
                }));
            }
        }

        if self.mode == AuthMode::Disabled {
            return Ok(Some(VerifiedToken {
                principal: self.dev_principal.clone(),
                raw_claims: RawClaims::new(),
            }));
        }

        let Some(token) = authorization.and_then(bearer_token) else {
            return Ok(None);
        };

        let verifier = self.verifier.as_ref().ok_or_else(|| {
            AccessError::AuthMisconfigured("OIDC mode without a bearer token verifier".into())
        })?;

        match verifier.verify(token).await {
            Ok(verified) => Ok(Some(verified)),
            Err(AccessError::InvalidCredential(_)) => Ok(None),
            Err(e) => Err(e),
        }
    }
}

/// `Authorization` ヘッダから Bearer トークンを取り出す。スキーム名は大文字小文字を区別しない。
pub fn bearer_token(header: &str) -> Option<&str> {
    let (scheme, token) = header.trim().split_once(' ')?;
    let token = token.trim();
    (scheme.eq_ignore_ascii_case("bearer") && !token.is_empty()).then_some(token)
}

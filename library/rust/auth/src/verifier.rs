//! JWKS 検証器: 鍵ストアから公開鍵を解決し、JWT の署名・発行者・オーディエンス・有効期限を検証する。

use jsonwebtoken::errors::ErrorKind;
use jsonwebtoken::{decode, decode_header, Algorithm, DecodingKey, Validation};
use std::sync::Arc;

use crate::error::AuthError;
use crate::jwks::JwksKeyStore;
use crate::principal::{RawClaims, VerifiedToken};

/// 受け入れる署名アルゴリズム。HMAC 系と none は受け入れない。
const ALLOWED_ALGORITHMS: &[Algorithm] = &[
    Algorithm::RS256,
    Algorithm::RS384,
    Algorithm::RS512,
    Algorithm::PS256,
    Algorithm::PS384,
    Algorithm::PS512,
    Algorithm::ES256,
    Algorithm::ES384,
];

/// JwksVerifier は 1 つの信頼アンカー（issuer + audience + 鍵セット）に対する検証器。
#[derive(Clone)]
pub struct JwksVerifier {
    keys: Arc<JwksKeyStore>,
    issuer: String,
    audience: Option<String>,
}

impl JwksVerifier {
    /// 新しい JwksVerifier を生成する。audience が `None` の場合は aud を検証しない。
    pub fn new(keys: Arc<JwksKeyStore>, issuer: &str, audience: Option<&str>) -> Self {
        Self {
            keys,
            issuer: issuer.to_string(),
            audience: audience.map(str::to_string),
        }
    }

    /// JWT トークン文字列を検証し、Principal と生の Claims を返す。
    pub async fn verify(&self, token: &str) -> Result<VerifiedToken, AuthError> {
        self.verify_with_audience(token, self.audience.as_deref())
            .await
    }

    /// audience を明示して検証する。ID トークン（aud = client_id）の検証に使う。
    pub async fn verify_with_audience(
        &self,
        token: &str,
        audience: Option<&str>,
    ) -> Result<VerifiedToken, AuthError> {
        let header = decode_header(token).map_err(|e| AuthError::InvalidToken(e.to_string()))?;

        if !ALLOWED_ALGORITHMS.contains(&header.alg) {
            return Err(AuthError::InvalidToken(format!(
                "unsupported algorithm: {:?}",
                header.alg
            )));
        }

        let jwk = self.keys.key_for(header.kid.as_deref()).await?;
        let key = DecodingKey::from_jwk(&jwk).map_err(|e| AuthError::InvalidToken(e.to_string()))?;

        let mut validation = Validation::new(header.alg);
        validation.leeway = 0;
        validation.set_issuer(&[&self.issuer]);
        match audience {
            Some(aud) => validation.set_audience(&[aud]),
            None => validation.validate_aud = false,
        }

        let data = decode::<RawClaims>(token, &key, &validation).map_err(|e| match e.kind() {
            ErrorKind::ExpiredSignature => AuthError::TokenExpired,
            _ => AuthError::InvalidToken(e.to_string()),
        })?;

        VerifiedToken::from_raw_claims(data.claims)
    }
}

use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use profile_auth::{AuthError, JwksVerifier, VerifiedToken};

use crate::domain::error::AccessError;
use crate::infrastructure::oidc_provider::OidcProviderClient;
use crate::infrastructure::TokenVerifier;

/// 検証器の取得元。`jwks_uri` が明示されていればディスカバリを経由しない。
enum VerifierSource {
    Static(JwksVerifier),
    Discovered(Arc<OidcProviderClient>),
}

/// JwksVerifierAdapter はライブラリの JwksVerifier をサーバーの TokenVerifier に適合させる。
pub struct JwksVerifierAdapter {
    source: VerifierSource,
    timeout: Duration,
}

impl JwksVerifierAdapter {
    pub fn new(verifier: JwksVerifier, timeout: Duration) -> Self {
        Self {
            source: VerifierSource::Static(verifier),
            timeout,
        }
    }

    /// ディスカバリ済みプロバイダの鍵ストアで検証する。
    pub fn discovered(provider: Arc<OidcProviderClient>, timeout: Duration) -> Self {
        Self {
            source: VerifierSource::Discovered(provider),
            timeout,
        }
    }

    async fn verify_inner(&self, credential: &str) -> Result<VerifiedToken, AuthError> {
        match &self.source {
            VerifierSource::Static(verifier) => verifier.verify(credential).await,
            VerifierSource::Discovered(provider) => {
                provider.bearer_verifier().await?.verify(credential).await
            }
        }
    }
}

#[async_trait]
impl TokenVerifier for JwksVerifierAdapter {
    async fn verify(&self, credential: &str) -> Result<VerifiedToken, AccessError> {
        let result = match tokio::time::timeout(self.timeout, self.verify_inner(credential)).await {
            Ok(result) => result,
            Err(_) => Err(AuthError::Timeout(
                u64::try_from(self.timeout.as_millis()).unwrap_or(u64::MAX),
            )),
        };

        result.map_err(|e| {
            if e.is_infrastructure() {
                tracing::warn!(error = %e, "bearer token could not be verified");
            } else {
                tracing::debug!(error = %e, "rejected bearer token");
            }
            AccessError::InvalidCredential(e.to_string())
        })
    }
}

//! OIDC プロバイダクライアント: ディスカバリ結果と鍵ストアを issuer 単位でキャッシュする。

use std::sync::Arc;

use async_trait::async_trait;
use profile_auth::{
    discover, AuthError, CodeExchangeClient, CodeExchangeRequest, DefaultJwksFetcher,
    JwksKeyStore, JwksVerifier, ProviderMetadata, TokenResponse, VerifiedToken,
};
use secrecy::ExposeSecret;
use tokio::sync::Mutex;

use crate::infrastructure::config::ResolvedOidc;
use crate::infrastructure::OidcProvider;

/// 発見済みプロバイダの構成。issuer をキーに 1 件だけ保持する。
struct CachedProvider {
    issuer: String,
    metadata: ProviderMetadata,
    verifier: JwksVerifier,
}

/// OidcProviderClient はディスカバリ・トークン交換・ID トークン検証をまとめたクライアント。
pub struct OidcProviderClient {
    http: reqwest::Client,
    settings: ResolvedOidc,
    exchange: CodeExchangeClient,
    cache: Mutex<Option<CachedProvider>>,
}

impl OidcProviderClient {
    /// 設定のタイムアウトで HTTP クライアントを構築する。
    pub fn new(settings: ResolvedOidc) -> anyhow::Result<Self> {
        let http = reqwest::Client::builder()
            .timeout(settings.http_timeout)
            .build()?;
        Ok(Self::with_client(http, settings))
    }

    pub fn with_client(http: reqwest::Client, settings: ResolvedOidc) -> Self {
        let exchange = CodeExchangeClient::new(http.clone(), settings.http_timeout);
        Self {
            http,
            settings,
            exchange,
            cache: Mutex::new(None),
        }
    }

    /// Bearer トークン検証用の検証器（audience は設定値）。
    pub async fn bearer_verifier(&self) -> Result<JwksVerifier, AuthError> {
        let (_, verifier) = self.provider().await?;
        Ok(verifier)
    }

    async fn provider(&self) -> Result<(ProviderMetadata, JwksVerifier), AuthError> {
        let mut cache = self.cache.lock().await;
        if let Some(cached) = cache
            .as_ref()
            .filter(|c| c.issuer == self.settings.issuer)
        {
            return Ok((cached.metadata.clone(), cached.verifier.clone()));
        }

        let metadata = discover(&self.http, &self.settings.issuer).await?;
        if metadata.issuer.trim_end_matches('/') != self.settings.issuer.trim_end_matches('/') {
            return Err(AuthError::DiscoveryFailed(format!(
                "issuer mismatch: expected {}, got {}",
                self.settings.issuer, metadata.issuer
            )));
        }

        let jwks_uri = self
            .settings
            .jwks_uri
            .clone()
            .unwrap_or_else(|| metadata.jwks_uri.clone());
        let fetcher = DefaultJwksFetcher::with_client(self.http.clone(), self.settings.http_timeout);
        let keys = JwksKeyStore::with_fetcher(
            &jwks_uri,
            self.settings.jwks_cache_ttl,
            Arc::new(fetcher),
        );
        let verifier = JwksVerifier::new(
            Arc::new(keys),
            &metadata.issuer,
            self.settings.audience.as_deref(),
        );

        tracing::info!(issuer = %metadata.issuer, jwks_uri = %jwks_uri, "discovered OIDC provider");
        *cache = Some(CachedProvider {
            issuer: self.settings.issuer.clone(),
            metadata: metadata.clone(),
            verifier: verifier.clone(),
        });

        Ok((metadata, verifier))
    }
}

#[async_trait]
impl OidcProvider for OidcProviderClient {
    async fn metadata(&self) -> Result<ProviderMetadata, AuthError> {
        let (metadata, _) = self.provider().await?;
        Ok(metadata)
    }

    async fn exchange_code(
        &self,
        code: &str,
        code_verifier: &str,
    ) -> Result<TokenResponse, AuthError> {
        let metadata = self.metadata().await?;
        let token_endpoint = metadata.token_endpoint.ok_or_else(|| {
            AuthError::DiscoveryFailed("provider does not publish token_endpoint".into())
        })?;

        self.exchange
            .exchange(&CodeExchangeRequest {
                token_endpoint,
                code: code.to_string(),
                code_verifier: code_verifier.to_string(),
                redirect_uri: self.settings.redirect_uri.clone(),
                client_id: self.settings.client_id.clone(),
                client_secret: self
                    .settings
                    .client_secret
                    .as_ref()
                    .map(|s| s.expose_secret().clone()),
            })
            .await
    }

    /// ID トークンは aud = client_id で検証する。
    async fn verify_id_token(&self, id_token: &str) -> Result<VerifiedToken, AuthError> {
        let (_, verifier) = self.provider().await?;
        verifier
            .verify_with_audience(id_token, Some(&self.settings.client_id))
            .await
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;
    use std::time::Duration;
    use wiremock::matchers::{method, path};
    use wiremock::{Mock, MockServer, ResponseTemplate};

    fn settings(issuer: &str) -> ResolvedOidc {
        ResolvedOidc {
            issuer: issuer.to_string(),
            audience: None,
            jwks_uri: None,
            client_id: "profile-web".into(),
            client_secret: None,
            redirect_uri: "http://localhost:8080/auth/callback".into(),
            post_login_redirect_uri: "/".into(),
            post_logout_redirect_uri: None,
            scopes: "openid".into(),
            http_timeout: Duration::from_secs(2),
            jwks_cache_ttl: Duration::from_secs(600),
        }
    }

    async fn mount_discovery(server: &MockServer, issuer: &str, expected_calls: u64) {
        Mock::given(method("GET"))
            .and(path("/.well-known/openid-configuration"))
            .respond_with(ResponseTemplate::new(200).set_body_json(json!({
                "issuer": issuer,
                "jwks_uri": format!("{}/certs", server.uri()),
                "authorization_endpoint": format!("{}/auth", server.uri()),
                "token_endpoint": format!("{}/token", server.uri()),
            })))
            .expect(expected_calls)
            .mount(server)
            .await;
    }

    #[tokio::test]
    async fn test_metadata_is_discovered_once_per_issuer() {
        let server = MockServer::start().await;
        mount_discovery(&server, &server.uri(), 1).await;

        let client = OidcProviderClient::new(settings(&server.uri())).unwrap();
        let first = client.metadata().await.unwrap();
        let second = client.metadata().await.unwrap();

        assert_eq!(first, second);
        assert_eq!(first.token_endpoint, Some(format!("{}/token", server.uri())));
    }

    #[tokio::test]
    async fn test_issuer_mismatch_is_rejected_and_not_cached() {
        let server = MockServer::start().await;
        mount_discovery(&server, "https://elsewhere.example.com", 2).await;

        let client = OidcProviderClient::new(settings(&server.uri())).unwrap();
        for _ in 0..2 {
            let err = client.metadata().await.unwrap_err();
            assert!(matches!(err, AuthError::DiscoveryFailed(msg) if msg.contains("issuer mismatch")));
        }
    }

    #[tokio::test]
    async fn test_exchange_without_token_endpoint_fails() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .and(path("/.well-known/openid-configuration"))
            .respond_with(ResponseTemplate::new(200).set_body_json(json!({
                "issuer": server.uri(),
                "jwks_uri": format!("{}/certs", server.uri()),
            })))
            .mount(&server)
            .await;

        let client = OidcProviderClient::new(settings(&server.uri())).unwrap();
        let err = client.exchange_code("code", "verifier").await.unwrap_err();
        assert!(err.is_infrastructure());
    }
}

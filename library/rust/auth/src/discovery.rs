//! OpenID Connect ディスカバリドキュメントの取得。

use serde::Deserialize;

use crate::error::AuthError;

/// ProviderMetadata は `.well-known/openid-configuration` の必要フィールド。
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ProviderMetadata {
    pub issuer: String,
    pub jwks_uri: String,
    pub authorization_endpoint: Option<String>,
    pub token_endpoint: Option<String>,
    pub end_session_endpoint: Option<String>,
}

#[derive(Debug, Deserialize)]
struct DiscoveryDocument {
    issuer: Option<String>,
    jwks_uri: Option<String>,
    authorization_endpoint: Option<String>,
    token_endpoint: Option<String>,
    end_session_endpoint: Option<String>,
}

/// issuer からディスカバリドキュメントの URL を組み立てる。
pub fn discovery_url(issuer: &str) -> String {
    format!(
        "{}/.well-known/openid-configuration",
        issuer.trim_end_matches('/')
    )
}

/// ディスカバリドキュメントを取得する。`issuer` か `jwks_uri` が欠けていればエラー。
///
/// タイムアウトは渡された `reqwest::Client` の設定に従う。
pub async fn discover(
    client: &reqwest::Client,
    issuer: &str,
) -> Result<ProviderMetadata, AuthError> {
    let url = discovery_url(issuer);
    let resp = client
        .get(&url)
        .send()
        .await
        .map_err(|e| AuthError::DiscoveryFailed(e.to_string()))?;

    if !resp.status().is_success() {
        return Err(AuthError::DiscoveryFailed(format!(
            "{} returned {}",
            url,
            resp.status()
        )));
    }

    let doc: DiscoveryDocument = resp
        .json()
        .await
        .map_err(|e| AuthError::DiscoveryFailed(e.to_string()))?;

    let issuer = doc
        .issuer
        .filter(|s| !s.is_empty())
        .ok_or_else(|| AuthError::DiscoveryFailed("missing issuer".into()))?;
    let jwks_uri = doc
        .jwks_uri
        .filter(|s| !s.is_empty())
        .ok_or_else(|| AuthError::DiscoveryFailed("missing jwks_uri".into()))?;

    Ok(ProviderMetadata {
        issuer,
        jwks_uri,
        authorization_endpoint: doc.authorization_endpoint,
        token_endpoint: doc.token_endpoint,
        end_session_endpoint: doc.end_session_endpoint,
    })
}

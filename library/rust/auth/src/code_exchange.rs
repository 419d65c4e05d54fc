//! Authorization Code Grant（RFC 6749 4.1.3）+ PKCE のトークン交換クライアント。

use serde::{Deserialize, Serialize};
use std::time::Duration;

use crate::error::AuthError;

/// CodeExchangeRequest はトークンエンドポイントへ送る交換パラメータ。
#[derive(Debug, Clone)]
pub struct CodeExchangeRequest {
    pub token_endpoint: String,
    pub code: String,
    pub code_verifier: String,
    pub redirect_uri: String,
    pub client_id: String,
    pub client_secret: Option<String>,
}

/// TokenResponse はトークンエンドポイントのレスポンス。
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TokenResponse {
    pub access_token: String,
    #[serde(default)]
    pub token_type: String,
    #[serde(default)]
    pub id_token: Option<String>,
    #[serde(default)]
    pub expires_in: Option<u64>,
    #[serde(default)]
    pub refresh_token: Option<String>,
}

/// OAuth2 エラーレスポンス。
#[derive(Debug, Deserialize)]
struct OAuthErrorResponse {
    error: String,
    #[serde(default)]
    error_description: Option<String>,
}

/// CodeExchangeClient は認可コードをトークンに交換する。
#[derive(Clone)]
pub struct CodeExchangeClient {
    client: reqwest::Client,
    timeout: Duration,
}

impl CodeExchangeClient {
    /// 新しい CodeExchangeClient を生成する。
    pub fn new(client: reqwest::Client, timeout: Duration) -> Self {
        Self { client, timeout }
    }

    /// 認可コードを交換する。
    pub async fn exchange(&self, req: &CodeExchangeRequest) -> Result<TokenResponse, AuthError> {
        let mut params: Vec<(&str, &str)> = vec![
            ("grant_type", "authorization_code"),
            ("code", &req.code),
            ("redirect_uri", &req.redirect_uri),
            ("client_id", &req.client_id),
            ("code_verifier", &req.code_verifier),
        ];
        if let Some(secret) = req.client_secret.as_deref() {
            params.push(("client_secret", secret));
        }

        let resp = self
            .client
            .post(&req.token_endpoint)
            .timeout(self.timeout)
            .form(&params)
            .send()
            .await
            .map_err(|e| self.map_err(e))?;

        let status = resp.status();
        let body = resp.text().await.map_err(|e| self.map_err(e))?;

        if !status.is_success() {
            let detail = serde_json::from_str::<OAuthErrorResponse>(&body)
                .map(|err| match err.error_description {
                    Some(desc) => format!("{}: {}", err.error, desc),
                    None => err.error,
                })
                .unwrap_or_else(|_| format!("status {}", status.as_u16()));
            return Err(AuthError::TokenEndpoint(detail));
        }

        serde_json::from_str(&body).map_err(|e| AuthError::TokenEndpoint(e.to_string()))
    }

    fn map_err(&self, e: reqwest::Error) -> AuthError {
        if e.is_timeout() {
            AuthError::Timeout(u64::try_from(self.timeout.as_millis()).unwrap_or(u64::MAX))
        } else {
            AuthError::TokenEndpoint(e.to_string())
        }
    }
}

use std::sync::Arc;

use chrono::Duration;
use profile_auth::{AuthError, LoginArtifacts, Principal};
use url::Url;

use crate::domain::entity::{
    AuthSession, LoginTransaction, Session, AUTH_SESSION_KEY, LOGIN_TRANSACTION_KEY,
};
use crate::domain::error::AccessError;
use crate::infrastructure::clock::Clock;
use crate::infrastructure::config::ResolvedOidc;
use crate::infrastructure::OidcProvider;

/// OidcFlowSettings はリダイレクトフローで使うクライアント設定。
#[derive(Debug, Clone)]
pub struct OidcFlowSettings {
    pub client_id: String,
    pub redirect_uri: String,
    pub scopes: String,
    pub post_login_redirect_uri: String,
    pub post_logout_redirect_uri: Option<String>,
}

impl From<&ResolvedOidc> for OidcFlowSettings {
    fn from(oidc: &ResolvedOidc) -> Self {
        Self {
            client_id: oidc.client_id.clone(),
            redirect_uri: oidc.redirect_uri.clone(),
            scopes: oidc.scopes.clone(),
            post_login_redirect_uri: oidc.post_login_redirect_uri.clone(),
            post_logout_redirect_uri: oidc.post_logout_redirect_uri.clone(),
        }
    }
}

/// OidcFlowUseCase はログイン・コールバック・ログアウトの 3 段階のリダイレクトフローを扱う。
pub struct OidcFlowUseCase {
    provider: Option<Arc<dyn OidcProvider>>,
    settings: Option<OidcFlowSettings>,
    session_ttl: Duration,
    clock: Arc<dyn Clock>,
}

impl OidcFlowUseCase {
    pub fn new(
        provider: Arc<dyn OidcProvider>,
        settings: OidcFlowSettings,
        session_ttl: Duration,
        clock: Arc<dyn Clock>,
    ) -> Self {
        Self {
            provider: Some(provider),
            settings: Some(settings),
            session_ttl,
            clock,
        }
    }

    /// OIDC が無効な構成。ログインとコールバックは `AuthDisabled` になる。
    pub fn disabled(clock: Arc<dyn Clock>) -> Self {
        Self {
            provider: None,
            settings: None,
            session_ttl: Duration::zero(),
            clock,
        }
    }

    /// ログイン成功後のリダイレクト先。
    pub fn post_login_redirect(&self) -> &str {
        self.settings
            .as_ref()
            .map_or("/", |s| s.post_login_redirect_uri.as_str())
    }

    fn enabled(&self) -> Result<(&Arc<dyn OidcProvider>, &OidcFlowSettings), AccessError> {
        match (&self.provider, &self.settings) {
            (Some(provider), Some(settings)) => Ok((provider, settings)),
            _ => Err(AccessError::AuthDisabled),
        }
    }

    /// 新しい LoginTransaction をセッションに保存し、認可エンドポイントの URL を返す。
    pub async fn begin_login(&self, session: &mut Session) -> Result<String, AccessError> {
        let (provider, settings) = self.enabled()?;

        let metadata = provider.metadata().await.map_err(|e| {
            tracing::error!(error = %e, "OIDC provider discovery failed");
            AccessError::Internal(format!("provider discovery failed: {e}"))
        })?;
        let endpoint = metadata.authorization_endpoint.ok_or_else(|| {
            AccessError::Internal("provider does not publish authorization_endpoint".into())
        })?;
        let mut url = Url::parse(&endpoint)
            .map_err(|e| AccessError::Internal(format!("invalid authorization_endpoint: {e}")))?;

        let artifacts = LoginArtifacts::generate();
        let challenge = artifacts.code_challenge();
        let transaction = LoginTransaction::new(artifacts, self.clock.now());

        url.query_pairs_mut()
            .append_pair("response_type", "code")
            .append_pair("client_id", &settings.client_id)
            .append_pair("redirect_uri", &settings.redirect_uri)
            .append_pair("scope", &settings.scopes)
            .append_pair("state", &transaction.state)
            .append_pair("nonce", &transaction.nonce)
            .append_pair("code_challenge", &challenge)
            .append_pair("code_challenge_method", "S256");

        session.insert(LOGIN_TRANSACTION_KEY, &transaction)?;
        Ok(url.into())
    }

    /// コールバックを処理して AuthSession を確立する。
    ///
    /// LoginTransaction は成否に関わらずここで消費される。フローのエラーではセッション全体を破棄する。
    pub async fn complete_callback(
        &self,
        session: &mut Session,
        state: Option<&str>,
        code: Option<&str>,
    ) -> Result<Principal, AccessError> {
        let result = self.establish_session(session, state, code).await;
        if let Err(e) = &result {
            if e.clears_session() {
                session.clear();
            }
        }
        result
    }

    async fn establish_session(
        &self,
        session: &mut Session,
        state: Option<&str>,
        code: Option<&str>,
    ) -> Result<Principal, AccessError> {
        let (provider, _) = self.enabled()?;

        let transaction: LoginTransaction = session
            .take(LOGIN_TRANSACTION_KEY)
            .ok_or(AccessError::MissingLoginTransaction)?;

        let now = self.clock.now();
        if transaction.is_expired(now) {
            return Err(AccessError::LoginTransactionExpired);
        }
        if state != Some(transaction.state.as_str()) {
            return Err(AccessError::StateMismatch);
        }
        let code = code
            .filter(|c| !c.is_empty())
            .ok_or_else(|| AccessError::CallbackFailed("missing authorization code".into()))?;

        let tokens = provider
            .exchange_code(code, &transaction.code_verifier)
            .await
            .map_err(callback_failed)?;
        let id_token = tokens
            .id_token
            .ok_or_else(|| AccessError::CallbackFailed("token response has no id_token".into()))?;

        let verified = provider
            .verify_id_token(&id_token)
            .await
            .map_err(callback_failed)?;
        let identity = verified.identity();
        if identity.nonce.as_deref() != Some(transaction.nonce.as_str()) {
            return Err(AccessError::CallbackFailed("nonce mismatch".into()));
        }

        let session_limit = (now + self.session_ttl).timestamp_millis();
        let token_expires_at = identity
            .exp
            .map_or(session_limit, |exp| exp.saturating_mul(1000).min(session_limit));

        let principal = verified.principal;
        session.insert(
            AUTH_SESSION_KEY,
            &AuthSession {
                principal: principal.clone(),
                token_expires_at,
                id_token: Some(id_token),
            },
        )?;

        tracing::info!(sub = %principal.subject, "OIDC login completed");
        Ok(principal)
    }

    /// セッションを破棄し、ログアウト後のリダイレクト先を返す。失敗しない。
    pub async fn build_logout(&self, session: &mut Session) -> String {
        let id_token_hint = session
            .get::<AuthSession>(AUTH_SESSION_KEY)
            .and_then(|auth| auth.id_token);
        session.clear();

        let post_logout = self
            .settings
            .as_ref()
            .and_then(|s| s.post_logout_redirect_uri.clone());
        let fallback = post_logout.clone().unwrap_or_else(|| "/".to_string());

        let Ok((provider, _)) = self.enabled() else {
            return fallback;
        };

        let endpoint = match provider.metadata().await {
            Ok(metadata) => metadata.end_session_endpoint,
            Err(e) => {
                tracing::warn!(error = %e, "discovery failed during logout; using local redirect");
                None
            }
        };
        let Some(endpoint) = endpoint else {
            return fallback;
        };

        match Url::parse(&endpoint) {
            Ok(mut url) => {
                {
                    let mut query = url.query_pairs_mut();
                    if let Some(hint) = &id_token_hint {
                        query.append_pair("id_token_hint", hint);
                    }
                    if let Some(uri) = &post_logout {
                        query.append_pair("post_logout_redirect_uri", uri);
                    }
                }
                url.into()
            }
            Err(e) => {
                tracing::warn!(error = %e, endpoint = %endpoint, "invalid end_session_endpoint");
                fallback
            }
        }
    }
}

fn callback_failed(e: AuthError) -> AccessError {
    tracing::error!(error = %e, "OIDC callback failed");
    AccessError::CallbackFailed(e.to_string())
}

use std::collections::BTreeMap;
use std::time::Duration;

use secrecy::{ExposeSecret, SecretString};
use serde::Deserialize;

/// セッション鍵の最小長。
const MIN_SESSION_SECRET_LEN: usize = 16;

/// セッション TTL の下限（秒）。
const MIN_SESSION_TTL_SECS: u64 = 60;

/// ConfigError は設定の読み込み・検証エラーを表す。
#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    #[error("failed to read config file {path}: {source}")]
    Read {
        path: String,
        #[source]
        source: std::io::Error,
    },

    #[error("failed to parse config: {0}")]
    Parse(#[from] serde_yaml::Error),

    #[error("auth.mode=disabled is not allowed when app.environment=production")]
    DisabledInProduction,

    #[error("auth.mode=oidc requires: {0}")]
    MissingOidcSettings(String),

    #[error("auth.dev_principal.subject must not be empty")]
    EmptyDevSubject,

    #[error("session.ttl_secs must be at least {MIN_SESSION_TTL_SECS}")]
    SessionTtlTooShort,

    #[error("invalid security settings: {0}")]
    InvalidSecuritySettings(String),

    #[error("{key} must be an absolute URL or a path starting with '/': {value}")]
    InvalidRedirectUri { key: &'static str, value: String },
}

/// Application configuration.
#[derive(Debug, Clone, Deserialize)]
pub struct Config {
    pub app: AppConfig,
    #[serde(default)]
    pub server: ServerConfig,
    #[serde(default)]
    pub auth: AuthConfig,
    #[serde(default)]
    pub session: SessionConfig,
    #[serde(default)]
    pub database: Option<DatabaseConfig>,
    #[serde(default)]
    pub permissions: PermissionsConfig,
    #[serde(default)]
    pub security: SecurityConfig,
    #[serde(default)]
    pub logging: LoggingConfig,
}

#[derive(Debug, Clone, Deserialize)]
pub struct AppConfig {
    pub name: String,
    #[serde(default = "default_version")]
    pub version: String,
    #[serde(default = "default_environment")]
    pub environment: String,
}

fn default_version() -> String {
    "0.1.0".to_string()
}

fn default_environment() -> String {
    "dev".to_string()
}

impl AppConfig {
    pub fn is_production(&self) -> bool {
        self.environment == "production"
    }
}

#[derive(Debug, Clone, Deserialize)]
pub struct ServerConfig {
    #[serde(default = "default_host")]
    pub host: String,
    #[serde(default = "default_port")]
    pub port: u16,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            host: default_host(),
            port: default_port(),
        }
    }
}

fn default_host() -> String {
    "0.0.0.0".to_string()
}

fn default_port() -> u16 {
    8080
}

/// AuthMode は主体解決の方式。開発用の固定 ID と OIDC は排他。
#[derive(Debug, Clone, Copy, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum AuthMode {
    Disabled,
    Oidc,
}

#[derive(Debug, Clone, Default, Deserialize)]
pub struct AuthConfig {
    /// 未指定の場合は production なら oidc、それ以外は disabled
    #[serde(default)]
    pub mode: Option<AuthMode>,
    #[serde(default)]
    pub dev_principal: DevPrincipalConfig,
    #[serde(default)]
    pub oidc: OidcConfig,
    #[serde(default)]
    pub keycloak: Option<KeycloakConfig>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct DevPrincipalConfig {
    #[serde(default = "default_dev_subject")]
    pub subject: String,
    #[serde(default)]
    pub roles: Vec<String>,
}

impl Default for DevPrincipalConfig {
    fn default() -> Self {
        Self {
            subject: default_dev_subject(),
            roles: Vec::new(),
        }
    }
}

fn default_dev_subject() -> String {
    "dev".to_string()
}

#[derive(Debug, Clone, Deserialize)]
pub struct OidcConfig {
    #[serde(default)]
    pub issuer: Option<String>,
    #[serde(default)]
    pub audience: Option<String>,
    /// 明示指定するとディスカバリを経ずに Bearer 検証の鍵セットを取得する
    #[serde(default)]
    pub jwks_uri: Option<String>,
    #[serde(default)]
    pub client_id: Option<String>,
    #[serde(default)]
    pub client_secret: Option<SecretString>,
    #[serde(default)]
    pub redirect_uri: Option<String>,
    #[serde(default = "default_post_login_redirect_uri")]
    pub post_login_redirect_uri: String,
    #[serde(default)]
    pub post_logout_redirect_uri: Option<String>,
    #[serde(default = "default_scopes")]
    pub scopes: String,
    #[serde(default = "default_http_timeout_secs")]
    pub http_timeout_secs: u64,
    #[serde(default = "default_jwks_cache_ttl_secs")]
    pub jwks_cache_ttl_secs: u64,
}

impl Default for OidcConfig {
    fn default() -> Self {
        Self {
            issuer: None,
            audience: None,
            jwks_uri: None,
            client_id: None,
            client_secret: None,
            redirect_uri: None,
            post_login_redirect_uri: default_post_login_redirect_uri(),
            post_logout_redirect_uri: None,
            scopes: default_scopes(),
            http_timeout_secs: default_http_timeout_secs(),
            jwks_cache_ttl_secs: default_jwks_cache_ttl_secs(),
        }
    }
}

fn default_post_login_redirect_uri() -> String {
    "/".to_string()
}

fn default_scopes() -> String {
    "openid profile email".to_string()
}

fn default_http_timeout_secs() -> u64 {
    5
}

fn default_jwks_cache_ttl_secs() -> u64 {
    600
}

/// KeycloakConfig は issuer / audience を Keycloak の realm から導出するための簡易設定。
#[derive(Debug, Clone, Deserialize)]
pub struct KeycloakConfig {
    pub base_url: String,
    pub realm: String,
    #[serde(default)]
    pub client_id: Option<String>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct SessionConfig {
    #[serde(default)]
    pub secret: Option<SecretString>,
    #[serde(default = "default_cookie_name")]
    pub cookie_name: String,
    #[serde(default = "default_session_ttl_secs")]
    pub ttl_secs: u64,
    #[serde(default)]
    pub cookie_secure: bool,
}

impl Default for SessionConfig {
    fn default() -> Self {
        Self {
            secret: None,
            cookie_name: default_cookie_name(),
            ttl_secs: default_session_ttl_secs(),
            cookie_secure: false,
        }
    }
}

fn default_cookie_name() -> String {
    "sid".to_string()
}

fn default_session_ttl_secs() -> u64 {
    3600
}

impl SessionConfig {
    pub fn ttl(&self) -> Duration {
        Duration::from_secs(self.ttl_secs)
    }
}

#[derive(Debug, Clone, Deserialize)]
pub struct DatabaseConfig {
    pub url: SecretString,
    #[serde(default = "default_max_connections")]
    pub max_connections: u32,
}

fn default_max_connections() -> u32 {
    10
}

#[derive(Debug, Clone, Deserialize)]
pub struct PermissionsConfig {
    /// ロール名 → パーミッション名一覧（インメモリリポジトリ用）
    #[serde(default = "default_role_permissions")]
    pub roles: BTreeMap<String, Vec<String>>,
    #[serde(default = "default_permission_cache_ttl_secs")]
    pub cache_ttl_secs: u64,
}

impl Default for PermissionsConfig {
    fn default() -> Self {
        Self {
            roles: default_role_permissions(),
            cache_ttl_secs: default_permission_cache_ttl_secs(),
        }
    }
}

fn default_role_permissions() -> BTreeMap<String, Vec<String>> {
    BTreeMap::from([(
        "admin".to_string(),
        vec!["adminJobs.run".to_string(), "docs.view".to_string()],
    )])
}

fn default_permission_cache_ttl_secs() -> u64 {
    60
}

/// SecurityConfig は CORS 許可リスト・レート制限・同時実行数の上限。
#[derive(Debug, Clone, Deserialize)]
pub struct SecurityConfig {
    /// 許可するブラウザ Origin。空なら Origin 付きのクロスオリジン要求はすべて不許可
    #[serde(default)]
    pub cors_origins: Vec<String>,
    #[serde(default)]
    pub rate_limit: RateLimitConfig,
    #[serde(default = "default_max_concurrent_requests")]
    pub max_concurrent_requests: usize,
}

impl Default for SecurityConfig {
    fn default() -> Self {
        Self {
            cors_origins: Vec::new(),
            rate_limit: RateLimitConfig::default(),
            max_concurrent_requests: default_max_concurrent_requests(),
        }
    }
}

fn default_max_concurrent_requests() -> usize {
    1024
}

/// RateLimitConfig はクライアント IP ごとの固定ウィンドウ制限。
#[derive(Debug, Clone, Deserialize)]
pub struct RateLimitConfig {
    #[serde(default = "default_rate_limit_max_requests")]
    pub max_requests: u32,
    #[serde(default = "default_rate_limit_window_secs")]
    pub window_secs: u64,
}

impl Default for RateLimitConfig {
    fn default() -> Self {
        Self {
            max_requests: default_rate_limit_max_requests(),
            window_secs: default_rate_limit_window_secs(),
        }
    }
}

fn default_rate_limit_max_requests() -> u32 {
    200
}

fn default_rate_limit_window_secs() -> u64 {
    60
}

impl RateLimitConfig {
    pub fn window(&self) -> Duration {
        Duration::from_secs(self.window_secs)
    }
}

#[derive(Debug, Clone, Deserialize)]
pub struct LoggingConfig {
    #[serde(default = "default_log_level")]
    pub level: String,
    /// "json" または "text"
    #[serde(default = "default_log_format")]
    pub format: String,
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            level: default_log_level(),
            format: default_log_format(),
        }
    }
}

fn default_log_level() -> String {
    "info".to_string()
}

fn default_log_format() -> String {
    "json".to_string()
}

/// ResolvedOidc は Keycloak 簡易設定を展開した後の OIDC 設定。
#[derive(Debug, Clone)]
pub struct ResolvedOidc {
    pub issuer: String,
    pub audience: Option<String>,
    pub jwks_uri: Option<String>,
    pub client_id: String,
    pub client_secret: Option<SecretString>,
    pub redirect_uri: String,
    pub post_login_redirect_uri: String,
    pub post_logout_redirect_uri: Option<String>,
    pub scopes: String,
    pub http_timeout: Duration,
    pub jwks_cache_ttl: Duration,
}

impl Config {
    /// YAML ファイルから設定を読み込み、環境変数で機密値を上書きする。
    pub fn load(path: &str) -> Result<Self, ConfigError> {
        let content = std::fs::read_to_string(path).map_err(|source| ConfigError::Read {
            path: path.to_string(),
            source,
        })?;
        let mut cfg = Self::from_yaml(&content)?;
        cfg.apply_env_overrides(|key| std::env::var(key).ok());
        Ok(cfg)
    }

    pub fn from_yaml(content: &str) -> Result<Self, ConfigError> {
        Ok(serde_yaml::from_str(content)?)
    }

    /// SESSION_SECRET / OIDC_CLIENT_SECRET / DATABASE_URL で機密値を、
    /// CORS_ORIGINS（カンマ区切り）で CORS 許可リストを上書きする。
    pub fn apply_env_overrides<F>(&mut self, lookup: F)
    where
        F: Fn(&str) -> Option<String>,
    {
        if let Some(secret) = lookup("SESSION_SECRET").filter(|s| !s.is_empty()) {
            self.session.secret = Some(SecretString::new(secret));
        }
        if let Some(secret) = lookup("OIDC_CLIENT_SECRET").filter(|s| !s.is_empty()) {
            self.auth.oidc.client_secret = Some(SecretString::new(secret));
        }
        if let Some(origins) = lookup("CORS_ORIGINS") {
            self.security.cors_origins = origins
                .split(',')
                .map(str::trim)
                .filter(|s| !s.is_empty())
                .map(str::to_string)
                .collect();
        }
        if let Some(url) = lookup("DATABASE_URL").filter(|s| !s.is_empty()) {
            let max_connections = self
                .database
                .as_ref()
                .map_or_else(default_max_connections, |d| d.max_connections);
            self.database = Some(DatabaseConfig {
                url: SecretString::new(url),
                max_connections,
            });
        }
    }

    /// 実効の認証モード。
    pub fn auth_mode(&self) -> AuthMode {
        self.auth.mode.unwrap_or(if self.app.is_production() {
            AuthMode::Oidc
        } else {
            AuthMode::Disabled
        })
    }

    /// Keycloak 簡易設定を考慮した issuer。
    pub fn oidc_issuer(&self) -> Option<String> {
        self.auth.oidc.issuer.clone().or_else(|| {
            self.auth.keycloak.as_ref().map(|kc| {
                format!("{}/realms/{}", kc.base_url.trim_end_matches('/'), kc.realm)
            })
        })
    }

    /// 起動時の検証。OIDC モードで必須の設定が欠けていれば起動を拒否する。
    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.session.ttl_secs < MIN_SESSION_TTL_SECS {
            return Err(ConfigError::SessionTtlTooShort);
        }

        self.validate_security()?;
        check_redirect_uri(
            "auth.oidc.post_login_redirect_uri",
            &self.auth.oidc.post_login_redirect_uri,
        )?;
        if let Some(uri) = &self.auth.oidc.post_logout_redirect_uri {
            check_redirect_uri("auth.oidc.post_logout_redirect_uri", uri)?;
        }

        match self.auth_mode() {
            AuthMode::Disabled => {
                if self.app.is_production() {
                    return Err(ConfigError::DisabledInProduction);
                }
                if self.auth.dev_principal.subject.trim().is_empty() {
                    return Err(ConfigError::EmptyDevSubject);
                }
            }
            AuthMode::Oidc => {
                let mut missing = Vec::new();
                if self.oidc_issuer().is_none() {
                    missing.push("auth.oidc.issuer");
                }
                if self.client_id().is_none() {
                    missing.push("auth.oidc.client_id");
                }
                if self.auth.oidc.redirect_uri.is_none() {
                    missing.push("auth.oidc.redirect_uri");
                }
                let secret_ok = self
                    .session
                    .secret
                    .as_ref()
                    .is_some_and(|s| s.expose_secret().len() >= MIN_SESSION_SECRET_LEN);
                if !secret_ok {
                    missing.push("session.secret");
                }
                if !missing.is_empty() {
                    return Err(ConfigError::MissingOidcSettings(missing.join(", ")));
                }
            }
        }

        Ok(())
    }

    /// OIDC モードで使う設定を解決する。必須項目が欠けていれば `None`。
    pub fn resolved_oidc(&self) -> Option<ResolvedOidc> {
        let oidc = &self.auth.oidc;
        let audience = oidc.audience.clone().or_else(|| {
            self.auth
                .keycloak
                .as_ref()
                .and_then(|kc| kc.client_id.clone())
        });

        Some(ResolvedOidc {
            issuer: self.oidc_issuer()?,
            audience,
            jwks_uri: oidc.jwks_uri.clone(),
            client_id: self.client_id()?,
            client_secret: oidc.client_secret.clone(),
            redirect_uri: oidc.redirect_uri.clone()?,
            post_login_redirect_uri: oidc.post_login_redirect_uri.clone(),
            post_logout_redirect_uri: oidc.post_logout_redirect_uri.clone(),
            scopes: oidc.scopes.clone(),
            http_timeout: Duration::from_secs(oidc.http_timeout_secs),
            jwks_cache_ttl: Duration::from_secs(oidc.jwks_cache_ttl_secs),
        })
    }

    fn validate_security(&self) -> Result<(), ConfigError> {
        let security = &self.security;
        if security.rate_limit.max_requests == 0 || security.rate_limit.window_secs == 0 {
            return Err(ConfigError::InvalidSecuritySettings(
                "security.rate_limit.max_requests and window_secs must be at least 1".into(),
            ));
        }
        if security.max_concurrent_requests == 0 {
            return Err(ConfigError::InvalidSecuritySettings(
                "security.max_concurrent_requests must be at least 1".into(),
            ));
        }
        for origin in &security.cors_origins {
            let valid = url::Url::parse(origin)
                .is_ok_and(|u| u.has_host() && u.origin().ascii_serialization() == *origin)
                && axum::http::HeaderValue::from_str(origin).is_ok();
            if !valid {
                return Err(ConfigError::InvalidSecuritySettings(format!(
                    "security.cors_origins entry is not an origin: {origin}"
                )));
            }
        }
        Ok(())
    }

    fn client_id(&self) -> Option<String> {
        self.auth.oidc.client_id.clone().or_else(|| {
            self.auth
                .keycloak
                .as_ref()
                .and_then(|kc| kc.client_id.clone())
        })
    }
}

/// リダイレクト先は Location ヘッダとして送出できる絶対 URL かサイト内パスに限る。
fn check_redirect_uri(key: &'static str, value: &str) -> Result<(), ConfigError> {
    let is_local_path = value.starts_with('/') && !value.starts_with("//");
    let well_formed = is_local_path || url::Url::parse(value).is_ok_and(|u| u.has_host());
    if well_formed && axum::http::HeaderValue::from_str(value).is_ok() {
        Ok(())
    } else {
        Err(ConfigError::InvalidRedirectUri {
            key,
            value: value.to_string(),
        })
    }
}

//! JWKS 鍵ストア: HTTP で公開鍵セットを取得し TTL 付きでキャッシュする。
//!
//! キャッシュ切れや未知の kid による再取得は [`SingleFlight`] で重複排除し、
//! 同時に発生した N 件のミスでも JWKS エンドポイントへのリクエストは 1 回になる。

use jsonwebtoken::jwk::{Jwk, JwkSet};
use std::sync::Arc;
use std::time::{Duration, Instant};
use tokio::sync::RwLock;

use crate::error::AuthError;
use crate::single_flight::SingleFlight;

/// 未知の kid による強制再取得の最小間隔（既定値）。
const DEFAULT_MIN_REFRESH_INTERVAL: Duration = Duration::from_secs(10);

/// JwksFetcher は JWKS エンドポイントからの鍵取得を抽象化するトレイト。
#[async_trait::async_trait]
pub trait JwksFetcher: Send + Sync {
    async fn fetch_keys(&self, jwks_uri: &str) -> Result<JwkSet, AuthError>;
}

/// DefaultJwksFetcher は reqwest で JWKS を取得するデフォルト実装。
pub struct DefaultJwksFetcher {
    client: reqwest::Client,
    timeout: Duration,
}

impl DefaultJwksFetcher {
    /// タイムアウト付きの HTTP クライアントで DefaultJwksFetcher を生成する。
    pub fn new(timeout: Duration) -> Self {
        let client = reqwest::Client::builder()
            .timeout(timeout)
            .build()
            .unwrap_or_else(|_| reqwest::Client::new());
        Self { client, timeout }
    }

    /// 既存の HTTP クライアントを使う。タイムアウトはリクエスト単位で設定する。
    pub fn with_client(client: reqwest::Client, timeout: Duration) -> Self {
        Self { client, timeout }
    }

    fn map_err(&self, e: reqwest::Error) -> AuthError {
        if e.is_timeout() {
            AuthError::Timeout(u64::try_from(self.timeout.as_millis()).unwrap_or(u64::MAX))
        } else {
            AuthError::JwksFetchFailed(e.to_string())
        }
    }
}

#[async_trait::async_trait]
impl JwksFetcher for DefaultJwksFetcher {
    async fn fetch_keys(&self, jwks_uri: &str) -> Result<JwkSet, AuthError> {
        let resp = self
            .client
            .get(jwks_uri)
            .timeout(self.timeout)
            .send()
            .await
            .map_err(|e| self.map_err(e))?;

        if !resp.status().is_success() {
            return Err(AuthError::JwksFetchFailed(format!(
                "{} returned {}",
                jwks_uri,
                resp.status()
            )));
        }

        resp.json::<JwkSet>().await.map_err(|e| self.map_err(e))
    }
}

/// JWKS キャッシュ。
struct CachedKeys {
    keys: Arc<JwkSet>,
    fetched_at: Instant,
}

/// JwksKeyStore は同一の信頼アンカーを共有する全リクエストで使う鍵キャッシュ。
pub struct JwksKeyStore {
    jwks_uri: String,
    fetcher: Arc<dyn JwksFetcher>,
    cache: Arc<RwLock<Option<CachedKeys>>>,
    ttl: Duration,
    min_refresh_interval: Duration,
    refresh: SingleFlight<Arc<JwkSet>>,
}

impl JwksKeyStore {
    /// 新しい JwksKeyStore を生成する。
    pub fn new(jwks_uri: &str, ttl: Duration, timeout: Duration) -> Self {
        Self::with_fetcher(jwks_uri, ttl, Arc::new(DefaultJwksFetcher::new(timeout)))
    }

    /// カスタムフェッチャーを使う JwksKeyStore を生成する（テスト用）。
    pub fn with_fetcher(jwks_uri: &str, ttl: Duration, fetcher: Arc<dyn JwksFetcher>) -> Self {
        Self {
            jwks_uri: jwks_uri.to_string(),
            fetcher,
            cache: Arc::new(RwLock::new(None)),
            ttl,
            min_refresh_interval: DEFAULT_MIN_REFRESH_INTERVAL,
            refresh: SingleFlight::new(),
        }
    }

    /// 未知の kid による強制再取得の最小間隔を変更する。
    pub fn with_min_refresh_interval(mut self, interval: Duration) -> Self {
        self.min_refresh_interval = interval;
        self
    }

    pub fn jwks_uri(&self) -> &str {
        &self.jwks_uri
    }

    /// kid に対応する JWK を返す。
    ///
    /// kid が無い場合は鍵セットに鍵が 1 つだけのときに限りその鍵を使う。
    /// 未知の kid はキャッシュが十分古ければ 1 回だけ再取得してから判定する。
    pub async fn key_for(&self, kid: Option<&str>) -> Result<Jwk, AuthError> {
        let keys = self.current_keys().await?;
        if let Some(jwk) = select_key(&keys, kid)? {
            return Ok(jwk);
        }

        let kid = kid.unwrap_or_default();
        if !self.refresh_allowed().await {
            return Err(AuthError::InvalidToken(format!("unknown kid: {}", kid)));
        }

        tracing::debug!(kid = %kid, "unknown kid, refreshing JWKS");
        let keys = self.refresh_keys().await?;
        select_key(&keys, Some(kid))?
            .ok_or_else(|| AuthError::InvalidToken(format!("unknown kid: {}", kid)))
    }

    /// キャッシュが有効ならそれを返し、期限切れなら再取得する。
    async fn current_keys(&self) -> Result<Arc<JwkSet>, AuthError> {
        let stale = {
            let cache = self.cache.read().await;
            match cache.as_ref() {
                Some(c) if c.fetched_at.elapsed() < self.ttl => return Ok(c.keys.clone()),
                Some(c) => Some(c.keys.clone()),
                None => None,
            }
        };

        match self.refresh_keys().await {
            Ok(keys) => Ok(keys),
            Err(e) => match stale {
                Some(keys) => {
                    tracing::warn!(error = %e, "JWKS refresh failed, using stale keys");
                    Ok(keys)
                }
                None => Err(e),
            },
        }
    }

    async fn refresh_allowed(&self) -> bool {
        let cache = self.cache.read().await;
        cache
            .as_ref()
            .is_none_or(|c| c.fetched_at.elapsed() >= self.min_refresh_interval)
    }

    /// JWKS を取得してキャッシュを更新する。同時呼び出しは 1 回の取得にまとめる。
    async fn refresh_keys(&self) -> Result<Arc<JwkSet>, AuthError> {
        let fetcher = self.fetcher.clone();
        let cache = self.cache.clone();
        let uri = self.jwks_uri.clone();

        self.refresh
            .run(move || async move {
                let keys = Arc::new(fetcher.fetch_keys(&uri).await?);
                let mut guard = cache.write().await;
                *guard = Some(CachedKeys {
                    keys: keys.clone(),
                    fetched_at: Instant::now(),
                });
                Ok(keys)
            })
            .await
    }
}

fn select_key(keys: &JwkSet, kid: Option<&str>) -> Result<Option<Jwk>, AuthError> {
    match kid {
        Some(kid) => Ok(keys.find(kid).cloned()),
        None if keys.keys.len() == 1 => Ok(keys.keys.first().cloned()),
        None => Err(AuthError::InvalidToken("missing kid in header".into())),
    }
}

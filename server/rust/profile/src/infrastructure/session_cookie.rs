//! 暗号化 Cookie によるセッションストア。
//!
//! セッション（JSON マップ）を AES-256-GCM で暗号化し、ランダム nonce を先頭に付けて
//! base64url で Cookie に格納する。改ざん・復号不能な Cookie は空のセッションとして扱う。

use aes_gcm::{
    aead::{Aead, KeyInit},
    Aes256Gcm, Nonce,
};
use axum_extra::extract::cookie::{Cookie, CookieJar, SameSite};
use base64::{engine::general_purpose::URL_SAFE_NO_PAD, Engine};
use rand::RngCore;
use secrecy::{ExposeSecret, SecretString};
use sha2::{Digest, Sha256};
use std::time::Duration;

use crate::domain::entity::Session;
use crate::domain::error::AccessError;

const NONCE_LEN: usize = 12;

/// SessionCookieCodec はセッションと Cookie の相互変換を行う。
#[derive(Clone)]
pub struct SessionCookieCodec {
    key: [u8; 32],
    cookie_name: String,
    ttl: Duration,
    secure: bool,
}

impl SessionCookieCodec {
    /// セッション鍵は SHA-256 でハッシュして 32 バイトの AES 鍵にする。
    pub fn new(secret: &SecretString, cookie_name: &str, ttl: Duration, secure: bool) -> Self {
        let key: [u8; 32] = Sha256::digest(secret.expose_secret().as_bytes()).into();
        Self {
            key,
            cookie_name: cookie_name.to_string(),
            ttl,
            secure,
        }
    }

    pub fn cookie_name(&self) -> &str {
        &self.cookie_name
    }

    /// Cookie からセッションを読み込む。Cookie が無い・復号できない場合は空のセッション。
    pub fn load(&self, jar: &CookieJar) -> Session {
        let Some(cookie) = jar.get(&self.cookie_name) else {
            return Session::new();
        };
        match self.open(cookie.value()) {
            Some(session) => session,
            None => {
                tracing::debug!(cookie = %self.cookie_name, "discarding undecryptable session cookie");
                Session::new()
            }
        }
    }

    /// セッションを Cookie に書き戻す。空のセッションは Cookie を削除する。
    pub fn store(&self, jar: CookieJar, session: &Session) -> Result<CookieJar, AccessError> {
        if session.is_empty() {
            return Ok(jar.remove(Cookie::build(self.cookie_name.clone()).path("/")));
        }

        let value = self.seal(session)?;
        let max_age = time::Duration::seconds(i64::try_from(self.ttl.as_secs()).unwrap_or(i64::MAX));
        let cookie = Cookie::build((self.cookie_name.clone(), value))
            .http_only(true)
            .same_site(SameSite::Lax)
            .path("/")
            .secure(self.secure)
            .max_age(max_age);

        Ok(jar.add(cookie))
    }

    /// セッションを暗号化して Cookie 値にする。
    pub fn seal(&self, session: &Session) -> Result<String, AccessError> {
        let plaintext =
            serde_json::to_vec(session).map_err(|e| AccessError::Internal(e.to_string()))?;

        let cipher = Aes256Gcm::new_from_slice(&self.key)
            .map_err(|e| AccessError::Internal(e.to_string()))?;

        let mut nonce_bytes = [0u8; NONCE_LEN];
        rand::thread_rng().fill_bytes(&mut nonce_bytes);
        let nonce = Nonce::from_slice(&nonce_bytes);

        let ciphertext = cipher
            .encrypt(nonce, plaintext.as_ref())
            .map_err(|e| AccessError::Internal(e.to_string()))?;

        // nonce を先頭に付けて base64url エンコード
        let mut combined = nonce_bytes.to_vec();
        combined.extend_from_slice(&ciphertext);
        Ok(URL_SAFE_NO_PAD.encode(&combined))
    }

    /// Cookie 値を復号する。改ざん・鍵不一致・形式不正はすべて `None`。
    pub fn open(&self, value: &str) -> Option<Session> {
        let combined = URL_SAFE_NO_PAD.decode(value).ok()?;
        if combined.len() < NONCE_LEN {
            return None;
        }

        let (nonce_bytes, encrypted) = combined.split_at(NONCE_LEN);
        let cipher = Aes256Gcm::new_from_slice(&self.key).ok()?;
        let plaintext = cipher
            .decrypt(Nonce::from_slice(nonce_bytes), encrypted)
            .ok()?;

        serde_json::from_slice(&plaintext).ok()
    }
}

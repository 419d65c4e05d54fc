//! Authorization Code フロー用の state / nonce / PKCE パラメータ生成。

use base64::{engine::general_purpose::URL_SAFE_NO_PAD, Engine};
use rand::RngCore;
use sha2::{Digest, Sha256};

/// LoginArtifacts は 1 回のログイン試行で使う乱数パラメータ一式。
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct LoginArtifacts {
    /// CSRF 対策用の state
    pub state: String,
    /// ID トークンのリプレイ対策用 nonce
    pub nonce: String,
    /// PKCE の code_verifier（43 文字の base64url）
    pub code_verifier: String,
}

impl LoginArtifacts {
    /// OS 乱数から新しいパラメータを生成する。
    pub fn generate() -> Self {
        Self {
            state: random_token(),
            nonce: random_token(),
            code_verifier: random_token(),
        }
    }

    /// code_verifier から導出した S256 の code_challenge を返す。
    pub fn code_challenge(&self) -> String {
        code_challenge_s256(&self.code_verifier)
    }
}

/// RFC 7636 の S256 方式で code_challenge を計算する。
pub fn code_challenge_s256(code_verifier: &str) -> String {
    let digest = Sha256::digest(code_verifier.as_bytes());
    URL_SAFE_NO_PAD.encode(digest)
}

/// 32 バイトの乱数を base64url（パディングなし）で返す。
fn random_token() -> String {
    let mut bytes = [0u8; 32];
    rand::rngs::OsRng.fill_bytes(&mut bytes);
    URL_SAFE_NO_PAD.encode(bytes)
}

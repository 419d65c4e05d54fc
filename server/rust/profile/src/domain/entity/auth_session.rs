use chrono::{DateTime, Duration, Utc};
use profile_auth::{LoginArtifacts, Principal};
use serde::{Deserialize, Serialize};

/// セッション上で AuthSession を保持する予約キー。
pub const AUTH_SESSION_KEY: &str = "auth";

/// セッション上で LoginTransaction を保持する予約キー。
pub const LOGIN_TRANSACTION_KEY: &str = "oidc_login";

/// LoginTransaction の有効期間。セッション TTL とは独立。
pub const LOGIN_TRANSACTION_LIFETIME_SECS: i64 = 5 * 60;

/// LoginTransaction は進行中のログイン試行を証明する一時状態。1 回だけ消費される。
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct LoginTransaction {
    pub state: String,
    pub nonce: String,
    pub code_verifier: String,
    pub created_at: DateTime<Utc>,
}

impl LoginTransaction {
    pub fn new(artifacts: LoginArtifacts, created_at: DateTime<Utc>) -> Self {
        Self {
            state: artifacts.state,
            nonce: artifacts.nonce,
            code_verifier: artifacts.code_verifier,
            created_at,
        }
    }

    /// `now - created_at` が 5 分を超えていれば期限切れ。
    pub fn is_expired(&self, now: DateTime<Utc>) -> bool {
        now - self.created_at > Duration::seconds(LOGIN_TRANSACTION_LIFETIME_SECS)
    }
}

/// AuthSession はログイン成功後にセッションへ保存する認証状態。
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct AuthSession {
    pub principal: Principal,
    /// セッションの有効期限（Unix エポックミリ秒）
    pub token_expires_at: i64,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub id_token: Option<String>,
}

impl AuthSession {
    /// 有効期限が厳密に未来であれば有効。
    pub fn is_active(&self, now: DateTime<Utc>) -> bool {
        self.token_expires_at > now.timestamp_millis()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::entity::Session;
    use serde_json::json;

    fn transaction(created_at: DateTime<Utc>) -> LoginTransaction {
        LoginTransaction {
            state: "s".into(),
            nonce: "n".into(),
            code_verifier: "v".into(),
            created_at,
        }
    }

    #[test]
    fn test_login_transaction_expires_after_five_minutes() {
        let created = Utc::now();
        let tx = transaction(created);

        assert!(!tx.is_expired(created + Duration::seconds(300)));
        assert!(tx.is_expired(created + Duration::seconds(301)));
    }

    #[test]
    fn test_auth_session_is_inactive_at_exact_expiry() {
        let now = Utc::now();
        let session = AuthSession {
            principal: Principal::new("user-1", ["admin"]).unwrap(),
            token_expires_at: now.timestamp_millis(),
            id_token: None,
        };

        assert!(!session.is_active(now));
        assert!(session.is_active(now - Duration::milliseconds(1)));
    }

    #[test]
    fn test_auth_session_with_empty_subject_is_not_restored() {
        let mut session = Session::new();
        session
            .insert(
                AUTH_SESSION_KEY,
                &json!({
                    "principal": { "sub": "", "roles": ["admin"] },
                    "token_expires_at": i64::MAX
                }),
            )
            .unwrap();

        assert!(session.get::<AuthSession>(AUTH_SESSION_KEY).is_none());
    }
}

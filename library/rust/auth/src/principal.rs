//! 認証済み主体（Principal）と検証結果（VerifiedToken）。

use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};
use std::collections::BTreeSet;
use std::hash::{Hash, Hasher};

use crate::claims::IdentityClaims;
use crate::error::AuthError;

/// RawClaims は検証済みトークンの生の Claims マップ。
pub type RawClaims = Map<String, Value>;

/// Principal はリクエストに紐づく認証済みの ID とロール。
///
/// 一度解決されたら変更しない。等価性は `subject` のみで判定する。
/// デシリアライズも `Principal::new` と同じ subject の検証を通る。
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(try_from = "PrincipalRecord")]
pub struct Principal {
    /// 空にならない安定した識別子
    #[serde(rename = "sub")]
    pub subject: String,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub email: Option<String>,

    #[serde(rename = "name", default, skip_serializing_if = "Option::is_none")]
    pub display_name: Option<String>,

    #[serde(default)]
    pub roles: BTreeSet<String>,
}

/// 直列化された Principal。復元時に [`Principal`] へ検証付きで変換する。
#[derive(Deserialize)]
struct PrincipalRecord {
    sub: String,
    #[serde(default)]
    email: Option<String>,
    #[serde(default)]
    name: Option<String>,
    #[serde(default)]
    roles: BTreeSet<String>,
}

impl TryFrom<PrincipalRecord> for Principal {
    type Error = AuthError;

    fn try_from(record: PrincipalRecord) -> Result<Self, Self::Error> {
        let mut principal = Principal::new(&record.sub, record.roles)?;
        principal.email = record.email;
        principal.display_name = record.name;
        Ok(principal)
    }
}

impl Principal {
    /// subject とロールから Principal を生成する。subject が空の場合はエラー。
    pub fn new<I, S>(subject: &str, roles: I) -> Result<Self, AuthError>
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        if subject.is_empty() {
            return Err(AuthError::MissingSubject);
        }
        Ok(Self {
            subject: subject.to_string(),
            email: None,
            display_name: None,
            roles: roles.into_iter().map(Into::into).collect(),
        })
    }

    /// 検証済み Claims から Principal を導出する。
    /// sub が無い場合はプレースホルダを作らずに失敗する。
    pub fn from_claims(claims: &IdentityClaims) -> Result<Self, AuthError> {
        let subject = claims.sub.clone().ok_or(AuthError::MissingSubject)?;
        Ok(Self {
            subject,
            email: claims.email.clone(),
            display_name: claims.name.clone(),
            roles: claims.roles(),
        })
    }

    /// 指定ロールを持つかどうかを判定する。
    pub fn has_role(&self, role: &str) -> bool {
        self.roles.contains(role)
    }
}

impl PartialEq for Principal {
    fn eq(&self, other: &Self) -> bool {
        self.subject == other.subject
    }
}

impl Eq for Principal {}

impl Hash for Principal {
    fn hash<H: Hasher>(&self, state: &mut H) {
        self.subject.hash(state);
    }
}

impl std::fmt::Display for Principal {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(
            f,
            "Principal{{sub={}, email={:?}, roles={:?}}}",
            self.subject, self.email, self.roles,
        )
    }
}

/// VerifiedToken は 1 回の検証呼び出しで得られる結果。キャッシュはしない。
#[derive(Debug, Clone)]
pub struct VerifiedToken {
    pub principal: Principal,
    pub raw_claims: RawClaims,
}

impl VerifiedToken {
    /// 生の Claims から VerifiedToken を組み立てる。
    pub fn from_raw_claims(raw_claims: RawClaims) -> Result<Self, AuthError> {
        let identity = IdentityClaims::from_map(&raw_claims);
        let principal = Principal::from_claims(&identity)?;
        Ok(Self {
            principal,
            raw_claims,
        })
    }

    /// 型付きの IdentityClaims を返す。
    pub fn identity(&self) -> IdentityClaims {
        IdentityClaims::from_map(&self.raw_claims)
    }
}

//! IdP が発行する JWT Claims から、サービスが使うフィールドだけを型付きで取り出す。
//!
//! IdP ごとに Claims の形は揺れるため serde の derive で一括デシリアライズはせず、
//! フィールドごとに明示的に取り出す。既定値の規則は次の通り:
//!
//! - 文字列フィールドは値が文字列のときだけ `Some`、それ以外（欠落・数値・null）は `None`
//! - `realm_access.roles` と `groups` は文字列要素だけを採用し、欠落時は空
//! - `exp` は整数（または小数の切り捨て）のときだけ `Some`

use serde_json::{Map, Value};
use std::collections::BTreeSet;

/// IdentityClaims は検証済みトークンから取り出した ID 関連の Claims。
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct IdentityClaims {
    /// ユーザーの一意識別子
    pub sub: Option<String>,

    /// メールアドレス
    pub email: Option<String>,

    /// 表示名
    pub name: Option<String>,

    /// 有効期限（Unix タイムスタンプ秒）
    pub exp: Option<i64>,

    /// 認可リクエスト時に送った nonce（ID トークンのみ）
    pub nonce: Option<String>,

    /// Keycloak 形式の realm_access.roles
    pub realm_roles: Vec<String>,

    /// フラットな groups Claim
    pub groups: Vec<String>,
}

impl IdentityClaims {
    /// 生の Claims マップから IdentityClaims を取り出す。
    pub fn from_map(claims: &Map<String, Value>) -> Self {
        let realm_roles = claims
            .get("realm_access")
            .and_then(Value::as_object)
            .and_then(|ra| ra.get("roles"))
            .map(string_list)
            .unwrap_or_default();

        Self {
            sub: string_claim(claims, "sub").filter(|s| !s.is_empty()),
            email: string_claim(claims, "email"),
            name: string_claim(claims, "name"),
            exp: claims.get("exp").and_then(numeric_date),
            nonce: string_claim(claims, "nonce"),
            realm_roles,
            groups: claims.get("groups").map(string_list).unwrap_or_default(),
        }
    }

    /// realm_access.roles と groups の和集合をロール集合として返す。
    pub fn roles(&self) -> BTreeSet<String> {
        self.realm_roles
            .iter()
            .chain(self.groups.iter())
            .cloned()
            .collect()
    }
}

fn string_claim(claims: &Map<String, Value>, name: &str) -> Option<String> {
    claims.get(name).and_then(Value::as_str).map(str::to_string)
}

fn string_list(value: &Value) -> Vec<String> {
    value
        .as_array()
        .map(|items| {
            items
                .iter()
                .filter_map(Value::as_str)
                .map(str::to_string)
                .collect()
        })
        .unwrap_or_default()
}

#[allow(clippy::cast_possible_truncation)]
fn numeric_date(value: &Value) -> Option<i64> {
    value
        .as_i64()
        .or_else(|| value.as_f64().map(|f| f.floor() as i64))
}

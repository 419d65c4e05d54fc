use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::collections::BTreeMap;

use crate::domain::error::AccessError;

/// Session は 1 リクエストに閉じたセッションデータ（キー → JSON 値）。
///
/// 主体解決・OIDC フローには明示的な引数として渡す。永続化は Cookie コーデックが担う。
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct Session {
    values: BTreeMap<String, Value>,
}

impl Session {
    pub fn new() -> Self {
        Self::default()
    }

    /// キーの値を型付きで取り出す。値が無い、または型が合わない場合は `None`。
    pub fn get<T: DeserializeOwned>(&self, key: &str) -> Option<T> {
        self.values
            .get(key)
            .and_then(|v| serde_json::from_value(v.clone()).ok())
    }

    pub fn insert<T: Serialize>(&mut self, key: &str, value: &T) -> Result<(), AccessError> {
        let value =
            serde_json::to_value(value).map_err(|e| AccessError::Internal(e.to_string()))?;
        self.values.insert(key.to_string(), value);
        Ok(())
    }

    /// キーの値を取り除き、型付きで返す（取り出しと削除を 1 回で行う）。
    pub fn take<T: DeserializeOwned>(&mut self, key: &str) -> Option<T> {
        self.values
            .remove(key)
            .and_then(|v| serde_json::from_value(v).ok())
    }

    /// 全キーを削除する。
    pub fn clear(&mut self) {
        self.values.clear();
    }

    pub fn is_empty(&self) -> bool {
        self.values.is_empty()
    }
}

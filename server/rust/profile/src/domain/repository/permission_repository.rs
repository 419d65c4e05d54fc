use std::collections::HashSet;

use async_trait::async_trait;

/// PermissionRepository はロール名からパーミッション名への対応を解決するインターフェース。
#[cfg_attr(test, mockall::automock)]
#[async_trait]
pub trait PermissionRepository: Send + Sync {
    /// 指定ロールが持つパーミッションの和集合を返す。
    async fn permissions_for_roles(&self, roles: &[String]) -> anyhow::Result<HashSet<String>>;
}

use std::collections::HashSet;
use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use moka::future::Cache;

use crate::domain::repository::PermissionRepository;

/// CachedPermissionRepository はロール集合ごとのパーミッション和集合を TTL 付きでキャッシュする。
/// 取得に失敗した結果はキャッシュしない。
pub struct CachedPermissionRepository {
    inner: Arc<dyn PermissionRepository>,
    cache: Cache<String, Arc<HashSet<String>>>,
}

impl CachedPermissionRepository {
    pub fn new(inner: Arc<dyn PermissionRepository>, ttl_secs: u64, max_capacity: u64) -> Self {
        Self {
            inner,
            cache: Cache::builder()
                .max_capacity(max_capacity)
                .time_to_live(Duration::from_secs(ttl_secs))
                .build(),
        }
    }

    /// ロールの並び順に依らないキー。
    pub fn make_key(roles: &[String]) -> String {
        let mut sorted: Vec<&str> = roles.iter().map(String::as_str).collect();
        sorted.sort_unstable();
        sorted.dedup();
        sorted.join(",")
    }
}

#[async_trait]
impl PermissionRepository for CachedPermissionRepository {
    async fn permissions_for_roles(&self, roles: &[String]) -> anyhow::Result<HashSet<String>> {
        let key = Self::make_key(roles);
        if let Some(hit) = self.cache.get(&key).await {
            return Ok(hit.as_ref().clone());
        }

        let permissions = self.inner.permissions_for_roles(roles).await?;
        self.cache
            .insert(key, Arc::new(permissions.clone()))
            .await;
        Ok(permissions)
    }
}

use std::collections::HashSet;

use async_trait::async_trait;
use sqlx::PgPool;

use crate::domain::repository::PermissionRepository;

/// PermissionPostgresRepository は PermissionRepository の PostgreSQL 実装。
pub struct PermissionPostgresRepository {
    pool: PgPool,
}

impl PermissionPostgresRepository {
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }
}

#[async_trait]
impl PermissionRepository for PermissionPostgresRepository {
    async fn permissions_for_roles(&self, roles: &[String]) -> anyhow::Result<HashSet<String>> {
        if roles.is_empty() {
            return Ok(HashSet::new());
        }

        let rows: Vec<(String,)> = sqlx::query_as(
            "SELECT permission_name FROM permissions WHERE is_active = true AND role = ANY($1)",
        )
        .bind(roles)
        .fetch_all(&self.pool)
        .await?;

        Ok(rows.into_iter().map(|(name,)| name).collect())
    }
}

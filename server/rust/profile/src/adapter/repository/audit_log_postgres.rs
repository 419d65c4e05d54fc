use async_trait::async_trait;
use sqlx::PgPool;

use crate::domain::entity::AuditEvent;
use crate::domain::repository::AuditLogger;

/// AuditLogPostgresRepository は AuditLogger の PostgreSQL 実装。
pub struct AuditLogPostgresRepository {
    pool: PgPool,
}

impl AuditLogPostgresRepository {
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }
}

#[async_trait]
impl AuditLogger for AuditLogPostgresRepository {
    async fn record(&self, event: &AuditEvent) -> anyhow::Result<()> {
        let actor_sub = event.actor.as_ref().map(|a| a.sub.clone());
        let actor_roles = event.actor.as_ref().map(|a| a.roles.clone());

        sqlx::query(
            r#"
            INSERT INTO audit_log (id, created_at, actor_sub, actor_roles, action, resource, outcome, error, meta)
            VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9)
            "#,
        )
        .bind(event.id)
        .bind(event.timestamp)
        .bind(actor_sub)
        .bind(actor_roles)
        .bind(&event.action)
        .bind(&event.resource)
        .bind(event.outcome.as_str())
        .bind(&event.error)
        .bind(&event.meta)
        .execute(&self.pool)
        .await?;

        Ok(())
    }
}

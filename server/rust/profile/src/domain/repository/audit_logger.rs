use async_trait::async_trait;

use crate::domain::entity::AuditEvent;

/// AuditLogger は監査イベントの記録先インターフェース。
#[cfg_attr(test, mockall::automock)]
#[async_trait]
pub trait AuditLogger: Send + Sync {
    async fn record(&self, event: &AuditEvent) -> anyhow::Result<()>;
}

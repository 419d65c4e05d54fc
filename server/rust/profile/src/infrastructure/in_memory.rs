//! データベースを使わない構成向けのインメモリ実装。

use std::collections::{BTreeMap, HashSet};

use async_trait::async_trait;
use tokio::sync::RwLock;

use crate::domain::entity::AuditEvent;
use crate::domain::repository::{AuditLogger, PermissionRepository};

/// InMemoryPermissionRepository は設定ファイルのロール表からパーミッションを解決する。
pub struct InMemoryPermissionRepository {
    roles: BTreeMap<String, Vec<String>>,
}

impl InMemoryPermissionRepository {
    pub fn new(roles: BTreeMap<String, Vec<String>>) -> Self {
        Self { roles }
    }
}

#[async_trait]
impl PermissionRepository for InMemoryPermissionRepository {
    async fn permissions_for_roles(&self, roles: &[String]) -> anyhow::Result<HashSet<String>> {
        Ok(roles
            .iter()
            .filter_map(|role| self.roles.get(role))
            .flatten()
            .cloned()
            .collect())
    }
}

/// InMemoryAuditLogger は監査イベントをメモリに保持し、ログにも出力する。
#[derive(Default)]
pub struct InMemoryAuditLogger {
    events: RwLock<Vec<AuditEvent>>,
}

impl InMemoryAuditLogger {
    pub fn new() -> Self {
        Self::default()
    }

    pub async fn events(&self) -> Vec<AuditEvent> {
        self.events.read().await.clone()
    }
}

#[async_trait]
impl AuditLogger for InMemoryAuditLogger {
    async fn record(&self, event: &AuditEvent) -> anyhow::Result<()> {
        tracing::info!(
            action = %event.action,
            resource = event.resource.as_deref().unwrap_or("-"),
            outcome = event.outcome.as_str(),
            actor = event.actor.as_ref().map(|a| a.sub.as_str()).unwrap_or("-"),
            "audit"
        );
        self.events.write().await.push(event.clone());
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Utc;
    use profile_auth::Principal;

    fn role_table() -> BTreeMap<String, Vec<String>> {
        BTreeMap::from([
            (
                "admin".to_string(),
                vec!["adminJobs.run".to_string(), "docs.view".to_string()],
            ),
            ("viewer".to_string(), vec!["docs.view".to_string()]),
        ])
    }

    #[tokio::test]
    async fn test_permissions_are_union_of_roles() {
        let repo = InMemoryPermissionRepository::new(role_table());
        let permissions = repo
            .permissions_for_roles(&["viewer".to_string(), "admin".to_string()])
            .await
            .unwrap();

        assert_eq!(
            permissions,
            HashSet::from(["adminJobs.run".to_string(), "docs.view".to_string()])
        );
    }

    #[tokio::test]
    async fn test_unknown_role_contributes_nothing() {
        let repo = InMemoryPermissionRepository::new(role_table());
        let permissions = repo
            .permissions_for_roles(&["guest".to_string()])
            .await
            .unwrap();
        assert!(permissions.is_empty());
    }

    #[tokio::test]
    async fn test_audit_logger_keeps_events_in_order() {
        let logger = InMemoryAuditLogger::new();
        let principal = Principal::new("user-1", ["admin"]).unwrap();

        logger
            .record(&AuditEvent::success(Utc::now(), Some(&principal), "job.run", Some("a")))
            .await
            .unwrap();
        logger
            .record(&AuditEvent::failure(Utc::now(), None, "job.run", Some("b"), "boom"))
            .await
            .unwrap();

        let events = logger.events().await;
        assert_eq!(events.len(), 2);
        assert_eq!(events[0].resource.as_deref(), Some("a"));
        assert_eq!(events[1].error.as_deref(), Some("boom"));
    }
}

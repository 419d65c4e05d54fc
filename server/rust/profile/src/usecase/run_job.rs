use std::sync::Arc;

use profile_auth::Principal;
use serde::Serialize;

use crate::domain::entity::{AuditEvent, JobError};
use crate::domain::error::AccessError;
use crate::domain::repository::{AuditLogger, JobRegistry};
use crate::infrastructure::clock::Clock;

const JOB_RUN_ACTION: &str = "job.run";

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct RunJobOutput {
    pub ok: bool,
    pub job: String,
}

/// RunJobUseCase はジョブを手動実行し、結果を監査ログに記録する。
///
/// 認可はこのユースケースの手前（RequirePermission）で済んでいる前提。
pub struct RunJobUseCase {
    registry: Arc<dyn JobRegistry>,
    audit_logger: Arc<dyn AuditLogger>,
    clock: Arc<dyn Clock>,
}

impl RunJobUseCase {
    pub fn new(
        registry: Arc<dyn JobRegistry>,
        audit_logger: Arc<dyn AuditLogger>,
        clock: Arc<dyn Clock>,
    ) -> Self {
        Self {
            registry,
            audit_logger,
            clock,
        }
    }

    pub async fn execute(
        &self,
        actor: Option<&Principal>,
        name: &str,
    ) -> Result<RunJobOutput, AccessError> {
        let result = self.registry.run(name).await;

        let event = match &result {
            Ok(()) => AuditEvent::success(self.clock.now(), actor, JOB_RUN_ACTION, Some(name)),
            Err(e) => AuditEvent::failure(
                self.clock.now(),
                actor,
                JOB_RUN_ACTION,
                Some(name),
                &e.to_string(),
            ),
        };
        // 監査の書き込み失敗はクライアントへ返さない
        if let Err(e) = self.audit_logger.record(&event).await {
            tracing::error!(error = %e, action = JOB_RUN_ACTION, job = name, "failed to record audit event");
        }

        match result {
            Ok(()) => Ok(RunJobOutput {
                ok: true,
                job: name.to_string(),
            }),
            Err(JobError::NotFound(name)) => Err(AccessError::NotFound(format!("job {name}"))),
            Err(e @ JobError::Failed { .. }) => {
                tracing::error!(error = %e, "job failed");
                Err(AccessError::Internal(e.to_string()))
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::entity::AuditOutcome;
    use crate::domain::repository::audit_logger::MockAuditLogger;
    use crate::domain::repository::job_registry::MockJobRegistry;
    use crate::infrastructure::clock::ManualClock;
    use chrono::Utc;

    fn admin() -> Principal {
        Principal::new("dev-user", ["admin"]).unwrap()
    }

    fn use_case(registry: MockJobRegistry, audit: MockAuditLogger) -> RunJobUseCase {
        RunJobUseCase::new(
            Arc::new(registry),
            Arc::new(audit),
            Arc::new(ManualClock::new(Utc::now())),
        )
    }

    #[tokio::test]
    async fn test_run_job_success_is_audited() {
        let mut registry = MockJobRegistry::new();
        registry
            .expect_run()
            .withf(|name| name == "sample.cleanup")
            .returning(|_| Ok(()));

        let mut audit = MockAuditLogger::new();
        audit
            .expect_record()
            .withf(|e| {
                e.outcome == AuditOutcome::Success
                    && e.action == "job.run"
                    && e.resource.as_deref() == Some("sample.cleanup")
                    && e.actor.as_ref().map(|a| a.sub.as_str()) == Some("dev-user")
            })
            .times(1)
            .returning(|_| Ok(()));

        let output = use_case(registry, audit)
            .execute(Some(&admin()), "sample.cleanup")
            .await
            .unwrap();
        assert_eq!(
            output,
            RunJobOutput {
                ok: true,
                job: "sample.cleanup".into()
            }
        );
    }

    #[tokio::test]
    async fn test_unknown_job_is_audited_as_failure() {
        let mut registry = MockJobRegistry::new();
        registry
            .expect_run()
            .returning(|name| Err(JobError::NotFound(name.to_string())));

        let mut audit = MockAuditLogger::new();
        audit
            .expect_record()
            .withf(|e| e.outcome == AuditOutcome::Failure && e.error.is_some())
            .times(1)
            .returning(|_| Ok(()));

        let err = use_case(registry, audit)
            .execute(Some(&admin()), "missing")
            .await
            .unwrap_err();
        assert!(matches!(err, AccessError::NotFound(_)));
    }

    #[tokio::test]
    async fn test_job_failure_is_internal_error() {
        let mut registry = MockJobRegistry::new();
        registry.expect_run().returning(|name| {
            Err(JobError::Failed {
                name: name.to_string(),
                source: anyhow::anyhow!("disk full"),
            })
        });
        let mut audit = MockAuditLogger::new();
        audit
            .expect_record()
            .withf(|e| e.error.as_deref().is_some_and(|m| m.contains("disk full")))
            .returning(|_| Ok(()));

        let err = use_case(registry, audit)
            .execute(Some(&admin()), "sample.cleanup")
            .await
            .unwrap_err();
        assert!(matches!(err, AccessError::Internal(_)));
    }

    #[tokio::test]
    async fn test_audit_failure_does_not_fail_request() {
        let mut registry = MockJobRegistry::new();
        registry.expect_run().returning(|_| Ok(()));
        let mut audit = MockAuditLogger::new();
        audit
            .expect_record()
            .returning(|_| Err(anyhow::anyhow!("audit store down")));

        let output = use_case(registry, audit)
            .execute(Some(&admin()), "sample.cleanup")
            .await
            .unwrap();
        assert!(output.ok);
    }
}

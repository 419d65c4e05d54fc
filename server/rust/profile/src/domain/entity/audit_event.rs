use chrono::{DateTime, Utc};
use profile_auth::Principal;
use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// AuditOutcome は監査対象操作の結果。
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum AuditOutcome {
    Success,
    Failure,
}

impl AuditOutcome {
    pub fn as_str(&self) -> &'static str {
        match self {
            AuditOutcome::Success => "success",
            AuditOutcome::Failure => "failure",
        }
    }
}

/// AuditActor は操作を行った主体の監査用スナップショット。
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct AuditActor {
    pub sub: String,
    pub roles: Vec<String>,
}

impl From<&Principal> for AuditActor {
    fn from(p: &Principal) -> Self {
        Self {
            sub: p.subject.clone(),
            roles: p.roles.iter().cloned().collect(),
        }
    }
}

/// AuditEvent はパーミッションで保護された操作の結果を表す監査イベント。
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AuditEvent {
    pub id: Uuid,
    pub timestamp: DateTime<Utc>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub actor: Option<AuditActor>,
    pub action: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub resource: Option<String>,
    pub outcome: AuditOutcome,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub meta: Option<serde_json::Value>,
}

impl AuditEvent {
    pub fn success(
        timestamp: DateTime<Utc>,
        actor: Option<&Principal>,
        action: &str,
        resource: Option<&str>,
    ) -> Self {
        Self {
            id: Uuid::new_v4(),
            timestamp,
            actor: actor.map(AuditActor::from),
            action: action.to_string(),
            resource: resource.map(str::to_string),
            outcome: AuditOutcome::Success,
            error: None,
            meta: None,
        }
    }

    pub fn failure(
        timestamp: DateTime<Utc>,
        actor: Option<&Principal>,
        action: &str,
        resource: Option<&str>,
        error: &str,
    ) -> Self {
        Self {
            outcome: AuditOutcome::Failure,
            error: Some(error.to_string()),
            ..Self::success(timestamp, actor, action, resource)
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_failure_event_carries_error_and_actor_roles() {
        let principal = Principal::new("user-1", ["admin", "ops"]).unwrap();
        let event = AuditEvent::failure(
            Utc::now(),
            Some(&principal),
            "job.run",
            Some("sample.cleanup"),
            "boom",
        );

        assert_eq!(event.outcome, AuditOutcome::Failure);
        assert_eq!(event.error.as_deref(), Some("boom"));
        let actor = event.actor.unwrap();
        assert_eq!(actor.sub, "user-1");
        assert_eq!(actor.roles, vec!["admin", "ops"]);
    }

    #[test]
    fn test_outcome_serializes_lowercase() {
        let v = serde_json::to_value(AuditOutcome::Success).unwrap();
        assert_eq!(v, "success");
    }
}

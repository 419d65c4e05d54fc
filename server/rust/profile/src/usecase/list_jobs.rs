use std::sync::Arc;

use serde::Serialize;

use crate::domain::entity::JobDefinition;
use crate::domain::repository::JobRegistry;

#[derive(Debug, Clone, Serialize)]
pub struct ListJobsOutput {
    pub jobs: Vec<JobDefinition>,
}

/// ListJobsUseCase は手動実行可能なジョブの一覧を返す。
pub struct ListJobsUseCase {
    registry: Arc<dyn JobRegistry>,
}

impl ListJobsUseCase {
    pub fn new(registry: Arc<dyn JobRegistry>) -> Self {
        Self { registry }
    }

    pub async fn execute(&self) -> ListJobsOutput {
        ListJobsOutput {
            jobs: self.registry.list().await,
        }
    }
}

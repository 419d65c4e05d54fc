use std::collections::BTreeMap;
use std::sync::Arc;

use async_trait::async_trait;

use crate::domain::entity::{JobDefinition, JobError};
use crate::domain::repository::JobRegistry;

/// Job は管理者が手動実行できる処理単位。
#[async_trait]
pub trait Job: Send + Sync {
    fn name(&self) -> &str;

    fn description(&self) -> Option<&str> {
        None
    }

    async fn run(&self) -> anyhow::Result<()>;
}

/// InMemoryJobRegistry は名前順にジョブを保持するレジストリ。
#[derive(Default)]
pub struct InMemoryJobRegistry {
    jobs: BTreeMap<String, Arc<dyn Job>>,
}

impl InMemoryJobRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// 同名のジョブは後から登録したもので置き換える。
    pub fn register(mut self, job: Arc<dyn Job>) -> Self {
        self.jobs.insert(job.name().to_string(), job);
        self
    }
}

#[async_trait]
impl JobRegistry for InMemoryJobRegistry {
    async fn list(&self) -> Vec<JobDefinition> {
        self.jobs
            .values()
            .map(|job| JobDefinition {
                name: job.name().to_string(),
                description: job.description().map(str::to_string),
            })
            .collect()
    }

    async fn run(&self, name: &str) -> Result<(), JobError> {
        let job = self
            .jobs
            .get(name)
            .ok_or_else(|| JobError::NotFound(name.to_string()))?;

        job.run().await.map_err(|source| JobError::Failed {
            name: name.to_string(),
            source,
        })
    }
}

/// SampleCleanupJob は動作確認用のジョブ。実行をログに残すだけ。
pub struct SampleCleanupJob;

#[async_trait]
impl Job for SampleCleanupJob {
    fn name(&self) -> &str {
        "sample.cleanup"
    }

    fn description(&self) -> Option<&str> {
        Some("Example scheduled job (replace in real projects).")
    }

    async fn run(&self) -> anyhow::Result<()> {
        tracing::info!(job = "sample.cleanup", "running sample cleanup job");
        Ok(())
    }
}

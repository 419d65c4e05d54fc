use async_trait::async_trait;

use crate::domain::entity::{JobDefinition, JobError};

/// JobRegistry は手動実行可能なジョブの一覧と実行を提供する。
#[cfg_attr(test, mockall::automock)]
#[async_trait]
pub trait JobRegistry: Send + Sync {
    /// 名前順のジョブ一覧を返す。
    async fn list(&self) -> Vec<JobDefinition>;

    /// 指定ジョブを実行する。未登録の名前は `JobError::NotFound`。
    async fn run(&self, name: &str) -> Result<(), JobError>;
}

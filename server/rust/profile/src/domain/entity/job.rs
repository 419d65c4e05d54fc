use serde::Serialize;

/// JobDefinition は登録済みジョブの名前と説明。
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct JobDefinition {
    pub name: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub description: Option<String>,
}

/// JobError はジョブ実行のエラーを表す。
#[derive(Debug, thiserror::Error)]
pub enum JobError {
    #[error("unknown job: {0}")]
    NotFound(String),

    #[error("job {name} failed: {source}")]
    Failed {
        name: String,
        #[source]
        source: anyhow::Error,
    },
}

use std::sync::Arc;

use chrono::{DateTime, Utc};
use serde::Serialize;

use crate::infrastructure::clock::Clock;

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct HealthOutput {
    pub status: &'static str,
    pub now: DateTime<Utc>,
}

/// GetHealthUseCase は死活確認の応答を返す。
pub struct GetHealthUseCase {
    clock: Arc<dyn Clock>,
}

impl GetHealthUseCase {
    pub fn new(clock: Arc<dyn Clock>) -> Self {
        Self { clock }
    }

    pub fn execute(&self) -> HealthOutput {
        HealthOutput {
            status: "ok",
            now: self.clock.now(),
        }
    }
}

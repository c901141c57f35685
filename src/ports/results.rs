use async_trait::async_trait;
use serde::{Deserialize, Serialize};

use crate::domain::{DomainError, SessionResult};

/// A persisted session result with its assigned id.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SavedResult {
    pub id: i64,
    pub exercise_id: i64,
    pub result: SessionResult,
}

/// Port for durable result storage.
///
/// Invoked by the session consumer after the SessionFinished notification,
/// never by the engine itself; the engine's responsibility ends at
/// producing a valid [`SessionResult`].
#[async_trait]
pub trait ResultStore: Send + Sync {
    async fn save(
        &self,
        exercise_id: i64,
        result: &SessionResult,
    ) -> Result<SavedResult, DomainError>;
}

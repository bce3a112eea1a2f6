use crate::domain::{Result, SessionInfo, SessionOutcome};
use async_trait::async_trait;
use uuid::Uuid;

/// Port for tracking bridged viewer sessions
#[async_trait]
pub trait TrackingPort: Send + Sync {
    /// Register a new session
    async fn track_session(&self, info: SessionInfo) -> Result<()>;

    /// Mark a session as closed, recording how it ended
    async fn close_session(&self, id: Uuid, outcome: SessionOutcome) -> Result<()>;

    /// Get all sessions that are still open
    async fn active_sessions(&self) -> Result<Vec<SessionInfo>>;
}

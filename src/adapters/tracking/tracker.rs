use crate::domain::{Result, SessionInfo, SessionOutcome};
use crate::ports::TrackingPort;
use async_trait::async_trait;
use std::sync::Arc;
use tokio::sync::RwLock;
use tracing::{info, warn};
use uuid::Uuid;

/// In-memory registry of bridged sessions
pub struct SessionTracker {
    sessions: Arc<RwLock<Vec<SessionInfo>>>,
}

impl SessionTracker {
    pub fn new() -> Self {
        Self {
            sessions: Arc::new(RwLock::new(Vec::new())),
        }
    }
}

impl Default for SessionTracker {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl TrackingPort for SessionTracker {
    async fn track_session(&self, info: SessionInfo) -> Result<()> {
        info!(session = %info.id, peer = %info.peer, "{} (via {})", info.peer, info.route);

        let mut sessions = self.sessions.write().await;
        sessions.push(info);

        Ok(())
    }

    async fn close_session(&self, id: Uuid, outcome: SessionOutcome) -> Result<()> {
        let mut sessions = self.sessions.write().await;

        if let Some(pos) = sessions.iter().position(|s| s.id == id) {
            let mut session = sessions.swap_remove(pos);
            session.close();
            let elapsed = session
                .closed_at
                .map(|closed| closed.duration_since(session.opened_at))
                .unwrap_or_default();
            match outcome {
                SessionOutcome::Relayed { sent, received } => info!(
                    session = %id,
                    peer = %session.peer,
                    sent,
                    received,
                    "session closed after {:.1}s",
                    elapsed.as_secs_f64()
                ),
                SessionOutcome::RelayFailed(reason) => warn!(
                    session = %id,
                    peer = %session.peer,
                    "session ended with error after {:.1}s: {}",
                    elapsed.as_secs_f64(),
                    reason
                ),
                SessionOutcome::TunnelFailed(reason) => warn!(
                    session = %id,
                    peer = %session.peer,
                    "session closed without a tunnel: {}",
                    reason
                ),
            }
        }

        Ok(())
    }

    async fn active_sessions(&self) -> Result<Vec<SessionInfo>> {
        let sessions = self.sessions.read().await;
        Ok(sessions.iter().filter(|s| s.closed_at.is_none()).cloned().collect())
    }
}

// gateway/src/store/memory.rs
use async_trait::async_trait;
use chrono::{DateTime, Duration as ChronoDuration, Utc};
use common::models::session::{SessionCodec, SessionPayload};
use dashmap::DashMap;
use std::sync::Arc;
use std::time::Duration;

use super::{SessionBackend, StoreError};

// Sweep expired sessions every ten minutes
const CLEANUP_INTERVAL: Duration = Duration::from_secs(600);

struct MemoryRecord {
    payload: Vec<u8>,
    expires_at: DateTime<Utc>,
}

impl MemoryRecord {
    fn is_expired(&self, now: DateTime<Utc>) -> bool {
        self.expires_at <= now
    }
}

/// Process-local session backend used when no external store is configured.
///
/// Nothing is shared between instances and everything is lost on restart.
#[derive(Clone, Default)]
pub struct MemoryBackend {
    sessions: Arc<DashMap<String, MemoryRecord>>,
}

impl MemoryBackend {
    pub fn new() -> Self {
        Self::default()
    }

    /// Seed a session. The gateway itself never calls this; it exists for
    /// local development and tests.
    pub fn insert(
        &self,
        session_id: impl Into<String>,
        payload: &SessionPayload,
        ttl: ChronoDuration,
    ) -> Result<(), StoreError> {
        let record = MemoryRecord {
            payload: SessionCodec::encode(payload)?,
            expires_at: Utc::now() + ttl,
        };
        self.sessions.insert(session_id.into(), record);
        Ok(())
    }

    pub fn remove(&self, session_id: &str) -> bool {
        self.sessions.remove(session_id).is_some()
    }

    pub fn len(&self) -> usize {
        self.sessions.len()
    }

    pub fn is_empty(&self) -> bool {
        self.sessions.is_empty()
    }

    /// Remove expired sessions, returning how many were dropped.
    pub fn purge_expired(&self) -> usize {
        let now = Utc::now();
        let before = self.sessions.len();
        self.sessions.retain(|_, record| !record.is_expired(now));
        before.saturating_sub(self.sessions.len())
    }

    /// Periodically purge expired sessions for the lifetime of the process.
    pub fn spawn_janitor(&self) -> tokio::task::JoinHandle<()> {
        let backend = self.clone();
        tokio::spawn(async move {
            let mut interval = tokio::time::interval(CLEANUP_INTERVAL);
            loop {
                interval.tick().await;
                let expired = backend.purge_expired();
                if expired > 0 {
                    tracing::info!(
                        "Cleaned up {} expired sessions, {} remaining",
                        expired,
                        backend.len()
                    );
                }
            }
        })
    }
}

#[async_trait]
impl SessionBackend for MemoryBackend {
    async fn load(&self, session_id: &str) -> Result<Option<Vec<u8>>, StoreError> {
        let now = Utc::now();
        Ok(self
            .sessions
            .get(session_id)
            .filter(|record| !record.is_expired(now))
            .map(|record| record.payload.clone()))
    }

    fn kind(&self) -> &'static str {
        "memory"
    }
}

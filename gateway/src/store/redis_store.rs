// gateway/src/store/redis_store.rs
use ::redis::aio::ConnectionManager;
use ::redis::{AsyncCommands, Client};
use async_trait::async_trait;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::OnceCell;

use super::{SessionBackend, StoreError, StoreReadiness};

// Connection health probe cadence once connected
const PING_INTERVAL: Duration = Duration::from_secs(5);
// Cap for the initial-connection backoff
const MAX_BACKOFF_SECS: u64 = 60;

/// Session backend reading documents written by the application into Redis.
///
/// The connection is established in the background; until it is up every
/// lookup reports [`StoreError::NotConnected`] and the gateway serves
/// requests anonymously.
#[derive(Clone)]
pub struct RedisBackend {
    client: Client,
    prefix: String,
    conn: Arc<OnceCell<ConnectionManager>>,
    readiness: StoreReadiness,
}

impl RedisBackend {
    /// Validate the URL and prepare the backend. Does not connect.
    pub fn open(url: &str, prefix: String, readiness: StoreReadiness) -> Result<Self, StoreError> {
        let client = Client::open(url)?;
        Ok(Self {
            client,
            prefix,
            conn: Arc::new(OnceCell::new()),
            readiness,
        })
    }

    fn key(&self, session_id: &str) -> String {
        format!("{}{}", self.prefix, session_id)
    }

    /// Connect with capped exponential backoff, then keep the readiness flag
    /// in step with the connection by pinging it.
    pub fn spawn_supervisor(&self) -> tokio::task::JoinHandle<()> {
        let backend = self.clone();
        tokio::spawn(async move { backend.supervise().await })
    }

    async fn supervise(self) {
        let mut attempts: u32 = 0;
        let manager = loop {
            match ConnectionManager::new(self.client.clone()).await {
                Ok(manager) => break manager,
                Err(e) => {
                    self.readiness.set(false);
                    let backoff = std::cmp::min(2u64.pow(attempts.min(6)), MAX_BACKOFF_SECS);
                    tracing::warn!(
                        "Failed to connect to session store (attempt {}), retrying in {}s: {}",
                        attempts + 1,
                        backoff,
                        e
                    );
                    tokio::time::sleep(Duration::from_secs(backoff)).await;
                    attempts = attempts.saturating_add(1);
                }
            }
        };

        if self.conn.set(manager.clone()).is_err() {
            tracing::debug!("Session store connection was already initialised");
        }
        self.readiness.set(true);

        let mut interval = tokio::time::interval(PING_INTERVAL);
        loop {
            interval.tick().await;
            let mut conn = manager.clone();
            match ::redis::cmd("PING").query_async::<String>(&mut conn).await {
                Ok(_) => {
                    self.readiness.set(true);
                }
                Err(e) => {
                    if self.readiness.set(false) {
                        tracing::error!("Session store connection lost: {}", e);
                    }
                }
            }
        }
    }
}

#[async_trait]
impl SessionBackend for RedisBackend {
    async fn load(&self, session_id: &str) -> Result<Option<Vec<u8>>, StoreError> {
        let mut conn = self.conn.get().cloned().ok_or(StoreError::NotConnected)?;
        let payload: Option<Vec<u8>> = conn.get(self.key(session_id)).await?;
        Ok(payload)
    }

    fn kind(&self) -> &'static str {
        "redis"
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_open_rejects_malformed_url() {
        assert!(RedisBackend::open("not-a-redis-url", "sess:".into(), StoreReadiness::new(false)).is_err());
    }

    #[tokio::test]
    async fn test_lookup_before_connect_is_not_connected() {
        let backend =
            RedisBackend::open("redis://127.0.0.1:1", "sess:".into(), StoreReadiness::new(false)).unwrap();
        assert_eq!(backend.key("abc"), "sess:abc");
        assert!(matches!(backend.load("abc").await, Err(StoreError::NotConnected)));
    }
}

// gateway/src/store/mod.rs
//! Session store adapter.
//!
//! Request handlers only ever see [`SessionStore::get`], which never fails:
//! backend and decoding problems are logged and read as "no session".
mod memory;
mod readiness;
mod redis_store;

pub use memory::MemoryBackend;
pub use readiness::StoreReadiness;
pub use redis_store::RedisBackend;

use async_trait::async_trait;
use common::models::session::{CodecError, SessionCodec, SessionPayload};
use common::{GatewayConfig, SessionStoreKind};
use std::sync::Arc;
use std::time::Duration;
use thiserror::Error;

/// Upper bound for a single session lookup.
const LOOKUP_TIMEOUT: Duration = Duration::from_secs(2);

#[derive(Debug, Error)]
pub enum StoreError {
    #[error("session store is not connected yet")]
    NotConnected,
    #[error("session lookup timed out")]
    Timeout,
    #[error("redis error: {0}")]
    Redis(#[from] ::redis::RedisError),
    #[error(transparent)]
    Codec(#[from] CodecError),
}

/// A key-value backend holding encoded session documents.
#[async_trait]
pub trait SessionBackend: Send + Sync {
    /// Raw encoded payload for `session_id`, or `None` when absent/expired.
    async fn load(&self, session_id: &str) -> Result<Option<Vec<u8>>, StoreError>;

    fn kind(&self) -> &'static str;
}

#[derive(Clone)]
pub struct SessionStore {
    backend: Arc<dyn SessionBackend>,
    readiness: StoreReadiness,
    lookup_timeout: Duration,
}

impl std::fmt::Debug for SessionStore {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("SessionStore")
            .field("kind", &self.backend.kind())
            .field("ready", &self.readiness.is_ready())
            .finish()
    }
}

impl SessionStore {
    pub fn new(backend: Arc<dyn SessionBackend>, readiness: StoreReadiness) -> Self {
        Self {
            backend,
            readiness,
            lookup_timeout: LOOKUP_TIMEOUT,
        }
    }

    /// Build the backend named by the configuration.
    ///
    /// Must run inside a tokio runtime: the redis backend starts its
    /// connection supervisor and the memory backend its expiry sweep.
    pub fn from_config(config: &GatewayConfig) -> Result<Self, StoreError> {
        match &config.session_store {
            SessionStoreKind::Redis { url } => {
                let readiness = StoreReadiness::new(false);
                let backend = RedisBackend::open(url, config.session_prefix.clone(), readiness.clone())?;
                backend.spawn_supervisor();
                tracing::info!("Session store: redis (prefix `{}`)", config.session_prefix);
                Ok(Self::new(Arc::new(backend), readiness))
            }
            SessionStoreKind::Memory => {
                tracing::warn!(
                    "Session store: in-process memory; sessions are not shared and are lost on restart"
                );
                let backend = MemoryBackend::new();
                backend.spawn_janitor();
                Ok(Self::new(Arc::new(backend), StoreReadiness::new(true)))
            }
        }
    }

    /// Resolve a session id to its payload. Never fails.
    pub async fn get(&self, session_id: &str) -> Option<SessionPayload> {
        match self.try_get(session_id).await {
            Ok(payload) => payload,
            Err(e) => {
                tracing::warn!("Session lookup failed, treating request as anonymous: {}", e);
                None
            }
        }
    }

    async fn try_get(&self, session_id: &str) -> Result<Option<SessionPayload>, StoreError> {
        let bytes = tokio::time::timeout(self.lookup_timeout, self.backend.load(session_id))
            .await
            .map_err(|_| StoreError::Timeout)??;
        match bytes {
            Some(bytes) => Ok(Some(SessionCodec::decode(&bytes)?)),
            None => Ok(None),
        }
    }

    pub fn readiness(&self) -> &StoreReadiness {
        &self.readiness
    }

    pub fn kind(&self) -> &'static str {
        self.backend.kind()
    }
}

// gateway/src/store/readiness.rs
use std::sync::Arc;
use tokio::sync::watch;

/// Last known connection state of the session store.
///
/// Only connection lifecycle events write it; individual lookups never do.
/// Subscribers are woken on every transition.
#[derive(Clone, Debug)]
pub struct StoreReadiness {
    state: Arc<watch::Sender<bool>>,
}

impl StoreReadiness {
    pub fn new(ready: bool) -> Self {
        let (state, _) = watch::channel(ready);
        Self {
            state: Arc::new(state),
        }
    }

    pub fn is_ready(&self) -> bool {
        *self.state.borrow()
    }

    /// Record a connection outcome. Returns `true` when the state changed.
    pub fn set(&self, ready: bool) -> bool {
        let changed = self.state.send_if_modified(|current| {
            if *current == ready {
                false
            } else {
                *current = ready;
                true
            }
        });
        if changed {
            if ready {
                tracing::info!("Session store connected");
            } else {
                tracing::warn!("Session store unavailable; serving requests as anonymous");
            }
        }
        changed
    }

    pub fn subscribe(&self) -> watch::Receiver<bool> {
        self.state.subscribe()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_transitions_are_reported_once() {
        let readiness = StoreReadiness::new(false);
        assert!(!readiness.is_ready());
        assert!(readiness.set(true));
        assert!(!readiness.set(true));
        assert!(readiness.is_ready());
        assert!(readiness.set(false));
        assert!(!readiness.is_ready());
    }

    #[tokio::test]
    async fn test_subscribers_observe_transitions() {
        let readiness = StoreReadiness::new(false);
        let mut rx = readiness.subscribe();

        let writer = readiness.clone();
        tokio::spawn(async move {
            writer.set(true);
        });

        rx.changed().await.unwrap();
        assert!(*rx.borrow());
    }
}

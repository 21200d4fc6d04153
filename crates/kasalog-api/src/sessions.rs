//! In-memory session registry with idle eviction.

use std::collections::HashMap;
use std::sync::Arc;
use std::time::{Duration, Instant};

use tokio::sync::RwLock;
use uuid::Uuid;

struct Entry<T> {
    value: Arc<T>,
    last_seen: Instant,
}

/// Sessions keyed by UUIDv7. Every lookup refreshes the idle clock.
pub struct SessionRegistry<T> {
    inner: Arc<RwLock<HashMap<Uuid, Entry<T>>>>,
}

impl<T> Clone for SessionRegistry<T> {
    fn clone(&self) -> Self {
        Self {
            inner: self.inner.clone(),
        }
    }
}

impl<T> Default for SessionRegistry<T> {
    fn default() -> Self {
        Self {
            inner: Arc::new(RwLock::new(HashMap::new())),
        }
    }
}

impl<T> SessionRegistry<T> {
    pub fn new() -> Self {
        Self::default()
    }

    pub async fn insert(&self, value: T) -> (Uuid, Arc<T>) {
        let id = Uuid::now_v7();
        let value = Arc::new(value);
        self.inner.write().await.insert(
            id,
            Entry {
                value: value.clone(),
                last_seen: Instant::now(),
            },
        );
        (id, value)
    }

    pub async fn get(&self, id: Uuid) -> Option<Arc<T>> {
        let mut sessions = self.inner.write().await;
        let entry = sessions.get_mut(&id)?;
        entry.last_seen = Instant::now();
        Some(entry.value.clone())
    }

    pub async fn remove(&self, id: Uuid) -> Option<Arc<T>> {
        self.inner.write().await.remove(&id).map(|e| e.value)
    }

    /// Drop sessions idle for longer than `ttl` and hand them back.
    pub async fn evict_idle(&self, ttl: Duration) -> Vec<Arc<T>> {
        let mut sessions = self.inner.write().await;
        let expired: Vec<Uuid> = sessions
            .iter()
            .filter(|(_, e)| e.last_seen.elapsed() > ttl)
            .map(|(id, _)| *id)
            .collect();
        expired
            .into_iter()
            .filter_map(|id| sessions.remove(&id).map(|e| e.value))
            .collect()
    }

    pub async fn len(&self) -> usize {
        self.inner.read().await.len()
    }

    pub async fn is_empty(&self) -> bool {
        self.len().await == 0
    }
}

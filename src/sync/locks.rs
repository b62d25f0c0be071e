use std::collections::HashMap;
use std::sync::{Arc, Mutex};

use tokio::sync::{Mutex as AsyncMutex, OwnedMutexGuard};

/// Run tokens keyed by manifest path: at most one sync per path at a time.
#[derive(Default)]
pub struct PathLocks {
    inner: Mutex<HashMap<String, Arc<AsyncMutex<()>>>>,
}

impl PathLocks {
    pub fn new() -> Self {
        Self::default()
    }

    /// Waits until no other sync holds `path`. The token is released on drop.
    pub async fn acquire(&self, path: &str) -> OwnedMutexGuard<()> {
        let lock = {
            let mut map = self.inner.lock().unwrap_or_else(|e| e.into_inner());
            // Only the map holds an entry with a single reference.
            map.retain(|_, lock| Arc::strong_count(lock) > 1);
            map.entry(path.to_string()).or_default().clone()
        };
        lock.lock_owned().await
    }

    #[cfg(test)]
    fn tracked(&self) -> usize {
        self.inner.lock().unwrap_or_else(|e| e.into_inner()).len()
    }
}

#[cfg(test)]
mod tests {
    use std::time::Duration;

    use super::*;

    #[tokio::test]
    async fn test_same_path_is_serialized() {
        let locks = Arc::new(PathLocks::new());
        let guard = locks.acquire("catalog/a.yaml").await;

        let waiter = {
            let locks = Arc::clone(&locks);
            tokio::spawn(async move {
                let _guard = locks.acquire("catalog/a.yaml").await;
            })
        };

        tokio::time::sleep(Duration::from_millis(20)).await;
        assert!(!waiter.is_finished());

        drop(guard);
        waiter.await.unwrap();
    }

    #[tokio::test]
    async fn test_different_paths_do_not_block() {
        let locks = PathLocks::new();
        let _a = locks.acquire("catalog/a.yaml").await;
        let _b = locks.acquire("catalog/b.yaml").await;
        assert_eq!(locks.tracked(), 2);
    }

    #[tokio::test]
    async fn test_released_tokens_are_pruned() {
        let locks = PathLocks::new();
        drop(locks.acquire("catalog/a.yaml").await);
        drop(locks.acquire("catalog/b.yaml").await);
        assert_eq!(locks.tracked(), 1);
    }
}

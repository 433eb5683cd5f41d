use std::collections::HashMap;
use std::future::Future;
use std::hash::Hash;
use std::sync::{Arc, Mutex, MutexGuard};
use tokio::sync::OnceCell;
use tracing::debug;

use crate::{Error, Result};

type Slot<T> = Arc<OnceCell<Arc<T>>>;

pub struct KitRegistry<K, T> {
    entries: Mutex<HashMap<K, Slot<T>>>,
}

impl<K, T> Default for KitRegistry<K, T> {
    fn default() -> Self {
        Self {
            entries: Mutex::new(HashMap::new()),
        }
    }
}

impl<K, T> KitRegistry<K, T>
where
    K: Eq + Hash + Clone + std::fmt::Debug,
{
    pub fn new() -> Self {
        Self::default()
    }

    fn entries(&self) -> Result<MutexGuard<'_, HashMap<K, Slot<T>>>> {
        self.entries
            .lock()
            .map_err(|e| Error::internal(format!("registry lock poisoned: {}", e)))
    }

    /// Returns the cached value for `key`, constructing it with `factory` on
    /// first use.
    pub async fn get_or_init<F, Fut>(&self, key: K, factory: F) -> Result<Arc<T>>
    where
        F: FnOnce() -> Fut,
        Fut: Future<Output = Result<T>>,
    {
        let slot = {
            let mut entries = self.entries()?;
            entries.entry(key.clone()).or_default().clone()
        };
        if let Some(value) = slot.get() {
            debug!(key = ?key, "registry hit");
            return Ok(value.clone());
        }
        let value = slot
            .get_or_try_init(|| async { factory().await.map(Arc::new) })
            .await?;
        Ok(value.clone())
    }

    /// Cached value without constructing.
    pub fn get(&self, key: &K) -> Option<Arc<T>> {
        let entries = self.entries().ok()?;
        entries.get(key).and_then(|slot| slot.get().cloned())
    }

    /// Drops the entry so the next [`get_or_init`](Self::get_or_init) rebuilds it.
    /// Returns whether a constructed value was present.
    pub fn invalidate(&self, key: &K) -> bool {
        match self.entries() {
            Ok(mut entries) => entries
                .remove(key)
                .map_or(false, |slot| slot.initialized()),
            Err(_) => false,
        }
    }

    pub fn clear(&self) {
        if let Ok(mut entries) = self.entries() {
            entries.clear();
        }
    }

    /// Number of constructed entries.
    pub fn len(&self) -> usize {
        self.entries()
            .map(|entries| entries.values().filter(|slot| slot.initialized()).count())
            .unwrap_or(0)
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error_kind::ErrorKind;
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::time::Duration;

    #[tokio::test]
    async fn test_concurrent_first_access_constructs_once() {
        let registry: Arc<KitRegistry<&'static str, String>> = Arc::new(KitRegistry::new());
        let builds = Arc::new(AtomicUsize::new(0));

        let mut handles = Vec::new();
        for _ in 0..8 {
            let registry = registry.clone();
            let builds = builds.clone();
            handles.push(tokio::spawn(async move {
                registry
                    .get_or_init("kit", || async move {
                        builds.fetch_add(1, Ordering::SeqCst);
                        tokio::time::sleep(Duration::from_millis(20)).await;
                        Ok("built".to_string())
                    })
                    .await
                    .unwrap()
            }));
        }
        let mut values = Vec::new();
        for h in handles {
            values.push(h.await.unwrap());
        }
        assert_eq!(builds.load(Ordering::SeqCst), 1);
        assert!(values.iter().all(|v| Arc::ptr_eq(v, &values[0])));
    }

    #[tokio::test]
    async fn test_invalidate_rebuilds() {
        let registry: KitRegistry<String, u32> = KitRegistry::new();
        let first = registry.get_or_init("k".into(), || async { Ok(1) }).await.unwrap();
        let cached = registry.get_or_init("k".into(), || async { Ok(2) }).await.unwrap();
        assert!(Arc::ptr_eq(&first, &cached));

        assert!(registry.invalidate(&"k".to_string()));
        let rebuilt = registry.get_or_init("k".into(), || async { Ok(3) }).await.unwrap();
        assert_eq!(*rebuilt, 3);
        assert_eq!(registry.len(), 1);

        registry.clear();
        assert!(registry.is_empty());
        assert!(registry.get(&"k".to_string()).is_none());
    }

    #[tokio::test]
    async fn test_failed_factory_is_not_cached() {
        let registry: KitRegistry<String, u32> = KitRegistry::new();
        let err = registry
            .get_or_init("k".into(), || async { Err(Error::dependency_unavailable("no key")) })
            .await
            .unwrap_err();
        assert_eq!(err.kind(), ErrorKind::DependencyUnavailable);
        let ok = registry.get_or_init("k".into(), || async { Ok(7) }).await.unwrap();
        assert_eq!(*ok, 7);
    }

    #[tokio::test]
    async fn test_poisoned_lock_is_internal_error() {
        let registry: Arc<KitRegistry<String, u32>> = Arc::new(KitRegistry::new());
        let poisoner = registry.clone();
        let _ = std::thread::spawn(move || {
            let _guard = poisoner.entries.lock().unwrap();
            panic!("poison the registry lock");
        })
        .join();

        let err = registry
            .get_or_init("k".to_string(), || async { Ok(1) })
            .await
            .unwrap_err();
        assert_eq!(err.kind(), ErrorKind::Unknown);
        assert!(err.message().contains("registry lock poisoned"));
    }
}

//! Shared artifact cache threaded through every task of a lane run.
//!
//! The cache maps string keys to opaque artifacts. It is cheaply cloneable:
//! every clone refers to the same store, so sibling tasks running in parallel
//! observe each other's writes once they are joined.

use std::any::Any;
use std::collections::HashMap;
use std::sync::Arc;

use lanekit_shared::errors::{LaneError, LaneResult};
use parking_lot::RwLock;

/// Opaque artifact stored in the cache.
pub type Artifact = Arc<dyn Any + Send + Sync>;

/// Well-known key under which the launcher publishes engine configuration.
pub const ENGINE_CONF_KEY: &str = "engine.conf";

/// Lifecycle hooks for artifacts that hold external resources
/// (persisted engine datasets, temp tables, open handles).
pub trait CacheLifecycle: Send + Sync {
    /// Called once when the artifact enters the cache through [`ContextCache::cache`].
    fn on_cache(&self) {}

    /// Called once when the artifact leaves the cache.
    fn on_uncache(&self) {}
}

struct Entry {
    value: Artifact,
    lifecycle: Option<Arc<dyn CacheLifecycle>>,
}

/// Process-local keyed store shared by reference across a lane run.
///
/// Concurrent `put` to the same key is last-writer-wins. Hooks run outside
/// the internal lock so they may touch the cache themselves.
#[derive(Clone, Default)]
pub struct ContextCache {
    inner: Arc<RwLock<HashMap<String, Entry>>>,
}

impl std::fmt::Debug for ContextCache {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ContextCache")
            .field("keys", &self.keys())
            .finish()
    }
}

impl ContextCache {
    pub fn new() -> Self {
        Self::default()
    }

    /// Store `value` under `key`, overwriting any prior value.
    pub fn put<T>(&self, key: impl Into<String>, value: T)
    where
        T: Any + Send + Sync,
    {
        self.put_raw(key, Arc::new(value));
    }

    /// Store an already shared artifact under `key`.
    pub fn put_raw(&self, key: impl Into<String>, value: Artifact) {
        let key = key.into();
        tracing::trace!(key = %key, "Caching artifact");
        let previous = self.inner.write().insert(
            key,
            Entry {
                value,
                lifecycle: None,
            },
        );
        release(previous);
    }

    /// Store `value` and fire its `on_cache` hook.
    pub fn cache<T>(&self, key: impl Into<String>, value: T)
    where
        T: CacheLifecycle + Any + Send + Sync,
    {
        let key = key.into();
        let value = Arc::new(value);
        value.on_cache();
        tracing::debug!(key = %key, "Cached artifact with lifecycle hooks");

        let lifecycle: Arc<dyn CacheLifecycle> = value.clone();
        let previous = self.inner.write().insert(
            key,
            Entry {
                value,
                lifecycle: Some(lifecycle),
            },
        );
        release(previous);
    }

    /// Typed read of the artifact under `key`.
    pub fn get<T>(&self, key: &str) -> LaneResult<Arc<T>>
    where
        T: Any + Send + Sync,
    {
        self.get_raw(key)?
            .downcast::<T>()
            .map_err(|_| LaneError::ArtifactType {
                key: key.to_string(),
                expected: std::any::type_name::<T>(),
            })
    }

    /// Read the artifact under `key` without assuming its type.
    pub fn get_raw(&self, key: &str) -> LaneResult<Artifact> {
        self.inner
            .read()
            .get(key)
            .map(|entry| Arc::clone(&entry.value))
            .ok_or_else(|| LaneError::MissingArtifact(key.to_string()))
    }

    /// Remove `key`, returning the artifact that was stored.
    ///
    /// Fires `on_uncache` when the artifact was stored through [`ContextCache::cache`].
    pub fn remove(&self, key: &str) -> LaneResult<Artifact> {
        let entry = self
            .inner
            .write()
            .remove(key)
            .ok_or_else(|| LaneError::MissingArtifact(key.to_string()))?;
        tracing::trace!(key = %key, "Removed artifact");
        let value = Arc::clone(&entry.value);
        release(Some(entry));
        Ok(value)
    }

    /// Remove `key` and fire its `on_uncache` hook.
    pub fn uncache(&self, key: &str) -> LaneResult<()> {
        self.remove(key).map(|_| ())
    }

    pub fn has(&self, key: &str) -> bool {
        self.inner.read().contains_key(key)
    }

    /// Keys currently stored, sorted.
    pub fn keys(&self) -> Vec<String> {
        let mut keys: Vec<String> = self.inner.read().keys().cloned().collect();
        keys.sort();
        keys
    }

    pub fn len(&self) -> usize {
        self.inner.read().len()
    }

    pub fn is_empty(&self) -> bool {
        self.inner.read().is_empty()
    }

    /// Drop every artifact, firing `on_uncache` for hooked ones.
    pub fn clear(&self) {
        let drained: Vec<Entry> = self.inner.write().drain().map(|(_, e)| e).collect();
        for entry in drained {
            release(Some(entry));
        }
    }
}

fn release(entry: Option<Entry>) {
    if let Some(Entry {
        lifecycle: Some(hooks),
        ..
    }) = entry
    {
        hooks.on_uncache();
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicUsize, Ordering};

    #[derive(Default)]
    struct Persisted {
        cached: AtomicUsize,
        uncached: Arc<AtomicUsize>,
    }

    impl CacheLifecycle for Persisted {
        fn on_cache(&self) {
            self.cached.fetch_add(1, Ordering::SeqCst);
        }

        fn on_uncache(&self) {
            self.uncached.fetch_add(1, Ordering::SeqCst);
        }
    }

    #[test]
    fn test_put_get_remove() {
        let cache = ContextCache::new();
        assert!(matches!(
            cache.get::<i64>("missing_key"),
            Err(LaneError::MissingArtifact(key)) if key == "missing_key"
        ));

        cache.put("k", 42i64);
        assert_eq!(*cache.get::<i64>("k").unwrap(), 42);

        cache.remove("k").unwrap();
        assert!(!cache.has("k"));
        assert!(matches!(
            cache.get::<i64>("k"),
            Err(LaneError::MissingArtifact(_))
        ));
        assert!(matches!(
            cache.remove("k"),
            Err(LaneError::MissingArtifact(_))
        ));
    }

    #[test]
    fn test_put_overwrites() {
        let cache = ContextCache::new();
        cache.put("df", "first".to_string());
        cache.put("df", "second".to_string());
        assert_eq!(cache.get::<String>("df").unwrap().as_str(), "second");
        assert_eq!(cache.len(), 1);
    }

    #[test]
    fn test_typed_get_mismatch() {
        let cache = ContextCache::new();
        cache.put("n", 1u8);
        assert!(matches!(
            cache.get::<String>("n"),
            Err(LaneError::ArtifactType { key, .. }) if key == "n"
        ));
    }

    #[test]
    fn test_clones_share_store() {
        let cache = ContextCache::new();
        let other = cache.clone();
        other.put("a", 1i32);
        assert!(cache.has("a"));
        assert_eq!(cache.keys(), vec!["a".to_string()]);
    }

    #[test]
    fn test_lifecycle_hooks() {
        let uncached = Arc::new(AtomicUsize::new(0));
        let cache = ContextCache::new();
        cache.cache(
            "iris",
            Persisted {
                uncached: Arc::clone(&uncached),
                ..Default::default()
            },
        );
        assert_eq!(cache.get::<Persisted>("iris").unwrap().cached.load(Ordering::SeqCst), 1);

        cache.uncache("iris").unwrap();
        assert_eq!(uncached.load(Ordering::SeqCst), 1);
        assert!(cache.is_empty());
    }

    #[test]
    fn test_overwrite_and_clear_release_hooks() {
        let uncached = Arc::new(AtomicUsize::new(0));
        let cache = ContextCache::new();
        let make = || Persisted {
            uncached: Arc::clone(&uncached),
            ..Default::default()
        };

        cache.cache("a", make());
        cache.cache("a", make());
        assert_eq!(uncached.load(Ordering::SeqCst), 1);

        cache.cache("b", make());
        cache.put("plain", 3u32);
        cache.clear();
        assert_eq!(uncached.load(Ordering::SeqCst), 3);
        assert!(cache.is_empty());
    }

    #[test]
    fn test_concurrent_distinct_puts() {
        let cache = ContextCache::new();
        std::thread::scope(|s| {
            for t in 0..8 {
                let cache = cache.clone();
                s.spawn(move || {
                    for i in 0..100 {
                        cache.put(format!("{}-{}", t, i), i);
                    }
                });
            }
        });
        assert_eq!(cache.len(), 800);
    }
}

use crate::core::error::Error;
use crate::index::store::LocationIndex;
use crate::storage::layout::StorageLayout;
use lru::LruCache;
use parking_lot::Mutex;
use std::num::NonZeroUsize;
use std::sync::Arc;

/// Cache key: a fully-qualified location.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
struct CacheKey {
    db: String,
    namespace: String,
    metric: String,
    location_id: String,
}

/// Opens per-location indices on demand and caches them, bounded by `capacity`.
/// A flush invalidates the entry for the location it just wrote (see `invalidate`),
/// matching the writer-discipline contract: searchers are acquired on demand after
/// the most recent flush.
pub struct IndexEngine {
    layout: Arc<StorageLayout>,
    cache: Mutex<LruCache<CacheKey, Arc<Mutex<LocationIndex>>>>,
}

impl IndexEngine {
    pub fn new(layout: Arc<StorageLayout>, capacity: usize) -> Self {
        let capacity = NonZeroUsize::new(capacity.max(1)).unwrap();
        IndexEngine {
            layout,
            cache: Mutex::new(LruCache::new(capacity)),
        }
    }

    pub fn open(
        &self,
        db: &str,
        namespace: &str,
        metric: &str,
        location_id: &str,
    ) -> Result<Arc<Mutex<LocationIndex>>, Error> {
        let key = CacheKey {
            db: db.to_string(),
            namespace: namespace.to_string(),
            metric: metric.to_string(),
            location_id: location_id.to_string(),
        };
        let mut cache = self.cache.lock();
        if let Some(existing) = cache.get(&key) {
            return Ok(existing.clone());
        }
        let path = self.layout.location_file(db, namespace, metric, location_id);
        let index = LocationIndex::load_or_create(path)?;
        let handle = Arc::new(Mutex::new(index));
        cache.put(key, handle.clone());
        Ok(handle)
    }

    /// Invalidates the cached searcher for a location, forcing the next `open` to
    /// reload from disk. Called by the write accumulator right after a flush.
    pub fn invalidate(&self, db: &str, namespace: &str, metric: &str, location_id: &str) {
        let key = CacheKey {
            db: db.to_string(),
            namespace: namespace.to_string(),
            metric: metric.to_string(),
            location_id: location_id.to_string(),
        };
        self.cache.lock().pop(&key);
    }

    pub fn invalidate_metric(&self, db: &str, namespace: &str, metric: &str, location_ids: &[String]) {
        for id in location_ids {
            self.invalidate(db, namespace, metric, id);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::tempdir;

    #[test]
    fn open_caches_and_invalidate_forces_reload() {
        let dir = tempdir().unwrap();
        let layout = Arc::new(StorageLayout::new(dir.path().to_path_buf()));
        let engine = IndexEngine::new(layout, 4);

        let handle1 = engine.open("db", "ns", "m", "0_99").unwrap();
        let handle2 = engine.open("db", "ns", "m", "0_99").unwrap();
        assert!(Arc::ptr_eq(&handle1, &handle2));

        engine.invalidate("db", "ns", "m", "0_99");
        let handle3 = engine.open("db", "ns", "m", "0_99").unwrap();
        assert!(!Arc::ptr_eq(&handle1, &handle3));
    }
}

//! # Parser Cache
//!
//! Memoizes resolved schemas by absolute proto path, so a proto file is compiled once no
//! matter how many calls use it.
//!
//! The cache is an ordinary value: construct one, wrap it in an `Arc` and hand it to every
//! call site that needs it. Each key owns a `tokio::sync::OnceCell`; concurrent callers for
//! the same cold key wait on the one resolution in flight instead of starting their own.
//! A failed resolution removes its empty cell from the map, so the next caller tries again
//! and paths that never resolve do not accumulate.
use crate::resolver::{DescriptorError, DescriptorResolver};
use crate::schema::ProtoSchema;
use std::collections::HashMap;
use std::path::{Path, PathBuf};
use std::sync::{Arc, Mutex, MutexGuard};
use tokio::sync::OnceCell;
use tracing::debug;

type Slot = Arc<OnceCell<Arc<ProtoSchema>>>;

#[derive(Debug)]
pub struct ParserCache {
    resolver: DescriptorResolver,
    entries: Mutex<HashMap<PathBuf, Slot>>,
}

impl ParserCache {
    pub fn new(resolver: DescriptorResolver) -> Self {
        Self {
            resolver,
            entries: Mutex::new(HashMap::new()),
        }
    }

    pub fn resolver(&self) -> &DescriptorResolver {
        &self.resolver
    }

    /// Returns the cached schema for `path`, resolving it on first use.
    ///
    /// Only compiled schemas are ever stored.
    pub async fn get_or_resolve(&self, path: &Path) -> Result<Arc<ProtoSchema>, DescriptorError> {
        let key = cache_key(path);

        let slot = {
            let mut entries = self.lock();
            Arc::clone(entries.entry(key.clone()).or_default())
        };

        if let Some(schema) = slot.get() {
            debug!(proto = %key.display(), "parser cache hit");
            return Ok(Arc::clone(schema));
        }

        let resolved = slot
            .get_or_try_init(|| async {
                debug!(proto = %key.display(), "parser cache miss, resolving");
                self.resolver.resolve(&key).await.map(Arc::new)
            })
            .await;

        match resolved {
            Ok(schema) => Ok(Arc::clone(schema)),
            Err(err) => {
                self.evict_empty(&key, &slot);
                Err(err)
            }
        }
    }

    /// Removes `slot` from the map unless it was filled or replaced in the meantime.
    fn evict_empty(&self, key: &Path, slot: &Slot) {
        let mut entries = self.lock();
        let stale = entries
            .get(key)
            .is_some_and(|current| Arc::ptr_eq(current, slot) && !current.initialized());

        if stale {
            entries.remove(key);
            debug!(proto = %key.display(), "dropped empty parser cache entry");
        }
    }

    /// Drops every entry. Resolutions in flight complete but are not kept.
    pub fn clear(&self) {
        self.lock().clear();
    }

    /// Number of schemas currently cached.
    pub fn len(&self) -> usize {
        self.lock()
            .values()
            .filter(|slot| slot.initialized())
            .count()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    fn lock(&self) -> MutexGuard<'_, HashMap<PathBuf, Slot>> {
        // The map is never left half-updated, so a poisoned lock is still usable.
        self.entries.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
    }
}

fn cache_key(path: &Path) -> PathBuf {
    std::path::absolute(path).unwrap_or_else(|_| path.to_path_buf())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn keys_are_absolute() {
        let key = cache_key(Path::new("protos/./a.proto"));
        assert!(key.is_absolute());
        assert!(key.ends_with("protos/a.proto"));
    }

    #[tokio::test]
    async fn failed_resolutions_leave_no_entries() {
        let dir = tempfile::tempdir().unwrap();
        let cache = ParserCache::new(DescriptorResolver::new(crate::resolver::ProtoxCompiler));

        for i in 0..16 {
            let missing = dir.path().join(format!("missing-{i}.proto"));
            assert!(cache.get_or_resolve(&missing).await.is_err());
        }

        let broken = dir.path().join("broken.proto");
        std::fs::write(&broken, "syntax = \"proto3\"; message {").unwrap();
        assert!(cache.get_or_resolve(&broken).await.is_err());

        assert!(cache.lock().is_empty());
    }

    #[test]
    fn new_cache_is_empty() {
        let cache = ParserCache::new(DescriptorResolver::new(crate::resolver::ProtoxCompiler));
        assert!(cache.is_empty());
        cache.clear();
        assert_eq!(cache.len(), 0);
    }
}

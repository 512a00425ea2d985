//! Directory listing cache keyed by remote path

use super::ttl::TtlCache;
use crate::models::RemoteFile;
use std::sync::Arc;
use std::time::Duration;
use tracing::debug;

/// Default LRU ceiling for cached listings
pub const DEFAULT_LISTING_CAPACITY: usize = 128;

/// TTL-bounded cache of directory listings
///
/// Sits above the connection pool. Concurrent misses for the same path are
/// not coalesced: each miss costs one upstream listing call.
pub struct DirectoryCache {
    inner: TtlCache<String, Arc<Vec<RemoteFile>>>,
}

impl DirectoryCache {
    pub fn new(ttl: Duration) -> Self {
        Self::with_capacity(DEFAULT_LISTING_CAPACITY, ttl)
    }

    pub fn with_capacity(capacity: usize, ttl: Duration) -> Self {
        Self {
            inner: TtlCache::new(capacity, ttl),
        }
    }

    pub fn get(&self, path: &str) -> Option<Arc<Vec<RemoteFile>>> {
        let hit = self.inner.get(&path.to_string());
        debug!(path, hit = hit.is_some(), "Listing cache lookup");
        hit
    }

    pub fn set(&self, path: &str, listing: Vec<RemoteFile>) -> Arc<Vec<RemoteFile>> {
        let listing = Arc::new(listing);
        self.inner.insert(path.to_string(), Arc::clone(&listing));
        listing
    }

    pub fn invalidate(&self, path: &str) {
        self.inner.remove(&path.to_string());
    }
}

//! LRU cache of downloaded file text

use super::lru::LruCache;
use crate::error::CoreError;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use tracing::trace;

/// File text keyed by local path and expected size
pub struct ContentCache {
    inner: LruCache<(PathBuf, Option<u64>), Arc<str>>,
}

impl ContentCache {
    pub fn new(capacity: usize) -> Self {
        Self {
            inner: LruCache::new(capacity),
        }
    }

    /// Read a file as text, invalid UTF-8 replaced, serving repeats from cache
    pub async fn read(&self, path: &Path, size: Option<u64>) -> Result<Arc<str>, CoreError> {
        let key = (path.to_path_buf(), size);
        if let Some(text) = self.inner.get(&key) {
            trace!(path = %path.display(), "Content cache hit");
            return Ok(text);
        }

        let bytes = tokio::fs::read(path)
            .await
            .map_err(|source| CoreError::FileRead {
                path: path.to_path_buf(),
                source,
            })?;
        let text: Arc<str> = Arc::from(String::from_utf8_lossy(&bytes).into_owned());
        self.inner.insert(key, Arc::clone(&text));
        Ok(text)
    }

    pub fn len(&self) -> usize {
        self.inner.len()
    }

    pub fn is_empty(&self) -> bool {
        self.inner.is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::tempdir;

    #[tokio::test]
    async fn test_second_read_served_from_cache() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("A.DAT");
        std::fs::write(&path, "Tiefe: 1,5 mm").unwrap();

        let cache = ContentCache::new(4);
        let first = cache.read(&path, Some(13)).await.unwrap();

        // Same key after the file changed on disk still hits the cache
        std::fs::write(&path, "changed").unwrap();
        let second = cache.read(&path, Some(13)).await.unwrap();

        assert_eq!(&*first, "Tiefe: 1,5 mm");
        assert_eq!(first, second);
        assert_eq!(cache.len(), 1);
    }

    #[tokio::test]
    async fn test_missing_file_is_read_error() {
        let cache = ContentCache::new(4);
        let result = cache.read(Path::new("/nonexistent/X.DAT"), None).await;
        assert!(matches!(result, Err(CoreError::FileRead { .. })));
    }

    #[tokio::test]
    async fn test_invalid_utf8_is_replaced() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("B.DAT");
        std::fs::write(&path, b"Wert: 2.5\xff\xfe").unwrap();

        let cache = ContentCache::new(4);
        let text = cache.read(&path, None).await.unwrap();
        assert!(text.starts_with("Wert: 2.5"));
    }
}

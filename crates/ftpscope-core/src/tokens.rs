//! Short-lived opaque tokens for reading back downloaded files

use crate::config::expiry_from_now;
use parking_lot::Mutex;
use std::collections::HashMap;
use std::path::{Path, PathBuf};
use std::time::Duration;
use tokio::time::Instant;
use tracing::debug;
use uuid::Uuid;

struct TokenRecord {
    path: PathBuf,
    expires_at: Instant,
}

/// Maps opaque tokens to local paths until they expire
///
/// Expired tokens are removed lazily on lookup, or in bulk by [`TokenStore::cleanup`].
pub struct TokenStore {
    ttl: Duration,
    records: Mutex<HashMap<String, TokenRecord>>,
}

impl TokenStore {
    pub fn new(ttl: Duration) -> Self {
        Self {
            ttl,
            records: Mutex::new(HashMap::new()),
        }
    }

    pub fn ttl(&self) -> Duration {
        self.ttl
    }

    /// Issue a new token for `path`, valid for the configured TTL
    pub fn issue(&self, path: impl AsRef<Path>) -> String {
        let token = Uuid::new_v4().simple().to_string();
        let record = TokenRecord {
            path: path.as_ref().to_path_buf(),
            expires_at: expiry_from_now(self.ttl),
        };
        self.records.lock().insert(token.clone(), record);
        token
    }

    /// Local path behind `token`, or `None` if unknown or expired
    pub fn resolve(&self, token: &str) -> Option<PathBuf> {
        let mut records = self.records.lock();
        let record = records.get(token)?;
        if record.expires_at <= Instant::now() {
            records.remove(token);
            return None;
        }
        Some(record.path.clone())
    }

    /// Drop every expired token, returning how many were removed
    pub fn cleanup(&self) -> usize {
        let now = Instant::now();
        let mut records = self.records.lock();
        let before = records.len();
        records.retain(|_, record| record.expires_at > now);
        let removed = before - records.len();
        if removed > 0 {
            debug!(removed, remaining = records.len(), "Expired tokens removed");
        }
        removed
    }

    pub fn len(&self) -> usize {
        self.records.lock().len()
    }

    pub fn is_empty(&self) -> bool {
        self.records.lock().is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test(start_paused = true)]
    async fn test_issue_then_resolve() {
        let store = TokenStore::new(Duration::from_secs(300));
        let token = store.issue("/tmp/batch/01-02-24/LOG_001.DAT");

        assert_eq!(token.len(), 32);
        assert!(token.chars().all(|c| c.is_ascii_hexdigit()));
        assert_eq!(
            store.resolve(&token),
            Some(PathBuf::from("/tmp/batch/01-02-24/LOG_001.DAT"))
        );
        assert_eq!(store.resolve("unknown"), None);
    }

    #[tokio::test(start_paused = true)]
    async fn test_expired_token_resolves_to_none_and_is_removed() {
        let store = TokenStore::new(Duration::from_secs(300));
        let token = store.issue("/tmp/a");

        tokio::time::advance(Duration::from_secs(300)).await;

        assert_eq!(store.resolve(&token), None);
        assert!(store.is_empty());
    }

    #[tokio::test(start_paused = true)]
    async fn test_cleanup_removes_exactly_expired() {
        let store = TokenStore::new(Duration::from_secs(10));
        let old_a = store.issue("/tmp/a");
        let old_b = store.issue("/tmp/a");

        tokio::time::advance(Duration::from_secs(6)).await;
        let fresh = store.issue("/tmp/b");
        tokio::time::advance(Duration::from_secs(5)).await;

        assert_eq!(store.cleanup(), 2);
        assert_eq!(store.len(), 1);
        assert_eq!(store.resolve(&fresh), Some(PathBuf::from("/tmp/b")));
        assert_eq!(store.resolve(&old_a), None);
        assert_eq!(store.resolve(&old_b), None);
        assert_eq!(store.cleanup(), 0);
    }

    #[tokio::test(start_paused = true)]
    async fn test_tokens_unique_for_same_path() {
        let store = TokenStore::new(Duration::from_secs(60));
        let a = store.issue("/tmp/same");
        let b = store.issue("/tmp/same");
        assert_ne!(a, b);
        assert_eq!(store.len(), 2);
    }

    #[tokio::test(start_paused = true)]
    async fn test_unbounded_ttl_does_not_overflow() {
        let store = TokenStore::new(Duration::MAX);
        let token = store.issue("/tmp/long");
        assert_eq!(store.resolve(&token), Some(PathBuf::from("/tmp/long")));
    }
}

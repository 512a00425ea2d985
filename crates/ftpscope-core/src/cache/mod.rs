//! Caching layer for ftpscope-core
//!
//! Bounded in-memory caches: a pure LRU (file contents) and an LRU with
//! per-entry expiry (directory listings).

pub mod content;
pub mod listing;
pub mod lru;
pub mod ttl;

pub use content::ContentCache;
pub use listing::DirectoryCache;
pub use lru::LruCache;
pub use ttl::TtlCache;

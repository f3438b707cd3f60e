//! # tinylru
//!
//! Fixed-capacity, in-memory LRU cache with O(1) `get` and `put`.
//!
//! ## Architecture
//! - **Index**: AHash map from key to arena slot (O(1) lookup)
//! - **Recency list**: doubly linked by slot index between two sentinels
//!   (O(1) promote and evict)
//! - **SharedCache**: one-lock wrapper with hit/miss statistics for
//!   multi-threaded callers
//!
//! ```
//! use tinylru::LruCache;
//!
//! let mut cache = LruCache::new(2)?;
//! cache.put(1, "one");
//! cache.put(2, "two");
//! cache.get(&1);
//! cache.put(3, "three"); // evicts 2
//!
//! assert_eq!(cache.get(&2), None);
//! assert_eq!(cache.get(&1), Some(&"one"));
//! # Ok::<(), tinylru::Error>(())
//! ```

#![warn(missing_docs)]

mod config;
mod error;
mod lru;
mod shared;
mod stats;

pub use config::{CacheConfig, DEFAULT_CAPACITY};
pub use error::{Error, Result};
pub use lru::{Iter, LruCache};
pub use shared::SharedCache;
pub use stats::{CacheStats, StatsSnapshot};

//! Result storage for hashing jobs.
//!
//! Completed digests are kept in two tiers:
//!
//! * [`lru`]: a bounded, recency-ordered in-memory cache that serves reads.
//! * [`journal`]: an append-only JSON Lines file that every cache insert is
//!   written through to. It is replayed on startup, so results survive both
//!   eviction and process restarts.
//!
//! [`record`] defines the [`ResultRecord`] shared by both tiers.
//!
//! # Consistency
//!
//! A record is visible to cache readers as soon as [`BoundedCache::add`]
//! returns, and durable once the underlying [`DurableStore::append`] has
//! succeeded. If the append fails the cache entry is kept anyway; callers
//! see the error and decide whether to log or retry.

pub mod journal;
pub mod lru;
pub mod record;

pub use journal::{DurableStore, StoreError, StoreResult};
pub use lru::{BoundedCache, DEFAULT_CAPACITY};
pub use record::{JobId, ResultRecord};

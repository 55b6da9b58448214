//! The C7 "backend storage" contract: an async key/value service providing
//! atomic get/set/compare-and-set and the small atomic scripts the Indexed
//! Log's mark/reclaim and the State Store's `getOrSet` require (spec.md
//! §4.7). Any backend satisfying [`KvBackend`] is acceptable — an embedded
//! store, an external in-memory store, or a SQL row lock.
//!
//! Two implementations ship here: [`memory::MemoryBackend`] (an in-process,
//! `dashmap`-backed store for tests and single-process deployments) and,
//! behind the `redis-backend` feature, [`redis_backend::RedisBackend`]
//! (grounded directly in the original `RedisList` Lua scripts).

pub mod memory;
#[cfg(feature = "redis-backend")]
pub mod redis_backend;
pub mod trait_def;

pub use trait_def::KvBackend;

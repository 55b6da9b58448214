//! Bundled word-count demo topology and backend wiring, grounded in
//! `original_source/examples/wordcounter` (spec.md §1 "example topology").
//!
//! `WordSplitter` reads raw bytes off the ingress queue one character at a
//! time and emits whole words to a derived `Words` queue; `WordCounter`
//! consumes `Words` and keeps a running per-stream tally. Together they
//! exercise the full C4/C5/C6 path: a two-stage DAG, a derived queue
//! written by a non-root stage, and State Store accumulation.

pub mod topology;

pub use topology::{build_demo_topology, WordCounter, WordSplitter};

use std::sync::Arc;

use snowcat_backend::memory::MemoryBackend;
use snowcat_backend::KvBackend;
use snowcat_core::{Error, SnowcatConfig};

/// Constructs the configured [`KvBackend`] implementation.
///
/// `"memory"` is always available; `"redis"` requires the `redis-backend`
/// feature and `backend.redis_url` to be set (validated already by
/// [`SnowcatConfig::validate`]).
pub async fn build_backend(config: &SnowcatConfig) -> Result<Arc<dyn KvBackend>, Error> {
    match config.backend.kind.as_str() {
        "memory" => Ok(Arc::new(MemoryBackend::new())),
        #[cfg(feature = "redis-backend")]
        "redis" => {
            let url = config
                .backend
                .redis_url
                .as_deref()
                .ok_or_else(|| Error::Config("backend.redis_url missing".into()))?;
            let backend = snowcat_backend::redis_backend::RedisBackend::connect(url).await?;
            Ok(Arc::new(backend))
        }
        #[cfg(not(feature = "redis-backend"))]
        "redis" => Err(Error::Config(
            "backend.kind = \"redis\" requires the redis-backend feature".into(),
        )),
        other => Err(Error::Config(format!("unknown backend.kind '{other}'"))),
    }
}

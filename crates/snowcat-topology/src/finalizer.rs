//! Stream finalization: when every stage has flagged finished, purge the
//! stream's keys, reclaim its queues, and leave a tombstone (spec.md
//! §4.4). This generalizes `original_source/snowcat/categorizers.py`'s
//! `close_session` (delete all keys under a categorizer+user namespace)
//! to the whole-stream sweep spec.md describes.

use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use snowcat_backend::KvBackend;
use snowcat_core::{Error, StreamId};

/// A finalization step run against a finishing stream. Finalizers run in
/// the order supplied to `Topology::builder()...finalizers(...)`; an
/// error aborts the remaining ones (SPEC_FULL §5 Open Question decision).
#[async_trait]
pub trait Finalizer: Send + Sync {
    async fn finalize(&self, stream: &StreamId) -> Result<(), Error>;
}

/// The built-in purge sweep: deletes every key under `{stream}:*` except
/// the lock and tombstone keys, then writes the tombstone with a TTL.
/// Individual queue data is removed as part of the same prefix sweep —
/// `KvBackend::delete` clears a key out of whichever internal structure
/// (scalar, hash, log, marks) actually holds it.
pub struct PurgeFinalizer {
    backend: Arc<dyn KvBackend>,
    tombstone_ttl: Duration,
}

impl PurgeFinalizer {
    pub fn new(backend: Arc<dyn KvBackend>, tombstone_ttl: Duration) -> Self {
        Self {
            backend,
            tombstone_ttl,
        }
    }
}

#[async_trait]
impl Finalizer for PurgeFinalizer {
    #[tracing::instrument(level = "info", skip(self), fields(stream = %stream))]
    async fn finalize(&self, stream: &StreamId) -> Result<(), Error> {
        let prefix = format!("{stream}:");
        let tombstone_key = format!("{stream}:finished");
        let keys = self.backend.scan_prefix(&prefix).await?;

        for key in keys {
            if key.ends_with(":lock") || key == tombstone_key {
                continue;
            }
            self.backend.delete(&key).await?;
        }

        self.backend
            .set_with_ttl(&tombstone_key, Vec::new(), self.tombstone_ttl.as_secs())
            .await?;
        tracing::info!(stream = %stream, "stream finalized");
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use snowcat_backend::memory::MemoryBackend;

    #[tokio::test]
    async fn purge_removes_stream_keys_but_keeps_lock_and_sets_tombstone() {
        let backend: Arc<dyn KvBackend> = Arc::new(MemoryBackend::new());
        let stream = StreamId::from("u1");

        let _ = backend.hash_set("u1:SimpleKV", "init_finished", b"1".to_vec()).await;
        let _ = backend.log_append("u1:Stream", vec![b"x".to_vec()]).await;
        let _ = backend
            .set_nx_ttl("u1:wordcounter:lock", b"token".to_vec(), 60)
            .await;

        let finalizer = PurgeFinalizer::new(backend.clone(), Duration::from_secs(604800));
        finalizer.finalize(&stream).await.unwrap();

        assert!(backend
            .hash_get("u1:SimpleKV", "init_finished")
            .await
            .unwrap()
            .is_none());
        assert_eq!(backend.log_len("u1:Stream").await.unwrap(), 0);
        assert!(backend.exists("u1:wordcounter:lock").await.unwrap());
        assert!(backend.exists("u1:finished").await.unwrap());
    }
}

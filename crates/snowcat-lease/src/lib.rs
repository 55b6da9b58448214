//! C3 Lease Manager: TTL-bound mutual exclusion keyed by `{stage}:{stream}:lock`
//! (spec.md §4.3, §6). Grounded in `original_source/snowcat/decorators.py`'s
//! `singleton_task`, which sets a lock value to a unique token and only
//! deletes it if the value still matches — the same non-blocking
//! acquire / token-scoped release this module implements over
//! [`KvBackend::set_nx_ttl`] / [`KvBackend::delete_if_eq`].

use std::sync::Arc;
use std::time::Duration;

use snowcat_backend::KvBackend;
use snowcat_core::Error;
use uuid::Uuid;

/// Proof of a successful `try_acquire`. Each handle carries a random
/// per-acquire token so `release` can never clobber a lease that a later
/// owner re-acquired after this one's TTL expired.
#[derive(Debug, Clone)]
pub struct LeaseHandle {
    key: String,
    token: Vec<u8>,
}

impl LeaseHandle {
    pub fn key(&self) -> &str {
        &self.key
    }
}

pub struct LeaseManager {
    backend: Arc<dyn KvBackend>,
}

impl LeaseManager {
    pub fn new(backend: Arc<dyn KvBackend>) -> Self {
        Self { backend }
    }

    /// Non-blocking acquire. Returns `None` iff a live lease already holds
    /// `key`. Never blocks (spec.md §4.3 `tryAcquire`).
    #[tracing::instrument(level = "debug", skip(self), fields(key = %key))]
    pub async fn try_acquire(
        &self,
        key: &str,
        ttl: Duration,
    ) -> Result<Option<LeaseHandle>, Error> {
        let token = Uuid::new_v4().as_bytes().to_vec();
        let acquired = self
            .backend
            .set_nx_ttl(key, token.clone(), ttl.as_secs())
            .await?;
        if acquired {
            tracing::debug!(key, "lease acquired");
            Ok(Some(LeaseHandle {
                key: key.to_string(),
                token,
            }))
        } else {
            Ok(None)
        }
    }

    /// Idempotent; a release after TTL expiry (or after another owner has
    /// since re-acquired) is a no-op, since the stored value no longer
    /// matches this handle's token (spec.md §4.3 `release`).
    #[tracing::instrument(level = "debug", skip(self, handle), fields(key = %handle.key))]
    pub async fn release(&self, handle: &LeaseHandle) -> Result<(), Error> {
        let released = self
            .backend
            .delete_if_eq(&handle.key, &handle.token)
            .await?;
        if !released {
            tracing::debug!(key = %handle.key, "release was a no-op (lease already re-acquired or expired)");
        }
        Ok(())
    }

    /// Advisory check used by `runIfNotRunning` to avoid scheduling a
    /// duplicate activation (spec.md §4.3 `isHeld`).
    pub async fn is_held(&self, key: &str) -> Result<bool, Error> {
        self.backend.exists(key).await
    }
}
